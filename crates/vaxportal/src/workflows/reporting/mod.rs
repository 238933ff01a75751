//! Read-only reporting over vaccination records.
//!
//! Every function here works on snapshots handed in by the caller and never touches the
//! store, so the same query can back the JSON listing, the CSV download, and the CLI.

mod dashboard;
pub mod export;

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::workflows::vaccination::domain::{
    ClassName, Drive, DriveId, RecordId, Student, StudentId, VaccinationRecord,
};
use crate::workflows::vaccination::validation::ValidationErrors;

pub use dashboard::{dashboard_stats, upcoming_drives, DashboardStats};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Typed report filters; an absent field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilters {
    pub vaccine_name: Option<String>,
    pub class_name: Option<ClassName>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ReportFilters {
    fn matches(&self, record: &VaccinationRecord, student: &Student, drive: &Drive) -> bool {
        if let Some(vaccine) = &self.vaccine_name {
            if drive.vaccine_name != *vaccine {
                return false;
            }
        }
        if let Some(class_name) = self.class_name {
            if student.class_name != class_name {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if record.date < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if record.date > end {
                return false;
            }
        }
        true
    }
}

/// Raw query-string form of [`ReportFilters`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportParams {
    #[serde(default)]
    pub vaccine_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub download: Option<bool>,
}

impl ReportParams {
    /// Parses the raw values; blank strings are treated as absent.
    pub fn into_filters(self) -> Result<ReportFilters, ReportError> {
        let mut errors = ValidationErrors::new();

        let class_name = match non_blank(self.class_name) {
            Some(raw) => match ClassName::parse(&raw) {
                Ok(class_name) => Some(class_name),
                Err(invalid) => {
                    errors.add("class_name", invalid.to_string());
                    None
                }
            },
            None => None,
        };
        let start_date = parse_date(&mut errors, "start_date", self.start_date);
        let end_date = parse_date(&mut errors, "end_date", self.end_date);
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                errors.add("end_date", "must not precede start_date");
            }
        }
        errors.into_result()?;

        Ok(ReportFilters {
            vaccine_name: non_blank(self.vaccine_name),
            class_name,
            start_date,
            end_date,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_date(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<String>,
) -> Option<NaiveDate> {
    let raw = non_blank(value)?;
    match NaiveDate::parse_from_str(&raw, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            errors.add(field, format!("'{raw}' is not a YYYY-MM-DD date"));
            None
        }
    }
}

/// One report line, denormalised for display and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub record_id: RecordId,
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub section: String,
    pub vaccine_name: String,
    pub vaccination_date: NaiveDate,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordSet {
    pub count: usize,
    pub records: Vec<ReportRow>,
}

/// Runs the filters over the snapshots, ordered by vaccination date then record id.
pub fn query(
    records: &[VaccinationRecord],
    students: &[Student],
    drives: &[Drive],
    filters: &ReportFilters,
) -> RecordSet {
    let students: HashMap<StudentId, &Student> =
        students.iter().map(|student| (student.id, student)).collect();
    let drives: HashMap<DriveId, &Drive> = drives.iter().map(|drive| (drive.id, drive)).collect();

    let mut matched: Vec<(&VaccinationRecord, &Student, &Drive)> = records
        .iter()
        .filter_map(|record| {
            let student = students.get(&record.student)?;
            let drive = drives.get(&record.drive)?;
            Some((record, *student, *drive))
        })
        .filter(|(record, student, drive)| filters.matches(record, student, drive))
        .collect();
    matched.sort_by(|(a, _, _), (b, _, _)| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

    let records: Vec<ReportRow> = matched
        .into_iter()
        .map(|(record, student, drive)| ReportRow {
            record_id: record.id,
            student_id: student.student_id.clone(),
            student_name: student.name.clone(),
            class_name: student.class_name.to_string(),
            section: student.section.label().to_string(),
            vaccine_name: drive.vaccine_name.clone(),
            vaccination_date: record.date,
            status: record.status.label().to_string(),
        })
        .collect();

    RecordSet {
        count: records.len(),
        records,
    }
}

pub fn distinct_vaccine_names(drives: &[Drive]) -> Vec<String> {
    drives
        .iter()
        .map(|drive| drive.vaccine_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Class names as strings in lexicographic order, so "10" sorts before "5".
pub fn distinct_class_names(students: &[Student]) -> Vec<String> {
    students
        .iter()
        .map(|student| student.class_name.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
}
