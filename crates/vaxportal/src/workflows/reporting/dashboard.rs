use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::workflows::vaccination::domain::{Drive, DriveStatus, Student, VaccinationRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_students: usize,
    pub vaccinated_students: usize,
    /// Share of students with at least one record, rounded to two decimals.
    pub vaccination_percentage: f64,
    pub total_drives: usize,
    pub completed_drives: usize,
}

pub fn dashboard_stats(
    students: &[Student],
    drives: &[Drive],
    records: &[VaccinationRecord],
) -> DashboardStats {
    let vaccinated_students = records
        .iter()
        .map(|record| record.student)
        .collect::<HashSet<_>>()
        .len();
    let vaccination_percentage = if students.is_empty() {
        0.0
    } else {
        let raw = vaccinated_students as f64 / students.len() as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    };

    DashboardStats {
        total_students: students.len(),
        vaccinated_students,
        vaccination_percentage,
        total_drives: drives.len(),
        completed_drives: drives
            .iter()
            .filter(|drive| drive.status == DriveStatus::Completed)
            .count(),
    }
}

/// Scheduled drives dated within `window_days` of `today`, soonest first.
pub fn upcoming_drives(drives: &[Drive], today: NaiveDate, window_days: u32) -> Vec<Drive> {
    let horizon = today
        .checked_add_days(Days::new(u64::from(window_days)))
        .unwrap_or(NaiveDate::MAX);

    let mut upcoming: Vec<Drive> = drives
        .iter()
        .filter(|drive| drive.status == DriveStatus::Scheduled)
        .filter(|drive| drive.date >= today && drive.date <= horizon)
        .cloned()
        .collect();
    upcoming.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
    upcoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::vaccination::domain::{
        ClassName, DriveDraft, DriveId, NewStudent, RecordDraft, RecordId, RecordStatus,
        Section, StudentId,
    };
    use std::collections::BTreeSet;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).expect("valid")
    }

    fn drive(id: u64, days_ahead: i64, status: DriveStatus) -> Drive {
        let mut drive = DriveDraft {
            vaccine_name: format!("Vaccine {id}"),
            date: today() + chrono::Duration::days(days_ahead),
            available_doses: 5,
            applicable_classes: BTreeSet::from([ClassName::new(3).expect("grade")]),
        }
        .into_drive(DriveId(id));
        drive.status = status;
        drive
    }

    fn students(count: u64) -> Vec<Student> {
        (1..=count)
            .map(|id| {
                NewStudent {
                    student_id: format!("S{id}"),
                    name: format!("Student {id}"),
                    class_name: ClassName::new(3).expect("grade"),
                    section: Section::A,
                    age: None,
                    gender: None,
                }
                .into_student(StudentId(id))
            })
            .collect()
    }

    fn record(id: u64, student: u64, drive: u64) -> VaccinationRecord {
        RecordDraft {
            student: StudentId(student),
            drive: DriveId(drive),
            date: today(),
            status: RecordStatus::Completed,
        }
        .into_record(RecordId(id))
    }

    #[test]
    fn stats_count_distinct_vaccinated_students() {
        let drives = vec![
            drive(1, -3, DriveStatus::Completed),
            drive(2, 20, DriveStatus::Scheduled),
        ];
        let records = vec![record(1, 1, 1), record(2, 1, 2), record(3, 2, 1)];
        let stats = dashboard_stats(&students(3), &drives, &records);

        assert_eq!(stats.total_students, 3);
        assert_eq!(stats.vaccinated_students, 2);
        assert_eq!(stats.vaccination_percentage, 66.67);
        assert_eq!(stats.total_drives, 2);
        assert_eq!(stats.completed_drives, 1);
    }

    #[test]
    fn stats_without_students_report_zero_percent() {
        let stats = dashboard_stats(&[], &[], &[]);
        assert_eq!(stats.vaccination_percentage, 0.0);
    }

    #[test]
    fn upcoming_drives_are_scheduled_within_window_ascending() {
        let drives = vec![
            drive(1, 25, DriveStatus::Scheduled),
            drive(2, 5, DriveStatus::Scheduled),
            drive(3, 31, DriveStatus::Scheduled),
            drive(4, 10, DriveStatus::Cancelled),
            drive(5, -1, DriveStatus::Scheduled),
            drive(6, 30, DriveStatus::Scheduled),
        ];
        let ids: Vec<u64> = upcoming_drives(&drives, today(), 30)
            .iter()
            .map(|drive| drive.id.0)
            .collect();
        assert_eq!(ids, vec![2, 1, 6]);
    }
}
