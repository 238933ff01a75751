//! Student roster CSV import.

use std::collections::HashMap;
use std::io::Read;

use serde::{Deserialize, Deserializer, Serialize};

use crate::workflows::vaccination::domain::{ClassName, Gender, NewStudent, Section};
use crate::workflows::vaccination::validation::validate_new_student;

pub const TEMPLATE_HEADER: &str = "student_id,name,class_name,section,age,gender";
pub const TEMPLATE_FILENAME: &str = "student_import_template.csv";

const REQUIRED_COLUMNS: [&str; 4] = ["student_id", "name", "class_name", "section"];

/// Header-only CSV callers can fill in and upload.
pub fn template() -> String {
    format!("{TEMPLATE_HEADER}\n")
}

/// Errors that make the whole file unusable, as opposed to a single bad row.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("roster csv could not be read: {0}")]
    Unreadable(#[from] csv::Error),
}

/// A parsed data row; `line` is 1-based and excludes the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub line: usize,
    pub student: Result<NewStudent, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

impl ImportSummary {
    pub fn succeed(&mut self) {
        self.success_count += 1;
    }

    pub fn fail(&mut self, line: usize, message: impl std::fmt::Display) {
        self.error_count += 1;
        self.errors.push(format!("Row {line}: {message}"));
    }
}

#[derive(Debug, Deserialize)]
struct RosterCsvRow {
    student_id: String,
    name: String,
    class_name: String,
    section: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    age: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    gender: Option<String>,
}

impl RosterCsvRow {
    fn into_student(self) -> Result<NewStudent, String> {
        let class_name = ClassName::parse(&self.class_name).map_err(|err| err.to_string())?;
        let section = Section::parse(&self.section).map_err(|err| err.to_string())?;
        let age = match self.age {
            Some(raw) => Some(
                raw.parse::<u8>()
                    .map_err(|_| format!("age '{raw}' is not a whole number"))?,
            ),
            None => None,
        };
        let gender = self
            .gender
            .map(|raw| Gender::parse(&raw))
            .transpose()
            .map_err(|err| err.to_string())?;

        let student = NewStudent {
            student_id: self.student_id,
            name: self.name,
            class_name,
            section,
            age,
            gender,
        };
        validate_new_student(&student).map_err(|errors| errors.to_string())?;
        Ok(student)
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|raw| !raw.trim().is_empty()))
}

/// Parses a roster file, flagging student IDs repeated within the file on every
/// occurrence after the first.
pub fn parse_roster<R: Read>(reader: R) -> Result<Vec<RosterRow>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|header| header == column) {
            return Err(ImportError::MissingColumn(column));
        }
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut rows = Vec::new();

    for (index, result) in csv_reader.deserialize::<RosterCsvRow>().enumerate() {
        let line = index + 1;
        let student = match result {
            Ok(raw) => raw.into_student(),
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => Err(format!("unreadable row ({err})")),
        };

        let student = student.and_then(|student| match seen.get(&student.student_id) {
            Some(first) => Err(format!(
                "Student ID {} is duplicated in the file (first on row {first})",
                student.student_id
            )),
            None => {
                seen.insert(student.student_id.clone(), line);
                Ok(student)
            }
        });

        rows.push(RosterRow { line, student });
    }

    Ok(rows)
}
