use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Internal identifier assigned by the store when a student is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub u64);

/// Internal identifier for a vaccination drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriveId(pub u64);

/// Internal identifier for a vaccination record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

macro_rules! display_id {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })+
    };
}

display_id!(StudentId, DriveId, RecordId);

/// Error raised when a raw value does not name a valid enumerated field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} '{value}' is not one of {allowed}")]
pub struct FieldValueError {
    pub field: &'static str,
    pub value: String,
    pub allowed: &'static str,
}

/// Grade level "1" through "12".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassName(u8);

impl ClassName {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 12;

    pub fn new(grade: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&grade).then_some(Self(grade))
    }

    pub fn grade(self) -> u8 {
        self.0
    }

    pub fn parse(raw: &str) -> Result<Self, FieldValueError> {
        raw.trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| FieldValueError {
                field: "class_name",
                value: raw.to_string(),
                allowed: "1-12",
            })
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ClassName {
    type Error = FieldValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClassName> for String {
    fn from(value: ClassName) -> Self {
        value.to_string()
    }
}

/// Class section "A" through "E".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Section {
    A,
    B,
    C,
    D,
    E,
}

impl Section {
    pub const fn label(self) -> &'static str {
        match self {
            Section::A => "A",
            Section::B => "B",
            Section::C => "C",
            Section::D => "D",
            Section::E => "E",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, FieldValueError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Section::A),
            "B" => Ok(Section::B),
            "C" => Ok(Section::C),
            "D" => Ok(Section::D),
            "E" => Ok(Section::E),
            _ => Err(FieldValueError {
                field: "section",
                value: raw.to_string(),
                allowed: "A-E",
            }),
        }
    }
}

impl TryFrom<String> for Section {
    type Error = FieldValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Section> for String {
    fn from(value: Section) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, FieldValueError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(FieldValueError {
                field: "gender",
                value: raw.to_string(),
                allowed: "Male, Female, Other",
            }),
        }
    }
}

/// Inclusive school-age bounds accepted for the optional age field.
pub const STUDENT_AGE_RANGE: std::ops::RangeInclusive<u8> = 4..=20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub student_id: String,
    pub name: String,
    pub class_name: ClassName,
    pub section: Section,
    pub age: Option<u8>,
    pub gender: Option<Gender>,
}

/// Validated student fields prior to the store assigning an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub student_id: String,
    pub name: String,
    pub class_name: ClassName,
    pub section: Section,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

impl NewStudent {
    pub fn into_student(self, id: StudentId) -> Student {
        Student {
            id,
            student_id: self.student_id,
            name: self.name,
            class_name: self.class_name,
            section: self.section,
            age: self.age,
            gender: self.gender,
        }
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class_name: Option<ClassName>,
    #[serde(default)]
    pub section: Option<Section>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

/// Accepts any letter case on input; always serialized with its canonical label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DriveStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl DriveStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DriveStatus::Scheduled => "Scheduled",
            DriveStatus::Completed => "Completed",
            DriveStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, FieldValueError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(DriveStatus::Scheduled),
            "completed" => Ok(DriveStatus::Completed),
            "cancelled" | "canceled" => Ok(DriveStatus::Cancelled),
            _ => Err(FieldValueError {
                field: "status",
                value: raw.to_string(),
                allowed: "Scheduled, Completed, Cancelled",
            }),
        }
    }
}

impl TryFrom<String> for DriveStatus {
    type Error = FieldValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DriveStatus> for String {
    fn from(value: DriveStatus) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drive {
    pub id: DriveId,
    pub vaccine_name: String,
    pub date: NaiveDate,
    pub available_doses: u32,
    pub used_doses: u32,
    pub applicable_classes: BTreeSet<ClassName>,
    pub status: DriveStatus,
}

impl Drive {
    pub fn remaining_doses(&self) -> u32 {
        self.available_doses.saturating_sub(self.used_doses)
    }

    pub fn admits(&self, class_name: ClassName) -> bool {
        self.applicable_classes.contains(&class_name)
    }

    pub fn is_open(&self) -> bool {
        self.status == DriveStatus::Scheduled
    }

    /// Share of doses consumed, in percent; zero when nothing was allocated.
    pub fn completion_percentage(&self) -> f64 {
        if self.available_doses == 0 {
            return 0.0;
        }
        f64::from(self.used_doses) / f64::from(self.available_doses) * 100.0
    }

    pub fn completion_label(&self) -> String {
        if self.available_doses == 0 {
            return "0%".to_string();
        }
        format!("{:.1}%", self.completion_percentage())
    }

    /// Status the drive should carry on `today`, when it differs from the stored one.
    /// Past scheduled drives complete; completed drives moved into the future reopen.
    pub fn status_transition_on(&self, today: NaiveDate) -> Option<DriveStatus> {
        match self.status {
            DriveStatus::Scheduled if self.date < today => Some(DriveStatus::Completed),
            DriveStatus::Completed if self.date > today => Some(DriveStatus::Scheduled),
            _ => None,
        }
    }

    pub fn view(&self) -> DriveView {
        DriveView {
            id: self.id,
            vaccine_name: self.vaccine_name.clone(),
            date: self.date,
            available_doses: self.available_doses,
            used_doses: self.used_doses,
            remaining_doses: self.remaining_doses(),
            applicable_classes: self.applicable_classes.iter().copied().collect(),
            status: self.status,
            completion: self.completion_label(),
        }
    }
}

/// Drive representation returned by the API, including derived capacity fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriveView {
    pub id: DriveId,
    pub vaccine_name: String,
    pub date: NaiveDate,
    pub available_doses: u32,
    pub used_doses: u32,
    pub remaining_doses: u32,
    pub applicable_classes: Vec<ClassName>,
    pub status: DriveStatus,
    pub completion: String,
}

/// Fields required to schedule a drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveDraft {
    pub vaccine_name: String,
    pub date: NaiveDate,
    pub available_doses: u32,
    pub applicable_classes: BTreeSet<ClassName>,
}

impl DriveDraft {
    pub fn into_drive(self, id: DriveId) -> Drive {
        Drive {
            id,
            vaccine_name: self.vaccine_name,
            date: self.date,
            available_doses: self.available_doses,
            used_doses: 0,
            applicable_classes: self.applicable_classes,
            status: DriveStatus::Scheduled,
        }
    }
}

/// Partial drive edit. Dose consumption is never editable directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveEdit {
    #[serde(default)]
    pub vaccine_name: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub available_doses: Option<u32>,
    #[serde(default)]
    pub applicable_classes: Option<BTreeSet<ClassName>>,
    #[serde(default)]
    pub status: Option<DriveStatus>,
}

impl DriveEdit {
    pub fn apply_to(&self, drive: &Drive) -> Drive {
        let mut updated = drive.clone();
        if let Some(name) = &self.vaccine_name {
            updated.vaccine_name = name.trim().to_string();
        }
        if let Some(date) = self.date {
            updated.date = date;
        }
        if let Some(doses) = self.available_doses {
            updated.available_doses = doses;
        }
        if let Some(classes) = &self.applicable_classes {
            updated.applicable_classes = classes.clone();
        }
        if let Some(status) = self.status {
            updated.status = status;
        }
        updated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordStatus {
    #[default]
    Completed,
    Pending,
}

impl RecordStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RecordStatus::Completed => "Completed",
            RecordStatus::Pending => "Pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccinationRecord {
    pub id: RecordId,
    pub student: StudentId,
    pub drive: DriveId,
    pub date: NaiveDate,
    pub status: RecordStatus,
}

/// A record the evaluator accepted but the store has not yet committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub student: StudentId,
    pub drive: DriveId,
    pub date: NaiveDate,
    pub status: RecordStatus,
}

impl RecordDraft {
    pub fn into_record(self, id: RecordId) -> VaccinationRecord {
        VaccinationRecord {
            id,
            student: self.student,
            drive: self.drive,
            date: self.date,
            status: self.status,
        }
    }
}
