use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::domain::{NewStudent, StudentUpdate, STUDENT_AGE_RANGE};

/// Per-field validation failures collected before anything reaches the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<&'static str, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Keeps the first message reported for a field.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub(crate) fn check_age(errors: &mut ValidationErrors, age: Option<u8>) {
    if let Some(age) = age {
        if !STUDENT_AGE_RANGE.contains(&age) {
            errors.add(
                "age",
                format!(
                    "must be between {} and {}",
                    STUDENT_AGE_RANGE.start(),
                    STUDENT_AGE_RANGE.end()
                ),
            );
        }
    }
}

pub(crate) fn validate_new_student(student: &NewStudent) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if student.student_id.trim().is_empty() {
        errors.add("student_id", "is required");
    }
    if student.name.trim().is_empty() {
        errors.add("name", "is required");
    }
    check_age(&mut errors, student.age);
    errors.into_result()
}

pub(crate) fn validate_student_update(update: &StudentUpdate) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if matches!(&update.name, Some(name) if name.trim().is_empty()) {
        errors.add("name", "cannot be blank");
    }
    check_age(&mut errors, update.age);
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::vaccination::domain::{ClassName, Section};

    #[test]
    fn display_lists_fields_in_order() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "is required");
        errors.add("age", "must be between 4 and 20");
        errors.add("name", "ignored duplicate");
        assert_eq!(
            errors.to_string(),
            "age: must be between 4 and 20; name: is required"
        );
        assert_eq!(errors.get("name"), Some("is required"));
    }

    #[test]
    fn new_student_requires_identity_and_school_age() {
        let student = NewStudent {
            student_id: "  ".to_string(),
            name: "Ravi".to_string(),
            class_name: ClassName::new(3).expect("grade"),
            section: Section::B,
            age: Some(31),
            gender: None,
        };
        let errors = validate_new_student(&student).expect_err("invalid student");
        assert!(errors.get("student_id").is_some());
        assert!(errors.get("age").is_some());
        assert!(errors.get("name").is_none());
    }
}
