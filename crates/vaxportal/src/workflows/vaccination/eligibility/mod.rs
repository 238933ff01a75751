mod policy;
mod rules;

pub use policy::{DriveGuard, DrivePolicy, DriveRejection};

use super::domain::{Drive, Student};
use serde::{Deserialize, Serialize};

/// Outcome of checking a (student, drive) pair before recording a vaccination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Accept,
    Reject(RejectionReason),
}

impl Decision {
    pub fn is_accept(self) -> bool {
        matches!(self, Decision::Accept)
    }
}

/// Business-rule reasons a vaccination cannot be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum RejectionReason {
    #[error("the drive is not open for recording")]
    DriveNotOpen,
    #[error("the student is already vaccinated under this drive")]
    AlreadyVaccinated,
    #[error("the student's class is not eligible for this drive")]
    ClassNotEligible,
    #[error("no doses remain for this drive")]
    NoDosesAvailable,
}

impl RejectionReason {
    pub const fn code(self) -> &'static str {
        match self {
            RejectionReason::DriveNotOpen => "DriveNotOpen",
            RejectionReason::AlreadyVaccinated => "AlreadyVaccinated",
            RejectionReason::ClassNotEligible => "ClassNotEligible",
            RejectionReason::NoDosesAvailable => "NoDosesAvailable",
        }
    }
}

/// Stateless evaluator over student and drive snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityEvaluator;

impl EligibilityEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// `already_vaccinated` reports whether a record exists for the pair in the same snapshot.
    pub fn evaluate(&self, student: &Student, drive: &Drive, already_vaccinated: bool) -> Decision {
        match rules::first_violation(student, drive, already_vaccinated) {
            Some(reason) => Decision::Reject(reason),
            None => Decision::Accept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::vaccination::domain::{
        ClassName, DriveId, DriveStatus, Section, StudentId,
    };
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn student(class: u8) -> Student {
        Student {
            id: StudentId(1),
            student_id: "STU00001".to_string(),
            name: "Asha Rao".to_string(),
            class_name: ClassName::new(class).expect("grade"),
            section: Section::A,
            age: Some(10),
            gender: None,
        }
    }

    fn drive(status: DriveStatus, available: u32, used: u32) -> Drive {
        Drive {
            id: DriveId(7),
            vaccine_name: "MMR".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 11, 5).expect("valid"),
            available_doses: available,
            used_doses: used,
            applicable_classes: BTreeSet::from([
                ClassName::new(5).expect("grade"),
                ClassName::new(6).expect("grade"),
            ]),
            status,
        }
    }

    #[test]
    fn accepts_eligible_student_with_capacity() {
        let open = drive(DriveStatus::Scheduled, 2, 0);
        let decision = EligibilityEvaluator::new().evaluate(&student(5), &open, false);
        assert_eq!(decision, Decision::Accept);
        assert!(decision.is_accept());
    }

    #[test]
    fn closed_drive_is_reported_before_other_failures() {
        let full_and_cancelled = drive(DriveStatus::Cancelled, 1, 1);
        let decision = EligibilityEvaluator::new().evaluate(&student(9), &full_and_cancelled, true);
        assert_eq!(decision, Decision::Reject(RejectionReason::DriveNotOpen));

        let completed = drive(DriveStatus::Completed, 5, 0);
        assert_eq!(
            EligibilityEvaluator::new().evaluate(&student(5), &completed, false),
            Decision::Reject(RejectionReason::DriveNotOpen)
        );
    }

    #[test]
    fn repeat_request_on_exhausted_drive_reports_already_vaccinated() {
        let exhausted = drive(DriveStatus::Scheduled, 1, 1);
        assert_eq!(
            EligibilityEvaluator::new().evaluate(&student(5), &exhausted, true),
            Decision::Reject(RejectionReason::AlreadyVaccinated)
        );
    }

    #[test]
    fn ineligible_class_is_rejected() {
        let open = drive(DriveStatus::Scheduled, 2, 0);
        assert_eq!(
            EligibilityEvaluator::new().evaluate(&student(7), &open, false),
            Decision::Reject(RejectionReason::ClassNotEligible)
        );
    }

    #[test]
    fn exhausted_drive_rejects_new_students() {
        let exhausted = drive(DriveStatus::Scheduled, 2, 2);
        assert_eq!(
            EligibilityEvaluator::new().evaluate(&student(6), &exhausted, false),
            Decision::Reject(RejectionReason::NoDosesAvailable)
        );
    }

    #[test]
    fn evaluation_is_repeatable_for_identical_snapshots() {
        let evaluator = EligibilityEvaluator::new();
        let s = student(6);
        let d = drive(DriveStatus::Scheduled, 3, 1);
        let first = evaluator.evaluate(&s, &d, false);
        let second = evaluator.evaluate(&s, &d, false);
        assert_eq!(first, second);
    }

    #[test]
    fn rejection_codes_are_stable() {
        assert_eq!(RejectionReason::DriveNotOpen.code(), "DriveNotOpen");
        assert_eq!(RejectionReason::NoDosesAvailable.code(), "NoDosesAvailable");
        assert_eq!(RejectionReason::ClassNotEligible.code(), "ClassNotEligible");
        assert_eq!(RejectionReason::AlreadyVaccinated.code(), "AlreadyVaccinated");
    }
}
