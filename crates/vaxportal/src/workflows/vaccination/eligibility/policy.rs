use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::super::domain::{Drive, DriveDraft, DriveEdit, DriveId, DriveStatus};
use super::super::validation::ValidationErrors;

const DEFAULT_LEAD_TIME_DAYS: u32 = 15;

/// Scheduling rules applied to drive mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrivePolicy {
    lead_time_days: u32,
}

impl DrivePolicy {
    pub fn new(lead_time_days: u32) -> Self {
        Self { lead_time_days }
    }

    pub fn lead_time_days(&self) -> u32 {
        self.lead_time_days
    }

    /// First date a drive may be scheduled for when submitted on `today`.
    pub fn earliest_date(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_add_days(Days::new(u64::from(self.lead_time_days)))
            .unwrap_or(NaiveDate::MAX)
    }
}

impl Default for DrivePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LEAD_TIME_DAYS)
    }
}

/// Reasons a drive create, edit, or delete is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriveRejection {
    #[error("drives must be scheduled on or after {earliest} ({lead_time_days} days lead time)")]
    TooSoon {
        earliest: NaiveDate,
        lead_time_days: u32,
    },
    #[error("drive {drive} is locked: {reason}")]
    DriveLocked { drive: DriveId, reason: &'static str },
    #[error("drive {drive} has {used_doses} recorded vaccination(s)")]
    HasRecords { drive: DriveId, used_doses: u32 },
    #[error("drive {existing} is already scheduled on {date}")]
    DateConflict { date: NaiveDate, existing: DriveId },
    #[error("{0}")]
    Validation(ValidationErrors),
}

impl DriveRejection {
    pub const fn code(&self) -> &'static str {
        match self {
            DriveRejection::TooSoon { .. } => "TooSoon",
            DriveRejection::DriveLocked { .. } => "DriveLocked",
            DriveRejection::HasRecords { .. } => "HasRecords",
            DriveRejection::DateConflict { .. } => "DateConflict",
            DriveRejection::Validation(_) => "ValidationError",
        }
    }
}

impl From<ValidationErrors> for DriveRejection {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

/// Guard evaluating drive mutations against a snapshot of the drive calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveGuard {
    policy: DrivePolicy,
}

impl DriveGuard {
    pub fn new(policy: DrivePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DrivePolicy {
        self.policy
    }

    pub fn check_create(
        &self,
        draft: &DriveDraft,
        today: NaiveDate,
        calendar: &[Drive],
    ) -> Result<(), DriveRejection> {
        let mut errors = ValidationErrors::new();
        if draft.vaccine_name.trim().is_empty() {
            errors.add("vaccine_name", "is required");
        }
        if draft.available_doses < 1 {
            errors.add("available_doses", "must be at least 1");
        }
        if draft.applicable_classes.is_empty() {
            errors.add("applicable_classes", "must name at least one class");
        }
        errors.into_result()?;

        self.check_lead_time(draft.date, today)?;
        check_calendar(draft.date, None, calendar)
    }

    /// Validates `edit` against `current` and returns the drive as it would be stored.
    pub fn check_edit(
        &self,
        current: &Drive,
        edit: &DriveEdit,
        today: NaiveDate,
        calendar: &[Drive],
    ) -> Result<Drive, DriveRejection> {
        if current.status == DriveStatus::Completed {
            return Err(DriveRejection::DriveLocked {
                drive: current.id,
                reason: "completed drives cannot be edited",
            });
        }
        if current.date < today {
            return Err(DriveRejection::DriveLocked {
                drive: current.id,
                reason: "past drives cannot be edited",
            });
        }

        let updated = edit.apply_to(current);

        let mut errors = ValidationErrors::new();
        if updated.vaccine_name.is_empty() {
            errors.add("vaccine_name", "cannot be blank");
        }
        if updated.available_doses < 1 {
            errors.add("available_doses", "must be at least 1");
        } else if updated.available_doses < updated.used_doses {
            errors.add(
                "available_doses",
                format!(
                    "cannot drop below the {} dose(s) already used",
                    updated.used_doses
                ),
            );
        }
        if updated.applicable_classes.is_empty() {
            errors.add("applicable_classes", "must name at least one class");
        }
        errors.into_result()?;

        if let Some(date) = edit.date {
            self.check_lead_time(date, today)?;
            check_calendar(date, Some(current.id), calendar)?;
        }

        Ok(updated)
    }

    pub fn check_delete(
        &self,
        drive: &Drive,
        has_records: bool,
        today: NaiveDate,
    ) -> Result<(), DriveRejection> {
        if drive.status == DriveStatus::Completed {
            return Err(DriveRejection::DriveLocked {
                drive: drive.id,
                reason: "completed drives cannot be deleted",
            });
        }
        if drive.date < today {
            return Err(DriveRejection::DriveLocked {
                drive: drive.id,
                reason: "past drives cannot be deleted",
            });
        }
        if drive.used_doses > 0 || has_records {
            return Err(DriveRejection::HasRecords {
                drive: drive.id,
                used_doses: drive.used_doses,
            });
        }
        Ok(())
    }

    fn check_lead_time(&self, date: NaiveDate, today: NaiveDate) -> Result<(), DriveRejection> {
        let earliest = self.policy.earliest_date(today);
        if date < earliest {
            return Err(DriveRejection::TooSoon {
                earliest,
                lead_time_days: self.policy.lead_time_days(),
            });
        }
        Ok(())
    }
}

fn check_calendar(
    date: NaiveDate,
    exclude: Option<DriveId>,
    calendar: &[Drive],
) -> Result<(), DriveRejection> {
    let clash = calendar.iter().find(|other| {
        other.date == date
            && other.status != DriveStatus::Cancelled
            && Some(other.id) != exclude
    });

    match clash {
        Some(existing) => Err(DriveRejection::DateConflict {
            date,
            existing: existing.id,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::vaccination::domain::ClassName;
    use std::collections::BTreeSet;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 1).expect("valid")
    }

    fn classes() -> BTreeSet<ClassName> {
        BTreeSet::from([ClassName::new(5).expect("grade")])
    }

    fn draft(days_ahead: u64) -> DriveDraft {
        DriveDraft {
            vaccine_name: "Polio".to_string(),
            date: today() + Days::new(days_ahead),
            available_doses: 50,
            applicable_classes: classes(),
        }
    }

    fn stored(id: u64, days_ahead: u64, status: DriveStatus, used: u32) -> Drive {
        let mut drive = draft(days_ahead).into_drive(DriveId(id));
        drive.status = status;
        drive.used_doses = used;
        drive
    }

    #[test]
    fn lead_time_boundary_is_fifteen_days() {
        let guard = DriveGuard::default();
        assert!(matches!(
            guard.check_create(&draft(14), today(), &[]),
            Err(DriveRejection::TooSoon { lead_time_days: 15, .. })
        ));
        assert_eq!(guard.check_create(&draft(15), today(), &[]), Ok(()));
    }

    #[test]
    fn create_validates_fields_before_schedule() {
        let mut invalid = draft(3);
        invalid.available_doses = 0;
        invalid.applicable_classes.clear();
        match DriveGuard::default().check_create(&invalid, today(), &[]) {
            Err(DriveRejection::Validation(errors)) => {
                assert!(errors.get("available_doses").is_some());
                assert!(errors.get("applicable_classes").is_some());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn create_rejects_date_taken_by_active_drive() {
        let calendar = vec![stored(3, 20, DriveStatus::Scheduled, 0)];
        assert_eq!(
            DriveGuard::default().check_create(&draft(20), today(), &calendar),
            Err(DriveRejection::DateConflict {
                date: today() + Days::new(20),
                existing: DriveId(3),
            })
        );

        let cancelled = vec![stored(3, 20, DriveStatus::Cancelled, 0)];
        assert_eq!(
            DriveGuard::default().check_create(&draft(20), today(), &cancelled),
            Ok(())
        );
    }

    #[test]
    fn edit_of_completed_drive_is_locked() {
        let drive = stored(1, 30, DriveStatus::Completed, 0);
        let rejection = DriveGuard::default()
            .check_edit(&drive, &DriveEdit::default(), today(), &[])
            .expect_err("locked");
        assert_eq!(rejection.code(), "DriveLocked");
    }

    #[test]
    fn edit_revalidates_lead_time_for_new_date() {
        let drive = stored(1, 30, DriveStatus::Scheduled, 0);
        let edit = DriveEdit {
            date: Some(today() + Days::new(10)),
            ..DriveEdit::default()
        };
        let rejection = DriveGuard::default()
            .check_edit(&drive, &edit, today(), &[drive.clone()])
            .expect_err("too soon");
        assert_eq!(rejection.code(), "TooSoon");
    }

    #[test]
    fn edit_keeps_own_date_without_conflict() {
        let drive = stored(1, 30, DriveStatus::Scheduled, 0);
        let edit = DriveEdit {
            date: Some(drive.date),
            vaccine_name: Some("Polio booster".to_string()),
            ..DriveEdit::default()
        };
        let updated = DriveGuard::default()
            .check_edit(&drive, &edit, today(), &[drive.clone()])
            .expect("edit accepted");
        assert_eq!(updated.vaccine_name, "Polio booster");
    }

    #[test]
    fn edit_cannot_shrink_below_used_doses() {
        let drive = stored(1, 30, DriveStatus::Scheduled, 8);
        let edit = DriveEdit {
            available_doses: Some(5),
            ..DriveEdit::default()
        };
        let rejection = DriveGuard::default()
            .check_edit(&drive, &edit, today(), &[])
            .expect_err("shrink refused");
        assert_eq!(rejection.code(), "ValidationError");
    }

    #[test]
    fn delete_requires_unused_future_drive() {
        let guard = DriveGuard::default();
        let used = stored(1, 30, DriveStatus::Scheduled, 1);
        assert_eq!(
            guard.check_delete(&used, true, today()).map_err(|e| e.code()),
            Err("HasRecords")
        );

        let completed = stored(2, 30, DriveStatus::Completed, 0);
        assert_eq!(
            guard.check_delete(&completed, false, today()).map_err(|e| e.code()),
            Err("DriveLocked")
        );

        let fresh = stored(3, 30, DriveStatus::Scheduled, 0);
        assert_eq!(guard.check_delete(&fresh, false, today()), Ok(()));
    }
}
