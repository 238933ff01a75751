use super::super::domain::{Drive, Student};
use super::RejectionReason;

type Rule = fn(&Student, &Drive, bool) -> Option<RejectionReason>;

// Order matters: the first failing rule is the one reported to the caller.
const RULES: [Rule; 4] = [drive_open, not_yet_vaccinated, class_eligible, doses_remaining];

pub(crate) fn first_violation(
    student: &Student,
    drive: &Drive,
    already_vaccinated: bool,
) -> Option<RejectionReason> {
    RULES
        .iter()
        .find_map(|rule| rule(student, drive, already_vaccinated))
}

fn drive_open(_: &Student, drive: &Drive, _: bool) -> Option<RejectionReason> {
    (!drive.is_open()).then_some(RejectionReason::DriveNotOpen)
}

fn not_yet_vaccinated(_: &Student, _: &Drive, already: bool) -> Option<RejectionReason> {
    already.then_some(RejectionReason::AlreadyVaccinated)
}

fn class_eligible(student: &Student, drive: &Drive, _: bool) -> Option<RejectionReason> {
    (!drive.admits(student.class_name)).then_some(RejectionReason::ClassNotEligible)
}

fn doses_remaining(_: &Student, drive: &Drive, _: bool) -> Option<RejectionReason> {
    (drive.used_doses >= drive.available_doses).then_some(RejectionReason::NoDosesAvailable)
}
