//! Students, drives, and vaccination records.
//!
//! Eligibility is decided by a pure evaluator over a snapshot read from the store; the
//! store then commits the record and the dose increment together, refusing the write when
//! the drive counter moved after the snapshot was taken.

pub mod domain;
pub(crate) mod eligibility;
pub mod repository;
pub mod router;
pub mod service;
pub mod store;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    ClassName, Drive, DriveDraft, DriveEdit, DriveId, DriveStatus, DriveView, Gender,
    NewStudent, RecordId, RecordStatus, Section, Student, StudentId, StudentUpdate,
    VaccinationRecord,
};
pub use eligibility::{
    Decision, DriveGuard, DrivePolicy, DriveRejection, EligibilityEvaluator, RejectionReason,
};
pub use repository::{CommittedVaccination, EligibilitySnapshot, RepositoryError, VaccinationStore};
pub use router::vaccination_router;
pub use service::{
    DriveQuery, Page, RecordQuery, RecordView, ServiceError, StatusChange, StudentQuery,
    VaccinationRequest, VaccinationService,
};
pub use store::InMemoryVaccinationStore;
pub use validation::ValidationErrors;
