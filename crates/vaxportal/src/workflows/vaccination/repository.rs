use super::domain::{
    Drive, DriveDraft, DriveId, DriveStatus, NewStudent, RecordDraft, RecordId, Student,
    StudentId, VaccinationRecord,
};

/// Consistent read of everything the eligibility evaluator needs for one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilitySnapshot {
    pub student: Student,
    pub drive: Drive,
    pub already_vaccinated: bool,
}

/// Result of a committed vaccination: the new record and the drive after the increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedVaccination {
    pub record: VaccinationRecord,
    pub drive: Drive,
}

/// Storage abstraction for students, drives, and vaccination records.
///
/// Methods that touch both a record and its drive counter must apply both changes or
/// neither, and must serialize against each other for the same drive.
pub trait VaccinationStore: Send + Sync {
    fn insert_student(&self, student: NewStudent) -> Result<Student, RepositoryError>;
    fn update_student(&self, student: Student) -> Result<Student, RepositoryError>;
    /// Refuses with [`RepositoryError::InUse`] while records reference the student.
    fn delete_student(&self, id: StudentId) -> Result<Student, RepositoryError>;
    fn student(&self, id: StudentId) -> Result<Option<Student>, RepositoryError>;
    fn students(&self) -> Result<Vec<Student>, RepositoryError>;

    fn insert_drive(&self, draft: DriveDraft) -> Result<Drive, RepositoryError>;
    /// Writes every field except `used_doses`, which stays owned by record commits.
    fn update_drive(&self, drive: Drive) -> Result<Drive, RepositoryError>;
    /// Moves a drive from `expected` to `next`; [`RepositoryError::Stale`] if it moved first.
    fn transition_drive(
        &self,
        id: DriveId,
        expected: DriveStatus,
        next: DriveStatus,
    ) -> Result<Drive, RepositoryError>;
    /// Refuses with [`RepositoryError::InUse`] once any dose has been recorded.
    fn delete_drive(&self, id: DriveId) -> Result<Drive, RepositoryError>;
    fn drive(&self, id: DriveId) -> Result<Option<Drive>, RepositoryError>;
    fn drives(&self) -> Result<Vec<Drive>, RepositoryError>;

    fn eligibility_snapshot(
        &self,
        student: StudentId,
        drive: DriveId,
    ) -> Result<Option<EligibilitySnapshot>, RepositoryError>;
    /// Inserts the record and increments the drive counter in one step, provided the drive
    /// still reports `observed_used_doses` and would still admit the student.
    fn commit_vaccination(
        &self,
        draft: RecordDraft,
        observed_used_doses: u32,
    ) -> Result<CommittedVaccination, RepositoryError>;
    /// Removes the record and decrements the drive counter (saturating at zero) in one step.
    fn delete_record(
        &self,
        id: RecordId,
    ) -> Result<(VaccinationRecord, Option<Drive>), RepositoryError>;
    fn record(&self, id: RecordId) -> Result<Option<VaccinationRecord>, RepositoryError>;
    fn records(&self) -> Result<Vec<VaccinationRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("snapshot is stale; the record changed concurrently")]
    Stale,
    #[error("record is still referenced")]
    InUse,
    #[error("available doses cannot drop below the {used_doses} already used")]
    CapacityBelowUsage { used_doses: u32 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
