use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PortalConfig;
use crate::workflows::reporting::{self, DashboardStats, RecordSet, ReportError, ReportFilters};
use crate::workflows::roster::{self, ImportError, ImportSummary};

use super::domain::{
    ClassName, Drive, DriveDraft, DriveEdit, DriveId, DriveStatus, DriveView, NewStudent,
    RecordDraft, RecordId, RecordStatus, Student, StudentId, StudentUpdate, VaccinationRecord,
};
use super::eligibility::{
    Decision, DriveGuard, DriveRejection, EligibilityEvaluator, RejectionReason,
};
use super::repository::{
    CommittedVaccination, EligibilitySnapshot, RepositoryError, VaccinationStore,
};
use super::validation::{validate_new_student, validate_student_update, ValidationErrors};

const MAX_PAGE_SIZE: u32 = 100;
const COMMIT_ATTEMPTS: usize = 2;

/// Request to record a vaccination for a student under a drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccinationRequest {
    pub student_id: StudentId,
    pub drive_id: DriveId,
    #[serde(default)]
    pub status: Option<RecordStatus>,
    /// Defaults to the drive date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StudentQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub class_name: Option<ClassName>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DriveQuery {
    #[serde(default)]
    pub status: Option<DriveStatus>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RecordQuery {
    #[serde(default)]
    pub student_id: Option<StudentId>,
    #[serde(default)]
    pub drive_id: Option<DriveId>,
}

/// One page of a listing plus the totals needed to navigate it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: usize,
    pub pages: usize,
    pub current_page: u32,
    pub per_page: u32,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    fn slice(items: Vec<T>, page: u32, per_page: u32) -> Self {
        let total = items.len();
        let per = per_page as usize;
        let pages = total.div_ceil(per);
        let skip = (page as usize - 1).saturating_mul(per);
        let items = items.into_iter().skip(skip).take(per).collect();
        Self {
            total,
            pages,
            current_page: page,
            per_page,
            items,
        }
    }
}

/// Record joined with the names a caller needs to display it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordView {
    pub id: RecordId,
    pub student_id: StudentId,
    pub drive_id: DriveId,
    pub student_name: String,
    pub vaccine_name: String,
    pub date: NaiveDate,
    pub status: RecordStatus,
}

/// Outcome of a status refresh pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub drive_id: DriveId,
    pub from: DriveStatus,
    pub to: DriveStatus,
}

/// Service composing the eligibility evaluator, drive guard, and store.
pub struct VaccinationService<S> {
    store: Arc<S>,
    evaluator: EligibilityEvaluator,
    guard: DriveGuard,
    config: PortalConfig,
}

impl<S> VaccinationService<S>
where
    S: VaccinationStore + 'static,
{
    pub fn new(store: Arc<S>, config: PortalConfig) -> Self {
        Self {
            store,
            evaluator: EligibilityEvaluator::new(),
            guard: DriveGuard::new(config.drive_policy()),
            config,
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    // Students

    pub fn create_student(&self, student: NewStudent) -> Result<Student, ServiceError> {
        validate_new_student(&student)?;
        let student = NewStudent {
            student_id: student.student_id.trim().to_string(),
            name: student.name.trim().to_string(),
            ..student
        };
        let code = student.student_id.clone();
        match self.store.insert_student(student) {
            Ok(created) => {
                info!(student = %created.id, code = %created.student_id, "student created");
                Ok(created)
            }
            Err(RepositoryError::Conflict) => {
                Err(ServiceError::DuplicateStudent { student_id: code })
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn student(&self, id: StudentId) -> Result<Student, ServiceError> {
        self.store
            .student(id)?
            .ok_or_else(|| ServiceError::not_found("student", id))
    }

    pub fn update_student(
        &self,
        id: StudentId,
        update: StudentUpdate,
    ) -> Result<Student, ServiceError> {
        validate_student_update(&update)?;
        let mut student = self.student(id)?;
        if let Some(name) = update.name {
            student.name = name.trim().to_string();
        }
        if let Some(class_name) = update.class_name {
            student.class_name = class_name;
        }
        if let Some(section) = update.section {
            student.section = section;
        }
        if update.age.is_some() {
            student.age = update.age;
        }
        if update.gender.is_some() {
            student.gender = update.gender;
        }

        match self.store.update_student(student) {
            Ok(updated) => Ok(updated),
            Err(RepositoryError::NotFound) => Err(ServiceError::not_found("student", id)),
            Err(other) => Err(other.into()),
        }
    }

    pub fn delete_student(&self, id: StudentId) -> Result<Student, ServiceError> {
        match self.store.delete_student(id) {
            Ok(student) => {
                info!(student = %id, "student deleted");
                Ok(student)
            }
            Err(RepositoryError::NotFound) => Err(ServiceError::not_found("student", id)),
            Err(RepositoryError::InUse) => Err(ServiceError::StudentHasRecords(id)),
            Err(other) => Err(other.into()),
        }
    }

    pub fn list_students(&self, query: &StudentQuery) -> Result<Page<Student>, ServiceError> {
        let (page, per_page) = self.page_bounds(query.page, query.per_page);
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);

        let students: Vec<Student> = self
            .store
            .students()?
            .into_iter()
            .filter(|student| query.class_name.map_or(true, |class| student.class_name == class))
            .filter(|student| match &needle {
                Some(needle) => {
                    student.name.to_lowercase().contains(needle)
                        || student.student_id.to_lowercase().contains(needle)
                        || student.class_name.to_string().contains(needle.as_str())
                }
                None => true,
            })
            .collect();

        Ok(Page::slice(students, page, per_page))
    }

    /// Imports a roster CSV; row-level problems are reported without aborting the file.
    pub fn import_students<R: Read>(&self, reader: R) -> Result<ImportSummary, ServiceError> {
        let rows = roster::parse_roster(reader)?;
        let mut summary = ImportSummary::default();

        for row in rows {
            let student = match row.student {
                Ok(student) => student,
                Err(message) => {
                    summary.fail(row.line, message);
                    continue;
                }
            };

            let code = student.student_id.clone();
            match self.store.insert_student(student) {
                Ok(_) => summary.succeed(),
                Err(RepositoryError::Conflict) => {
                    summary.fail(row.line, format!("Student ID {code} already exists"));
                }
                Err(other) => return Err(other.into()),
            }
        }

        info!(
            imported = summary.success_count,
            failed = summary.error_count,
            "roster import finished"
        );
        Ok(summary)
    }

    // Drives

    pub fn create_drive(&self, draft: DriveDraft, today: NaiveDate) -> Result<Drive, ServiceError> {
        let draft = DriveDraft {
            vaccine_name: draft.vaccine_name.trim().to_string(),
            ..draft
        };
        let calendar = self.store.drives()?;
        if let Err(rejection) = self.guard.check_create(&draft, today, &calendar) {
            info!(code = rejection.code(), %rejection, "drive creation rejected");
            return Err(rejection.into());
        }

        let drive = self.store.insert_drive(draft)?;
        info!(
            drive = %drive.id,
            vaccine = %drive.vaccine_name,
            date = %drive.date,
            "drive scheduled"
        );
        Ok(drive)
    }

    pub fn drive(&self, id: DriveId) -> Result<Drive, ServiceError> {
        self.store
            .drive(id)?
            .ok_or_else(|| ServiceError::not_found("drive", id))
    }

    pub fn update_drive(
        &self,
        id: DriveId,
        edit: DriveEdit,
        today: NaiveDate,
    ) -> Result<Drive, ServiceError> {
        let current = self.drive(id)?;
        let calendar = self.store.drives()?;
        let updated = match self.guard.check_edit(&current, &edit, today, &calendar) {
            Ok(updated) => updated,
            Err(rejection) => {
                info!(drive = %id, code = rejection.code(), %rejection, "drive edit rejected");
                return Err(rejection.into());
            }
        };

        match self.store.update_drive(updated) {
            Ok(drive) => {
                info!(drive = %id, "drive updated");
                Ok(drive)
            }
            Err(RepositoryError::NotFound) => Err(ServiceError::not_found("drive", id)),
            Err(RepositoryError::CapacityBelowUsage { used_doses }) => {
                Err(DriveRejection::Validation(ValidationErrors::single(
                    "available_doses",
                    format!("cannot drop below the {used_doses} dose(s) already used"),
                ))
                .into())
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn delete_drive(&self, id: DriveId, today: NaiveDate) -> Result<Drive, ServiceError> {
        let drive = self.drive(id)?;
        let has_records = self.store.records()?.iter().any(|record| record.drive == id);
        if let Err(rejection) = self.guard.check_delete(&drive, has_records, today) {
            info!(drive = %id, code = rejection.code(), %rejection, "drive deletion rejected");
            return Err(rejection.into());
        }

        match self.store.delete_drive(id) {
            Ok(deleted) => {
                info!(drive = %id, "drive deleted");
                Ok(deleted)
            }
            Err(RepositoryError::NotFound) => Err(ServiceError::not_found("drive", id)),
            Err(RepositoryError::InUse) => {
                let used_doses = self.drive(id).map(|drive| drive.used_doses).unwrap_or_default();
                Err(DriveRejection::HasRecords { drive: id, used_doses }.into())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Drives ordered by date, newest first.
    pub fn list_drives(&self, query: &DriveQuery) -> Result<Page<DriveView>, ServiceError> {
        let (page, per_page) = self.page_bounds(query.page, query.per_page);
        let mut drives: Vec<Drive> = self
            .store
            .drives()?
            .into_iter()
            .filter(|drive| query.status.map_or(true, |status| drive.status == status))
            .collect();
        drives.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        let views = drives.iter().map(Drive::view).collect();
        Ok(Page::slice(views, page, per_page))
    }

    pub fn refresh_drive_statuses(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<StatusChange>, ServiceError> {
        let mut changes = Vec::new();
        for drive in self.store.drives()? {
            let Some(next) = drive.status_transition_on(today) else {
                continue;
            };
            match self.store.transition_drive(drive.id, drive.status, next) {
                Ok(_) => {
                    info!(
                        drive = %drive.id,
                        from = drive.status.label(),
                        to = next.label(),
                        "drive status refreshed"
                    );
                    changes.push(StatusChange {
                        drive_id: drive.id,
                        from: drive.status,
                        to: next,
                    });
                }
                Err(RepositoryError::Stale | RepositoryError::NotFound) => {
                    debug!(drive = %drive.id, "drive changed during status refresh; skipping");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Ok(changes)
    }

    pub fn upcoming_drives(&self, today: NaiveDate) -> Result<Vec<DriveView>, ServiceError> {
        let drives = self.store.drives()?;
        Ok(reporting::upcoming_drives(&drives, today, self.config.upcoming_window_days)
            .iter()
            .map(Drive::view)
            .collect())
    }

    // Records

    /// Evaluates the pair against a consistent snapshot without writing anything.
    pub fn check_eligibility(
        &self,
        student: StudentId,
        drive: DriveId,
    ) -> Result<Decision, ServiceError> {
        let snapshot = self.snapshot(student, drive)?;
        Ok(self
            .evaluator
            .evaluate(&snapshot.student, &snapshot.drive, snapshot.already_vaccinated))
    }

    /// Records a vaccination; the record insert and dose increment commit together.
    pub fn record_vaccination(
        &self,
        request: VaccinationRequest,
    ) -> Result<CommittedVaccination, ServiceError> {
        for attempt in 1..=COMMIT_ATTEMPTS {
            let snapshot = self.snapshot(request.student_id, request.drive_id)?;
            let decision = self.evaluator.evaluate(
                &snapshot.student,
                &snapshot.drive,
                snapshot.already_vaccinated,
            );
            if let Decision::Reject(reason) = decision {
                info!(
                    student = %request.student_id,
                    drive = %request.drive_id,
                    code = reason.code(),
                    "vaccination rejected"
                );
                return Err(ServiceError::Rejected(reason));
            }

            let draft = RecordDraft {
                student: snapshot.student.id,
                drive: snapshot.drive.id,
                date: request.date.unwrap_or(snapshot.drive.date),
                status: request.status.unwrap_or_default(),
            };

            match self.store.commit_vaccination(draft, snapshot.drive.used_doses) {
                Ok(committed) => {
                    info!(
                        record = %committed.record.id,
                        student = %committed.record.student,
                        drive = %committed.drive.id,
                        used_doses = committed.drive.used_doses,
                        "vaccination recorded"
                    );
                    return Ok(committed);
                }
                Err(RepositoryError::Conflict) => {
                    return Err(ServiceError::Rejected(RejectionReason::AlreadyVaccinated));
                }
                Err(RepositoryError::Stale) => {
                    warn!(
                        drive = %request.drive_id,
                        attempt,
                        "dose counter moved during commit; rechecking eligibility"
                    );
                }
                Err(RepositoryError::NotFound) => {
                    // Re-resolve to report which side disappeared.
                    self.snapshot(request.student_id, request.drive_id)?;
                    return Err(RepositoryError::NotFound.into());
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(drive = %request.drive_id, "lost dose race twice; reporting no doses");
        Err(ServiceError::Rejected(RejectionReason::NoDosesAvailable))
    }

    pub fn record(&self, id: RecordId) -> Result<RecordView, ServiceError> {
        let record = self
            .store
            .record(id)?
            .ok_or_else(|| ServiceError::not_found("record", id))?;
        let students = self.students_by_id()?;
        let drives = self.drives_by_id()?;
        Ok(record_view(&record, &students, &drives))
    }

    pub fn list_records(&self, query: RecordQuery) -> Result<Vec<RecordView>, ServiceError> {
        let students = self.students_by_id()?;
        let drives = self.drives_by_id()?;
        Ok(self
            .store
            .records()?
            .iter()
            .filter(|record| query.student_id.map_or(true, |id| record.student == id))
            .filter(|record| query.drive_id.map_or(true, |id| record.drive == id))
            .map(|record| record_view(record, &students, &drives))
            .collect())
    }

    /// Deletes a record and returns the drive with its restored capacity.
    pub fn delete_record(
        &self,
        id: RecordId,
    ) -> Result<(VaccinationRecord, Option<Drive>), ServiceError> {
        match self.store.delete_record(id) {
            Ok((record, drive)) => {
                info!(
                    record = %id,
                    drive = %record.drive,
                    used_doses = drive.as_ref().map(|drive| drive.used_doses),
                    "vaccination record deleted"
                );
                Ok((record, drive))
            }
            Err(RepositoryError::NotFound) => Err(ServiceError::not_found("record", id)),
            Err(other) => Err(other.into()),
        }
    }

    // Reporting

    pub fn report(&self, filters: &ReportFilters) -> Result<RecordSet, ServiceError> {
        let students = self.store.students()?;
        let drives = self.store.drives()?;
        let records = self.store.records()?;
        let set = reporting::query(&records, &students, &drives, filters);
        debug!(count = set.count, "report generated");
        Ok(set)
    }

    pub fn vaccine_names(&self) -> Result<Vec<String>, ServiceError> {
        Ok(reporting::distinct_vaccine_names(&self.store.drives()?))
    }

    pub fn class_names(&self) -> Result<Vec<String>, ServiceError> {
        Ok(reporting::distinct_class_names(&self.store.students()?))
    }

    pub fn dashboard(&self) -> Result<DashboardStats, ServiceError> {
        let students = self.store.students()?;
        let drives = self.store.drives()?;
        let records = self.store.records()?;
        Ok(reporting::dashboard_stats(&students, &drives, &records))
    }

    fn snapshot(
        &self,
        student: StudentId,
        drive: DriveId,
    ) -> Result<EligibilitySnapshot, ServiceError> {
        if let Some(snapshot) = self.store.eligibility_snapshot(student, drive)? {
            return Ok(snapshot);
        }
        if self.store.student(student)?.is_none() {
            return Err(ServiceError::not_found("student", student));
        }
        Err(ServiceError::not_found("drive", drive))
    }

    fn page_bounds(&self, page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page
            .unwrap_or(self.config.default_page_size)
            .clamp(1, MAX_PAGE_SIZE);
        (page, per_page)
    }

    fn students_by_id(&self) -> Result<HashMap<StudentId, Student>, ServiceError> {
        Ok(self
            .store
            .students()?
            .into_iter()
            .map(|student| (student.id, student))
            .collect())
    }

    fn drives_by_id(&self) -> Result<HashMap<DriveId, Drive>, ServiceError> {
        Ok(self
            .store
            .drives()?
            .into_iter()
            .map(|drive| (drive.id, drive))
            .collect())
    }
}

fn record_view(
    record: &VaccinationRecord,
    students: &HashMap<StudentId, Student>,
    drives: &HashMap<DriveId, Drive>,
) -> RecordView {
    RecordView {
        id: record.id,
        student_id: record.student,
        drive_id: record.drive,
        student_name: students
            .get(&record.student)
            .map(|student| student.name.clone())
            .unwrap_or_default(),
        vaccine_name: drives
            .get(&record.drive)
            .map(|drive| drive.vaccine_name.clone())
            .unwrap_or_default(),
        date: record.date,
        status: record.status,
    }
}

/// Error raised by the vaccination service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Rejected(RejectionReason),
    #[error(transparent)]
    Drive(#[from] DriveRejection),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("student ID {student_id} already exists")]
    DuplicateStudent { student_id: String },
    #[error("student {0} has vaccination records")]
    StudentHasRecords(StudentId),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) | ServiceError::Import(_) => "ValidationError",
            ServiceError::Rejected(reason) => reason.code(),
            ServiceError::Drive(rejection) => rejection.code(),
            ServiceError::NotFound { .. } => "NotFound",
            ServiceError::DuplicateStudent { .. } => "Conflict",
            ServiceError::StudentHasRecords(_) => "HasRecords",
            ServiceError::Repository(RepositoryError::NotFound) => "NotFound",
            ServiceError::Repository(_) => "InternalError",
        }
    }

    /// True when the failure is the system's fault rather than the caller's.
    pub fn is_internal(&self) -> bool {
        self.code() == "InternalError"
    }
}

impl From<ReportError> for ServiceError {
    fn from(value: ReportError) -> Self {
        match value {
            ReportError::Validation(errors) => Self::Validation(errors),
        }
    }
}
