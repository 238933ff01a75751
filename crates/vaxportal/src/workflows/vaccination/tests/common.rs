use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{Days, NaiveDate};
use serde_json::Value;

use crate::config::PortalConfig;
use crate::workflows::vaccination::domain::{
    ClassName, Drive, DriveDraft, DriveId, DriveStatus, NewStudent, RecordDraft, RecordId,
    Section, Student, StudentId, VaccinationRecord,
};
use crate::workflows::vaccination::repository::{
    CommittedVaccination, EligibilitySnapshot, RepositoryError, VaccinationStore,
};
use crate::workflows::vaccination::{
    vaccination_router, InMemoryVaccinationStore, VaccinationRequest, VaccinationService,
};

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).expect("valid date")
}

pub(super) fn days_from_today(days: u64) -> NaiveDate {
    today() + Days::new(days)
}

pub(super) fn class(grade: u8) -> ClassName {
    ClassName::new(grade).expect("valid grade")
}

pub(super) fn new_student(code: &str, grade: u8) -> NewStudent {
    NewStudent {
        student_id: code.to_string(),
        name: format!("Student {code}"),
        class_name: class(grade),
        section: Section::A,
        age: Some(11),
        gender: None,
    }
}

pub(super) fn drive_draft(
    vaccine: &str,
    days_ahead: u64,
    doses: u32,
    grades: &[u8],
) -> DriveDraft {
    DriveDraft {
        vaccine_name: vaccine.to_string(),
        date: days_from_today(days_ahead),
        available_doses: doses,
        applicable_classes: grades.iter().map(|grade| class(*grade)).collect::<BTreeSet<_>>(),
    }
}

pub(super) fn request(student: StudentId, drive: DriveId) -> VaccinationRequest {
    VaccinationRequest {
        student_id: student,
        drive_id: drive,
        status: None,
        date: None,
    }
}

pub(super) fn build_service() -> (
    VaccinationService<InMemoryVaccinationStore>,
    Arc<InMemoryVaccinationStore>,
) {
    let store = Arc::new(InMemoryVaccinationStore::new());
    let service = VaccinationService::new(store.clone(), PortalConfig::default());
    (service, store)
}

/// MMR drive with two doses for classes 5 and 6, stored directly.
pub(super) fn seed_mmr(store: &InMemoryVaccinationStore) -> Drive {
    store
        .insert_drive(drive_draft("MMR", 20, 2, &[5, 6]))
        .expect("drive stored")
}

pub(super) fn seed_student(store: &InMemoryVaccinationStore, code: &str, grade: u8) -> Student {
    store
        .insert_student(new_student(code, grade))
        .expect("student stored")
}

pub(super) fn portal_router_with_service(
    service: VaccinationService<InMemoryVaccinationStore>,
) -> axum::Router {
    vaccination_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf8 body")
}

/// Store that lets a rival student claim a dose between the caller's snapshot and commit,
/// once per queued rival. It can also move the caller to another class at that point.
pub(super) struct ContendedStore {
    pub(super) inner: InMemoryVaccinationStore,
    rivals: Mutex<Vec<StudentId>>,
    class_change: Mutex<Option<ClassName>>,
}

impl ContendedStore {
    pub(super) fn new(inner: InMemoryVaccinationStore, rivals: Vec<StudentId>) -> Self {
        Self {
            inner,
            rivals: Mutex::new(rivals),
            class_change: Mutex::new(None),
        }
    }

    pub(super) fn with_class_change(self, class_name: ClassName) -> Self {
        Self {
            class_change: Mutex::new(Some(class_name)),
            ..self
        }
    }
}

impl VaccinationStore for ContendedStore {
    fn insert_student(&self, student: NewStudent) -> Result<Student, RepositoryError> {
        self.inner.insert_student(student)
    }

    fn update_student(&self, student: Student) -> Result<Student, RepositoryError> {
        self.inner.update_student(student)
    }

    fn delete_student(&self, id: StudentId) -> Result<Student, RepositoryError> {
        self.inner.delete_student(id)
    }

    fn student(&self, id: StudentId) -> Result<Option<Student>, RepositoryError> {
        self.inner.student(id)
    }

    fn students(&self) -> Result<Vec<Student>, RepositoryError> {
        self.inner.students()
    }

    fn insert_drive(&self, draft: DriveDraft) -> Result<Drive, RepositoryError> {
        self.inner.insert_drive(draft)
    }

    fn update_drive(&self, drive: Drive) -> Result<Drive, RepositoryError> {
        self.inner.update_drive(drive)
    }

    fn transition_drive(
        &self,
        id: DriveId,
        expected: DriveStatus,
        next: DriveStatus,
    ) -> Result<Drive, RepositoryError> {
        self.inner.transition_drive(id, expected, next)
    }

    fn delete_drive(&self, id: DriveId) -> Result<Drive, RepositoryError> {
        self.inner.delete_drive(id)
    }

    fn drive(&self, id: DriveId) -> Result<Option<Drive>, RepositoryError> {
        self.inner.drive(id)
    }

    fn drives(&self) -> Result<Vec<Drive>, RepositoryError> {
        self.inner.drives()
    }

    fn eligibility_snapshot(
        &self,
        student: StudentId,
        drive: DriveId,
    ) -> Result<Option<EligibilitySnapshot>, RepositoryError> {
        self.inner.eligibility_snapshot(student, drive)
    }

    fn commit_vaccination(
        &self,
        draft: RecordDraft,
        observed_used_doses: u32,
    ) -> Result<CommittedVaccination, RepositoryError> {
        let class_change = self.class_change.lock().expect("class mutex poisoned").take();
        if let Some(class_name) = class_change {
            let mut student = self
                .inner
                .student(draft.student)?
                .expect("contended student exists");
            student.class_name = class_name;
            self.inner.update_student(student)?;
        }

        let rival = self.rivals.lock().expect("rival mutex poisoned").pop();
        if let Some(rival) = rival {
            let current = self
                .inner
                .drive(draft.drive)?
                .expect("contended drive exists");
            self.inner.commit_vaccination(
                RecordDraft {
                    student: rival,
                    ..draft.clone()
                },
                current.used_doses,
            )?;
        }
        self.inner.commit_vaccination(draft, observed_used_doses)
    }

    fn delete_record(
        &self,
        id: RecordId,
    ) -> Result<(VaccinationRecord, Option<Drive>), RepositoryError> {
        self.inner.delete_record(id)
    }

    fn record(&self, id: RecordId) -> Result<Option<VaccinationRecord>, RepositoryError> {
        self.inner.record(id)
    }

    fn records(&self) -> Result<Vec<VaccinationRecord>, RepositoryError> {
        self.inner.records()
    }
}

pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl VaccinationStore for UnavailableStore {
    fn insert_student(&self, _student: NewStudent) -> Result<Student, RepositoryError> {
        offline()
    }

    fn update_student(&self, _student: Student) -> Result<Student, RepositoryError> {
        offline()
    }

    fn delete_student(&self, _id: StudentId) -> Result<Student, RepositoryError> {
        offline()
    }

    fn student(&self, _id: StudentId) -> Result<Option<Student>, RepositoryError> {
        offline()
    }

    fn students(&self) -> Result<Vec<Student>, RepositoryError> {
        offline()
    }

    fn insert_drive(&self, _draft: DriveDraft) -> Result<Drive, RepositoryError> {
        offline()
    }

    fn update_drive(&self, _drive: Drive) -> Result<Drive, RepositoryError> {
        offline()
    }

    fn transition_drive(
        &self,
        _id: DriveId,
        _expected: DriveStatus,
        _next: DriveStatus,
    ) -> Result<Drive, RepositoryError> {
        offline()
    }

    fn delete_drive(&self, _id: DriveId) -> Result<Drive, RepositoryError> {
        offline()
    }

    fn drive(&self, _id: DriveId) -> Result<Option<Drive>, RepositoryError> {
        offline()
    }

    fn drives(&self) -> Result<Vec<Drive>, RepositoryError> {
        offline()
    }

    fn eligibility_snapshot(
        &self,
        _student: StudentId,
        _drive: DriveId,
    ) -> Result<Option<EligibilitySnapshot>, RepositoryError> {
        offline()
    }

    fn commit_vaccination(
        &self,
        _draft: RecordDraft,
        _observed_used_doses: u32,
    ) -> Result<CommittedVaccination, RepositoryError> {
        offline()
    }

    fn delete_record(
        &self,
        _id: RecordId,
    ) -> Result<(VaccinationRecord, Option<Drive>), RepositoryError> {
        offline()
    }

    fn record(&self, _id: RecordId) -> Result<Option<VaccinationRecord>, RepositoryError> {
        offline()
    }

    fn records(&self) -> Result<Vec<VaccinationRecord>, RepositoryError> {
        offline()
    }
}
