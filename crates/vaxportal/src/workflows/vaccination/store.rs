use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    Drive, DriveDraft, DriveId, DriveStatus, NewStudent, RecordDraft, RecordId, Student,
    StudentId, VaccinationRecord,
};
use super::repository::{
    CommittedVaccination, EligibilitySnapshot, RepositoryError, VaccinationStore,
};

#[derive(Debug, Default)]
struct StoreState {
    students: BTreeMap<StudentId, Student>,
    drives: BTreeMap<DriveId, Drive>,
    records: BTreeMap<RecordId, VaccinationRecord>,
    next_student: u64,
    next_drive: u64,
    next_record: u64,
}

impl StoreState {
    fn has_record(&self, student: StudentId, drive: DriveId) -> bool {
        self.records
            .values()
            .any(|record| record.student == student && record.drive == drive)
    }

    fn student_code_taken(&self, code: &str, except: Option<StudentId>) -> bool {
        self.students
            .values()
            .any(|student| student.student_id == code && Some(student.id) != except)
    }
}

fn next_id(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

/// Process-local store; a single lock makes every method one serialized transaction.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVaccinationStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryVaccinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }
}

impl VaccinationStore for InMemoryVaccinationStore {
    fn insert_student(&self, student: NewStudent) -> Result<Student, RepositoryError> {
        let mut state = self.lock()?;
        if state.student_code_taken(&student.student_id, None) {
            return Err(RepositoryError::Conflict);
        }
        let id = StudentId(next_id(&mut state.next_student));
        let student = student.into_student(id);
        state.students.insert(id, student.clone());
        Ok(student)
    }

    fn update_student(&self, student: Student) -> Result<Student, RepositoryError> {
        let mut state = self.lock()?;
        if !state.students.contains_key(&student.id) {
            return Err(RepositoryError::NotFound);
        }
        if state.student_code_taken(&student.student_id, Some(student.id)) {
            return Err(RepositoryError::Conflict);
        }
        state.students.insert(student.id, student.clone());
        Ok(student)
    }

    fn delete_student(&self, id: StudentId) -> Result<Student, RepositoryError> {
        let mut state = self.lock()?;
        if !state.students.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        if state.records.values().any(|record| record.student == id) {
            return Err(RepositoryError::InUse);
        }
        state.students.remove(&id).ok_or(RepositoryError::NotFound)
    }

    fn student(&self, id: StudentId) -> Result<Option<Student>, RepositoryError> {
        Ok(self.lock()?.students.get(&id).cloned())
    }

    fn students(&self) -> Result<Vec<Student>, RepositoryError> {
        Ok(self.lock()?.students.values().cloned().collect())
    }

    fn insert_drive(&self, draft: DriveDraft) -> Result<Drive, RepositoryError> {
        let mut state = self.lock()?;
        let id = DriveId(next_id(&mut state.next_drive));
        let drive = draft.into_drive(id);
        state.drives.insert(id, drive.clone());
        Ok(drive)
    }

    fn update_drive(&self, drive: Drive) -> Result<Drive, RepositoryError> {
        let mut state = self.lock()?;
        let stored = state
            .drives
            .get_mut(&drive.id)
            .ok_or(RepositoryError::NotFound)?;
        if drive.available_doses < stored.used_doses {
            return Err(RepositoryError::CapacityBelowUsage {
                used_doses: stored.used_doses,
            });
        }
        let used_doses = stored.used_doses;
        *stored = Drive { used_doses, ..drive };
        Ok(stored.clone())
    }

    fn transition_drive(
        &self,
        id: DriveId,
        expected: DriveStatus,
        next: DriveStatus,
    ) -> Result<Drive, RepositoryError> {
        let mut state = self.lock()?;
        let stored = state.drives.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Err(RepositoryError::Stale);
        }
        stored.status = next;
        Ok(stored.clone())
    }

    fn delete_drive(&self, id: DriveId) -> Result<Drive, RepositoryError> {
        let mut state = self.lock()?;
        let drive = state.drives.get(&id).ok_or(RepositoryError::NotFound)?;
        if drive.used_doses > 0 || state.records.values().any(|record| record.drive == id) {
            return Err(RepositoryError::InUse);
        }
        state.drives.remove(&id).ok_or(RepositoryError::NotFound)
    }

    fn drive(&self, id: DriveId) -> Result<Option<Drive>, RepositoryError> {
        Ok(self.lock()?.drives.get(&id).cloned())
    }

    fn drives(&self) -> Result<Vec<Drive>, RepositoryError> {
        Ok(self.lock()?.drives.values().cloned().collect())
    }

    fn eligibility_snapshot(
        &self,
        student: StudentId,
        drive: DriveId,
    ) -> Result<Option<EligibilitySnapshot>, RepositoryError> {
        let state = self.lock()?;
        let (Some(student_row), Some(drive_row)) =
            (state.students.get(&student), state.drives.get(&drive))
        else {
            return Ok(None);
        };

        Ok(Some(EligibilitySnapshot {
            student: student_row.clone(),
            drive: drive_row.clone(),
            already_vaccinated: state.has_record(student, drive),
        }))
    }

    fn commit_vaccination(
        &self,
        draft: RecordDraft,
        observed_used_doses: u32,
    ) -> Result<CommittedVaccination, RepositoryError> {
        let mut state = self.lock()?;
        let class_name = state
            .students
            .get(&draft.student)
            .map(|student| student.class_name)
            .ok_or(RepositoryError::NotFound)?;
        if state.has_record(draft.student, draft.drive) {
            return Err(RepositoryError::Conflict);
        }

        let drive = state
            .drives
            .get(&draft.drive)
            .ok_or(RepositoryError::NotFound)?;
        if drive.used_doses != observed_used_doses
            || !drive.is_open()
            || !drive.admits(class_name)
            || drive.used_doses >= drive.available_doses
        {
            return Err(RepositoryError::Stale);
        }

        let id = RecordId(next_id(&mut state.next_record));
        let record = draft.into_record(id);
        let drive = state
            .drives
            .get_mut(&record.drive)
            .ok_or(RepositoryError::NotFound)?;
        drive.used_doses += 1;
        let drive = drive.clone();
        state.records.insert(id, record.clone());

        Ok(CommittedVaccination { record, drive })
    }

    fn delete_record(
        &self,
        id: RecordId,
    ) -> Result<(VaccinationRecord, Option<Drive>), RepositoryError> {
        let mut state = self.lock()?;
        let record = state.records.remove(&id).ok_or(RepositoryError::NotFound)?;
        let drive = state.drives.get_mut(&record.drive).map(|drive| {
            drive.used_doses = drive.used_doses.saturating_sub(1);
            drive.clone()
        });
        Ok((record, drive))
    }

    fn record(&self, id: RecordId) -> Result<Option<VaccinationRecord>, RepositoryError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    fn records(&self) -> Result<Vec<VaccinationRecord>, RepositoryError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }
}
