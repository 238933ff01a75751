use chrono::{Days, NaiveDate};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use vaxportal::workflows::vaccination::{
    ClassName, DriveDraft, Gender, InMemoryVaccinationStore, NewStudent, RecordStatus, Section,
    ServiceError, VaccinationRequest, VaccinationService,
};

pub(crate) type PortalService = VaccinationService<InMemoryVaccinationStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_class(raw: &str) -> Result<ClassName, String> {
    ClassName::parse(raw).map_err(|err| err.to_string())
}

const DEMO_ROSTER: [(&str, &str, u8, Section, u8, Gender); 8] = [
    ("STU001", "Asha Rao", 5, Section::A, 10, Gender::Female),
    ("STU002", "Dev Mehta", 5, Section::B, 10, Gender::Male),
    ("STU003", "Mira Shah", 6, Section::A, 11, Gender::Female),
    ("STU004", "Kabir Sen", 6, Section::C, 11, Gender::Male),
    ("STU005", "Lena Dsouza", 7, Section::A, 12, Gender::Female),
    ("STU006", "Arjun Nair", 7, Section::B, 12, Gender::Male),
    ("STU007", "Zoya Khan", 8, Section::D, 13, Gender::Female),
    ("STU008", "Rohan Iyer", 5, Section::E, 10, Gender::Other),
];

fn classes(grades: &[u8]) -> BTreeSet<ClassName> {
    grades.iter().copied().filter_map(ClassName::new).collect()
}

/// Populates an empty portal with a small roster, three drives, and a handful of records.
pub(crate) fn seed_demo_portal(
    service: &PortalService,
    today: NaiveDate,
) -> Result<(), ServiceError> {
    let mut students = Vec::new();
    for (code, name, grade, section, age, gender) in DEMO_ROSTER {
        let Some(class_name) = ClassName::new(grade) else {
            continue;
        };
        students.push(service.create_student(NewStudent {
            student_id: code.to_string(),
            name: name.to_string(),
            class_name,
            section,
            age: Some(age),
            gender: Some(gender),
        })?);
    }

    let lead = u64::from(service.config().lead_time_days);
    let drive_on = |offset: u64| {
        today
            .checked_add_days(Days::new(lead + offset))
            .unwrap_or(NaiveDate::MAX)
    };

    let mmr = service.create_drive(
        DriveDraft {
            vaccine_name: "MMR".to_string(),
            date: drive_on(0),
            available_doses: 4,
            applicable_classes: classes(&[5, 6]),
        },
        today,
    )?;
    let polio = service.create_drive(
        DriveDraft {
            vaccine_name: "Polio".to_string(),
            date: drive_on(7),
            available_doses: 30,
            applicable_classes: classes(&[5, 6, 7]),
        },
        today,
    )?;
    service.create_drive(
        DriveDraft {
            vaccine_name: "HPV".to_string(),
            date: drive_on(14),
            available_doses: 20,
            applicable_classes: classes(&[7, 8]),
        },
        today,
    )?;

    let plan = [
        (0, mmr.id, RecordStatus::Completed),
        (2, mmr.id, RecordStatus::Completed),
        (3, mmr.id, RecordStatus::Pending),
        (0, polio.id, RecordStatus::Completed),
        (4, polio.id, RecordStatus::Completed),
        (5, polio.id, RecordStatus::Completed),
    ];
    for (index, drive_id, status) in plan {
        service.record_vaccination(VaccinationRequest {
            student_id: students[index].id,
            drive_id,
            status: Some(status),
            date: None,
        })?;
    }

    Ok(())
}

pub(crate) fn demo_portal(today: NaiveDate) -> Result<PortalService, ServiceError> {
    let service = VaccinationService::new(
        Arc::new(InMemoryVaccinationStore::new()),
        Default::default(),
    );
    seed_demo_portal(&service, today)?;
    Ok(service)
}
