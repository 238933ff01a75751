use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection, StringRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde_json::json;
use tracing::error;

use crate::workflows::reporting::{export, ReportParams};
use crate::workflows::roster;

use super::domain::{DriveDraft, DriveEdit, DriveId, NewStudent, RecordId, StudentId, StudentUpdate};
use super::eligibility::Decision;
use super::repository::VaccinationStore;
use super::service::{
    DriveQuery, RecordQuery, ServiceError, StudentQuery, VaccinationRequest, VaccinationService,
};
use super::validation::ValidationErrors;

type SharedService<S> = Arc<VaccinationService<S>>;

/// Router exposing the portal endpoints under `/api`.
pub fn vaccination_router<S>(service: SharedService<S>) -> Router
where
    S: VaccinationStore + 'static,
{
    Router::new()
        .route(
            "/api/students",
            get(list_students_handler::<S>).post(create_student_handler::<S>),
        )
        .route("/api/students/bulk", post(bulk_import_handler::<S>))
        .route("/api/students/import-template", get(import_template_handler))
        .route(
            "/api/students/:student_id",
            get(get_student_handler::<S>)
                .put(update_student_handler::<S>)
                .delete(delete_student_handler::<S>),
        )
        .route(
            "/api/drives",
            get(list_drives_handler::<S>).post(create_drive_handler::<S>),
        )
        .route("/api/drives/refresh-status", post(refresh_status_handler::<S>))
        .route(
            "/api/drives/:drive_id",
            get(get_drive_handler::<S>)
                .put(update_drive_handler::<S>)
                .delete(delete_drive_handler::<S>),
        )
        .route(
            "/api/vaccinations",
            get(list_records_handler::<S>).post(record_vaccination_handler::<S>),
        )
        .route("/api/vaccinations/eligibility", get(eligibility_handler::<S>))
        .route(
            "/api/vaccinations/:record_id",
            get(get_record_handler::<S>).delete(delete_record_handler::<S>),
        )
        .route("/api/reports/vaccinations", get(report_handler::<S>))
        .route("/api/reports/vaccines", get(vaccine_names_handler::<S>))
        .route("/api/reports/classes", get(class_names_handler::<S>))
        .route("/api/dashboard/stats", get(dashboard_stats_handler::<S>))
        .route(
            "/api/dashboard/upcoming-drives",
            get(upcoming_drives_handler::<S>),
        )
        .with_state(service)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// HTTP status for a service error code.
pub fn status_for(code: &str) -> StatusCode {
    match code {
        "ValidationError" => StatusCode::BAD_REQUEST,
        "NotFound" => StatusCode::NOT_FOUND,
        "Conflict" | "AlreadyVaccinated" | "HasRecords" | "DateConflict" | "DriveLocked" => {
            StatusCode::CONFLICT
        }
        "DriveNotOpen" | "ClassNotEligible" | "NoDosesAvailable" | "TooSoon" => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(failure: ServiceError) -> Response {
    let code = failure.code();
    if failure.is_internal() {
        error!(error = %failure, "request failed");
    }

    let mut payload = json!({
        "error": code,
        "message": failure.to_string(),
    });
    if let ServiceError::Validation(errors) = &failure {
        payload["fields"] = json!(errors);
    }
    (status_for(code), Json(payload)).into_response()
}

/// Reports a body, query, or path that failed to deserialize as a `ValidationError`.
fn malformed(source: &'static str, rejection: impl std::fmt::Display) -> Response {
    error_response(ValidationErrors::single(source, rejection.to_string()).into())
}

fn csv_attachment(body: Vec<u8>, filename: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::TEXT_CSV_UTF_8.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

// Students

pub(crate) async fn list_students_handler<S>(
    State(service): State<SharedService<S>>,
    query: Result<Query<StudentQuery>, QueryRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Query(query) = match query {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("query", rejection),
    };

    match service.list_students(&query) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn create_student_handler<S>(
    State(service): State<SharedService<S>>,
    student: Result<Json<NewStudent>, JsonRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Json(student) = match student {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("body", rejection),
    };

    match service.create_student(student) {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn get_student_handler<S>(
    State(service): State<SharedService<S>>,
    student_id: Result<Path<u64>, PathRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Path(student_id) = match student_id {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("path", rejection),
    };

    match service.student(StudentId(student_id)) {
        Ok(student) => (StatusCode::OK, Json(student)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn update_student_handler<S>(
    State(service): State<SharedService<S>>,
    student_id: Result<Path<u64>, PathRejection>,
    update: Result<Json<StudentUpdate>, JsonRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Path(student_id) = match student_id {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("path", rejection),
    };
    let Json(update) = match update {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("body", rejection),
    };

    match service.update_student(StudentId(student_id), update) {
        Ok(student) => (StatusCode::OK, Json(student)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn delete_student_handler<S>(
    State(service): State<SharedService<S>>,
    student_id: Result<Path<u64>, PathRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Path(student_id) = match student_id {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("path", rejection),
    };

    match service.delete_student(StudentId(student_id)) {
        Ok(student) => {
            let payload = json!({
                "message": format!("student {} deleted", student.student_id),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn bulk_import_handler<S>(
    State(service): State<SharedService<S>>,
    body: Result<String, StringRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return malformed("body", rejection),
    };

    match service.import_students(body.as_bytes()) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn import_template_handler() -> Response {
    csv_attachment(roster::template().into_bytes(), roster::TEMPLATE_FILENAME)
}

// Drives

pub(crate) async fn list_drives_handler<S>(
    State(service): State<SharedService<S>>,
    query: Result<Query<DriveQuery>, QueryRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Query(query) = match query {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("query", rejection),
    };

    match service.list_drives(&query) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn create_drive_handler<S>(
    State(service): State<SharedService<S>>,
    draft: Result<Json<DriveDraft>, JsonRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Json(draft) = match draft {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("body", rejection),
    };

    match service.create_drive(draft, today()) {
        Ok(drive) => (StatusCode::CREATED, Json(drive.view())).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn get_drive_handler<S>(
    State(service): State<SharedService<S>>,
    drive_id: Result<Path<u64>, PathRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Path(drive_id) = match drive_id {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("path", rejection),
    };

    match service.drive(DriveId(drive_id)) {
        Ok(drive) => (StatusCode::OK, Json(drive.view())).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn update_drive_handler<S>(
    State(service): State<SharedService<S>>,
    drive_id: Result<Path<u64>, PathRejection>,
    edit: Result<Json<DriveEdit>, JsonRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Path(drive_id) = match drive_id {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("path", rejection),
    };
    let Json(edit) = match edit {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("body", rejection),
    };

    match service.update_drive(DriveId(drive_id), edit, today()) {
        Ok(drive) => (StatusCode::OK, Json(drive.view())).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn delete_drive_handler<S>(
    State(service): State<SharedService<S>>,
    drive_id: Result<Path<u64>, PathRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Path(drive_id) = match drive_id {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("path", rejection),
    };

    match service.delete_drive(DriveId(drive_id), today()) {
        Ok(drive) => {
            let payload = json!({
                "message": format!("drive {} deleted", drive.id),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn refresh_status_handler<S>(State(service): State<SharedService<S>>) -> Response
where
    S: VaccinationStore + 'static,
{
    match service.refresh_drive_statuses(today()) {
        Ok(changes) => {
            let payload = json!({
                "updated": changes.len(),
                "changes": changes,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(failure) => error_response(failure),
    }
}

// Vaccinations

pub(crate) async fn record_vaccination_handler<S>(
    State(service): State<SharedService<S>>,
    request: Result<Json<VaccinationRequest>, JsonRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Json(request) = match request {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("body", rejection),
    };

    match service.record_vaccination(request) {
        Ok(committed) => {
            let payload = json!({
                "record": committed.record,
                "drive": committed.drive.view(),
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(failure) => error_response(failure),
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct EligibilityQuery {
    student_id: StudentId,
    drive_id: DriveId,
}

pub(crate) async fn eligibility_handler<S>(
    State(service): State<SharedService<S>>,
    query: Result<Query<EligibilityQuery>, QueryRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Query(query) = match query {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("query", rejection),
    };

    match service.check_eligibility(query.student_id, query.drive_id) {
        Ok(decision) => {
            let mut payload = json!({ "eligible": decision.is_accept() });
            if let Decision::Reject(reason) = decision {
                payload["reason"] = json!(reason.code());
                payload["message"] = json!(reason.to_string());
            }
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn list_records_handler<S>(
    State(service): State<SharedService<S>>,
    query: Result<Query<RecordQuery>, QueryRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Query(query) = match query {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("query", rejection),
    };

    match service.list_records(query) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn get_record_handler<S>(
    State(service): State<SharedService<S>>,
    record_id: Result<Path<u64>, PathRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Path(record_id) = match record_id {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("path", rejection),
    };

    match service.record(RecordId(record_id)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn delete_record_handler<S>(
    State(service): State<SharedService<S>>,
    record_id: Result<Path<u64>, PathRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Path(record_id) = match record_id {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("path", rejection),
    };

    match service.delete_record(RecordId(record_id)) {
        Ok((record, drive)) => {
            let payload = json!({
                "record": record,
                "drive": drive.map(|drive| drive.view()),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(failure) => error_response(failure),
    }
}

// Reports

pub(crate) async fn report_handler<S>(
    State(service): State<SharedService<S>>,
    params: Result<Query<ReportParams>, QueryRejection>,
) -> Response
where
    S: VaccinationStore + 'static,
{
    let Query(params) = match params {
        Ok(extracted) => extracted,
        Err(rejection) => return malformed("query", rejection),
    };

    let download = params.download.unwrap_or(false);
    let filters = match params.into_filters() {
        Ok(filters) => filters,
        Err(invalid) => return error_response(invalid.into()),
    };

    let set = match service.report(&filters) {
        Ok(set) => set,
        Err(failure) => return error_response(failure),
    };

    if !download {
        return (StatusCode::OK, Json(set)).into_response();
    }

    match export::to_csv(&set) {
        Ok(body) => csv_attachment(body, export::REPORT_FILENAME),
        Err(failure) => {
            error!(error = %failure, "report export failed");
            let payload = json!({
                "error": "InternalError",
                "message": failure.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn vaccine_names_handler<S>(State(service): State<SharedService<S>>) -> Response
where
    S: VaccinationStore + 'static,
{
    match service.vaccine_names() {
        Ok(names) => (StatusCode::OK, Json(names)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn class_names_handler<S>(State(service): State<SharedService<S>>) -> Response
where
    S: VaccinationStore + 'static,
{
    match service.class_names() {
        Ok(names) => (StatusCode::OK, Json(names)).into_response(),
        Err(failure) => error_response(failure),
    }
}

// Dashboard

pub(crate) async fn dashboard_stats_handler<S>(State(service): State<SharedService<S>>) -> Response
where
    S: VaccinationStore + 'static,
{
    match service.dashboard() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(failure) => error_response(failure),
    }
}

pub(crate) async fn upcoming_drives_handler<S>(State(service): State<SharedService<S>>) -> Response
where
    S: VaccinationStore + 'static,
{
    match service.upcoming_drives(today()) {
        Ok(drives) => (StatusCode::OK, Json(drives)).into_response(),
        Err(failure) => error_response(failure),
    }
}
