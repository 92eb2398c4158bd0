//! Appointment endpoints: booking, opening a case, completing a review,
//! and the doctor's completed reports.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::{parse_id, ApiError};
use crate::api::types::{success, ApiContext, Success};
use crate::models::Appointment;
use crate::workflow::{CaseDetails, CaseWorkflow, ReportSummary};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    #[serde(default)]
    pub patient_id: String,
    #[serde(default)]
    pub doctor_id: String,
    #[serde(default)]
    pub report_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub final_risk: String,
}

#[derive(Serialize)]
pub struct AppointmentResponse {
    pub message: &'static str,
    pub appointment: Appointment,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResponse {
    pub case_details: CaseDetails,
}

#[derive(Serialize)]
pub struct ReportsResponse {
    pub reports: Vec<ReportSummary>,
}

/// `POST /api/appointments/book`
pub async fn book(
    State(ctx): State<ApiContext>,
    payload: Result<Json<BookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Success<AppointmentResponse>>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let patient_id = parse_id(&req.patient_id, "patientId")?;
    let doctor_id = parse_id(&req.doctor_id, "doctorId")?;
    let report_id = parse_id(&req.report_id, "reportId")?;

    let appointment = ctx
        .with_db(move |core, conn| {
            Ok(CaseWorkflow::new(conn, core.email()).book(&patient_id, &doctor_id, &report_id)?)
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        success(AppointmentResponse {
            message: "Appointment booked successfully.",
            appointment,
        }),
    ))
}

/// `GET /api/appointments/case/:appointment_id/:doctor_id`: opens the case.
pub async fn case_details(
    State(ctx): State<ApiContext>,
    Path((appointment_id, doctor_id)): Path<(String, String)>,
) -> Result<Json<Success<CaseResponse>>, ApiError> {
    let appointment_id = parse_id(&appointment_id, "appointmentId")?;
    let doctor_id = parse_id(&doctor_id, "doctorId")?;

    let case_details = ctx
        .with_db(move |core, conn| {
            Ok(CaseWorkflow::new(conn, core.email()).case_details(&appointment_id, &doctor_id)?)
        })
        .await?;
    Ok(success(CaseResponse { case_details }))
}

/// `POST /api/appointments/review/:appointment_id/:doctor_id`
pub async fn review(
    State(ctx): State<ApiContext>,
    Path((appointment_id, doctor_id)): Path<(String, String)>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<Success<AppointmentResponse>>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let appointment_id = parse_id(&appointment_id, "appointmentId")?;
    let doctor_id = parse_id(&doctor_id, "doctorId")?;

    let appointment = ctx
        .with_db(move |core, conn| {
            Ok(CaseWorkflow::new(conn, core.email()).complete(
                &appointment_id,
                &doctor_id,
                &req.notes,
                &req.final_risk,
            )?)
        })
        .await?;

    Ok(success(AppointmentResponse {
        message: "Case reviewed and completed successfully.",
        appointment,
    }))
}

/// `GET /api/appointments/approved/:doctor_id`
pub async fn approved(
    State(ctx): State<ApiContext>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Success<ReportsResponse>>, ApiError> {
    let doctor_id = parse_id(&doctor_id, "doctorId")?;
    let reports = ctx
        .with_db(move |core, conn| {
            Ok(CaseWorkflow::new(conn, core.email()).approved_reports(&doctor_id)?)
        })
        .await?;
    Ok(success(ReportsResponse { reports }))
}
