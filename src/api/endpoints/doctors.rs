//! Doctor endpoints.
//!
//! - `GET /api/doctors/approved`: doctors a patient can book
//! - `GET /api/doctors/:doctor_id/cases`: open cases for review

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::{parse_id, ApiError};
use crate::api::types::{success, ApiContext, Success};
use crate::workflow::{CaseSummary, CaseWorkflow, DoctorListing};

#[derive(Serialize)]
pub struct DoctorsResponse {
    pub doctors: Vec<DoctorListing>,
}

#[derive(Serialize)]
pub struct CasesResponse {
    pub cases: Vec<CaseSummary>,
}

pub async fn approved(
    State(ctx): State<ApiContext>,
) -> Result<Json<Success<DoctorsResponse>>, ApiError> {
    let doctors = ctx
        .with_db(|core, conn| Ok(CaseWorkflow::new(conn, core.email()).approved_doctors()?))
        .await?;
    Ok(success(DoctorsResponse { doctors }))
}

pub async fn cases(
    State(ctx): State<ApiContext>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Success<CasesResponse>>, ApiError> {
    let doctor_id = parse_id(&doctor_id, "doctorId")?;
    let cases = ctx
        .with_db(move |core, conn| Ok(CaseWorkflow::new(conn, core.email()).open_cases(&doctor_id)?))
        .await?;
    Ok(success(CasesResponse { cases }))
}
