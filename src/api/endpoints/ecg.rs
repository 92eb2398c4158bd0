//! ECG endpoints.
//!
//! - `POST /api/ecg/submit`: multipart upload, scored before responding
//! - `GET /api/ecg/history/:patient_id`: the patient's records

use std::path::{Path as FsPath, PathBuf};

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::{parse_id, ApiError};
use crate::api::types::{success, ApiContext, Success};
use crate::models::enums::RiskLabel;
use crate::models::{EcgRecord, IntakeFields};
use crate::pipeline::{AnalysisPipeline, EcgHistoryEntry, Recording};
use crate::workflow::WorkflowError;

/// Extensions accepted for an uploaded recording.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "pdf", "csv", "dat", "txt"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub message: String,
    pub record: EcgRecord,
    pub risk_label: RiskLabel,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub records: Vec<EcgHistoryEntry>,
}

/// Multipart form as received, before validation.
#[derive(Default)]
struct SubmitForm {
    patient_id: Option<String>,
    age: Option<String>,
    gender: Option<String>,
    cholesterol_level: Option<String>,
    smoking_history: Option<String>,
    blood_pressure: Option<String>,
    file: Option<(String, Vec<u8>)>,
}

/// `POST /api/ecg/submit`
pub async fn submit(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Success<SubmitResponse>>), ApiError> {
    let max_bytes = ctx.core.config().max_upload_bytes;
    let form = read_form(&mut multipart).await?;

    let patient_id = parse_id(&required(form.patient_id, "patientId")?, "patientId")?;
    let age_raw = required(form.age, "age")?;
    let age = age_raw
        .trim()
        .parse::<u32>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid age: '{age_raw}'")))?;
    let intake = IntakeFields {
        age,
        gender: required(form.gender, "gender")?,
        cholesterol_level: optional(form.cholesterol_level),
        smoking_history: required(form.smoking_history, "smokingHistory")?,
        blood_pressure: optional(form.blood_pressure),
    };

    let (file_name, bytes) = form
        .file
        .ok_or_else(|| ApiError::BadRequest("No ECG file provided".into()))?;
    if bytes.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "ECG file exceeds {max_bytes} bytes"
        )));
    }
    let extension = accepted_extension(&file_name).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Unsupported file type. Accepted: {}",
            ACCEPTED_EXTENSIONS.join(", ")
        ))
    })?;

    let record = ctx
        .with_db(move |core, conn| {
            let stored = store_upload(&core.config().uploads_dir, &extension, &bytes)?;
            let recording = Recording {
                file_path: stored.to_string_lossy().into_owned(),
                content_type: mime_guess::from_path(&file_name)
                    .first_or_octet_stream()
                    .to_string(),
                file_name,
                bytes,
            };

            let pipeline = AnalysisPipeline::new(conn, core.oracle());
            pipeline
                .submit(&patient_id, intake, &recording)
                .map_err(|e| {
                    if rejected_before_insert(&e) {
                        discard_upload(&stored);
                    }
                    ApiError::from(e)
                })
        })
        .await?;

    let message = match record.risk {
        Some(_) => "ECG analyzed successfully.",
        None => "ECG uploaded, but the AI analysis failed.",
    };
    Ok((
        StatusCode::CREATED,
        success(SubmitResponse {
            message: message.into(),
            risk_label: record.risk_label(),
            record,
        }),
    ))
}

/// `GET /api/ecg/history/:patient_id`
pub async fn history(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<Success<HistoryResponse>>, ApiError> {
    let patient_id = parse_id(&patient_id, "patientId")?;
    let records = ctx
        .with_db(move |core, conn| {
            Ok(AnalysisPipeline::new(conn, core.oracle()).history(&patient_id)?)
        })
        .await?;
    Ok(success(HistoryResponse { records }))
}

async fn read_form(multipart: &mut Multipart) -> Result<SubmitForm, ApiError> {
    let mut form = SubmitForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        if name == "ecgFile" {
            let file_name = field.file_name().unwrap_or("ecg").to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?;
            form.file = Some((file_name, bytes.to_vec()));
            continue;
        }

        let slot = match name.as_str() {
            "patientId" => &mut form.patient_id,
            "age" => &mut form.age,
            "gender" => &mut form.gender,
            "cholesterolLevel" => &mut form.cholesterol_level,
            "smokingHistory" => &mut form.smoking_history,
            "bloodPressure" => &mut form.blood_pressure,
            _ => continue,
        };
        *slot = Some(field.text().await.map_err(multipart_error)?);
    }
    Ok(form)
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(format!("Malformed upload: {}", e.body_text()))
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{field} is required")))
}

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Lowercased extension if it is on the accepted list.
fn accepted_extension(file_name: &str) -> Option<String> {
    let ext = FsPath::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ACCEPTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Writes the upload under a generated name; client file names never touch
/// the filesystem.
fn store_upload(dir: &FsPath, extension: &str, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| ApiError::Internal(format!("cannot create uploads dir: {e}")))?;
    let path = dir.join(format!("{}.{extension}", Uuid::new_v4()));
    std::fs::write(&path, bytes)
        .map_err(|e| ApiError::Internal(format!("cannot store upload: {e}")))?;
    tracing::info!(path = %path.display(), size = bytes.len(), "ECG upload stored");
    Ok(path)
}

/// Submission errors raised before the record row is written. Later
/// failures leave a row that still points at the stored file.
fn rejected_before_insert(err: &WorkflowError) -> bool {
    matches!(err, WorkflowError::InvalidInput(_) | WorkflowError::NotFound(_))
}

fn discard_upload(path: &FsPath) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove rejected upload");
    }
}
