use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::oracle::{Recording, RiskOracle};
use crate::db::{self, DatabaseError};
use crate::models::enums::{AnalysisStatus, ConsultationStatus, NotificationKind};
use crate::models::{EcgRecord, IntakeFields, Patient};
use crate::notifications::NotificationDispatcher;
use crate::workflow::WorkflowError;

/// Oldest age accepted on intake.
pub const MAX_AGE: u32 = 130;

/// A patient's record as shown in their history, with the doctor's
/// prescription once the consultation has been completed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EcgHistoryEntry {
    #[serde(flatten)]
    pub record: EcgRecord,
    pub prescription: Option<String>,
}

/// Owns the EcgRecord lifecycle: upload, scoring, verdict, notification.
pub struct AnalysisPipeline<'a> {
    conn: &'a Connection,
    oracle: &'a dyn RiskOracle,
}

impl<'a> AnalysisPipeline<'a> {
    pub fn new(conn: &'a Connection, oracle: &'a dyn RiskOracle) -> Self {
        Self { conn, oracle }
    }

    /// Persists the upload as Pending, scores it, and records the verdict.
    ///
    /// Scorer failures are recovered into a Failed record; only invalid
    /// input, an unknown patient, or a store failure reach the caller.
    pub fn submit(
        &self,
        patient_id: &Uuid,
        intake: IntakeFields,
        recording: &Recording,
    ) -> Result<EcgRecord, WorkflowError> {
        validate_intake(&intake)?;
        if recording.bytes.is_empty() {
            return Err(WorkflowError::InvalidInput("ECG file is empty".into()));
        }

        let patient = db::get_patient(self.conn, patient_id)?
            .ok_or_else(|| WorkflowError::not_found("patient", patient_id))?;

        let ts = db::now();
        let record = EcgRecord {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            intake,
            ecg_file_path: recording.file_path.clone(),
            analysis_status: AnalysisStatus::Pending,
            risk: None,
            consultation_status: ConsultationStatus::Pending,
            created_at: ts,
            updated_at: ts,
        };
        db::insert_ecg_record(self.conn, &record)?;
        tracing::info!(record_id = %record.id, patient_id = %patient.id, "ECG record created");

        let resolved = match self.oracle.score(recording) {
            Ok(vector) if !vector.is_valid() => {
                tracing::warn!(record_id = %record.id, ?vector, "Risk vector out of range");
                db::fail_analysis(self.conn, &record.id)?
            }
            Ok(vector) => {
                tracing::info!(
                    record_id = %record.id,
                    overall_risk = vector.overall_risk,
                    "Risk analysis completed"
                );
                db::complete_analysis(self.conn, &record.id, &vector)?
            }
            Err(e) => {
                tracing::warn!(record_id = %record.id, error = %e, "Risk analysis failed");
                db::fail_analysis(self.conn, &record.id)?
            }
        };

        let record = db::get_ecg_record(self.conn, &record.id)?.ok_or_else(|| {
            DatabaseError::NotFound {
                entity_type: "EcgRecord".into(),
                id: record.id.to_string(),
            }
        })?;

        // Not resolved here: whoever resolved it owns the notification.
        if resolved {
            self.notify_outcome(&patient, &record);
        }
        Ok(record)
    }

    fn notify_outcome(&self, patient: &Patient, record: &EcgRecord) {
        let dispatcher = NotificationDispatcher::new(self.conn);
        match (record.analysis_status, record.risk) {
            (AnalysisStatus::Completed, Some(risk)) => dispatcher.notify_patient(
                patient.id,
                &format!(
                    "Congratulations, {}! Your AI risk report is ready. Your Overall Risk is {}%.",
                    patient.first_name(),
                    risk.overall_percent()
                ),
                NotificationKind::ReportReady,
                &format!("/report-details/{}", record.id),
            ),
            _ => dispatcher.notify_patient(
                patient.id,
                &format!(
                    "{}, your ECG file has been uploaded, but the AI analysis failed. We are looking into it.",
                    patient.first_name()
                ),
                NotificationKind::EcgUpload,
                &format!("/ecg-history/{}", record.id),
            ),
        }
    }

    /// All of a patient's records, newest first.
    pub fn history(&self, patient_id: &Uuid) -> Result<Vec<EcgHistoryEntry>, WorkflowError> {
        if db::get_patient(self.conn, patient_id)?.is_none() {
            return Err(WorkflowError::not_found("patient", patient_id));
        }

        let records = db::list_ecg_records_for_patient(self.conn, patient_id)?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let prescription = match record.consultation_status {
                ConsultationStatus::Done => db::get_appointment_by_report(self.conn, &record.id)?
                    .and_then(|appt| appt.notes),
                ConsultationStatus::Pending => None,
            };
            entries.push(EcgHistoryEntry { record, prescription });
        }
        Ok(entries)
    }
}

fn validate_intake(intake: &IntakeFields) -> Result<(), WorkflowError> {
    if intake.age == 0 || intake.age > MAX_AGE {
        return Err(WorkflowError::InvalidInput(format!(
            "age must be between 1 and {MAX_AGE}"
        )));
    }
    if intake.gender.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("gender is required".into()));
    }
    if intake.smoking_history.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("smoking history is required".into()));
    }
    Ok(())
}
