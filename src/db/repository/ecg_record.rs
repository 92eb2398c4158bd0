use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, now, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

const ECG_COLUMNS: &str = "id, patient_id, age, gender, cholesterol_level, smoking_history,
     blood_pressure, ecg_file_path, analysis_status, cad, hf, arr, overall_risk,
     consultation_status, created_at, updated_at";

/// Raw column values before enum/uuid/timestamp parsing.
struct EcgRecordRow {
    id: String,
    patient_id: String,
    age: u32,
    gender: String,
    cholesterol_level: Option<String>,
    smoking_history: String,
    blood_pressure: Option<String>,
    ecg_file_path: String,
    analysis_status: String,
    cad: Option<f64>,
    hf: Option<f64>,
    arr: Option<f64>,
    overall_risk: Option<f64>,
    consultation_status: String,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EcgRecordRow> {
    Ok(EcgRecordRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        age: row.get(2)?,
        gender: row.get(3)?,
        cholesterol_level: row.get(4)?,
        smoking_history: row.get(5)?,
        blood_pressure: row.get(6)?,
        ecg_file_path: row.get(7)?,
        analysis_status: row.get(8)?,
        cad: row.get(9)?,
        hf: row.get(10)?,
        arr: row.get(11)?,
        overall_risk: row.get(12)?,
        consultation_status: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn ecg_record_from_row(row: EcgRecordRow) -> Result<EcgRecord, DatabaseError> {
    let analysis_status = AnalysisStatus::from_str(&row.analysis_status)?;
    let risk = match (analysis_status, row.cad, row.hf, row.arr, row.overall_risk) {
        (AnalysisStatus::Completed, Some(cad), Some(hf), Some(arr), Some(overall_risk)) => {
            Some(RiskVector { cad, hf, arr, overall_risk })
        }
        (AnalysisStatus::Completed, ..) => {
            return Err(DatabaseError::ConstraintViolation(format!(
                "ECG record {} is Completed without a full risk vector",
                row.id
            )))
        }
        _ => None,
    };

    Ok(EcgRecord {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        intake: IntakeFields {
            age: row.age,
            gender: row.gender,
            cholesterol_level: row.cholesterol_level,
            smoking_history: row.smoking_history,
            blood_pressure: row.blood_pressure,
        },
        ecg_file_path: row.ecg_file_path,
        analysis_status,
        risk,
        consultation_status: ConsultationStatus::from_str(&row.consultation_status)?,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

pub fn insert_ecg_record(conn: &Connection, record: &EcgRecord) -> Result<(), DatabaseError> {
    let risk = record.risk.as_ref();
    conn.execute(
        &format!("INSERT INTO ecg_records ({ECG_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"),
        params![
            record.id.to_string(),
            record.patient_id.to_string(),
            record.intake.age,
            record.intake.gender,
            record.intake.cholesterol_level,
            record.intake.smoking_history,
            record.intake.blood_pressure,
            record.ecg_file_path,
            record.analysis_status.as_str(),
            risk.map(|r| r.cad),
            risk.map(|r| r.hf),
            risk.map(|r| r.arr),
            risk.map(|r| r.overall_risk),
            record.consultation_status.as_str(),
            format_timestamp(&record.created_at),
            format_timestamp(&record.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_ecg_record(conn: &Connection, id: &Uuid) -> Result<Option<EcgRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {ECG_COLUMNS} FROM ecg_records WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(ecg_record_from_row).transpose()
}

/// A patient's records, newest first.
pub fn list_ecg_records_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<EcgRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ECG_COLUMNS} FROM ecg_records WHERE patient_id = ?1
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], read_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(ecg_record_from_row(row?)?);
    }
    Ok(records)
}

/// Pending -> Completed with the risk vector. Returns false if the record
/// was not Pending (already resolved or missing).
pub fn complete_analysis(
    conn: &Connection,
    id: &Uuid,
    risk: &RiskVector,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE ecg_records
         SET analysis_status = 'Completed', cad = ?2, hf = ?3, arr = ?4, overall_risk = ?5,
             updated_at = ?6
         WHERE id = ?1 AND analysis_status = 'Pending'",
        params![
            id.to_string(),
            risk.cad,
            risk.hf,
            risk.arr,
            risk.overall_risk,
            format_timestamp(&now()),
        ],
    )?;
    Ok(changed == 1)
}

/// Pending -> Failed. Returns false if the record was not Pending.
pub fn fail_analysis(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE ecg_records SET analysis_status = 'Failed', updated_at = ?2
         WHERE id = ?1 AND analysis_status = 'Pending'",
        params![id.to_string(), format_timestamp(&now())],
    )?;
    Ok(changed == 1)
}

/// Consultation Pending -> Done. Returns false if it was already Done.
pub fn mark_consultation_done(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE ecg_records SET consultation_status = 'Done', updated_at = ?2
         WHERE id = ?1 AND consultation_status = 'Pending'",
        params![id.to_string(), format_timestamp(&now())],
    )?;
    Ok(changed == 1)
}
