use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, now, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

const APPOINTMENT_COLUMNS: &str =
    "id, patient_id, doctor_id, report_id, status, risk, notes, created_at, updated_at";

struct AppointmentRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    report_id: String,
    status: String,
    risk: String,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        report_id: row.get(3)?,
        status: row.get(4)?,
        risk: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, DatabaseError> {
    Ok(Appointment {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        doctor_id: parse_uuid(&row.doctor_id)?,
        report_id: parse_uuid(&row.report_id)?,
        status: AppointmentStatus::from_str(&row.status)?,
        risk: RiskLabel::from_str(&row.risk)?,
        notes: row.notes,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

/// SQL list literal for a fixed set of statuses, e.g. `'pending','view'`.
fn status_list(statuses: &[AppointmentStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO appointments ({APPOINTMENT_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            appt.id.to_string(),
            appt.patient_id.to_string(),
            appt.doctor_id.to_string(),
            appt.report_id.to_string(),
            appt.status.as_str(),
            appt.risk.as_str(),
            appt.notes,
            format_timestamp(&appt.created_at),
            format_timestamp(&appt.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(appointment_from_row).transpose()
}

/// Appointment only if it is assigned to `doctor_id`.
pub fn get_appointment_for_doctor(
    conn: &Connection,
    id: &Uuid,
    doctor_id: &Uuid,
) -> Result<Option<Appointment>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1 AND doctor_id = ?2"
            ),
            params![id.to_string(), doctor_id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(appointment_from_row).transpose()
}

pub fn get_appointment_by_report(
    conn: &Connection,
    report_id: &Uuid,
) -> Result<Option<Appointment>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE report_id = ?1"),
            params![report_id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(appointment_from_row).transpose()
}

/// Conditional status update: moves the doctor's appointment to `to` only
/// if its current status is one of `from`. Returns whether a row changed.
pub fn transition_appointment_status(
    conn: &Connection,
    id: &Uuid,
    doctor_id: &Uuid,
    from: &[AppointmentStatus],
    to: AppointmentStatus,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        &format!(
            "UPDATE appointments SET status = ?3, updated_at = ?4
             WHERE id = ?1 AND doctor_id = ?2 AND status IN ({})",
            status_list(from)
        ),
        params![
            id.to_string(),
            doctor_id.to_string(),
            to.as_str(),
            format_timestamp(&now()),
        ],
    )?;
    Ok(changed == 1)
}

/// Completes an open appointment with the doctor's notes and final risk.
/// Returns false when the appointment is missing, not the doctor's, or
/// already completed.
pub fn complete_appointment(
    conn: &Connection,
    id: &Uuid,
    doctor_id: &Uuid,
    notes: &str,
    final_risk: RiskLabel,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        &format!(
            "UPDATE appointments SET status = 'completed', notes = ?3, risk = ?4, updated_at = ?5
             WHERE id = ?1 AND doctor_id = ?2 AND status IN ({})",
            status_list(&[AppointmentStatus::Pending, AppointmentStatus::View])
        ),
        params![
            id.to_string(),
            doctor_id.to_string(),
            notes,
            final_risk.as_str(),
            format_timestamp(&now()),
        ],
    )?;
    Ok(changed == 1)
}

/// A doctor's appointments in any of `statuses`, newest first.
pub fn list_doctor_appointments(
    conn: &Connection,
    doctor_id: &Uuid,
    statuses: &[AppointmentStatus],
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE doctor_id = ?1 AND status IN ({})
         ORDER BY created_at DESC, rowid DESC",
        status_list(statuses)
    ))?;
    let rows = stmt.query_map(params![doctor_id.to_string()], read_row)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_row(row?)?);
    }
    Ok(appointments)
}

pub fn list_patient_appointments(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE patient_id = ?1
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], read_row)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_row(row?)?);
    }
    Ok(appointments)
}
