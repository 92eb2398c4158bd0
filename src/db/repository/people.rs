use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{parse_uuid, DatabaseError};
use crate::models::*;

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, full_name, email) VALUES (?1, ?2, ?3)",
        params![patient.id.to_string(), patient.full_name, patient.email],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, full_name, email FROM patients WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, full_name, email)| -> Result<Patient, DatabaseError> {
        Ok(Patient {
            id: parse_uuid(&id)?,
            full_name,
            email,
        })
    })
    .transpose()
}

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, full_name, email, is_approved) VALUES (?1, ?2, ?3, ?4)",
        params![
            doctor.id.to_string(),
            doctor.full_name,
            doctor.email,
            doctor.is_approved as i32,
        ],
    )?;
    Ok(())
}

const DOCTOR_COLUMNS: &str = "id, full_name, email, is_approved";

fn doctor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, Option<String>, i32)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_doctor(raw: (String, String, Option<String>, i32)) -> Result<Doctor, DatabaseError> {
    let (id, full_name, email, is_approved) = raw;
    Ok(Doctor {
        id: parse_uuid(&id)?,
        full_name,
        email,
        is_approved: is_approved != 0,
    })
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = ?1"),
            params![id.to_string()],
            doctor_from_row,
        )
        .optional()?;
    row.map(build_doctor).transpose()
}

/// Doctors open for consultation, by name.
pub fn list_approved_doctors(conn: &Connection) -> Result<Vec<Doctor>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCTOR_COLUMNS} FROM doctors WHERE is_approved = 1 ORDER BY full_name"
    ))?;
    let rows = stmt.query_map([], doctor_from_row)?;

    let mut doctors = Vec::new();
    for row in rows {
        doctors.push(build_doctor(row?)?);
    }
    Ok(doctors)
}
