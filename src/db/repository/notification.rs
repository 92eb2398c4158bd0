use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::db::{format_timestamp, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

pub fn insert_notification(conn: &Connection, notification: &Notification) -> Result<(), DatabaseError> {
    let (patient_id, doctor_id) = match notification.recipient {
        Recipient::Patient(id) => (Some(id.to_string()), None),
        Recipient::Doctor(id) => (None, Some(id.to_string())),
    };

    conn.execute(
        "INSERT INTO notifications (id, patient_id, doctor_id, message, kind, is_new, link, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            notification.id.to_string(),
            patient_id,
            doctor_id,
            notification.message,
            notification.kind.as_str(),
            notification.is_new as i32,
            notification.link,
            format_timestamp(&notification.created_at),
        ],
    )?;
    Ok(())
}

/// Notifications of one recipient, newest first. Rows of the other scope
/// never match because the filter is on the recipient's own column.
pub fn list_notifications(
    conn: &Connection,
    recipient: &Recipient,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, message, kind, is_new, link, created_at
         FROM notifications WHERE {} = ?1
         ORDER BY created_at DESC, rowid DESC",
        recipient.column()
    ))?;

    let rows = stmt.query_map(params![recipient.id().to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i32>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut notifications = Vec::new();
    for row in rows {
        let (id, message, kind, is_new, link, created_at) = row?;
        notifications.push(Notification {
            id: parse_uuid(&id)?,
            recipient: *recipient,
            message,
            kind: NotificationKind::from_str(&kind)?,
            is_new: is_new != 0,
            link,
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(notifications)
}

pub fn count_new_notifications(conn: &Connection, recipient: &Recipient) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM notifications WHERE {} = ?1 AND is_new = 1",
            recipient.column()
        ),
        params![recipient.id().to_string()],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(count)
}

/// Marks every unread notification of the recipient as read.
/// Returns how many rows changed; 0 once everything is read.
pub fn mark_notifications_read(conn: &Connection, recipient: &Recipient) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        &format!(
            "UPDATE notifications SET is_new = 0 WHERE {} = ?1 AND is_new = 1",
            recipient.column()
        ),
        params![recipient.id().to_string()],
    )?;
    Ok(changed)
}
