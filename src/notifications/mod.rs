//! In-app notification feed and outbound email.
//!
//! Notification writes are side effects of workflow transitions: they are
//! best-effort and never fail the operation that triggered them.

pub mod email;

pub use email::*;

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::NotificationKind;
use crate::models::{Notification, NotificationFeed, Recipient};

/// Link used when a notification has nowhere to point.
pub const DEFAULT_LINK: &str = "#";

pub struct NotificationDispatcher<'a> {
    conn: &'a Connection,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn notify_patient(&self, patient_id: Uuid, message: &str, kind: NotificationKind, link: &str) {
        self.notify(Recipient::Patient(patient_id), message, kind, link);
    }

    pub fn notify_doctor(&self, doctor_id: Uuid, message: &str, kind: NotificationKind, link: &str) {
        self.notify(Recipient::Doctor(doctor_id), message, kind, link);
    }

    /// Appends a new notification. Failures are logged and dropped.
    pub fn notify(&self, recipient: Recipient, message: &str, kind: NotificationKind, link: &str) {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient,
            message: message.to_string(),
            kind,
            is_new: true,
            link: if link.is_empty() { DEFAULT_LINK.into() } else { link.to_string() },
            created_at: db::now(),
        };

        match db::insert_notification(self.conn, &notification) {
            Ok(()) => tracing::debug!(
                notification_id = %notification.id,
                recipient = ?recipient,
                kind = %kind,
                "Notification created"
            ),
            Err(e) => tracing::warn!(
                recipient = ?recipient,
                kind = %kind,
                error = %e,
                "Failed to create notification"
            ),
        }
    }

    /// Recipient's notifications, newest first, with the unread count.
    pub fn list(&self, recipient: &Recipient) -> Result<NotificationFeed, DatabaseError> {
        let notifications = db::list_notifications(self.conn, recipient)?;
        let new_count = db::count_new_notifications(self.conn, recipient)?;
        Ok(NotificationFeed {
            notifications,
            new_count,
        })
    }

    /// Marks every unread notification of this recipient as read.
    pub fn mark_all_read(&self, recipient: &Recipient) -> Result<usize, DatabaseError> {
        let updated = db::mark_notifications_read(self.conn, recipient)?;
        tracing::debug!(recipient = ?recipient, updated, "Notifications marked read");
        Ok(updated)
    }
}
