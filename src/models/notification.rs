use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::NotificationKind;

/// Who a notification belongs to. A notification has exactly one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Patient(Uuid),
    Doctor(Uuid),
}

impl Recipient {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Patient(id) | Self::Doctor(id) => *id,
        }
    }

    /// Column holding this recipient's id in the notifications table.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Patient(_) => "patient_id",
            Self::Doctor(_) => "doctor_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Recipient,
    pub message: String,
    pub kind: NotificationKind,
    pub is_new: bool,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

/// Recipient's notifications, newest first, with the unread count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
    pub new_count: u32,
}
