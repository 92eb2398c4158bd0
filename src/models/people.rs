use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Patient account, owned by the registration service and read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
}

impl Patient {
    /// First word of the full name, used in notification greetings.
    pub fn first_name(&self) -> &str {
        self.full_name.split_whitespace().next().unwrap_or("Patient")
    }
}

/// Doctor account. Only approved doctors are offered for consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub is_approved: bool,
}
