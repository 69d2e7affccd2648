// File: message.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::Role;
use crate::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Customer,
    Agent,
}

impl SenderType {
    /// Admins watch threads but do not post in them.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Customer => Some(SenderType::Customer),
            Role::Agent => Some(SenderType::Agent),
            Role::Admin => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub file_url: String,
}

/// Stored chat message (`message` collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub complaint_id: String,
    /// Author.
    pub user_id: String,
    pub sender_type: SenderType,
    pub sender_name: String,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}
