use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::phase::Phase;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub current_phase: Phase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub is_insight: bool,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
}

/// A photo of a built model, attached to a session and optionally to one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionImage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub message_id: Option<Uuid>,
    pub title: String,
    pub mime_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub session_id: Uuid,
    pub message_id: Option<Uuid>,
    pub title: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// An image sent along with a user turn, before it has ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub title: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// What the user submits for one turn.
#[derive(Debug, Clone, Default)]
pub struct UserTurn {
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// Both halves of a turn as they were stored.
#[derive(Debug, Clone)]
pub struct CommittedTurn {
    pub user_message: Message,
    pub model_message: Message,
}

/// A message restored from outside the store, e.g. an imported transcript.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub is_insight: bool,
}
