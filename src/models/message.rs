//! Chat message model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppError;

/// Author class of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    /// Site visitor.
    User,
    /// Human support agent.
    Agent,
    /// Automated notice.
    System,
}

impl SenderType {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            "system" => Ok(Self::System),
            other => Err(AppError::InvalidInput(format!("invalid sender type: {other}"))),
        }
    }
}

/// One entry in a conversation's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique record identifier.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Author class.
    pub sender_type: SenderType,
    /// Message body.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Construct a new message with a generated identifier.
    #[must_use]
    pub fn new(conversation_id: String, sender_type: SenderType, content: String) -> Self {
        Self {
            id: format!("msg:{}", Uuid::new_v4()),
            conversation_id,
            sender_type,
            content,
            created_at: Utc::now(),
        }
    }
}
