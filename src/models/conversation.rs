//! Conversation model and lifecycle state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppError;

/// Lifecycle status of a support conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Queued, no agent yet.
    Waiting,
    /// Owned by an agent who has not replied yet.
    Assigned,
    /// Agent has replied at least once.
    Active,
    /// Finished normally.
    Closed,
    /// Left the queue without ever being served.
    Abandoned,
}

impl ConversationStatus {
    /// Statuses that still hold (or wait for) agent capacity.
    pub const OPEN: [Self; 3] = [Self::Waiting, Self::Assigned, Self::Active];

    /// Every status.
    pub const ALL: [Self; 5] = [
        Self::Waiting,
        Self::Assigned,
        Self::Active,
        Self::Closed,
        Self::Abandoned,
    ];

    /// Whether the conversation has reached a final state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Abandoned)
    }

    /// Whether an agent load unit is held for this status.
    #[must_use]
    pub fn holds_agent(self) -> bool {
        matches!(self, Self::Assigned | Self::Active)
    }

    /// Transition table for the conversation lifecycle.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Assigned | Self::Abandoned)
                | (Self::Assigned, Self::Active | Self::Closed | Self::Waiting)
                | (Self::Active, Self::Closed)
        )
    }

    /// Statuses from which `next` may be entered.
    #[must_use]
    pub fn sources(next: Self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }

    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Assigned => "assigned",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "assigned" => Ok(Self::Assigned),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(AppError::InvalidInput(format!(
                "invalid conversation status: {other}"
            ))),
        }
    }
}

/// Queue priority; variants are declared in ascending order.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Served last.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Served before normal traffic.
    High,
    /// Served before everything else.
    Urgent,
}

impl Priority {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(AppError::InvalidInput(format!("invalid priority: {other}"))),
        }
    }
}

/// Optional contact details supplied by the chat widget.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    /// External user identifier, if the visitor is logged in.
    pub user_identifier: Option<String>,
    /// Display name.
    pub user_name: Option<String>,
    /// Contact e-mail.
    pub user_email: Option<String>,
}

/// A support conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Unique record identifier.
    pub id: String,
    /// Caller correlation key; unique among non-terminal conversations.
    pub session_id: String,
    /// Current lifecycle status.
    pub status: ConversationStatus,
    /// Queue priority.
    pub priority: Priority,
    /// Department tag used for routing.
    pub department: String,
    /// Agent owning the conversation; retained after close.
    pub assigned_agent_id: Option<String>,
    /// Contact metadata.
    #[serde(flatten)]
    pub contact: Contact,
    /// Opaque key/value bag passed through unmodified.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the current agent took the conversation.
    pub assigned_at: Option<DateTime<Utc>>,
    /// First agent reply.
    pub first_response_at: Option<DateTime<Utc>>,
    /// When the conversation reached a terminal state.
    pub closed_at: Option<DateTime<Utc>>,
    /// Visitor rating (1-5), only on closed conversations.
    pub user_rating: Option<u8>,
}

impl Conversation {
    /// Construct a new waiting conversation with a generated identifier.
    #[must_use]
    pub fn new(
        session_id: String,
        department: String,
        priority: Priority,
        contact: Contact,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            status: ConversationStatus::Waiting,
            priority,
            department,
            assigned_agent_id: None,
            contact,
            metadata,
            created_at: now,
            updated_at: now,
            assigned_at: None,
            first_response_at: None,
            closed_at: None,
            user_rating: None,
        }
    }

    /// Seconds between creation and the first agent reply.
    #[must_use]
    pub fn response_time_seconds(&self) -> Option<f64> {
        self.first_response_at.map(|first| {
            #[allow(clippy::cast_precision_loss)] // millisecond spans fit comfortably in f64.
            let millis = (first - self.created_at).num_milliseconds() as f64;
            millis / 1000.0
        })
    }
}

/// Validate a visitor rating.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if the rating is outside 1..=5.
pub fn validate_rating(rating: u8) -> crate::Result<u8> {
    if (1..=5).contains(&rating) {
        Ok(rating)
    } else {
        Err(AppError::InvalidInput(format!(
            "rating must be between 1 and 5, got {rating}"
        )))
    }
}
