//! Support agent and role models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppError;

/// Presence of an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Signed in to the agent console.
    Online,
    /// Signed out or disconnected.
    Offline,
}

impl AgentStatus {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(AppError::InvalidInput(format!("invalid agent status: {other}"))),
        }
    }
}

/// A class of agent defining concurrency capacity and routing priority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRole {
    /// Unique record identifier.
    pub id: String,
    /// Unique role name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Concurrent conversations an agent of this role may own.
    pub max_concurrent_chats: u32,
    /// Routing priority; lower values are served first.
    pub priority: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AgentRole {
    /// Construct a new role with a generated identifier.
    #[must_use]
    pub fn new(name: String, description: String, max_concurrent_chats: u32, priority: i32) -> Self {
        Self {
            id: format!("role:{}", Uuid::new_v4()),
            name,
            description,
            max_concurrent_chats,
            priority,
            created_at: Utc::now(),
        }
    }
}

/// A human support operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    /// Unique record identifier.
    pub id: String,
    /// Owning role.
    pub role_id: String,
    /// Name shown to visitors.
    pub display_name: String,
    /// Contact e-mail.
    pub email: Option<String>,
    /// Presence.
    pub status: AgentStatus,
    /// Independent of presence; an online agent may be on a break.
    pub is_available: bool,
    /// Conversations in `assigned` or `active` owned by this agent.
    pub current_load: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last presence or availability change.
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Construct a new offline agent with a generated identifier.
    #[must_use]
    pub fn new(role_id: String, display_name: String, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("agent:{}", Uuid::new_v4()),
            role_id,
            display_name,
            email,
            status: AgentStatus::Offline,
            is_available: false,
            current_load: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Online and not on a break, regardless of load.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.status == AgentStatus::Online && self.is_available
    }
}

/// An agent joined with the role fields the router needs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AgentCapacity {
    /// The agent record.
    #[serde(flatten)]
    pub agent: Agent,
    /// Name of the agent's role.
    pub role_name: String,
    /// Routing priority of the agent's role.
    pub role_priority: i32,
    /// Capacity of the agent's role.
    pub max_concurrent_chats: u32,
}

impl AgentCapacity {
    /// Slots left before the role limit is reached.
    #[must_use]
    pub fn spare(&self) -> u32 {
        self.max_concurrent_chats
            .saturating_sub(self.agent.current_load)
    }

    /// Online, available, and under capacity.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.agent.is_accepting() && self.spare() > 0
    }
}
