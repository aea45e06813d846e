//! Agent registry: roles, agents, availability, and the load counter API.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::config::RoutingConfig;
use crate::models::agent::{Agent, AgentCapacity, AgentRole, AgentStatus};
use crate::orchestrator::assignment::candidate_order;
use crate::persistence::agent_repo::AgentRepo;
use crate::persistence::db::Database;
use crate::persistence::role_repo::RoleRepo;
use crate::{AppError, Result};

/// Administrative input for a new role.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    /// Unique role name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Concurrent conversations per agent; must be positive.
    pub max_concurrent_chats: u32,
    /// Routing priority; lower is served first.
    #[serde(default)]
    pub priority: i32,
}

/// Durable record of agents and roles.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: AgentRepo,
    roles: RoleRepo,
    routing: Arc<RoutingConfig>,
}

impl AgentRegistry {
    /// Create a registry over the shared pool.
    #[must_use]
    pub fn new(db: Arc<Database>, routing: Arc<RoutingConfig>) -> Self {
        Self {
            agents: AgentRepo::new(Arc::clone(&db)),
            roles: RoleRepo::new(db),
            routing,
        }
    }

    /// Define a new role.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for an empty name or zero capacity,
    /// `AppError::Conflict` if the name already exists.
    pub async fn create_role(&self, input: NewRole) -> Result<AgentRole> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("role name must not be empty".into()));
        }
        if input.max_concurrent_chats == 0 {
            return Err(AppError::InvalidInput(
                "max_concurrent_chats must be greater than zero".into(),
            ));
        }

        let role = AgentRole::new(
            name.to_owned(),
            input.description,
            input.max_concurrent_chats,
            input.priority,
        );
        let role = self.roles.create(&role).await?;
        info!(role_id = %role.id, name = %role.name, "role created");
        Ok(role)
    }

    /// Look up a role.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the role does not exist.
    pub async fn role(&self, id: &str) -> Result<AgentRole> {
        self.roles.get_by_id(id).await
    }

    /// List all roles.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn roles(&self) -> Result<Vec<AgentRole>> {
        self.roles.list().await
    }

    /// Register a new agent; agents start offline and unavailable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for an empty name, `AppError::NotFound`
    /// if the role does not exist.
    pub async fn create_agent(
        &self,
        role_id: &str,
        display_name: &str,
        email: Option<String>,
    ) -> Result<Agent> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AppError::InvalidInput(
                "agent display_name must not be empty".into(),
            ));
        }
        let role = self.roles.get_by_id(role_id).await?;

        let agent = Agent::new(role.id, display_name.to_owned(), email);
        let agent = self.agents.create(&agent).await?;
        info!(agent_id = %agent.id, role = %role.name, "agent registered");
        Ok(agent)
    }

    /// Look up an agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the agent does not exist.
    pub async fn agent(&self, id: &str) -> Result<Agent> {
        self.agents.get_by_id(id).await
    }

    /// List every agent with its role capacity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn agents(&self) -> Result<Vec<AgentCapacity>> {
        self.agents.list_with_capacity().await
    }

    /// Online and available agents, at capacity or not.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn accepting(&self) -> Result<Vec<AgentCapacity>> {
        self.agents.list_accepting().await
    }

    /// Agents that could take a new conversation in `department`, in
    /// routing order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn eligible(&self, department: &str) -> Result<Vec<AgentCapacity>> {
        let mut agents: Vec<AgentCapacity> = self
            .agents
            .list_accepting()
            .await?
            .into_iter()
            .filter(|a| a.is_eligible() && self.routing.role_serves(department, &a.role_name))
            .collect();
        agents.sort_by(candidate_order);
        Ok(agents)
    }

    /// Count agents eligible for new work in any department.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_eligible(&self) -> Result<u64> {
        self.agents.count_eligible().await
    }

    /// Update presence and availability.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the agent does not exist.
    pub async fn set_availability(
        &self,
        id: &str,
        status: AgentStatus,
        is_available: bool,
    ) -> Result<Agent> {
        let agent = self.agents.set_availability(id, status, is_available).await?;
        info!(agent_id = id, %status, is_available, "agent availability updated");
        Ok(agent)
    }

    /// Take one capacity unit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CapacityExceeded` if the agent is not eligible.
    pub async fn increment_load(&self, id: &str) -> Result<()> {
        self.agents.increment_load(id).await
    }

    /// Release one capacity unit, flooring at zero.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the agent does not exist.
    pub async fn decrement_load(&self, id: &str) -> Result<()> {
        self.agents.decrement_load(id).await
    }
}
