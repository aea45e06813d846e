//! Assignment engine: greedy matching of waiting conversations to agents.
//!
//! Planning is a pure function of a snapshot. Applying the plan goes
//! through [`ConversationLifecycle::assign`](super::lifecycle::ConversationLifecycle::assign),
//! which re-validates capacity, so a stale snapshot can only lose races,
//! never overbook an agent.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::config::RoutingConfig;
use crate::models::agent::AgentCapacity;
use crate::models::conversation::{Conversation, ConversationStatus};

/// One planned `(conversation, agent)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    /// Waiting conversation to place.
    pub conversation_id: String,
    /// Agent that should take it.
    pub agent_id: String,
}

/// Outcome of one assignment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Waiting conversations in the snapshot.
    pub waiting: usize,
    /// Pairs produced by the planner.
    pub planned: usize,
    /// Pairs that committed.
    pub assigned: usize,
    /// Pairs rejected at commit time.
    pub failed: usize,
}

/// Queue order: priority descending, then oldest first, then id.
#[must_use]
pub fn queue_order(a: &Conversation, b: &Conversation) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Candidate order: role priority ascending, then least loaded, then id.
#[must_use]
pub fn candidate_order(a: &AgentCapacity, b: &AgentCapacity) -> Ordering {
    a.role_priority
        .cmp(&b.role_priority)
        .then_with(|| a.agent.current_load.cmp(&b.agent.current_load))
        .then_with(|| a.agent.id.cmp(&b.agent.id))
}

/// Matches waiting conversations against agent capacity.
#[derive(Debug, Clone, Default)]
pub struct AssignmentEngine {
    routing: Arc<RoutingConfig>,
}

impl AssignmentEngine {
    /// Create an engine with the given department routing.
    #[must_use]
    pub fn new(routing: Arc<RoutingConfig>) -> Self {
        Self { routing }
    }

    /// Plan assignments for a snapshot.
    ///
    /// Conversations are visited in [`queue_order`]; each takes the first
    /// agent in [`candidate_order`] that serves its department and still has
    /// a spare slot after earlier picks in this pass. Conversations without a
    /// match are left out of the plan. Input order does not affect the result.
    #[must_use]
    pub fn plan(&self, waiting: &[Conversation], agents: &[AgentCapacity]) -> Vec<Assignment> {
        let mut queue: Vec<&Conversation> = waiting
            .iter()
            .filter(|c| c.status == ConversationStatus::Waiting)
            .collect();
        queue.sort_by(|a, b| queue_order(a, b));

        let mut candidates: Vec<&AgentCapacity> =
            agents.iter().filter(|a| a.is_eligible()).collect();
        candidates.sort_by(|a, b| candidate_order(a, b));

        let mut spare: Vec<u32> = candidates.iter().map(|a| a.spare()).collect();
        let mut plan = Vec::new();

        for conversation in queue {
            let pick = (0..candidates.len()).find(|&idx| {
                spare[idx] > 0
                    && self
                        .routing
                        .role_serves(&conversation.department, &candidates[idx].role_name)
            });
            if let Some(idx) = pick {
                spare[idx] -= 1;
                plan.push(Assignment {
                    conversation_id: conversation.id.clone(),
                    agent_id: candidates[idx].agent.id.clone(),
                });
            }
        }

        plan
    }
}
