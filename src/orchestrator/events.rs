//! In-process notification bus for conversation and agent changes.
//!
//! Delivery to connected clients is someone else's job; subscribers (the
//! SSE endpoint, tests) receive every event published after they subscribe.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::models::agent::Agent;
use crate::models::conversation::Conversation;
use crate::models::message::Message;

const DEFAULT_CAPACITY: usize = 256;

/// Change notification emitted by the lifecycle manager.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A conversation was created or changed state.
    ConversationUpdated {
        /// The conversation after the change.
        conversation: Conversation,
    },
    /// A message was appended to a conversation.
    MessageAppended {
        /// The new message.
        message: Message,
    },
    /// An agent's presence or availability changed.
    AgentUpdated {
        /// The agent after the change.
        agent: Agent,
    },
}

impl ChatEvent {
    /// Event name used on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConversationUpdated { .. } => "conversation_updated",
            Self::MessageAppended { .. } => "message_appended",
            Self::AgentUpdated { .. } => "agent_updated",
        }
    }
}

/// Cloneable handle to the broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; having no subscribers is not an error.
    pub fn publish(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            trace!("event dropped, no subscribers");
        }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }
}
