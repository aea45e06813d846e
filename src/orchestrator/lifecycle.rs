//! Conversation lifecycle manager.
//!
//! Every status change goes through this type. A transition and its
//! matching load counter change are committed in one `SQLite` transaction
//! whose first statement is a write, so the database lock is taken up front
//! and never upgraded mid-transaction.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::models::agent::{Agent, AgentStatus};
use crate::models::conversation::{
    validate_rating, Contact, Conversation, ConversationStatus, Priority,
};
use crate::models::message::{Message, SenderType};
use crate::orchestrator::assignment::{AssignmentEngine, PassReport};
use crate::orchestrator::events::{ChatEvent, EventBus};
use crate::orchestrator::triage::Triage;
use crate::persistence::agent_repo::AgentRepo;
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::db::Database;
use crate::persistence::message_repo::MessageRepo;
use crate::persistence::retry_read;
use crate::registry::AgentRegistry;
use crate::{AppError, Result};

/// Intake request for a new conversation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    /// Caller correlation key.
    pub session_id: String,
    /// Department tag; inferred from the initial message when absent.
    pub department: Option<String>,
    /// Queue priority; inferred from the initial message when absent.
    pub priority: Option<Priority>,
    /// Optional contact details.
    #[serde(flatten)]
    pub contact: Contact,
    /// Opaque metadata stored as-is.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// First user message, appended atomically with creation.
    pub initial_message: Option<String>,
}

/// Owns the conversation state machine.
#[derive(Clone)]
pub struct ConversationLifecycle {
    db: Arc<Database>,
    conversations: ConversationRepo,
    messages: MessageRepo,
    registry: AgentRegistry,
    engine: AssignmentEngine,
    triage: Triage,
    events: EventBus,
}

impl ConversationLifecycle {
    /// Build the lifecycle manager and its collaborators over one pool.
    #[must_use]
    pub fn new(db: Arc<Database>, config: &GlobalConfig, events: EventBus) -> Self {
        let routing = Arc::new(config.routing.clone());
        Self {
            conversations: ConversationRepo::new(Arc::clone(&db)),
            messages: MessageRepo::new(Arc::clone(&db)),
            registry: AgentRegistry::new(Arc::clone(&db), Arc::clone(&routing)),
            engine: AssignmentEngine::new(routing),
            triage: Triage::new(config.triage.clone()),
            events,
            db,
        }
    }

    /// The agent registry sharing this manager's pool.
    #[must_use]
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// The event bus transitions are published on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Open a conversation, or return the session's existing open one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for an empty session id.
    pub async fn start_conversation(&self, request: StartRequest) -> Result<Conversation> {
        let session_id = request.session_id.trim().to_owned();
        if session_id.is_empty() {
            return Err(AppError::InvalidInput("session_id must not be empty".into()));
        }

        let span = info_span!("start_conversation", session_id = %session_id);
        async move {
            if let Some(existing) = self.conversations.find_open_by_session(&session_id).await? {
                debug!(conversation_id = %existing.id, "returning open conversation");
                return Ok(existing);
            }

            let initial = request
                .initial_message
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty());
            let priority = request
                .priority
                .unwrap_or_else(|| self.triage.priority(initial));
            let department = request
                .department
                .map(|d| d.trim().to_owned())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| self.triage.department(initial));

            let conversation = Conversation::new(
                session_id.clone(),
                department,
                priority,
                request.contact,
                request.metadata,
            );

            let mut tx = self.db.begin().await?;
            match ConversationRepo::create_in(&mut tx, &conversation).await {
                Ok(()) => {}
                Err(AppError::Conflict(_)) => {
                    // Lost the race against a concurrent start for the same session.
                    tx.rollback().await?;
                    return self
                        .conversations
                        .find_open_by_session(&session_id)
                        .await?
                        .ok_or_else(|| {
                            AppError::Conflict(format!(
                                "session {session_id} changed while starting"
                            ))
                        });
                }
                Err(err) => return Err(err),
            }
            if let Some(text) = initial {
                let message = Message::new(conversation.id.clone(), SenderType::User, text.to_owned());
                MessageRepo::append_in(&mut tx, &message).await?;
            }
            tx.commit().await?;

            info!(
                conversation_id = %conversation.id,
                %priority,
                department = %conversation.department,
                "conversation started"
            );
            self.publish_conversation(&conversation.id).await;
            self.pass_after("start").await;

            self.conversations.get_by_id(&conversation.id).await
        }
        .instrument(span)
        .await
    }

    /// Assign a waiting conversation to an agent and take one load unit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown conversation or agent,
    /// `AppError::Conflict` if the conversation is not waiting, or
    /// `AppError::CapacityExceeded` if the agent is not eligible.
    pub async fn assign(&self, conversation_id: &str, agent_id: &str) -> Result<Conversation> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        if let Err(err) = AgentRepo::increment_load_in(&mut tx, agent_id).await {
            let current = ConversationRepo::get_in(&mut tx, conversation_id).await?;
            tx.rollback().await?;
            return Err(match current {
                None => not_found(conversation_id),
                Some(c) if c.status != ConversationStatus::Waiting => {
                    not_waiting(conversation_id, c.status)
                }
                Some(_) => err,
            });
        }

        if !ConversationRepo::mark_assigned_in(&mut tx, conversation_id, agent_id, now).await? {
            let current = ConversationRepo::get_in(&mut tx, conversation_id).await?;
            tx.rollback().await?;
            return Err(match current {
                None => not_found(conversation_id),
                Some(c) => not_waiting(conversation_id, c.status),
            });
        }

        let conversation = ConversationRepo::get_in(&mut tx, conversation_id)
            .await?
            .ok_or_else(|| not_found(conversation_id))?;
        tx.commit().await?;

        info!(conversation_id, agent_id, "conversation assigned");
        self.events.publish(ChatEvent::ConversationUpdated {
            conversation: conversation.clone(),
        });
        Ok(conversation)
    }

    /// Append a message; the first agent reply activates the conversation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for empty content,
    /// `AppError::NotFound` for an unknown conversation, or
    /// `AppError::Conflict` if the conversation is terminal or an agent
    /// writes before assignment.
    pub async fn record_message(
        &self,
        conversation_id: &str,
        sender_type: SenderType,
        content: &str,
    ) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(AppError::InvalidInput("message content must not be empty".into()));
        }

        let mut message =
            Message::new(conversation_id.to_owned(), sender_type, content.to_owned());
        let allowed: &[ConversationStatus] = match sender_type {
            SenderType::Agent => &[ConversationStatus::Assigned, ConversationStatus::Active],
            SenderType::User | SenderType::System => &ConversationStatus::OPEN,
        };

        let mut tx = self.db.begin().await?;
        let Some(stored_at) = MessageRepo::append_if_status_in(&mut tx, &message, allowed).await?
        else {
            let current = ConversationRepo::get_in(&mut tx, conversation_id).await?;
            tx.rollback().await?;
            return Err(match current {
                None => not_found(conversation_id),
                Some(c) if c.status.is_terminal() => AppError::Conflict(format!(
                    "conversation {conversation_id} is {}",
                    c.status
                )),
                Some(c) => AppError::Conflict(format!(
                    "conversation {conversation_id} has no agent yet (status {})",
                    c.status
                )),
            });
        };
        message.created_at = stored_at;

        let activated = sender_type == SenderType::Agent
            && ConversationRepo::mark_active_in(&mut tx, conversation_id, message.created_at)
                .await?;
        if !activated {
            ConversationRepo::touch_in(&mut tx, conversation_id, message.created_at).await?;
        }
        tx.commit().await?;

        debug!(conversation_id, sender = %sender_type, "message recorded");
        self.events.publish(ChatEvent::MessageAppended {
            message: message.clone(),
        });
        if activated {
            info!(conversation_id, "first agent response");
            self.publish_conversation(conversation_id).await;
        }
        Ok(message)
    }

    /// Close a conversation and release its agent.
    ///
    /// Closing an already closed conversation is a no-op apart from storing
    /// a first rating; closing a waiting one cancels it as abandoned.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for a rating outside 1..=5 or
    /// `AppError::NotFound` for an unknown conversation.
    pub async fn close(&self, conversation_id: &str, rating: Option<u8>) -> Result<Conversation> {
        let rating = rating.map(validate_rating).transpose()?;
        let now = Utc::now();
        let span = info_span!("close_conversation", conversation_id);

        async move {
            let mut tx = self.db.begin().await?;

            if let Some(agent_id) =
                ConversationRepo::mark_closed_in(&mut tx, conversation_id, rating, now).await?
            {
                AgentRepo::decrement_load_in(&mut tx, &agent_id).await?;
                tx.commit().await?;
                info!(agent_id = %agent_id, "conversation closed");
                let conversation = self.conversations.get_by_id(conversation_id).await?;
                self.events.publish(ChatEvent::ConversationUpdated {
                    conversation: conversation.clone(),
                });
                self.pass_after("close").await;
                return Ok(conversation);
            }

            if ConversationRepo::mark_abandoned_in(&mut tx, conversation_id, now).await? {
                tx.commit().await?;
                info!("waiting conversation cancelled");
                let conversation = self.conversations.get_by_id(conversation_id).await?;
                self.events.publish(ChatEvent::ConversationUpdated {
                    conversation: conversation.clone(),
                });
                return Ok(conversation);
            }

            match ConversationRepo::get_in(&mut tx, conversation_id).await? {
                None => {
                    tx.rollback().await?;
                    Err(not_found(conversation_id))
                }
                Some(current) => {
                    let rated = match (current.status, rating) {
                        (ConversationStatus::Closed, Some(rating)) => {
                            ConversationRepo::set_rating_in(&mut tx, conversation_id, rating)
                                .await?
                        }
                        _ => false,
                    };
                    tx.commit().await?;
                    if rated {
                        debug!("late rating stored on close");
                        self.conversations.get_by_id(conversation_id).await
                    } else {
                        debug!(status = %current.status, "close is a no-op");
                        Ok(current)
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Store the single post-close rating.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for a rating outside 1..=5,
    /// `AppError::NotFound` for an unknown conversation, or
    /// `AppError::Conflict` if it is not closed or already rated.
    pub async fn rate(&self, conversation_id: &str, rating: u8) -> Result<Conversation> {
        let rating = validate_rating(rating)?;
        let mut tx = self.db.begin().await?;

        if ConversationRepo::set_rating_in(&mut tx, conversation_id, rating).await? {
            tx.commit().await?;
            info!(conversation_id, rating, "conversation rated");
            return self.conversations.get_by_id(conversation_id).await;
        }

        let current = ConversationRepo::get_in(&mut tx, conversation_id).await?;
        tx.rollback().await?;
        Err(match current {
            None => not_found(conversation_id),
            Some(c) if c.status == ConversationStatus::Closed => {
                AppError::Conflict(format!("conversation {conversation_id} is already rated"))
            }
            Some(c) => AppError::Conflict(format!(
                "conversation {conversation_id} is {}, not closed",
                c.status
            )),
        })
    }

    /// Abandon a waiting conversation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown conversation or
    /// `AppError::Conflict` if it is no longer waiting.
    pub async fn abandon(&self, conversation_id: &str) -> Result<Conversation> {
        let mut tx = self.db.begin().await?;

        if !ConversationRepo::mark_abandoned_in(&mut tx, conversation_id, Utc::now()).await? {
            let current = ConversationRepo::get_in(&mut tx, conversation_id).await?;
            tx.rollback().await?;
            return Err(match current {
                None => not_found(conversation_id),
                Some(c) => not_waiting(conversation_id, c.status),
            });
        }
        tx.commit().await?;

        info!(conversation_id, "conversation abandoned");
        let conversation = self.conversations.get_by_id(conversation_id).await?;
        self.events.publish(ChatEvent::ConversationUpdated {
            conversation: conversation.clone(),
        });
        Ok(conversation)
    }

    /// Return an assigned, unanswered conversation to the queue.
    ///
    /// Priority and `created_at` are kept, so the conversation regains its
    /// original queue position.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown conversation or
    /// `AppError::Conflict` if it is not `assigned`.
    pub async fn requeue(&self, conversation_id: &str) -> Result<Conversation> {
        let current = self.conversations.get_by_id(conversation_id).await?;
        let agent_id = match (current.status, current.assigned_agent_id) {
            (ConversationStatus::Assigned, Some(agent_id)) => agent_id,
            (status, _) => {
                return Err(AppError::Conflict(format!(
                    "conversation {conversation_id} is {status}, not assigned"
                )))
            }
        };

        let mut tx = self.db.begin().await?;
        if !ConversationRepo::mark_requeued_in(&mut tx, conversation_id, &agent_id, Utc::now())
            .await?
        {
            tx.rollback().await?;
            return Err(AppError::Conflict(format!(
                "conversation {conversation_id} changed before requeue"
            )));
        }
        AgentRepo::decrement_load_in(&mut tx, &agent_id).await?;
        tx.commit().await?;

        info!(conversation_id, agent_id = %agent_id, "conversation requeued");
        let conversation = self.conversations.get_by_id(conversation_id).await?;
        self.events.publish(ChatEvent::ConversationUpdated {
            conversation: conversation.clone(),
        });
        Ok(conversation)
    }

    /// Update an agent's presence.
    ///
    /// Going offline requeues the agent's unanswered conversations; any
    /// change that may free capacity triggers an assignment pass.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the agent does not exist.
    pub async fn set_agent_availability(
        &self,
        agent_id: &str,
        status: AgentStatus,
        is_available: bool,
    ) -> Result<Agent> {
        let agent = self
            .registry
            .set_availability(agent_id, status, is_available)
            .await?;

        let mut requeued = 0_usize;
        if status == AgentStatus::Offline {
            let held = self
                .conversations
                .list_for_agent(agent_id, &[ConversationStatus::Assigned])
                .await?;
            for conversation in held {
                match self.requeue(&conversation.id).await {
                    Ok(_) => requeued += 1,
                    Err(err) => warn!(
                        conversation_id = %conversation.id,
                        agent_id,
                        %err,
                        "requeue on disconnect failed"
                    ),
                }
            }
        }

        if agent.is_accepting() || requeued > 0 {
            self.pass_after("availability").await;
        }

        let agent = self.registry.agent(agent_id).await?;
        self.events.publish(ChatEvent::AgentUpdated {
            agent: agent.clone(),
        });
        Ok(agent)
    }

    /// Match every waiting conversation the current agents can take.
    ///
    /// Per-pair failures are logged and counted, never returned.
    ///
    /// # Errors
    ///
    /// Returns an internal error only if the snapshot cannot be read.
    pub async fn run_assignment_pass(&self) -> Result<PassReport> {
        async move {
            let waiting = retry_read(|| {
                self.conversations
                    .list_by_status(&[ConversationStatus::Waiting])
            })
            .await?;
            if waiting.is_empty() {
                return Ok(PassReport::default());
            }

            let agents = retry_read(|| self.registry.accepting()).await?;
            let plan = self.engine.plan(&waiting, &agents);
            let mut report = PassReport {
                waiting: waiting.len(),
                planned: plan.len(),
                ..PassReport::default()
            };

            for pair in plan {
                match self.assign(&pair.conversation_id, &pair.agent_id).await {
                    Ok(_) => report.assigned += 1,
                    Err(err) => {
                        report.failed += 1;
                        warn!(
                            conversation_id = %pair.conversation_id,
                            agent_id = %pair.agent_id,
                            %err,
                            "planned assignment rejected"
                        );
                    }
                }
            }

            if report.planned > 0 {
                info!(
                    waiting = report.waiting,
                    assigned = report.assigned,
                    failed = report.failed,
                    "assignment pass complete"
                );
            }
            Ok(report)
        }
        .instrument(info_span!("assignment_pass"))
        .await
    }

    /// Abandon waiting conversations idle for longer than `max_idle`.
    ///
    /// Conversations that move on concurrently are skipped.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the idle list cannot be read.
    pub async fn abandon_idle(&self, max_idle: Duration) -> Result<usize> {
        let max_idle = chrono::Duration::from_std(max_idle)
            .map_err(|err| AppError::InvalidInput(format!("idle timeout out of range: {err}")))?;
        let cutoff = Utc::now() - max_idle;

        let idle = retry_read(|| self.conversations.list_idle_waiting(cutoff)).await?;
        let mut abandoned = 0;
        for conversation in idle {
            match self.abandon(&conversation.id).await {
                Ok(_) => abandoned += 1,
                Err(AppError::Conflict(_) | AppError::NotFound(_)) => {
                    debug!(conversation_id = %conversation.id, "idle conversation moved on");
                }
                Err(err) => {
                    warn!(conversation_id = %conversation.id, %err, "idle abandon failed");
                }
            }
        }

        if abandoned > 0 {
            info!(abandoned, "idle conversations abandoned");
        }
        Ok(abandoned)
    }

    /// Fetch one conversation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if it does not exist.
    pub async fn conversation(&self, id: &str) -> Result<Conversation> {
        retry_read(|| self.conversations.get_by_id(id)).await
    }

    /// List conversations in any of `statuses`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the query fails.
    pub async fn conversations(&self, statuses: &[ConversationStatus]) -> Result<Vec<Conversation>> {
        retry_read(|| self.conversations.list_by_status(statuses)).await
    }

    /// Messages of a conversation in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the conversation does not exist.
    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.conversation(conversation_id).await?;
        retry_read(|| self.messages.list_for_conversation(conversation_id)).await
    }

    async fn publish_conversation(&self, conversation_id: &str) {
        match self.conversations.get_by_id(conversation_id).await {
            Ok(conversation) => self.events.publish(ChatEvent::ConversationUpdated { conversation }),
            Err(err) => warn!(conversation_id, %err, "failed to load conversation for event"),
        }
    }

    async fn pass_after(&self, trigger: &'static str) {
        if let Err(err) = self.run_assignment_pass().await {
            warn!(trigger, %err, "assignment pass failed");
        }
    }
}

fn not_found(conversation_id: &str) -> AppError {
    AppError::NotFound(format!("conversation {conversation_id} not found"))
}

fn not_waiting(conversation_id: &str, status: ConversationStatus) -> AppError {
    AppError::Conflict(format!(
        "conversation {conversation_id} is {status}, not waiting"
    ))
}
