//! Periodic safety-net tasks: the assignment sweep and the idle abandon sweep.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::lifecycle::ConversationLifecycle;

/// Spawn the periodic assignment pass.
///
/// Catches conversations whose event-driven pass was lost, for example
/// when an agent's capacity freed up through a failed commit.
#[must_use]
pub fn spawn_assignment_sweep(
    lifecycle: ConversationLifecycle,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("assignment sweep shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = lifecycle.run_assignment_pass().await {
                        error!(%err, "assignment sweep failed");
                    }
                }
            }
        }
    })
}

/// Spawn the idle-waiting abandon sweep.
#[must_use]
pub fn spawn_abandon_sweep(
    lifecycle: ConversationLifecycle,
    max_idle: Duration,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("abandon sweep shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = lifecycle.abandon_idle(max_idle).await {
                        error!(%err, "abandon sweep failed");
                    }
                }
            }
        }
    })
}
