//! Conversation orchestration.
//!
//! Covers the lifecycle state machine, the assignment engine, intake
//! triage, change notifications, and the periodic sweeps.

pub mod assignment;
pub mod events;
pub mod lifecycle;
pub mod sweeper;
pub mod triage;
