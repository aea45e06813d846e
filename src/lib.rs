#![forbid(unsafe_code)]

//! Live-support chat core: conversation intake, agent capacity tracking,
//! routing of waiting conversations to agents, and dashboard statistics.

pub mod api;
pub mod config;
pub mod errors;
pub mod ipc;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod registry;
pub mod state;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
