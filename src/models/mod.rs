//! Domain model module declarations.

pub mod agent;
pub mod conversation;
pub mod message;
pub mod stats;
