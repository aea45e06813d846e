//! HTTP+JSON front end.

pub mod error;
pub mod handlers;
pub mod server;
