//! Route handlers for the REST API.

pub mod chat;
pub mod health;
pub mod metrics;
pub mod tickets;
