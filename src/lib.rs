//! Helpdesk - intent routing and streamed replies for IT support requests
//!
//! A request is classified (knowledge, workflow or escalation), handled by
//! the matching agent, and answered through a streamed model reply. Tickets
//! are the only persisted entity; per-stage metrics are kept in memory.

pub mod agents;
pub mod app;
pub mod config;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod rest;
pub mod tickets;

pub use app::App;
pub use config::Config;
pub use orchestrator::{ChatEvent, Orchestrator, APOLOGY_MESSAGE};
