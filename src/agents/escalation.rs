//! Escalation to a human agent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::tickets::{
    title_from_message, Category, NewTicket, Priority, StoreError, Ticket, TicketStore,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EscalationResult {
    pub ticket_id: u64,
    pub message: String,
    pub ticket: Ticket,
}

/// Hands a request to the human support team by opening a high-priority ticket
pub struct EscalationAgent {
    store: Arc<dyn TicketStore>,
    title_chars: usize,
}

impl EscalationAgent {
    pub fn new(store: Arc<dyn TicketStore>, title_chars: usize) -> Self {
        Self { store, title_chars }
    }

    /// Always opens a ticket; a store failure is the only error
    pub async fn escalate(&self, message: &str) -> Result<EscalationResult, StoreError> {
        let params = NewTicket::new(
            format!(
                "Escalation: {}",
                title_from_message(message, self.title_chars)
            ),
            format!(
                "User requested escalation to a human agent.\n\nOriginal message:\n{}",
                message
            ),
        )
        .with_priority(Priority::High)
        .with_category(Category::Other);

        let ticket = self.store.create(params).await?;
        info!(ticket_id = ticket.id, "escalated request to human support");

        Ok(EscalationResult {
            ticket_id: ticket.id,
            message: format!(
                "I've escalated your request to a human support agent. Your ticket number is #{}. \
                 Someone from the support team will contact you shortly.",
                ticket.id
            ),
            ticket,
        })
    }
}
