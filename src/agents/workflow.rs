//! Workflow actions: executes extracted actions against the ticket store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::extractor::{fallback_action, ActionDecision, ActionExtractor};
use super::AgentError;
use crate::llm::LlmProvider;
use crate::tickets::{NewTicket, StatusFilter, StoreError, TicketStore};

/// Systems covered by log analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogSystem {
    Vpn,
    Email,
    Network,
    Authentication,
}

impl LogSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSystem::Vpn => "vpn",
            LogSystem::Email => "email",
            LogSystem::Network => "network",
            LogSystem::Authentication => "authentication",
        }
    }
}

impl fmt::Display for LogSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vpn" => Ok(LogSystem::Vpn),
            "email" => Ok(LogSystem::Email),
            "network" => Ok(LogSystem::Network),
            "authentication" => Ok(LogSystem::Authentication),
            other => Err(format!("unknown system '{}'", other)),
        }
    }
}

/// Status and findings reported by log analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub system: LogSystem,
    pub status: &'static str,
    pub findings: Vec<&'static str>,
}

/// Canned diagnostics per system
pub fn diagnostics_for(system: LogSystem) -> Diagnostics {
    let (status, findings) = match system {
        LogSystem::Vpn => (
            "degraded",
            vec![
                "Elevated connection latency on the primary VPN gateway",
                "3 failed authentication attempts in the last hour",
                "Certificate expires in 14 days",
            ],
        ),
        LogSystem::Email => (
            "healthy",
            vec![
                "All mail queues processing normally",
                "No delivery failures in the last 24 hours",
            ],
        ),
        LogSystem::Network => (
            "warning",
            vec![
                "Packet loss of 2% detected on the floor 3 switch",
                "DNS resolution times within normal range",
            ],
        ),
        LogSystem::Authentication => (
            "healthy",
            vec![
                "SSO provider responding normally",
                "No unusual login patterns detected",
            ],
        ),
    };
    Diagnostics {
        system,
        status,
        findings,
    }
}

const PASSWORD_RESET_STEPS: &str = "\
To complete your password reset:
1. Visit the self-service portal at https://password.company.com
2. Enter your username and select \"Forgot password\"
3. Check your backup email for a verification code
4. Enter the code and choose a new password of at least 12 characters";

const UNKNOWN_ACTION: &str = "I'm not sure what you'd like me to do. I can create a ticket, \
check or update a ticket's status, list your tickets, help with a password reset, \
or check the logs for vpn, email, network or authentication.";

/// Outcome of one workflow action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkflowResult {
    pub action: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<serde_json::Value>,
}

impl WorkflowResult {
    fn ok(action: &str, message: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            success: true,
            message: message.into(),
            data: None,
        }
    }

    fn failed(action: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(action, message)
        }
    }

    fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

/// Executes validated actions against the ticket store
pub struct WorkflowDispatcher {
    store: Arc<dyn TicketStore>,
    list_limit: usize,
    helpdesk_contact: String,
}

impl WorkflowDispatcher {
    pub fn new(store: Arc<dyn TicketStore>, list_limit: usize, helpdesk_contact: &str) -> Self {
        Self {
            store,
            list_limit,
            helpdesk_contact: helpdesk_contact.to_string(),
        }
    }

    /// Run one action. Missing parameters and unknown ids are reported in the
    /// result; only store failures are errors.
    pub async fn dispatch(&self, decision: &ActionDecision) -> Result<WorkflowResult, StoreError> {
        let action = decision.name();

        let result = match decision {
            ActionDecision::CreateTicket {
                title,
                description,
                priority,
                category,
            } => {
                let ticket = self
                    .store
                    .create(NewTicket {
                        title: title.clone(),
                        description: description.clone(),
                        priority: *priority,
                        category: *category,
                    })
                    .await?;
                info!(ticket_id = ticket.id, priority = %ticket.priority, "created ticket");
                WorkflowResult::ok(
                    action,
                    format!(
                        "Created ticket #{} \"{}\" with {} priority in the {} category. \
                         The support team will follow up.",
                        ticket.id, ticket.title, ticket.priority, ticket.category
                    ),
                )
                .with_data(&ticket)
            }

            ActionDecision::CheckStatus { ticket_id: None } => WorkflowResult::failed(
                action,
                "Which ticket should I check? Please give me the ticket number (for example #42).",
            ),
            ActionDecision::CheckStatus {
                ticket_id: Some(id),
            } => match self.store.get(*id).await? {
                Some(ticket) => WorkflowResult::ok(action, ticket.details()).with_data(&ticket),
                None => WorkflowResult::failed(action, not_found(*id)),
            },

            ActionDecision::ListTickets { status, limit } => {
                let limit = limit.unwrap_or(self.list_limit);
                let tickets = self.store.list(*status, limit).await?;
                if tickets.is_empty() {
                    let message = match status {
                        StatusFilter::All => "No tickets found.".to_string(),
                        StatusFilter::Only(s) => format!("No tickets found with status {}.", s),
                    };
                    WorkflowResult::ok(action, message).with_data(&tickets)
                } else {
                    let lines: Vec<String> = tickets.iter().map(|t| t.summary_line()).collect();
                    WorkflowResult::ok(
                        action,
                        format!(
                            "Found {} ticket(s) ({}):\n{}",
                            tickets.len(),
                            status,
                            lines.join("\n")
                        ),
                    )
                    .with_data(&tickets)
                }
            }

            ActionDecision::UpdateStatus {
                ticket_id: None, ..
            } => WorkflowResult::failed(
                action,
                "Which ticket should I update? Please give me the ticket number.",
            ),
            ActionDecision::UpdateStatus {
                ticket_id: Some(id),
                new_status: None,
            } => WorkflowResult::failed(
                action,
                format!(
                    "What status should ticket #{} have? I can set it to open, in progress, resolved or closed.",
                    id
                ),
            ),
            ActionDecision::UpdateStatus {
                ticket_id: Some(id),
                new_status: Some(status),
            } => match self.store.update_status(*id, *status).await? {
                Some(ticket) => {
                    info!(ticket_id = ticket.id, status = %ticket.status, "updated ticket status");
                    WorkflowResult::ok(
                        action,
                        format!("Ticket #{} is now {}.", ticket.id, ticket.status),
                    )
                    .with_data(&ticket)
                }
                None => WorkflowResult::failed(action, not_found(*id)),
            },

            ActionDecision::PasswordReset => WorkflowResult::ok(
                action,
                format!(
                    "{}\n\nIf the code does not arrive within 10 minutes, contact {}.",
                    PASSWORD_RESET_STEPS, self.helpdesk_contact
                ),
            ),

            ActionDecision::AnalyzeLogs { system: None } => WorkflowResult::failed(
                action,
                "Which system should I check? I can analyze logs for vpn, email, network or authentication.",
            ),
            ActionDecision::AnalyzeLogs {
                system: Some(system),
            } => {
                let diagnostics = diagnostics_for(*system);
                let findings: Vec<String> = diagnostics
                    .findings
                    .iter()
                    .map(|f| format!("- {}", f))
                    .collect();
                WorkflowResult::ok(
                    action,
                    format!(
                        "Log analysis for {}: status {}\n{}",
                        system,
                        diagnostics.status,
                        findings.join("\n")
                    ),
                )
                .with_data(&diagnostics)
            }

            ActionDecision::Unknown => WorkflowResult::failed(action, UNKNOWN_ACTION),
        };

        Ok(result)
    }

    fn manual_channel(&self, action: &str) -> WorkflowResult {
        WorkflowResult::failed(
            action,
            format!(
                "I couldn't complete that request right now. Please contact {} for help.",
                self.helpdesk_contact
            ),
        )
    }
}

fn not_found(id: u64) -> String {
    format!(
        "I couldn't find ticket #{}. Please check the number and try again.",
        id
    )
}

/// Workflow handler: extraction followed by dispatch
pub struct WorkflowAgent {
    extractor: ActionExtractor,
    dispatcher: WorkflowDispatcher,
}

impl WorkflowAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, dispatcher: WorkflowDispatcher) -> Self {
        Self {
            extractor: ActionExtractor::new(llm),
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &WorkflowDispatcher {
        &self.dispatcher
    }

    /// Handle a workflow request.
    ///
    /// When dispatch fails, the keyword extraction is tried once more for
    /// ticket creation and password resets; other actions get a pointer to the
    /// manual helpdesk channel. A second store failure ends the request.
    pub async fn handle(&self, message: &str) -> Result<WorkflowResult, AgentError> {
        let extracted = self.extractor.extract(message).await;
        info!(
            action = %extracted.decision,
            source = extracted.source.as_str(),
            "dispatching workflow action"
        );

        let err = match self.dispatcher.dispatch(&extracted.decision).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };
        warn!(action = %extracted.decision, "Workflow dispatch failed: {}", err);

        match fallback_action(message) {
            decision @ (ActionDecision::CreateTicket { .. } | ActionDecision::PasswordReset) => {
                Ok(self.dispatcher.dispatch(&decision).await?)
            }
            _ => Ok(self.dispatcher.manual_channel(extracted.decision.name())),
        }
    }
}
