//! Action extraction for workflow requests.
//!
//! The model answers in the flat [`RawAction`] shape (its JSON schema is part
//! of the prompt). The reply is validated into the closed [`ActionDecision`]
//! here; anything that does not validate takes the keyword fallback.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use super::classifier::DecisionSource;
use super::prompts;
use super::workflow::LogSystem;
use crate::llm::{complete_json, CompletionRequest, LlmError, LlmProvider};
use crate::tickets::{title_from_message, Category, Priority, StatusFilter, TicketStatus};

/// Characters of the message used for fallback ticket titles
pub const FALLBACK_TITLE_CHARS: usize = 50;

/// Action names understood by the workflow dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateTicket,
    CheckStatus,
    ListTickets,
    UpdateStatus,
    PasswordReset,
    AnalyzeLogs,
    Unknown,
}

/// A ticket id as the model writes it: `42`, `"42"` or `"#42"`
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TicketIdValue {
    Number(u64),
    Text(String),
}

impl TicketIdValue {
    fn resolve(&self) -> Result<u64, LlmError> {
        match self {
            TicketIdValue::Number(id) => Ok(*id),
            TicketIdValue::Text(text) => text
                .trim()
                .trim_start_matches('#')
                .parse()
                .map_err(|_| LlmError::invalid_output(format!("invalid ticket id '{}'", text))),
        }
    }
}

/// Structured reply the model must produce for the extraction prompt
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawAction {
    /// Which action the user wants
    pub action: ActionKind,
    /// create_ticket: short title of 3 to 6 words
    #[serde(default)]
    pub title: Option<String>,
    /// create_ticket: full description of the problem
    #[serde(default)]
    pub description: Option<String>,
    /// create_ticket: low, medium, high or critical
    #[serde(default)]
    pub priority: Option<String>,
    /// create_ticket: hardware, software, network, access or other
    #[serde(default)]
    pub category: Option<String>,
    /// check_status / update_status: the ticket number
    #[serde(default)]
    pub ticket_id: Option<TicketIdValue>,
    /// list_tickets: "all" or one status
    #[serde(default)]
    pub status: Option<String>,
    /// list_tickets: how many tickets to show
    #[serde(default)]
    pub limit: Option<usize>,
    /// update_status: open, in_progress, resolved or closed
    #[serde(default)]
    pub new_status: Option<String>,
    /// analyze_logs: vpn, email, network or authentication
    #[serde(default)]
    pub system: Option<String>,
    /// Why this action was chosen
    #[serde(default)]
    pub reason: String,
}

/// JSON schema of [`RawAction`], embedded in the extraction prompt
pub fn action_schema() -> String {
    let schema = schemars::schema_for!(RawAction);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// A validated workflow action carrying only the parameters its tag uses
#[derive(Debug, Clone, PartialEq)]
pub enum ActionDecision {
    CreateTicket {
        title: String,
        description: String,
        priority: Option<Priority>,
        category: Option<Category>,
    },
    CheckStatus {
        ticket_id: Option<u64>,
    },
    ListTickets {
        status: StatusFilter,
        limit: Option<usize>,
    },
    UpdateStatus {
        ticket_id: Option<u64>,
        new_status: Option<TicketStatus>,
    },
    PasswordReset,
    AnalyzeLogs {
        system: Option<LogSystem>,
    },
    Unknown,
}

impl ActionDecision {
    pub fn name(&self) -> &'static str {
        match self {
            ActionDecision::CreateTicket { .. } => "create_ticket",
            ActionDecision::CheckStatus { .. } => "check_status",
            ActionDecision::ListTickets { .. } => "list_tickets",
            ActionDecision::UpdateStatus { .. } => "update_status",
            ActionDecision::PasswordReset => "password_reset",
            ActionDecision::AnalyzeLogs { .. } => "analyze_logs",
            ActionDecision::Unknown => "unknown",
        }
    }

    /// Validate a model reply against the action set
    pub fn from_raw(raw: RawAction, message: &str) -> Result<Self, LlmError> {
        let ticket_id = raw.ticket_id.as_ref().map(TicketIdValue::resolve).transpose()?;

        let decision = match raw.action {
            ActionKind::CreateTicket => {
                let description = raw
                    .description
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| message.to_string());
                let title = raw
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| title_from_message(&description, FALLBACK_TITLE_CHARS));
                ActionDecision::CreateTicket {
                    title,
                    description,
                    priority: lenient("priority", raw.priority.as_deref()),
                    category: lenient("category", raw.category.as_deref()),
                }
            }
            ActionKind::CheckStatus => ActionDecision::CheckStatus { ticket_id },
            ActionKind::ListTickets => {
                let status = match raw.status.as_deref() {
                    None | Some("") => StatusFilter::All,
                    Some(s) => s
                        .parse::<StatusFilter>()
                        .map_err(|e| LlmError::invalid_output(e.to_string()))?,
                };
                ActionDecision::ListTickets {
                    status,
                    limit: raw.limit.filter(|l| *l > 0),
                }
            }
            ActionKind::UpdateStatus => ActionDecision::UpdateStatus {
                ticket_id,
                new_status: lenient("newStatus", raw.new_status.as_deref()),
            },
            ActionKind::PasswordReset => ActionDecision::PasswordReset,
            ActionKind::AnalyzeLogs => ActionDecision::AnalyzeLogs {
                system: lenient("system", raw.system.as_deref()),
            },
            ActionKind::Unknown => ActionDecision::Unknown,
        };
        Ok(decision)
    }
}

/// Parse an optional vocabulary field with the lenient `FromStr` rules.
/// Unrecognized values count as absent so later defaults or inference apply.
fn lenient<T: FromStr>(field: &'static str, value: Option<&str>) -> Option<T> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            debug!(field, value, "ignoring unrecognized value in model reply");
            None
        }
    }
}

impl fmt::Display for ActionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An extracted action with its justification and origin
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAction {
    pub decision: ActionDecision,
    pub reason: String,
    pub source: DecisionSource,
}

static STATUS_KEYWORDS: Lazy<Vec<(Regex, TicketStatus)>> = Lazy::new(|| {
    [
        (r"\b(reopen|re-open)\b", TicketStatus::Open),
        (
            r"\b(close|closed|shut|complete|completed|done|finish|finished)\b",
            TicketStatus::Closed,
        ),
        (r"\b(resolve|resolved|fix|fixed)\b", TicketStatus::Resolved),
        (
            r"\b(progress|start|started|work|working|begin)\b",
            TicketStatus::InProgress,
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, status)| match Regex::new(pattern) {
        Ok(re) => Some((re, status)),
        Err(e) => {
            warn!(pattern, error = %e, "Failed to compile status pattern");
            None
        }
    })
    .collect()
});

/// Map status verbs in free text to the status vocabulary
pub fn infer_status(message: &str) -> Option<TicketStatus> {
    let lower = message.to_lowercase();
    STATUS_KEYWORDS
        .iter()
        .find(|(re, _)| re.is_match(&lower))
        .map(|(_, status)| *status)
}

/// Coarse keyword extraction used whenever the model path fails
pub fn fallback_action(message: &str) -> ActionDecision {
    let lower = message.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has_any(&["ticket", "broken", "issue", "fix"]) {
        ActionDecision::CreateTicket {
            title: title_from_message(message, FALLBACK_TITLE_CHARS),
            description: message.to_string(),
            priority: None,
            category: None,
        }
    } else if has_any(&["password", "reset"]) {
        ActionDecision::PasswordReset
    } else {
        ActionDecision::Unknown
    }
}

pub struct ActionExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl ActionExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    async fn extract_with_model(&self, message: &str) -> Result<ExtractedAction, LlmError> {
        let system = prompts::extract_system(&action_schema())
            .map_err(|e| LlmError::invalid_output(e.to_string()))?;
        let request = CompletionRequest::new(system, message)
            .with_max_tokens(500)
            .with_temperature(0.0);

        let raw: RawAction = complete_json(self.llm.as_ref(), request).await?;
        let reason = raw.reason.clone();
        let mut decision = ActionDecision::from_raw(raw, message)?;

        if let ActionDecision::UpdateStatus { new_status, .. } = &mut decision {
            if new_status.is_none() {
                *new_status = infer_status(message);
            }
        }

        Ok(ExtractedAction {
            decision,
            reason,
            source: DecisionSource::Model,
        })
    }

    /// Extract the requested action. Never fails: model failures use [`fallback_action`].
    pub async fn extract(&self, message: &str) -> ExtractedAction {
        match self.extract_with_model(message).await {
            Ok(extracted) => {
                debug!(action = %extracted.decision, reason = %extracted.reason, "extracted by model");
                extracted
            }
            Err(e) => {
                let decision = fallback_action(message);
                warn!(action = %decision, "Action extraction fell back to keywords: {}", e);
                ExtractedAction {
                    decision,
                    reason: format!("keyword fallback ({})", e),
                    source: DecisionSource::Fallback,
                }
            }
        }
    }
}
