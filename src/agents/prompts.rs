//! Prompt templates for every model call.
//!
//! Each system prompt opens with a distinct instruction ("Classify",
//! "Extract", "documentation excerpts", "final reply") so scripted
//! providers can tell the calls apart.

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("failed to render prompt '{name}': {message}")]
pub struct PromptError {
    pub name: &'static str,
    pub message: String,
}

pub const CLASSIFY_SYSTEM: &str = "\
Classify the user's message for an IT support desk into exactly one category:
- knowledge: the user wants information or how-to guidance (policies, setup steps, troubleshooting advice).
- workflow: an action must be performed (create, check, list or update a ticket, reset a password, check system logs).
- escalation: the user explicitly asks for a human, or is clearly frustrated with automated help.

Respond with only a JSON object, no prose:
{\"category\": \"knowledge\" | \"workflow\" | \"escalation\", \"reason\": \"<one short sentence>\"}";

const EXTRACT_SYSTEM: &str = "\
Extract the workflow action an IT support user is asking for.

Actions: create_ticket, check_status, list_tickets, update_status, password_reset, analyze_logs, unknown.

Rules:
- For create_ticket write a short title of 3 to 6 words and keep the full problem in the description.
- Pick priority (low, medium, high, critical) and category (hardware, software, network, access, other) only when the message supports them.
- Ticket ids are numbers; \"#42\" means ticket 42.
- Map status words to the status vocabulary: close, closed, shut, complete, done, finish, finished -> closed; resolve, resolved, fix, fixed -> resolved; progress, start, started, work, working, begin -> in_progress; reopen, re-open -> open.
- analyze_logs needs a system: vpn, email, network or authentication.
- Leave out every field the chosen action does not use.

Respond with only a JSON object matching this schema:
{{schema}}";

const KNOWLEDGE_SYSTEM: &str = "\
You answer IT support questions using only the documentation excerpts below.
If the excerpts do not contain the answer, say so and suggest contacting the helpdesk.
Keep the answer short and practical.

Documentation excerpts:
{{#each documents}}
--- {{this.source}} (similarity {{this.similarity}})
{{this.content}}
{{/each}}";

pub const SYNTHESIS_SYSTEM: &str = "\
You write the final reply to an IT support user, based on the output of the agent that handled their request.
- If the agent produced an answer, present it clearly.
- If the agent created or updated a ticket, confirm it warmly and repeat the ticket number.
- If the agent asked for clarification, politely ask the user for the missing detail.
- Do not add any information that is not in the agent output.
Reply in plain conversational text.";

const SYNTHESIS_PROMPT: &str = "\
Agent output:
{{agent_output}}

User message:
{{message}}";

/// Render a template with handlebars, without HTML escaping
fn render<T: Serialize>(name: &'static str, template: &str, data: &T) -> Result<String, PromptError> {
    let mut hb = Handlebars::new();

    // Prompts are plain text
    hb.register_escape_fn(handlebars::no_escape);

    let err = |e: &dyn std::fmt::Display| PromptError {
        name,
        message: e.to_string(),
    };

    hb.register_template_string(name, template)
        .map_err(|e| err(&e))?;
    hb.render(name, data).map_err(|e| err(&e))
}

/// System prompt for action extraction, embedding the action JSON schema
pub fn extract_system(schema: &str) -> Result<String, PromptError> {
    render(
        "extract",
        EXTRACT_SYSTEM,
        &serde_json::json!({ "schema": schema }),
    )
}

/// System prompt for knowledge answers over the retrieved documents
pub fn knowledge_system<T: Serialize>(documents: &[T]) -> Result<String, PromptError> {
    render(
        "knowledge",
        KNOWLEDGE_SYSTEM,
        &serde_json::json!({ "documents": documents }),
    )
}

/// User-turn prompt for the synthesis stage
pub fn synthesis_prompt(agent_output: &str, message: &str) -> Result<String, PromptError> {
    render(
        "synthesis",
        SYNTHESIS_PROMPT,
        &serde_json::json!({ "agent_output": agent_output, "message": message }),
    )
}
