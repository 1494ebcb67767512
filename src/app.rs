//! Composition root: builds the long-lived components from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::knowledge::{InMemoryKnowledgeBase, KnowledgeBase};
use crate::llm::{AnthropicProvider, LlmProvider, NotConfiguredProvider};
use crate::metrics::MetricsTracker;
use crate::orchestrator::Orchestrator;
use crate::tickets::{FileTicketStore, TicketStore};

/// Shared components for one process
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<dyn TicketStore>,
    pub metrics: Arc<MetricsTracker>,
    pub orchestrator: Arc<Orchestrator>,
    /// Whether the language model has credentials
    pub llm_configured: bool,
}

impl App {
    /// Build everything from configuration: file-backed tickets, documents
    /// from the knowledge directory, and the configured model provider.
    pub async fn from_config(config: Config) -> Result<Self> {
        let store = FileTicketStore::open(config.tickets_file())
            .await
            .context("Failed to open ticket store")?;
        info!(path = %store.path().display(), "opened ticket store");

        let knowledge = InMemoryKnowledgeBase::load_dir(
            &config.knowledge_path(),
            config.knowledge.min_similarity,
        )
        .context("Failed to load knowledge documents")?;

        let llm = build_provider(&config)?;

        Ok(Self::from_parts(
            config,
            llm,
            Arc::new(store),
            Arc::new(knowledge),
        ))
    }

    /// Assemble from explicit components
    pub fn from_parts(
        config: Config,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn TicketStore>,
        knowledge: Arc<dyn KnowledgeBase>,
    ) -> Self {
        let metrics = Arc::new(MetricsTracker::new(config.metrics.capacity));
        let llm_configured = llm.is_configured();
        let orchestrator = Arc::new(Orchestrator::new(
            llm,
            Arc::clone(&store),
            knowledge,
            Arc::clone(&metrics),
            &config,
        ));

        Self {
            config: Arc::new(config),
            store,
            metrics,
            orchestrator,
            llm_configured,
        }
    }
}

/// Select the model provider named in configuration
pub fn build_provider(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    let provider = config.llm.provider.as_str();
    if provider != "anthropic" {
        anyhow::bail!("Unsupported LLM provider '{}'", provider);
    }

    match AnthropicProvider::from_config(&config.llm).context("Failed to build LLM client")? {
        Some(client) => {
            info!(model = %config.llm.model, "using Anthropic provider");
            Ok(Arc::new(client))
        }
        None => {
            warn!(
                env = %config.llm.api_key_env,
                "No API key found; classification and extraction will use keyword fallbacks"
            );
            Ok(Arc::new(NotConfiguredProvider::new(provider)))
        }
    }
}
