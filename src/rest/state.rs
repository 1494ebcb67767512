//! API state shared by all handlers.

use std::sync::Arc;

use crate::app::App;
use crate::config::Config;
use crate::metrics::MetricsTracker;
use crate::orchestrator::Orchestrator;
use crate::tickets::TicketStore;

/// Shared state for the REST API
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub store: Arc<dyn TicketStore>,
    pub metrics: Arc<MetricsTracker>,
    pub orchestrator: Arc<Orchestrator>,
    pub llm_configured: bool,
}

impl ApiState {
    pub fn new(app: App) -> Self {
        Self {
            config: app.config,
            store: app.store,
            metrics: app.metrics,
            orchestrator: app.orchestrator,
            llm_configured: app.llm_configured,
        }
    }
}

impl From<App> for ApiState {
    fn from(app: App) -> Self {
        Self::new(app)
    }
}
