use std::sync::Arc;

use anyhow::Context;

use vx_agents::{IdentityAgent, PromptStore, RouterAgent, TaskManagerAgent};
use vx_domain::config::Config;
use vx_providers::{GeminiLiveClient, LiveClient};
use vx_sessions::SessionContext;
use vx_storage::StorageService;

use crate::runtime::orchestrator::Orchestrator;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<StorageService>,
    pub llm: Arc<dyn LiveClient>,
    pub prompts: Arc<PromptStore>,
}

impl AppState {
    /// Boot the shared services: storage, the model client, and the
    /// prompt store.
    pub fn build(config: Arc<Config>) -> anyhow::Result<Self> {
        let storage = Arc::new(
            StorageService::open(&config.storage.data_path).context("opening storage")?,
        );
        tracing::info!(path = %config.storage.data_path.display(), "storage ready");

        let api_key = config
            .api_key()
            .context("no LLM API key: set [llm] api_key or GOOGLE_API_KEY")?;
        let llm: Arc<dyn LiveClient> = Arc::new(
            GeminiLiveClient::new(&config.llm, api_key).context("initializing model client")?,
        );
        tracing::info!(model = %config.llm.model, "model client ready");

        let prompts = Arc::new(PromptStore::new(&config.prompts.path));

        Ok(Self {
            config,
            storage,
            llm,
            prompts,
        })
    }

    /// Build a per-call orchestrator with the full agent roster
    /// registered and the given session installed.
    pub fn build_orchestrator(&self, session: SessionContext) -> Orchestrator {
        let mut orchestrator = Orchestrator::new(
            &self.config.app.environment,
            &self.config.observer,
        );
        orchestrator.context.session = session;

        orchestrator
            .register_agent(Arc::new(RouterAgent::new(self.llm.clone(), &self.prompts)))
            .expect("router registered once");
        orchestrator
            .register_agent(Arc::new(IdentityAgent::new(
                self.llm.clone(),
                self.storage.clone(),
                &self.prompts,
            )))
            .expect("identity registered once");
        orchestrator
            .register_agent(Arc::new(TaskManagerAgent::new(
                self.llm.clone(),
                self.storage.clone(),
                &self.prompts,
            )))
            .expect("task_manager registered once");

        orchestrator
    }
}
