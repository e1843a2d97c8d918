use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use aurora_agent::toolkit::{
    ClaimsInsightTool, InsurerApiClient, PaymentCheckoutTool, PaymentGatewayClient,
    PaymentStatusTool, TravelInsurancePurchaseTool, TripDocumentScanner,
};
use aurora_agent::{
    OpenAiCompatClient, Orchestrator, PolicyResearchAgent, PolicyResearchTool, RegistryError,
    Tool, ToolRegistry,
};
use aurora_core::config::{AppConfig, ConfigError, LoadOptions};
use aurora_store::{connect_with_settings, SessionStore, SqliteSessionBackend, StoreError};

pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator<SqliteSessionBackend>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("session schema setup failed: {0}")]
    Schema(#[from] StoreError),
    #[error("llm client setup failed: {0}")]
    Llm(#[source] anyhow::Error),
    #[error("policy taxonomy setup failed: {0}")]
    Research(#[source] anyhow::Error),
    #[error("payments client setup failed: {0}")]
    Payments(#[source] anyhow::Error),
    #[error("insurer client setup failed: {0}")]
    Insurer(#[source] anyhow::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Constructs the whole object graph once; request handlers only ever see
/// the finished orchestrator.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    let backend = SqliteSessionBackend::new(pool);
    backend.ensure_schema().await?;
    info!(event_name = "system.bootstrap.sessions_ready", "session store schema ensured");

    let llm = Arc::new(OpenAiCompatClient::new(&config.llm).map_err(BootstrapError::Llm)?);

    let research_agent = Arc::new(
        PolicyResearchAgent::new(llm.clone(), config.research.taxonomy_path.clone())
            .map_err(BootstrapError::Research)?,
    );
    let gateway = Arc::new(
        PaymentGatewayClient::new(&config.payments).map_err(BootstrapError::Payments)?,
    );
    let insurer =
        Arc::new(InsurerApiClient::new(&config.insurer).map_err(BootstrapError::Insurer)?);

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(PolicyResearchTool::new(research_agent)),
        Arc::new(ClaimsInsightTool::load(&config.research.claims_data_path)),
        Arc::new(TripDocumentScanner::default()),
        Arc::new(TravelInsurancePurchaseTool::new(insurer)),
        Arc::new(PaymentCheckoutTool::new(gateway.clone())),
        Arc::new(PaymentStatusTool::new(gateway)),
    ];
    let registry = ToolRegistry::new(tools)?;

    let orchestrator =
        Arc::new(Orchestrator::new(llm, registry, SessionStore::new(backend)));

    info!(event_name = "system.bootstrap.complete", "application bootstrap finished");
    Ok(Application { config, orchestrator })
}
