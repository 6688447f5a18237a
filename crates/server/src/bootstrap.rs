use std::sync::Arc;

use concierge_agent::{
    LanguageModel, OpenAiCompatibleClient, PromptedLanguageModel, ProviderError,
    SideEffectDispatcher, TurnOrchestrator,
};
use concierge_core::config::{AppConfig, ConfigError, LoadOptions};
use concierge_core::{ContextStore, SlotResolver};
use concierge_db::{
    connect_with_settings, migrations, DbPool, SqlKnowledgeRepository, SqlOrderRepository,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<TurnOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("language model client setup failed: {0}")]
    LanguageModel(#[source] ProviderError),
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Builds every long-lived component once from `config`.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        environment = %config.app.environment,
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let client = OpenAiCompatibleClient::from_config(&config.llm)
        .map_err(BootstrapError::LanguageModel)?;
    info!(
        event_name = "system.bootstrap.llm_ready",
        correlation_id = "bootstrap",
        provider = ?config.llm.provider,
        model = %client.model(),
        "language model client configured"
    );
    let model: Arc<dyn LanguageModel> = Arc::new(PromptedLanguageModel::new(Arc::new(client)));

    let side_effects = Arc::new(SideEffectDispatcher::new(
        Arc::new(SqlOrderRepository::new(db_pool.clone())),
        Arc::new(SqlKnowledgeRepository::new(db_pool.clone())),
    ));
    let context = Arc::new(ContextStore::new(config.conversation.context_settings()));
    let orchestrator =
        Arc::new(TurnOrchestrator::new(context, SlotResolver::default(), model, side_effects));

    Ok(Application { config, db_pool, orchestrator })
}
