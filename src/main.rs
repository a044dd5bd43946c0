use std::sync::Arc;

use anyhow::Context;
use receptionist_setup::config::ServiceConfig;
use receptionist_setup::onboarding::DraftStore;
use receptionist_setup::server::{AppState, app_router};
use receptionist_setup::setup::SetupOrchestrator;
use receptionist_setup::store::LibSqlBackend;
use receptionist_setup::training::HttpAgentTrainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    eprintln!("📞 Receptionist setup v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);
    eprintln!("   Training webhook: {}", config.webhook.training_url);

    // ── Database ─────────────────────────────────────────────────────────
    let backend = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Setup pipeline ───────────────────────────────────────────────────
    let trainer = Arc::new(
        HttpAgentTrainer::new(config.webhook.clone()).context("failed to build webhook client")?,
    );
    let drafts = Arc::new(DraftStore::new(backend.clone()));
    let orchestrator = Arc::new(SetupOrchestrator::new(
        backend.clone(),
        trainer,
        drafts.clone(),
    ));

    let app = app_router(AppState {
        drafts,
        orchestrator,
        store: backend,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Setup API started");
    axum::serve(listener, app).await?;

    Ok(())
}
