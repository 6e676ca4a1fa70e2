use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use agent_ops::api::{self, AppState};
use agent_ops::config::AppConfig;
use agent_ops::generators::PromptGenerator;
use agent_ops::jobs::JobManager;
use agent_ops::llm::{TextGenerator, create_provider};
use agent_ops::metrics::SnapshotClient;
use agent_ops::sandbox::Sandbox;
use agent_ops::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Agent Ops");

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    tracing::info!(path = %config.db_path.display(), "Database ready");

    // ── Content generation ───────────────────────────────────────────────
    let provider = create_provider(&config.llm)?;
    let text = TextGenerator::new(provider, &config.llm);
    let mut generator = PromptGenerator::new(
        text,
        Sandbox::new(&config.sandbox_dir),
        config.system_docs_path.clone(),
    );
    match config.metrics.clone().map(SnapshotClient::new) {
        Some(Ok(client)) => {
            tracing::info!("Business metrics enabled");
            generator = generator.with_metrics(Arc::new(client));
        }
        Some(Err(e)) => tracing::warn!(error = %e, "Business metrics disabled"),
        None => tracing::info!("Business metrics not configured"),
    }

    let manager = Arc::new(JobManager::new(db, Arc::new(generator)));

    // ── HTTP server ──────────────────────────────────────────────────────
    let state = AppState {
        manager: Arc::clone(&manager),
        api_key: config.server.api_key.clone(),
    };
    let app = api::router(state, &config.server.allowed_origins);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    manager.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Console logging, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "agent-ops.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining jobs");
}
