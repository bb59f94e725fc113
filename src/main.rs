use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use carousel_forge::{
    app,
    audit::AuditLog,
    config::{AccessPolicy, Settings},
    gemini::GeminiClient,
    pipeline::CarouselOrchestrator,
    routes::AppState,
    selection::basic_catalog,
    store::InMemoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env().context("invalid configuration")?;
    tracing::info!("Using API key: {} against {}", settings.masked_api_key(), settings.api_base);
    if settings.admin_emails.is_empty() {
        tracing::warn!("ADMIN_EMAILS is empty, admin routes will reject everyone");
    }

    let gemini = Arc::new(GeminiClient::new(settings.api_key.clone(), settings.api_base.clone()));
    if gemini.is_demo() {
        tracing::warn!("Running in demo mode: no remote model calls will be made");
    }
    let store = Arc::new(InMemoryStore::new(settings.model_costs.clone()));
    let (audit, audit_worker) = AuditLog::spawn(store.clone(), settings.audit_queue_capacity);

    let orchestrator = CarouselOrchestrator::new(
        gemini.clone(),
        gemini,
        store.clone(),
        audit,
        settings.remote_call_timeout,
    );
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        store,
        access: Arc::new(AccessPolicy::new(&settings.admin_emails)),
        compositions: Arc::new(basic_catalog()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router (and every audit handle it held) is gone; let the queue drain.
    if let Err(e) = audit_worker.await {
        tracing::warn!("Audit worker ended abnormally: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
