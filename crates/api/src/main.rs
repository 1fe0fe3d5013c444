use std::sync::Arc;

use axum::http::HeaderValue;
use kartiquo_api::{create_router, AppState};
use kartiquo_core::config::{Settings, StoreBackend};
use kartiquo_core::llm::anthropic::AnthropicClient;
use kartiquo_core::llm::offline::OfflineAdvisor;
use kartiquo_core::llm::AdviceClient;
use kartiquo_core::storage::memory::MemoryStore;
use kartiquo_core::storage::postgres::PgStore;
use kartiquo_core::storage::Store;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store = connect_store(&settings).await;
    let advisor = build_advisor(&settings);
    tracing::info!(
        store_backend = ?settings.store_backend,
        store_ready = store.is_some(),
        advisor = advisor.provider().as_str(),
        "starting api"
    );

    let mut app = create_router(AppState::new(store, advisor));
    if let Some(origin) = settings.cors_allow_origin.as_deref() {
        let origin = HeaderValue::from_str(origin)
            .map_err(|e| anyhow::anyhow!("invalid CORS_ALLOW_ORIGIN {origin}: {e}"))?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Postgres problems leave the API in degraded mode (data routes answer 503)
/// instead of refusing to start.
async fn connect_store(settings: &Settings) -> Option<Arc<dyn Store>> {
    if settings.store_backend == StoreBackend::Memory {
        tracing::warn!("STORE_BACKEND=memory; data is lost on restart");
        return Some(Arc::new(MemoryStore::new()));
    }

    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            return None;
        }
    };

    match PgStore::connect(db_url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(
                error = %format!("{e:#}"),
                "db setup failed; starting API in degraded mode"
            );
            None
        }
    }
}

fn build_advisor(settings: &Settings) -> Arc<dyn AdviceClient> {
    if settings.anthropic_api_key.is_none() {
        tracing::warn!("ANTHROPIC_API_KEY not set; using offline advisor");
        return Arc::new(OfflineAdvisor::new());
    }
    match AnthropicClient::from_settings(settings) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "failed to build Anthropic client; using offline advisor");
            Arc::new(OfflineAdvisor::new())
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
