use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway_api::auth::{MemoryTokens, TokenStore};
use gateway_api::config::Config;
use gateway_api::gateway::Gateway;
use gateway_api::membership::{MembershipProvider, StaticMembership};
use gateway_api::{routes, AppState};

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokens::seeded(&config.static_tokens));
    if !config.static_tokens.is_empty() {
        tracing::info!(count = config.static_tokens.len(), "seeded static dev tokens");
    }

    // In-memory membership for Phase 1. Replace with a provider backed by the
    // chat API once room ACLs live behind a service.
    let membership: Arc<dyn MembershipProvider> = Arc::new(StaticMembership::new());

    let gateway = Arc::new(Gateway::new(config.gateway(), membership));
    let sweepers = gateway.spawn_sweepers();

    let state = AppState {
        config: Arc::new(config),
        tokens,
        gateway: gateway.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "gateway-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received, closing gateway sessions");
            gateway.shutdown();
        })
        .await
        .expect("server error");

    for sweeper in sweepers {
        sweeper.abort();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
