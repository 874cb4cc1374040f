//! Voice Gateway Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_gateway_auth::HttpTokenVerifier;
use voice_gateway_config::{load_settings, Settings};
use voice_gateway_resolver::HttpQueryResolver;
use voice_gateway_server::{create_router, AppState};
use voice_gateway_speech::{HttpSttClient, HttpTtsClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first; tracing needs the observability settings.
    let settings = load_settings()?;
    init_tracing(&settings);

    tracing::info!("Starting voice gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        port = settings.port,
        require_auth = settings.require_auth,
        stt = %settings.stt.endpoint,
        tts = %settings.tts.endpoint,
        resolver = %settings.resolver.endpoint,
        "Loaded configuration"
    );

    let verifier = Arc::new(HttpTokenVerifier::new(settings.auth.clone()));
    let stt = Arc::new(HttpSttClient::new(settings.stt.clone()));
    let tts = Arc::new(HttpTtsClient::new(settings.tts.clone()));
    let resolver = Arc::new(HttpQueryResolver::new(settings.resolver.clone()));

    let store = Arc::new(voice_gateway_persistence::init(settings.store.clone()).await?);
    tracing::info!("Connected to document store");

    let port = settings.port;
    let state = AppState::new(settings, verifier, stt, tts, resolver, store);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing from the environment, falling back to the configured
/// level
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            format!("voice_gateway={},tower_http=info", settings.observability.log_level).into()
        });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
