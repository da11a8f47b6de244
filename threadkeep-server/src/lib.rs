//! The threadkeep proxy.
//!
//! Forwards tweet and thread lookups to the provider so the provider key never
//! has to live in the client, and keeps one encrypted provider key per signed-in
//! user so devices can share it.
//!
//! # Routes
//!
//! | method | path                       | notes |
//! |--------|----------------------------|-------|
//! | GET    | `/health`                  | liveness |
//! | GET    | `/api/tweets?ids=a,b`      | batch lookup, at most 100 ids |
//! | GET    | `/api/tweets/{id}`         | single tweet, 404 when missing |
//! | GET    | `/api/thread/{id}`         | paginated thread context, `max_pages` clamped to the configured cap |
//! | GET    | `/api/key`                 | caller's stored key (bearer auth) |
//! | PUT    | `/api/key`                 | store `{"apiKey": ".."}` (bearer auth) |
//! | DELETE | `/api/key`                 | forget the caller's key (bearer auth) |
//!
//! Provider key precedence for the tweet routes is the `X-API-Key` request
//! header, then the caller's stored key, then `server.provider.api_key`.
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    http::{
        HeaderName, HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use threadkeep_config::ServerConfig;

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use auth::{Authenticator, StaticTokens};
pub use error::AppError;
pub use state::{AppState, SharedState};

use routes::{
    delete_key_handler, get_key_handler, health_handler, put_key_handler, thread_handler,
    tweet_handler, tweets_handler,
};

pub fn router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tweets", get(tweets_handler))
        .route("/api/tweets/{id}", get(tweet_handler))
        .route("/api/thread/{id}", get(thread_handler))
        .route(
            "/api/key",
            get(get_key_handler)
                .put(put_key_handler)
                .delete(delete_key_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ])
        .max_age(Duration::from_secs(60 * 60));

    if origins.iter().any(|o| o.trim() == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "server.cors.invalid_origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Open state from `config`, bind, and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    info!("Initializing state...");
    let state = AppState::new(config).await?;

    let address = state.config.bind.clone();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(address = %address, "server.listening");

    serve_with_shutdown(listener, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: SharedState,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = state.store.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    store.close().await;
    info!("server.stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                tracing::error!(error = %err, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};
        match unix_signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
