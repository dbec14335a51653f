use std::{future::Future, sync::Arc};

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{info, warn};
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;

use crate::config::{Config, ServerConfig};

/// Routes served to the dashboard.
pub fn router(cfg: Arc<Config>) -> Router {
    Router::new().route("/agent", get(expose)).with_state(cfg)
}

fn authorized(headers: &HeaderMap, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    headers
        .get(AUTHORIZATION)
        .is_some_and(|hv| bool::from(hv.as_bytes().ct_eq(secret.as_bytes())))
}

/// GET /agent -> the agent configuration when `Authorization` carries the secret key.
async fn expose(State(cfg): State<Arc<Config>>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &cfg.secret_key) {
        warn!("rejected config exposure request: missing auth");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "missing auth"})),
        )
            .into_response();
    }

    Json(cfg.as_ref()).into_response()
}

/// Serves until SIGINT or SIGTERM, letting in-flight requests finish.
pub async fn serve(server: ServerConfig, cfg: Arc<Config>) -> std::io::Result<()> {
    let listener = TcpListener::bind(server.addr).await?;
    info!("HTTP server listening on {}", server.addr);
    serve_until(listener, cfg, shutdown_signal()).await
}

pub async fn serve_until<F>(listener: TcpListener, cfg: Arc<Config>, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(cfg))
        .with_graceful_shutdown(signal)
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
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
    info!("shutting down");
}
