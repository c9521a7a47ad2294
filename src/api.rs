//! Local HTTP API served on the arbitrated port.
//!
//! `GET /` serves the entry asset and doubles as the ownership probe other
//! controller instances run before binding. `GET /health` answers `ok`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{AppError, Result};

#[derive(Clone)]
struct ApiState {
    entry_asset: Arc<PathBuf>,
}

/// Build the API router.
#[must_use]
pub fn router(entry_asset: PathBuf) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .with_state(ApiState {
            entry_asset: Arc::new(entry_asset),
        })
}

/// Serve the API on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve(listener: TcpListener, entry_asset: PathBuf, ct: CancellationToken) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("api listener has no address: {err}")))?;
    info!(%addr, "starting local API");

    axum::serve(listener, router(entry_asset))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Io(format!("api server error: {err}")))?;

    info!("local API shut down");
    Ok(())
}

async fn index(State(state): State<ApiState>) -> Response {
    match tokio::fs::read_to_string(state.entry_asset.as_ref()).await {
        Ok(body) => Html(body).into_response(),
        Err(err) => {
            warn!(%err, path = %state.entry_asset.display(), "entry asset unreadable");
            (StatusCode::NOT_FOUND, "entry asset missing").into_response()
        }
    }
}

async fn health() -> &'static str {
    "ok"
}
