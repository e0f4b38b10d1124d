//! HTTP surface: the callable endpoint, its router and the serving loop.

mod error;
mod handler;
mod shutdown;

use std::future::IntoFuture;
use std::io;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

pub use error::{CallableStatus, Error};
pub use handler::{
    CallableRequest, CallableResponse, SummarizeRequest, healthz, summarize_data,
    summarize_data_handler,
};
pub use shutdown::shutdown_signal;

use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::orchestrator::Orchestrator;

/// Tracing target for the HTTP surface.
pub const TRACING_TARGET_SERVER: &str = "docit_functions::server";

/// Process-scoped state shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            verifier,
        }
    }
}

/// Builds the router serving `POST /summarizeData` and `GET /healthz`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/summarizeData", post(summarize_data_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `config.server_addr()` and serves `app` until a shutdown signal.
pub async fn serve(app: Router, config: &ServerConfig) -> io::Result<()> {
    let addr = config.server_addr();
    let listener = TcpListener::bind(addr).await.inspect_err(|e| {
        tracing::error!(
            target: TRACING_TARGET_SERVER,
            addr = %addr,
            error = %e,
            "failed to bind"
        );
    })?;

    tracing::info!(target: TRACING_TARGET_SERVER, addr = %addr, "listening");
    if addr.ip().is_unspecified() {
        tracing::warn!(
            target: TRACING_TARGET_SERVER,
            "bound to all interfaces, ensure firewall rules are in place"
        );
    }

    let grace = config.shutdown_timeout();
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    };
    let deadline = async move {
        match signalled_rx.await {
            Ok(()) => {
                tracing::info!(
                    target: TRACING_TARGET_SERVER,
                    timeout_secs = grace.as_secs(),
                    "draining in-flight requests"
                );
                tokio::time::sleep(grace).await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .into_future();
    tokio::select! {
        result = server => result?,
        () = deadline => tracing::warn!(
            target: TRACING_TARGET_SERVER,
            "shutdown timeout elapsed, dropping remaining connections"
        ),
    }

    tracing::info!(target: TRACING_TARGET_SERVER, "server stopped");
    Ok(())
}
