//! Shutdown signal handling.

use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix;

use super::TRACING_TARGET_SERVER;

/// Resolves once SIGTERM (Cloud Run's stop signal) or Ctrl+C arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => tracing::info!(
                target: TRACING_TARGET_SERVER,
                "received Ctrl+C, shutting down"
            ),
            Err(e) => {
                tracing::error!(
                    target: TRACING_TARGET_SERVER,
                    error = %e,
                    "failed to install Ctrl+C handler"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match unix::signal(unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                tracing::info!(
                    target: TRACING_TARGET_SERVER,
                    "received SIGTERM, shutting down"
                );
            }
            Err(e) => {
                tracing::error!(
                    target: TRACING_TARGET_SERVER,
                    error = %e,
                    "failed to install SIGTERM handler"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
