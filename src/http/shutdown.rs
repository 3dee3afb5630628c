//! Graceful shutdown and signal handling.
//!
//! Handles:
//! - SIGTERM/SIGINT: Graceful shutdown of every listener with connection draining
//! - SIGHUP: Certificate, key and OCSP response reload

use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;

use super::server::TlsReloader;

/// Setup graceful shutdown on SIGTERM and SIGINT.
///
/// When either signal is received, every listener stops accepting new
/// connections and existing ones get `grace` to complete.
pub fn setup_shutdown_handler(handles: Vec<Handle>, grace: Duration) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
        }

        for handle in &handles {
            handle.graceful_shutdown(Some(grace));
        }
        tracing::info!(
            listeners = handles.len(),
            grace_secs = grace.as_secs(),
            "Graceful shutdown initiated, waiting for connections to close"
        );
    });
}

/// Setup SIGHUP handler for TLS reload.
///
/// A failed reload keeps serving the previous certificate and response.
#[cfg(unix)]
pub fn setup_reload_handler(reloader: Arc<TlsReloader>) {
    tokio::spawn(async move {
        let mut sighup =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGHUP handler");
                    return;
                }
            };

        loop {
            sighup.recv().await;
            tracing::info!("Received SIGHUP, reloading TLS configuration");

            if let Err(e) = reloader.reload().await {
                tracing::error!(error = %e, "Failed to reload TLS configuration, keeping previous one");
            }
        }
    });
}

/// No-op reload handler for non-Unix platforms.
#[cfg(not(unix))]
pub fn setup_reload_handler(_reloader: Arc<TlsReloader>) {
    tracing::warn!("TLS reload via SIGHUP not supported on this platform");
}
