//! Unix signal handling.
//!
//! - SIGINT / SIGTERM: graceful shutdown (flush pending events, close the sink)
//! - SIGUSR1: reopen the output (log rotation)
//!
//! Sinks never observe signals themselves; this module calls
//! [`Sink::reopen`] and the orchestrator calls the shutdown path.

use std::sync::Arc;

use anyhow::Result;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use auditpost_core::pipeline::Sink;

/// Installed SIGTERM / SIGINT handlers.
#[derive(Debug)]
pub struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignals {
    /// Install the shutdown signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if signal handlers cannot be installed.
    pub fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Wait for the next shutdown signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Spawn a task that reopens `sink` on every SIGUSR1 until `cancel` fires.
///
/// The handler is installed before this function returns, so a SIGUSR1
/// delivered afterwards never takes the default (terminating) action.
pub fn spawn_reopen_handler(
    sink: Arc<dyn Sink>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let mut sigusr1 = signal(SignalKind::user_defined1())
        .map_err(|e| anyhow::anyhow!("failed to install SIGUSR1 handler: {}", e))?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = sigusr1.recv() => {
                    if received.is_none() {
                        break;
                    }
                    tracing::info!("SIGUSR1 received, reopening output");
                    match sink.reopen() {
                        Ok(()) => tracing::info!("output reopened"),
                        Err(e) => tracing::error!(error = %e, "failed to reopen output"),
                    }
                }
            }
        }
        tracing::debug!("reopen handler stopped");
    }))
}
