//! Daemon orchestrator.
//!
//! Builds the output sink and the reassembler from the loaded configuration,
//! wires the record source, the flush ticker and the dispatch thread together,
//! and runs the shutdown sequence.
//!
//! # Shutdown sequence
//!
//! 1. Trigger: shutdown signal, end of input, or a fatal dispatch result
//! 2. Cancel the record source, the ticker and the reopen handler
//! 3. Send `Shutdown` so the dispatch thread flushes every pending event
//! 4. Drain the sink (close the HTTP queue and join its workers)

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use auditpost_core::config::AuditpostConfig;
use auditpost_marshaller::{AuditMarshaller, MarshallerConfig};
use auditpost_output::{BuiltSink, build_sink};

use crate::dispatch::{COMMAND_QUEUE_CAPACITY, Command, DispatchOutcome, Dispatcher, spawn_ticker};
use crate::signals::{ShutdownSignals, spawn_reopen_handler};
use crate::source::forward_records;

/// Daemon orchestrator.
///
/// Owns the configuration and the built sink for the lifetime of the process.
#[derive(Debug)]
pub struct Orchestrator {
    config: AuditpostConfig,
    sink: BuiltSink,
}

impl Orchestrator {
    /// Build the output sink from a validated configuration.
    ///
    /// Must be called from inside a tokio runtime (the HTTP sink spawns its workers here).
    pub fn build(config: AuditpostConfig) -> Result<Self> {
        let sink = build_sink(&config.output)
            .map_err(|e| anyhow::anyhow!("failed to build output sink: {}", e))?;
        Ok(Self { config, sink })
    }

    /// The built output sink.
    pub fn sink(&self) -> &BuiltSink {
        &self.sink
    }

    /// Run against stdin until a shutdown signal, end of input or a fatal output error.
    pub async fn run(self) -> Result<DispatchOutcome> {
        let mut signals = ShutdownSignals::install()?;
        let reopen_cancel = CancellationToken::new();
        let reopen = spawn_reopen_handler(self.sink.as_sink(), reopen_cancel.clone())?;

        let input = BufReader::new(tokio::io::stdin());
        let outcome = self
            .run_with(input, async move { signals.recv().await })
            .await;

        reopen_cancel.cancel();
        if let Err(e) = reopen.await {
            tracing::error!(error = %e, "reopen handler panicked");
        }
        outcome
    }

    /// Run against an arbitrary line source.
    ///
    /// `shutdown` resolves with the name of the trigger (e.g. a signal name).
    pub async fn run_with<R, F>(self, input: R, shutdown: F) -> Result<DispatchOutcome>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        F: Future<Output = &'static str>,
    {
        let Self { config, sink } = self;

        let marshaller = AuditMarshaller::new(MarshallerConfig::from_core(&config), sink.as_sink())
            .map_err(|e| anyhow::anyhow!("failed to create audit marshaller: {}", e))?;

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let mut dispatcher = Dispatcher::spawn(marshaller, cmd_rx)
            .map_err(|e| anyhow::anyhow!("failed to spawn dispatch thread: {}", e))?;

        let cancel = CancellationToken::new();
        let ticker = spawn_ticker(
            cmd_tx.clone(),
            Duration::from_millis(config.events.flush_interval_ms),
            cancel.clone(),
        );
        let mut source = tokio::spawn(forward_records(input, cmd_tx.clone(), cancel.clone()));

        tracing::info!(output = %sink.kind(), "auditpost-daemon running");

        let early_outcome = tokio::select! {
            signal = shutdown => {
                tracing::info!(signal, "shutdown signal received");
                None
            }
            result = &mut source => {
                match result {
                    Ok(stats) => tracing::info!(
                        received = stats.received,
                        decode_errors = stats.decode_errors,
                        "record source finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "record source task failed"),
                }
                None
            }
            outcome = dispatcher.wait() => Some(outcome),
        };

        cancel.cancel();
        source.abort();
        if let Err(e) = ticker.await {
            tracing::error!(error = %e, "flush ticker panicked");
        }

        let outcome = match early_outcome {
            Some(outcome) => outcome,
            None => {
                if cmd_tx.send(Command::Shutdown).await.is_err() {
                    tracing::debug!("dispatch thread already stopped");
                }
                drop(cmd_tx);
                dispatcher.wait().await
            }
        };

        tracing::info!(?outcome, "closing output");
        sink.close_and_wait().await;

        Ok(outcome)
    }
}
