//! Ingestion Pipeline
//!
//! Pulls messages off a [`MessageSource`] and persists them one at a time.
//! Transport errors drop back to `Disconnected` and reconnect after a fixed
//! delay, forever, until the shutdown signal fires.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::persist::MessageIngestor;
use super::source::{InboundMessage, MessageSource, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Disconnected,
    Connected,
    Stopped,
}

pub struct IngestionPipeline<S: MessageSource> {
    source: S,
    ingestor: MessageIngestor,
    reconnect_delay: Duration,
    state_tx: watch::Sender<PipelineState>,
}

/// Resolves once shutdown is signalled or the signal sender is gone
async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|&stop| stop).await;
}

/// Sleep for `delay`; false when shutdown arrived first
async fn backoff(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown_rx) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

impl<S: MessageSource + 'static> IngestionPipeline<S> {
    pub fn new(source: S, ingestor: MessageIngestor, reconnect_delay: Duration) -> Self {
        let (state_tx, _) = watch::channel(PipelineState::Disconnected);
        Self {
            source,
            ingestor,
            reconnect_delay,
            state_tx,
        }
    }

    /// Observe connection state changes
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    pub fn start(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        })
    }

    /// Drive the source until shutdown; returns the released source
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> S {
        'session: loop {
            let connected = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => None,
                result = self.source.connect() => Some(result),
            };
            match connected {
                None => break 'session,
                Some(Ok(())) => {
                    tracing::info!("Ingestion connected");
                    self.set_state(PipelineState::Connected);
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        retry_in_ms = self.reconnect_delay.as_millis() as u64,
                        "Ingestion connect failed"
                    );
                    if !backoff(self.reconnect_delay, &mut shutdown_rx).await {
                        break 'session;
                    }
                    continue 'session;
                }
            }

            loop {
                let next: Option<Result<InboundMessage, TransportError>> = tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut shutdown_rx) => None,
                    result = self.source.next_message() => Some(result),
                };
                match next {
                    None => break 'session,
                    // Not raced against shutdown: the in-flight message completes
                    Some(Ok(message)) => self.ingestor.handle(&message).await,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Ingestion connection lost, reconnecting");
                        self.source.disconnect().await;
                        self.set_state(PipelineState::Disconnected);
                        break;
                    }
                }
            }

            if !backoff(self.reconnect_delay, &mut shutdown_rx).await {
                break 'session;
            }
        }

        self.source.disconnect().await;
        self.set_state(PipelineState::Stopped);
        tracing::debug!("IngestionPipeline shutdown complete");
        self.source
    }

    fn set_state(&self, state: PipelineState) {
        self.state_tx.send_replace(state);
    }
}
