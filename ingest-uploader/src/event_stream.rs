//! Event stream client
//!
//! Keeps one connection to the backend event stream open for the
//! lifetime of the orchestrator, reconnecting with exponential backoff.
//! Decoded events are forwarded to the message loop as [`StreamMessage`]s;
//! the stream task never touches store state itself.

use futures::StreamExt;
use ingest_common::events::ServerEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::UploadBackend;
use crate::error::IngestError;

/// Message from the stream task to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Connected,
    Disconnected { reason: String },
    /// A frame arrived but its payload could not be decoded
    Undecodable { detail: String },
    Event(ServerEvent),
}

/// Reconnection backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay after `current`: doubled, capped at `max_delay`
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

pub struct EventStreamClient<B: UploadBackend> {
    backend: Arc<B>,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<StreamMessage>,
}

impl<B: UploadBackend> EventStreamClient<B> {
    pub fn new(backend: Arc<B>, policy: ReconnectPolicy, tx: mpsc::Sender<StreamMessage>) -> Self {
        Self { backend, policy, tx }
    }

    /// Run until `shutdown` fires or the receiver is dropped
    pub async fn run(self, shutdown: CancellationToken) {
        let mut delay = self.policy.initial_delay;

        loop {
            let opened = tokio::select! {
                _ = shutdown.cancelled() => break,
                opened = self.backend.open_event_stream() => opened,
            };

            let reason = match opened {
                Ok(mut stream) => {
                    info!("Event stream connected");
                    delay = self.policy.initial_delay;
                    if self.tx.send(StreamMessage::Connected).await.is_err() {
                        break;
                    }

                    loop {
                        let item = tokio::select! {
                            _ = shutdown.cancelled() => return,
                            item = stream.next() => item,
                        };
                        let message = match item {
                            Some(Ok(event)) => StreamMessage::Event(event),
                            Some(Err(IngestError::Parse(detail))) => {
                                warn!("Skipping undecodable event: {}", detail);
                                StreamMessage::Undecodable { detail }
                            }
                            Some(Err(e)) => break e.to_string(),
                            None => break "stream closed by server".to_string(),
                        };
                        if self.tx.send(message).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => e.to_string(),
            };

            warn!(reason = %reason, retry_in = ?delay, "Event stream unavailable");
            if self
                .tx
                .send(StreamMessage::Disconnected { reason })
                .await
                .is_err()
            {
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.policy.next_delay(delay);
        }

        debug!("Event stream task stopped");
    }
}
