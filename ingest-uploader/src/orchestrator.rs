//! Upload orchestrator
//!
//! One task owns the [`UploadStore`]. It multiplexes three inputs:
//! - commands from [`OrchestratorHandle`]s (user actions)
//! - completions of backend requests it spawned
//! - messages from the event stream task
//!
//! Each input is applied to the store in arrival order. Any [`Effect`]
//! the store returns is run on its own task and reports back as a
//! completion, so a slow request never blocks event handling. After
//! every input the store's pending change notifications are published
//! on the [`EventBus`].

use ingest_common::events::{EventBus, IngestEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::UploadBackend;
use crate::config::UploaderConfig;
use crate::error::{IngestError, IngestResult};
use crate::event_stream::{EventStreamClient, StreamMessage};
use crate::models::{ControlAction, FileHandle, LocalId, UploadSummary};
use crate::queue::EnqueueReport;
use crate::store::{Effect, StoreSnapshot, UploadStore};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// User action sent to the orchestrator task
enum Command {
    Enqueue {
        files: Vec<FileHandle>,
        reply: oneshot::Sender<EnqueueReport>,
    },
    Remove {
        local_id: LocalId,
        reply: oneshot::Sender<IngestResult<()>>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Submit {
        reply: oneshot::Sender<IngestResult<()>>,
    },
    Control {
        action: ControlAction,
        reply: oneshot::Sender<IngestResult<()>>,
    },
    ForceStop {
        reply: oneshot::Sender<IngestResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<StoreSnapshot>,
    },
}

/// Result of a spawned backend request
enum Completion {
    Submit {
        attempt: u64,
        result: Result<UploadSummary, String>,
    },
    Control {
        attempt: u64,
        action: ControlAction,
        result: Result<(), String>,
    },
    Cleanup {
        description: String,
        result: Result<(), String>,
    },
}

pub struct Orchestrator<B: UploadBackend> {
    store: UploadStore,
    backend: Arc<B>,
    event_bus: EventBus,
    command_rx: mpsc::Receiver<Command>,
    stream_rx: mpsc::Receiver<StreamMessage>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    shutdown: CancellationToken,
    stream_shutdown: CancellationToken,
}

impl<B: UploadBackend> Orchestrator<B> {
    /// Start the orchestrator and its event stream task
    ///
    /// The task runs until `shutdown` fires or every handle is dropped.
    pub fn spawn(
        config: &UploaderConfig,
        backend: Arc<B>,
        event_bus: EventBus,
        shutdown: CancellationToken,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let stream_shutdown = shutdown.child_token();
        let stream_client = EventStreamClient::new(Arc::clone(&backend), config.reconnect, stream_tx);
        tokio::spawn(stream_client.run(stream_shutdown.clone()));

        let orchestrator = Self {
            store: UploadStore::new(config.store_options()),
            backend,
            event_bus: event_bus.clone(),
            command_rx,
            stream_rx,
            completion_tx,
            completion_rx,
            shutdown,
            stream_shutdown,
        };
        let task = tokio::spawn(orchestrator.run());

        (
            OrchestratorHandle {
                tx: command_tx,
                event_bus,
            },
            task,
        )
    }

    async fn run(mut self) {
        info!("Upload orchestrator started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All orchestrator handles dropped");
                        break;
                    }
                },
                Some(completion) = self.completion_rx.recv() => self.handle_completion(completion),
                Some(message) = self.stream_rx.recv() => self.handle_stream(message),
            }
            self.publish();
        }

        self.stream_shutdown.cancel();
        info!("Upload orchestrator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue { files, reply } => {
                let report = self.store.enqueue(files);
                let _ = reply.send(report);
            }
            Command::Remove { local_id, reply } => {
                let result = self
                    .store
                    .remove(local_id)
                    .map(|effect| effect.into_iter().for_each(|e| self.run_effect(e)));
                let _ = reply.send(result);
            }
            Command::Clear { reply } => {
                if let Some(effect) = self.store.clear() {
                    self.run_effect(effect);
                }
                let _ = reply.send(());
            }
            Command::Submit { reply } => {
                let result = self.store.submit().map(|effect| self.run_effect(effect));
                let _ = reply.send(result);
            }
            Command::Control { action, reply } => {
                let result = self
                    .store
                    .request_control(action)
                    .map(|effect| self.run_effect(effect));
                let _ = reply.send(result);
            }
            Command::ForceStop { reply } => {
                let _ = reply.send(self.store.force_stop());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.store.snapshot());
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Submit { attempt, result } => self.store.submit_finished(attempt, result),
            Completion::Control {
                attempt,
                action,
                result,
            } => self.store.control_finished(attempt, action, result),
            Completion::Cleanup {
                description,
                result,
            } => self.store.cleanup_finished(&description, result),
        }
    }

    fn handle_stream(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::Connected => self.store.stream_status(true, "connected"),
            StreamMessage::Disconnected { reason } => self.store.stream_status(false, &reason),
            StreamMessage::Undecodable { detail } => self.store.undecodable_event(&detail),
            StreamMessage::Event(event) => self.store.apply_server_event(event),
        }
    }

    /// Run a backend request off the loop; the result comes back as a completion
    fn run_effect(&self, effect: Effect) {
        let backend = Arc::clone(&self.backend);
        let tx = self.completion_tx.clone();

        match effect {
            Effect::Upload { attempt, files } => {
                tokio::spawn(async move {
                    let result = backend.upload(files).await.map_err(|e| e.to_string());
                    let _ = tx.send(Completion::Submit { attempt, result });
                });
            }
            Effect::Control {
                attempt,
                action,
                session_id,
            } => {
                tokio::spawn(async move {
                    let result = backend
                        .control(action, &session_id)
                        .await
                        .map_err(|e| e.to_string());
                    let _ = tx.send(Completion::Control {
                        attempt,
                        action,
                        result,
                    });
                });
            }
            Effect::DeleteFile { file_name } => {
                tokio::spawn(async move {
                    let result = backend.delete_file(&file_name).await.map_err(|e| e.to_string());
                    let _ = tx.send(Completion::Cleanup {
                        description: file_name,
                        result,
                    });
                });
            }
            Effect::BulkDelete { file_names } => {
                tokio::spawn(async move {
                    let result = backend.bulk_delete(&file_names).await.map_err(|e| e.to_string());
                    let _ = tx.send(Completion::Cleanup {
                        description: format!("{} completed file(s)", file_names.len()),
                        result,
                    });
                });
            }
        }
    }

    fn publish(&mut self) {
        for event in self.store.take_events() {
            self.event_bus.emit_lossy(event);
        }
    }
}

/// Cloneable front end to a running orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
    event_bus: EventBus,
}

impl OrchestratorHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> IngestResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| IngestError::OrchestratorClosed)?;
        rx.await.map_err(|_| IngestError::OrchestratorClosed)
    }

    /// Add files; rejected files come back in the report
    pub async fn enqueue(&self, files: Vec<FileHandle>) -> IngestResult<EnqueueReport> {
        self.request(|reply| Command::Enqueue { files, reply }).await
    }

    pub async fn remove(&self, local_id: LocalId) -> IngestResult<()> {
        self.request(|reply| Command::Remove { local_id, reply }).await?
    }

    pub async fn clear(&self) -> IngestResult<()> {
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Start uploading every eligible file
    pub async fn submit(&self) -> IngestResult<()> {
        self.request(|reply| Command::Submit { reply }).await?
    }

    pub async fn cancel(&self) -> IngestResult<()> {
        self.control(ControlAction::Cancel).await
    }

    pub async fn pause(&self) -> IngestResult<()> {
        self.control(ControlAction::Pause).await
    }

    pub async fn resume(&self) -> IngestResult<()> {
        self.control(ControlAction::Resume).await
    }

    pub async fn control(&self, action: ControlAction) -> IngestResult<()> {
        self.request(|reply| Command::Control { action, reply }).await?
    }

    /// Stop tracking the current session without telling the server
    pub async fn force_stop(&self) -> IngestResult<()> {
        self.request(|reply| Command::ForceStop { reply }).await?
    }

    pub async fn snapshot(&self) -> IngestResult<StoreSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.event_bus.subscribe()
    }
}
