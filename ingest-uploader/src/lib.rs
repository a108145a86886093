//! ingest-uploader library interface
//!
//! Client-side orchestration of invoice uploads: a local file queue,
//! batch submission to the ingestion backend, live per-file progress from
//! the backend's event stream and session control (cancel, pause, resume).

pub mod backend;
pub mod config;
pub mod error;
pub mod event_stream;
pub mod file_state;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod stats;
pub mod store;

pub use crate::error::{IngestError, IngestResult};
pub use crate::orchestrator::{Orchestrator, OrchestratorHandle};
