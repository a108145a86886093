//! Ingestion backend interface
//!
//! The orchestrator only talks to the backend through [`UploadBackend`];
//! [`HttpBackend`] is the production implementation.

pub mod http;

use async_trait::async_trait;
use futures::stream::BoxStream;
use ingest_common::events::ServerEvent;

use crate::error::IngestResult;
use crate::models::{ControlAction, UploadSummary};
use crate::store::UploadPart;

pub use http::HttpBackend;

/// Decoded backend events; an `Err` item reports a frame that could not
/// be decoded, the stream ending means the connection was lost
pub type ServerEventStream = BoxStream<'static, IngestResult<ServerEvent>>;

/// Backend operations used by the orchestrator
#[async_trait]
pub trait UploadBackend: Send + Sync + 'static {
    /// Send every part in one multipart request
    async fn upload(&self, files: Vec<UploadPart>) -> IngestResult<UploadSummary>;

    /// Cancel, pause or resume a session
    async fn control(&self, action: ControlAction, session_id: &str) -> IngestResult<()>;

    /// Delete one processed file server-side
    async fn delete_file(&self, file_name: &str) -> IngestResult<()>;

    /// Delete several processed files server-side
    async fn bulk_delete(&self, file_names: &[String]) -> IngestResult<()>;

    /// Open the server-sent event stream
    async fn open_event_stream(&self) -> IngestResult<ServerEventStream>;
}
