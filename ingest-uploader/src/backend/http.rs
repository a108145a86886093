//! HTTP implementation of [`UploadBackend`]
//!
//! Routes, relative to the configured base URL:
//! - `POST /upload` (multipart, one `files` part per file)
//! - `POST /cancel-upload/{sessionId}`, `/pause-upload/..`, `/resume-upload/..`
//! - `DELETE /delete/{fileName}`
//! - `DELETE /bulk-delete` with `{"fileNames": [...]}`
//! - `GET /events` (text/event-stream)

use async_trait::async_trait;
use futures::StreamExt;
use ingest_common::events::ServerEvent;
use ingest_common::sse::decode_stream;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ServerEventStream, UploadBackend};
use crate::error::{IngestError, IngestResult};
use crate::models::{ControlAction, UploadSummary};
use crate::store::UploadPart;

const USER_AGENT: &str = concat!("ingest-uploader/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkDeleteRequest<'a> {
    file_names: &'a [String],
}

/// reqwest-backed client for the ingestion API
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpBackend {
    /// `request_timeout` applies to every call except the event stream,
    /// which stays open indefinitely
    pub fn new(base_url: &str, request_timeout: Duration) -> IngestResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| IngestError::Network(format!("Invalid backend URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(IngestError::Network(format!(
                "Backend URL '{}' cannot be used as a base",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl UploadBackend for HttpBackend {
    async fn upload(&self, files: Vec<UploadPart>) -> IngestResult<UploadSummary> {
        let mut form = Form::new();
        for file in &files {
            let bytes = tokio::fs::read(&file.path).await?;
            let part = Part::bytes(bytes)
                .file_name(file.name.clone())
                .mime_str(file.kind.mime_type())
                .map_err(|e| IngestError::Network(e.to_string()))?;
            form = form.part("files", part);
        }

        let url = self.endpoint(&["upload"]);
        debug!(url = %url, files = files.len(), "Posting upload batch");

        let response = self
            .http_client
            .post(url)
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;
        let response = check_status(response).await?;

        let body = response
            .text()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(UploadSummary::default());
        }
        match serde_json::from_str::<UploadSummary>(&body) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                // The files were accepted; the summary is informational
                warn!("Unrecognised upload response body: {}", e);
                Ok(UploadSummary::default())
            }
        }
    }

    async fn control(&self, action: ControlAction, session_id: &str) -> IngestResult<()> {
        let url = self.endpoint(&[action.route_segment(), session_id]);
        debug!(url = %url, "Sending {} request", action);

        let response = self
            .http_client
            .post(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_file(&self, file_name: &str) -> IngestResult<()> {
        let url = self.endpoint(&["delete", file_name]);
        debug!(url = %url, "Deleting file");

        let response = self
            .http_client
            .delete(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    async fn bulk_delete(&self, file_names: &[String]) -> IngestResult<()> {
        let url = self.endpoint(&["bulk-delete"]);
        debug!(url = %url, files = file_names.len(), "Bulk deleting files");

        let response = self
            .http_client
            .delete(url)
            .timeout(self.request_timeout)
            .json(&BulkDeleteRequest { file_names })
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    async fn open_event_stream(&self) -> IngestResult<ServerEventStream> {
        let url = self.endpoint(&["events"]);
        debug!(url = %url, "Opening event stream");

        let response = self
            .http_client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;
        let response = check_status(response).await?;

        let events = decode_stream(response.bytes_stream()).filter_map(|frame| async move {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => return Some(Err(IngestError::Network(e.to_string()))),
            };
            match ServerEvent::parse(frame.event_name(), &frame.data) {
                Ok(Some(event)) => Some(Ok(event)),
                Ok(None) => {
                    debug!(event = frame.event_name(), "Skipping unhandled event");
                    None
                }
                Err(e) => Some(Err(IngestError::Parse(format!(
                    "{} payload: {}",
                    frame.event_name(),
                    e
                )))),
            }
        });

        Ok(events.boxed())
    }
}

/// Turn a non-2xx response into `IngestError::Api`
async fn check_status(response: Response) -> IngestResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(IngestError::Api {
        status: status.as_u16(),
        message: error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
    })
}

/// Extract `error`/`message` from a JSON error body, or use the raw text
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["error", "message"] {
            if let Some(serde_json::Value::String(text)) = map.get(key) {
                return Some(text.clone());
            }
        }
    }
    Some(trimmed.to_string())
}
