//! # Ingest Common Library
//!
//! Shared code for the invoice ingestion client crates including:
//! - Wire event types pushed by the ingestion backend
//! - Shared file/session state enums and aggregate statistics
//! - EventBus for local change notifications
//! - Configuration loading
//! - Server-Sent Events frame decoding
//! - Byte-size formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_size;
pub mod sse;

pub use error::{Error, Result};
