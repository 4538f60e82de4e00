//! docpilot - client-side orchestration for a document question-answering
//! backend
//!
//! This crate provides:
//! - A single-flight ingestion queue that serializes file uploads (the
//!   backend shares one GPU-bound vision model)
//! - A job status monitor that polls multi-stage pipeline runs to completion
//!   and drives cache invalidation
//! - A streaming query client that decodes chunked NDJSON answers
//!   incrementally

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod monitor;
pub mod queue;
pub mod stream;

pub use client::BackendClient;
pub use config::Config;
pub use error::{Error, Result};
pub use events::{CacheInvalidation, CacheScope, EventBus};
pub use models::{JobStatus, QueryResult};
pub use monitor::{JobStatusMonitor, MonitorHandle, MonitorOptions, MonitorUpdate};
pub use queue::{IngestionQueue, QueueEvent};
pub use stream::StreamingQueryClient;
