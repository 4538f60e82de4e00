//! Shared data model for the ingestion queue, job monitor, and query stream.
//!
//! Wire field names follow the backend's JSON (camelCase on the query/result
//! side, flat fields on the status side).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One staged file awaiting ingestion.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Unique id, generated at enqueue time
    pub id: Uuid,
    /// File bytes and name, owned by the item until consumed
    pub file: FileSubmission,
    /// Destination document collection
    pub collection_id: String,
    /// Vision model used for chart/figure analysis during processing
    pub vision_model: String,
    /// Current lifecycle status
    pub status: ItemStatus,
    /// When the item was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(file: FileSubmission, collection_id: &str, vision_model: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            collection_id: collection_id.to_string(),
            vision_model: vision_model.to_string(),
            status: ItemStatus::Pending,
            enqueued_at: Utc::now(),
        }
    }
}

/// A file handed to the queue: name plus raw bytes.
#[derive(Debug, Clone)]
pub struct FileSubmission {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileSubmission {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Lifecycle status of a queue item.
///
/// An item never re-enters `Pending` after leaving it, and at most one item
/// across the whole queue is `Uploading` at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Pending,
    Uploading,
    ProcessingAck,
    Error,
    Completed,
}

/// Server-reported state of one ingestion pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub status: PipelineStatus,
    #[serde(default)]
    pub stage: PipelineStage,
    /// Free-text human-readable description; displayed, never parsed
    #[serde(default)]
    pub step: String,
    /// Percentage 0-100; the backend intends this to be monotonic but the
    /// client tolerates regressions
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JobDetails>,
}

impl JobStatus {
    /// Synthetic value published when a status poll fails at the transport
    /// level; display-only, does not terminate the monitor.
    pub fn connection_failed() -> Self {
        Self {
            status: PipelineStatus::Error,
            stage: PipelineStage::Error,
            step: "Connection failed".to_string(),
            progress: 0,
            details: None,
        }
    }

    /// True when the server reports the run finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Diagnostic bag attached to a job status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub current_file: Option<String>,
}

/// Top-level pipeline run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    #[default]
    Idle,
    Queued,
    Processing,
    Completed,
    Error,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Sub-state of `Processing`, strictly ordered.
///
/// Stages advance parsing → vision → indexing → graph → done; a stage may be
/// skipped (graph is absent for non-graph-eligible jobs) but a displayed
/// stage never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    #[default]
    Parsing,
    Vision,
    Indexing,
    Graph,
    Done,
    Error,
}

impl PipelineStage {
    /// Forward-order rank used by the stage-regression guard. `Error` ranks
    /// last so an error status is never discarded as stale.
    pub fn index(&self) -> usize {
        match self {
            Self::Parsing => 0,
            Self::Vision => 1,
            Self::Indexing => 2,
            Self::Graph => 3,
            Self::Done => 4,
            Self::Error => 5,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Parsing => "parsing",
            Self::Vision => "vision",
            Self::Indexing => "indexing",
            Self::Graph => "graph",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{}", label)
    }
}

/// One line of the streamed query response.
///
/// Zero or more `Step` events precede exactly one terminal `Result` or
/// `Error`. Lines that match none of these shapes are parse warnings, never
/// panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Step { step: String },
    Result { result: QueryResult },
    Error { error: String },
}

/// Final structured answer from a streaming query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub answer_text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// A source reference attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub kind: CitationKind,
    pub source_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
    #[serde(default)]
    pub excerpt: String,
}

/// Whether a citation came from text retrieval or the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationKind {
    Text,
    Graph,
}

/// Response to a start-processing request.
///
/// The backend may key jobs by collection id and omit a dedicated job id;
/// `status == "already_queued"` marks a deduplicated concurrent submission.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessAck {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ProcessAck {
    /// The job id to poll, falling back to the collection id when the
    /// backend keys status by collection.
    pub fn job_id_or<'a>(&'a self, collection_id: &'a str) -> &'a str {
        self.job_id.as_deref().unwrap_or(collection_id)
    }

    pub fn is_deduplicated(&self) -> bool {
        self.status.as_deref() == Some("already_queued")
    }
}
