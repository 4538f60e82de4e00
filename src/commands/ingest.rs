//! Ingest command implementation
//!
//! Reads local files, pushes them through the single-flight ingestion queue,
//! and follows each started pipeline job to its terminal status.

use crate::client::BackendClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::models::{FileSubmission, JobStatus, PipelineStatus};
use crate::monitor::{JobStatusMonitor, MonitorOptions};
use crate::queue::{IngestionQueue, QueueEvent};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of one submitted file.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub filename: String,
    /// Job id when the transfer succeeded
    pub job_id: Option<String>,
    /// True when the backend deduplicated a concurrent submission
    pub deduplicated: bool,
    /// Terminal pipeline status, when the job was followed to completion
    pub final_status: Option<JobStatus>,
    /// Transfer or pipeline error, when something went wrong
    pub error: Option<String>,
}

impl IngestOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
            && self
                .final_status
                .as_ref()
                .is_some_and(|s| s.status == PipelineStatus::Completed)
    }
}

/// Statistics from an ingestion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestStats {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Read the files to submit. Fails up front on an unreadable path rather
/// than partway through the queue.
async fn read_submissions(paths: &[PathBuf]) -> Result<Vec<FileSubmission>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Config(format!("Invalid file path: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        debug!("Read {} ({} bytes)", name, bytes.len());
        files.push(FileSubmission::new(name, bytes));
    }
    Ok(files)
}

fn job_progress_bar(filename: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{msg:30} [{bar:30}] {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(filename.to_string());
    pb
}

/// Follow one started job to its terminal status, driving a progress bar.
async fn follow_job(
    client: &BackendClient,
    events: &EventBus,
    job_id: &str,
    collection_id: &str,
    filename: &str,
    options: MonitorOptions,
) -> Option<JobStatus> {
    let handle = JobStatusMonitor::watch(client.clone(), events.clone(), job_id, collection_id, options);
    let mut rx = handle.subscribe();
    let pb = job_progress_bar(filename);

    loop {
        if rx.changed().await.is_err() {
            break;
        }
        let current = rx.borrow().clone();
        if let Some(update) = current {
            // A transport blip is display-only; the monitor keeps polling
            // and so does this loop
            if update.is_transport_failure() {
                pb.set_message(format!("{}: connection lost, retrying", filename));
                continue;
            }
            let status = update.status();
            pb.set_position(status.progress.min(100) as u64);
            if !status.step.is_empty() {
                pb.set_message(format!("{}: {}", filename, status.step));
            }
            if update.is_terminal() {
                break;
            }
        }
    }

    let last = handle.join().await;
    match &last {
        Some(status) if status.status == PipelineStatus::Completed => {
            pb.finish_with_message(format!("{}: done", filename));
        }
        _ => pb.abandon_with_message(format!("{}: failed", filename)),
    }
    last
}

/// Submit files for ingestion and follow each pipeline job to completion.
pub async fn cmd_ingest(
    config: &Config,
    client: &BackendClient,
    events: &EventBus,
    paths: &[PathBuf],
    collection_id: &str,
    vision_model: Option<&str>,
) -> Result<IngestStats> {
    let vision_model = vision_model.unwrap_or(config.default_vision_model.as_str());
    info!(
        "Ingesting {} file(s) into collection {} using {}",
        paths.len(),
        collection_id,
        vision_model
    );

    let files = read_submissions(paths).await?;
    let total = files.len();

    let (queue, mut queue_events) = IngestionQueue::new(client.clone());
    queue.enqueue(files, collection_id, vision_model);

    let monitor_options = MonitorOptions::from_config(config);
    let mut stats = IngestStats::default();

    // One settlement event per file, in FIFO order. The queue keeps
    // draining while we follow an earlier job; events buffer in between.
    for _ in 0..total {
        let event = queue_events
            .recv()
            .await
            .ok_or_else(|| Error::Other("Ingestion queue closed unexpectedly".to_string()))?;

        match event {
            QueueEvent::JobStarted {
                item,
                job_id,
                deduplicated,
            } => {
                if deduplicated {
                    info!(
                        "'{}' already queued on the backend, following existing job",
                        item.file.name
                    );
                }
                let final_status = follow_job(
                    client,
                    events,
                    &job_id,
                    &item.collection_id,
                    &item.file.name,
                    monitor_options.clone(),
                )
                .await;

                let error = match &final_status {
                    Some(status) if status.status == PipelineStatus::Completed => None,
                    Some(status) => {
                        Some(Error::PipelineReported(status.step.clone()).to_string())
                    }
                    None => Some("job produced no status".to_string()),
                };
                stats.outcomes.push(IngestOutcome {
                    filename: item.file.name,
                    job_id: Some(job_id),
                    deduplicated,
                    final_status,
                    error,
                });
            }
            QueueEvent::ItemFailed { item, error } => {
                stats.outcomes.push(IngestOutcome {
                    filename: item.file.name,
                    job_id: None,
                    deduplicated: false,
                    final_status: None,
                    error: Some(error),
                });
            }
        }
    }

    Ok(stats)
}

/// Print ingestion results to console
pub fn print_ingest_stats(stats: &IngestStats) {
    println!();
    for outcome in &stats.outcomes {
        if outcome.succeeded() {
            let dedup = if outcome.deduplicated {
                " (already queued)"
            } else {
                ""
            };
            println!("✓ {}{}", outcome.filename, dedup);
        } else {
            let reason = outcome.error.as_deref().unwrap_or("unknown error");
            println!("✗ {}: {}", outcome.filename, reason);
        }
    }
    println!(
        "\n{} succeeded, {} failed",
        stats.succeeded(),
        stats.failed()
    );
}

/// Collect files from paths, expanding any that point at a directory.
pub fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            out.extend(entries);
        } else {
            out.push(path.clone());
        }
    }
    if out.is_empty() {
        return Err(Error::Config("No files to ingest".to_string()));
    }
    Ok(out)
}

/// True when the path has an extension the backend parser understands.
pub fn is_supported_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref(),
        Some("pdf" | "docx" | "pptx" | "xlsx" | "md" | "txt" | "html")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_files() {
        assert!(is_supported_file(Path::new("report.pdf")));
        assert!(is_supported_file(Path::new("slides.PPTX")));
        assert!(!is_supported_file(Path::new("archive.zip")));
        assert!(!is_supported_file(Path::new("no_extension")));
    }

    #[test]
    fn test_expand_paths_rejects_empty() {
        assert!(expand_paths(&[]).is_err());
    }

    #[tokio::test]
    async fn test_read_submissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"hello").unwrap();

        let files = read_submissions(&[path]).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "doc.txt");
        assert_eq!(files[0].bytes, b"hello");
    }

    #[tokio::test]
    async fn test_read_submissions_missing_file() {
        assert!(read_submissions(&[PathBuf::from("/nonexistent/x.pdf")])
            .await
            .is_err());
    }
}
