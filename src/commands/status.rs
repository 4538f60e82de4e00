//! Status command implementation

use crate::client::BackendClient;
use crate::config::Config;
use crate::error::Result;
use crate::events::EventBus;
use crate::models::JobStatus;
use crate::monitor::{JobStatusMonitor, MonitorOptions};
use tracing::info;

/// Fetch the current status of a job once.
pub async fn cmd_status(client: &BackendClient, job_id: &str) -> Result<JobStatus> {
    info!("Fetching status for job {}", job_id);
    client.job_status(job_id).await
}

/// Watch a job until it reaches a terminal status, printing each update.
///
/// The collection owning the job receives cache-invalidation events on
/// completion, same as during an ingest run.
pub async fn cmd_watch_status(
    config: &Config,
    client: &BackendClient,
    events: &EventBus,
    job_id: &str,
) -> Result<JobStatus> {
    let handle = JobStatusMonitor::watch(
        client.clone(),
        events.clone(),
        job_id,
        job_id,
        MonitorOptions::from_config(config),
    );

    let mut rx = handle.subscribe();
    let mut last_line = String::new();
    loop {
        if rx.changed().await.is_err() {
            break;
        }
        let current = rx.borrow().clone();
        if let Some(update) = current {
            // Transient poll failures are shown but never end the watch;
            // the monitor keeps polling through them
            if update.is_transport_failure() {
                println!("    connection lost, retrying");
                continue;
            }
            let status = update.status();
            let line = format_status_line(status);
            if line != last_line {
                println!("{}", line);
                last_line = line;
            }
            if let Some(details) = &status.details {
                if let Some(file) = &details.current_file {
                    println!("    current file: {}", file);
                }
                for log in &details.logs {
                    println!("    {}", log);
                }
            }
            if update.is_terminal() {
                break;
            }
        }
    }

    let last = handle.join().await;
    last.ok_or_else(|| crate::error::Error::JobNotFound(job_id.to_string()))
}

fn format_status_line(status: &JobStatus) -> String {
    let step = if status.step.is_empty() {
        String::new()
    } else {
        format!(" — {}", status.step)
    };
    format!(
        "[{:>3}%] {:?}/{}{}",
        status.progress, status.status, status.stage, step
    )
}

/// Print a one-shot status to console
pub fn print_job_status(job_id: &str, status: &JobStatus) {
    println!("Job: {}", job_id);
    println!("  Status:   {:?}", status.status);
    println!("  Stage:    {}", status.stage);
    println!("  Progress: {}%", status.progress);
    if !status.step.is_empty() {
        println!("  Step:     {}", status.step);
    }
    if let Some(details) = &status.details {
        if let Some(file) = &details.current_file {
            println!("  File:     {}", file);
        }
        if !details.logs.is_empty() {
            println!("  Recent log lines:");
            for log in details.logs.iter().rev().take(5).rev() {
                println!("    {}", log);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PipelineStage, PipelineStatus};

    #[test]
    fn test_format_status_line() {
        let status = JobStatus {
            status: PipelineStatus::Processing,
            stage: PipelineStage::Vision,
            step: "Analyzing chart 2/5".to_string(),
            progress: 40,
            details: None,
        };
        assert_eq!(
            format_status_line(&status),
            "[ 40%] Processing/vision — Analyzing chart 2/5"
        );
    }
}
