//! Job status monitoring.
//!
//! Polls the backend status endpoint for one job id at a fixed interval and
//! publishes each accepted update on a watch channel. Polling stops on the
//! first terminal status, on explicit `stop()`, or after too many
//! consecutive transport failures.
//!
//! Two guards keep the published sequence sane under real network timing:
//! every in-flight poll carries a monotonically increasing sequence number
//! and responses arriving after a newer one was applied are discarded, and a
//! response whose pipeline stage ranks below the last-seen stage is treated
//! as stale unless it reports an error.

use crate::client::BackendClient;
use crate::config::Config;
use crate::events::EventBus;
use crate::models::{JobStatus, PipelineStatus};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tuning knobs for a monitor.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Poll interval; 500-1000 ms is the intended range
    pub interval: Duration,
    /// Consecutive failed polls tolerated before giving up
    pub max_transport_failures: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(750),
            max_transport_failures: 8,
        }
    }
}

impl MonitorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            max_transport_failures: config.max_poll_transport_failures,
        }
    }
}

/// Admission control for poll responses.
///
/// Kept free of I/O so the ordering rules are testable on their own.
#[derive(Debug, Default)]
struct PollGuard {
    /// Highest sequence number applied so far
    applied_seq: Option<u64>,
    /// Stage rank of the last accepted server-reported status
    last_stage_index: Option<usize>,
}

impl PollGuard {
    /// Whether a response with this sequence number may be considered at
    /// all. Out-of-order arrivals (an older poll completing after a newer
    /// one was applied) are rejected.
    fn admit_seq(&mut self, seq: u64) -> bool {
        match self.applied_seq {
            Some(applied) if seq <= applied => false,
            _ => {
                self.applied_seq = Some(seq);
                true
            }
        }
    }

    /// Whether a server-reported status may be published. A stage that
    /// ranks below the last-seen stage is a stale snapshot, unless the
    /// status is an error, which always applies.
    fn admit_stage(&mut self, status: &JobStatus) -> bool {
        let index = status.stage.index();
        if status.status != PipelineStatus::Error {
            if let Some(last) = self.last_stage_index {
                if index < last {
                    return false;
                }
            }
        }
        self.last_stage_index = Some(self.last_stage_index.unwrap_or(0).max(index));
        true
    }
}

/// One update published to monitor subscribers.
///
/// A transient poll failure is a separate variant so display code never
/// mistakes it for the job itself erroring; the loop keeps polling through
/// transport failures.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorUpdate {
    /// Server-reported job status, admitted by the guards
    Status(JobStatus),
    /// A status poll failed at the transport level; display-only
    TransportFailure(JobStatus),
}

impl MonitorUpdate {
    /// The status to render, for either variant.
    pub fn status(&self) -> &JobStatus {
        match self {
            Self::Status(status) | Self::TransportFailure(status) => status,
        }
    }

    pub fn into_status(self) -> JobStatus {
        match self {
            Self::Status(status) | Self::TransportFailure(status) => status,
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }

    /// True only for a genuine server-reported terminal status. A transport
    /// failure is never terminal to subscribers.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Status(status) if status.is_terminal())
    }
}

/// Handle to a running monitor.
///
/// Dropping the handle does not stop the poll loop; `stop()` is explicit so
/// a detached monitor can keep driving cache invalidation after the caller
/// stops looking at it.
pub struct MonitorHandle {
    rx: watch::Receiver<Option<MonitorUpdate>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Subscribe to status updates. `None` until the first poll lands.
    pub fn subscribe(&self) -> watch::Receiver<Option<MonitorUpdate>> {
        self.rx.clone()
    }

    /// Stop polling immediately. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the poll loop to finish and return the last published
    /// status.
    pub async fn join(self) -> Option<JobStatus> {
        let _ = self.task.await;
        let last = self.rx.borrow().clone();
        last.map(MonitorUpdate::into_status)
    }
}

/// Spawns poll loops for ingestion jobs.
pub struct JobStatusMonitor;

impl JobStatusMonitor {
    /// Begin polling `job_id` and return a handle.
    ///
    /// On the first `completed` status the monitor emits cache invalidation
    /// for the owning collection exactly once, then stops; no further poll
    /// is issued after the terminal one. A server-reported `error` status
    /// also terminates. Transport failures publish a synthetic error status
    /// for display but polling continues, up to the configured cap.
    pub fn watch(
        client: BackendClient,
        events: EventBus,
        job_id: &str,
        collection_id: &str,
        options: MonitorOptions,
    ) -> MonitorHandle {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let job_id = job_id.to_string();
        let collection_id = collection_id.to_string();

        let task = tokio::spawn(async move {
            poll_loop(client, events, job_id, collection_id, options, tx, loop_cancel).await;
        });

        MonitorHandle { rx, cancel, task }
    }
}

async fn poll_loop(
    client: BackendClient,
    events: EventBus,
    job_id: String,
    collection_id: String,
    options: MonitorOptions,
    tx: watch::Sender<Option<MonitorUpdate>>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(options.interval);
    let (response_tx, mut response_rx) = mpsc::unbounded_channel();
    let mut guard = PollGuard::default();
    let mut next_seq: u64 = 0;
    let mut transport_failures: u32 = 0;
    let mut completion_emitted = false;

    debug!("Watching job {} every {:?}", job_id, options.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Monitor for job {} unsubscribed", job_id);
                return;
            }

            _ = interval.tick() => {
                let seq = next_seq;
                next_seq += 1;
                let client = client.clone();
                let job_id = job_id.clone();
                let response_tx = response_tx.clone();
                tokio::spawn(async move {
                    let result = client.job_status(&job_id).await;
                    let _ = response_tx.send((seq, result));
                });
            }

            Some((seq, result)) = response_rx.recv() => {
                if !guard.admit_seq(seq) {
                    debug!("Discarding out-of-order poll response {} for job {}", seq, job_id);
                    continue;
                }

                match result {
                    Ok(status) => {
                        transport_failures = 0;

                        if !guard.admit_stage(&status) {
                            debug!(
                                "Discarding stale stage {} for job {}",
                                status.stage, job_id
                            );
                            continue;
                        }

                        let terminal = status.is_terminal();
                        let completed = status.status == PipelineStatus::Completed;
                        tx.send_replace(Some(MonitorUpdate::Status(status)));

                        if completed && !completion_emitted {
                            completion_emitted = true;
                            info!("Job {} completed", job_id);
                            events.emit_job_completed(&collection_id);
                        }

                        if terminal {
                            return;
                        }
                    }
                    Err(err) => {
                        transport_failures += 1;
                        warn!(
                            "Status poll {}/{} failed for job {}: {}",
                            transport_failures, options.max_transport_failures, job_id, err
                        );
                        // Display-only; does not advance the stage guard
                        tx.send_replace(Some(MonitorUpdate::TransportFailure(
                            JobStatus::connection_failed(),
                        )));

                        if transport_failures >= options.max_transport_failures {
                            warn!("Giving up on job {} after {} failed polls", job_id, transport_failures);
                            return;
                        }
                    }
                }
            }
        }
    }
}
