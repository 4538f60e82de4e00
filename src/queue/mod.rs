//! Ingestion queue.
//!
//! Serializes file submissions into a single-flight pipeline: the backend's
//! ingestion path shares one GPU-bound vision model and has no admission
//! control of its own, so the client must never have two transfers in
//! flight. Items drain strictly FIFO; item n+1 never starts before item n
//! has fully settled. Failed items are surfaced and dropped, never retried,
//! and never wedge the drain loop.

use crate::client::BackendClient;
use crate::error::{Error, Result};
use crate::models::{FileSubmission, ItemStatus, ProcessAck, QueueItem};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Notification from the queue as items settle.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// Upload and processing registration succeeded; a pipeline job is now
    /// running and can be watched
    JobStarted {
        item: QueueItem,
        job_id: String,
        /// True when the backend deduplicated a concurrent submission for
        /// the same target
        deduplicated: bool,
    },
    /// Transfer failed; the item has been removed and will not be retried
    ItemFailed { item: QueueItem, error: String },
}

struct QueueInner {
    client: BackendClient,
    items: Mutex<VecDeque<QueueItem>>,
    /// Single-flight gate over the one shared backend resource. Acquired
    /// with compare_exchange so two overlapping completions cannot both
    /// observe "idle" and both start draining.
    in_flight: AtomicBool,
    events_tx: mpsc::UnboundedSender<QueueEvent>,
}

impl QueueInner {
    /// Start a drain task if none is running and work is queued.
    fn kick(self: &Arc<Self>) {
        if self.items.lock().expect("queue lock poisoned").is_empty() {
            return;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // A drain task is already running; it will pick the item up
            return;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.drain().await;
        });
    }

    /// Process items until the queue is empty, then release the gate.
    ///
    /// Holds the in-flight flag for the whole run; the lock on `items` is
    /// only taken for short synchronous sections, never across an await.
    async fn drain(self: &Arc<Self>) {
        loop {
            let Some(item) = self.take_head() else {
                break;
            };

            match self.transfer(&item).await {
                Ok(ack) => {
                    let job_id = ack.job_id_or(&item.collection_id).to_string();
                    let deduplicated = ack.is_deduplicated();
                    info!(
                        "Ingestion started for '{}' (job {}{})",
                        item.file.name,
                        job_id,
                        if deduplicated { ", already queued" } else { "" }
                    );
                    let mut settled = item;
                    settled.status = ItemStatus::Completed;
                    self.remove_head(settled.id);
                    let _ = self.events_tx.send(QueueEvent::JobStarted {
                        item: settled,
                        job_id,
                        deduplicated,
                    });
                }
                Err(err) => {
                    warn!("Ingestion failed for '{}': {}", item.file.name, err);
                    let mut settled = item;
                    settled.status = ItemStatus::Error;
                    self.remove_head(settled.id);
                    let _ = self.events_tx.send(QueueEvent::ItemFailed {
                        error: err.to_string(),
                        item: settled,
                    });
                }
            }
        }

        self.in_flight.store(false, Ordering::Release);
        // An enqueue may have landed between the empty check above and the
        // flag release; restart rather than strand it
        self.kick();
    }

    /// Mark the head item as uploading and return a working copy.
    fn take_head(&self) -> Option<QueueItem> {
        let mut items = self.items.lock().expect("queue lock poisoned");
        let head = items.front_mut()?;
        head.status = ItemStatus::Uploading;
        Some(head.clone())
    }

    /// Record that the upload finished and processing is registered.
    fn mark_head(&self, id: Uuid, status: ItemStatus) {
        let mut items = self.items.lock().expect("queue lock poisoned");
        if let Some(head) = items.front_mut() {
            if head.id == id {
                head.status = status;
            }
        }
    }

    /// Drop the settled head item. The queue never retains finished items.
    fn remove_head(&self, id: Uuid) {
        let mut items = self.items.lock().expect("queue lock poisoned");
        if items.front().is_some_and(|head| head.id == id) {
            items.pop_front();
        }
    }

    /// Upload the file, then register it for pipeline processing.
    async fn transfer(&self, item: &QueueItem) -> Result<ProcessAck> {
        self.client
            .upload_file(&item.file)
            .await
            .map_err(|e| transfer_error(&item.file.name, e))?;
        self.mark_head(item.id, ItemStatus::ProcessingAck);

        self.client
            .start_processing(&item.collection_id, &item.file.name, &item.vision_model)
            .await
            .map_err(|e| transfer_error(&item.file.name, e))
    }
}

fn transfer_error(filename: &str, err: Error) -> Error {
    match err {
        already @ Error::Transfer { .. } => already,
        other => Error::Transfer {
            filename: filename.to_string(),
            reason: other.to_string(),
        },
    }
}

/// FIFO, single-flight ingestion queue.
#[derive(Clone)]
pub struct IngestionQueue {
    inner: Arc<QueueInner>,
}

impl IngestionQueue {
    /// Create a queue and the receiver for its settlement events.
    pub fn new(client: BackendClient) -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let queue = Self {
            inner: Arc::new(QueueInner {
                client,
                items: Mutex::new(VecDeque::new()),
                in_flight: AtomicBool::new(false),
                events_tx,
            }),
        };
        (queue, events_rx)
    }

    /// Append files in FIFO order and start draining if idle.
    pub fn enqueue(&self, files: Vec<FileSubmission>, collection_id: &str, vision_model: &str) {
        if files.is_empty() {
            return;
        }
        {
            let mut items = self.inner.items.lock().expect("queue lock poisoned");
            for file in files {
                debug!("Enqueued '{}' for collection {}", file.name, collection_id);
                items.push_back(QueueItem::new(file, collection_id, vision_model));
            }
        }
        self.inner.kick();
    }

    /// Ordered view of pending and active items, for display.
    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.inner
            .items
            .lock()
            .expect("queue lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// The item currently being transferred, if any.
    pub fn active_item(&self) -> Option<QueueItem> {
        self.inner
            .items
            .lock()
            .expect("queue lock poisoned")
            .front()
            .filter(|item| item.status != ItemStatus::Pending)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a transfer is currently in flight.
    pub fn is_draining(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }
}
