/*!
 * Progress event publisher for in-flight run monitoring
 *
 * Workers publish per-file events over a channel; a renderer (TUI, log
 * writer) consumes them on its own thread. Events may arrive in any order
 * across files; only per-file ordering is meaningful.
 */

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Progress event types
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Work on one file started
    FileStart {
        index: u64,
        source: PathBuf,
        dest: PathBuf,
        bytes: u64,
        timestamp: u64,
    },

    /// One file finished successfully; counters reflect the whole run
    FileCompleted {
        index: u64,
        file_name: String,
        bytes: u64,
        processed_count: u64,
        processed_bytes: u64,
        timestamp: u64,
    },

    /// One file was skipped (already completed by a prior session)
    FileSkipped {
        index: u64,
        file_name: String,
        bytes: u64,
        timestamp: u64,
    },

    /// One file failed
    FileFailed {
        index: u64,
        file_name: String,
        error: String,
        timestamp: u64,
    },

    /// The whole run finished
    RunComplete {
        processed: u64,
        failed: u64,
        skipped: u64,
        bytes_processed: u64,
        timestamp: u64,
    },
}

impl ProgressEvent {
    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Sends progress events to a subscriber, or nowhere when disabled
#[derive(Clone)]
pub struct ProgressPublisher {
    sender: Option<Sender<ProgressEvent>>,
}

impl ProgressPublisher {
    /// Publisher with a bounded channel
    pub fn new(buffer_size: usize) -> (Self, ProgressSubscriber) {
        let (tx, rx) = bounded(buffer_size);
        (
            ProgressPublisher { sender: Some(tx) },
            ProgressSubscriber { receiver: rx },
        )
    }

    /// Publisher with an unbounded channel
    pub fn unbounded() -> (Self, ProgressSubscriber) {
        let (tx, rx) = unbounded();
        (
            ProgressPublisher { sender: Some(tx) },
            ProgressSubscriber { receiver: rx },
        )
    }

    /// No-op publisher for when progress tracking is disabled
    pub fn noop() -> Self {
        ProgressPublisher { sender: None }
    }

    /// Publish an event; send errors are ignored (the subscriber may be gone)
    pub fn publish(&self, event: ProgressEvent) {
        if let Some(ref tx) = self.sender {
            let _ = tx.send(event);
        }
    }

    pub fn file_start(&self, index: u64, source: PathBuf, dest: PathBuf, bytes: u64) {
        self.publish(ProgressEvent::FileStart {
            index,
            source,
            dest,
            bytes,
            timestamp: ProgressEvent::now(),
        });
    }

    pub fn file_completed(
        &self,
        index: u64,
        file_name: String,
        bytes: u64,
        processed_count: u64,
        processed_bytes: u64,
    ) {
        self.publish(ProgressEvent::FileCompleted {
            index,
            file_name,
            bytes,
            processed_count,
            processed_bytes,
            timestamp: ProgressEvent::now(),
        });
    }

    pub fn file_skipped(&self, index: u64, file_name: String, bytes: u64) {
        self.publish(ProgressEvent::FileSkipped {
            index,
            file_name,
            bytes,
            timestamp: ProgressEvent::now(),
        });
    }

    pub fn file_failed(&self, index: u64, file_name: String, error: String) {
        self.publish(ProgressEvent::FileFailed {
            index,
            file_name,
            error,
            timestamp: ProgressEvent::now(),
        });
    }

    pub fn run_complete(&self, processed: u64, failed: u64, skipped: u64, bytes_processed: u64) {
        self.publish(ProgressEvent::RunComplete {
            processed,
            failed,
            skipped,
            bytes_processed,
            timestamp: ProgressEvent::now(),
        });
    }
}

/// Receives progress events
pub struct ProgressSubscriber {
    receiver: Receiver<ProgressEvent>,
}

impl ProgressSubscriber {
    /// Non-blocking receive
    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }

    /// Blocking receive
    pub fn recv(&self) -> Option<ProgressEvent> {
        self.receiver.recv().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = ProgressEvent> + '_ {
        self.receiver.iter()
    }
}
