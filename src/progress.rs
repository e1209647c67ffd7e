//! Toolkit-independent progress reporting and cooperative cancellation.
//!
//! Decode/encode run off the interactive thread and report progress as
//! (step name, items processed, total items) over a channel. Cancellation is
//! a flag the long-running side checks at each layer boundary.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// One progress sample as sent over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub step: String,
    pub processed: u32,
    pub total: u32,
}

/// Progress state shared between the caller and a running operation.
#[derive(Debug)]
pub struct Progress {
    step: Mutex<String>,
    processed: AtomicU32,
    total: AtomicU32,
    cancelled: AtomicBool,
    tx: Option<Sender<ProgressUpdate>>,
}

impl Progress {
    /// Silent progress: counters and cancellation only, no channel.
    pub fn new() -> Self {
        Self {
            step: Mutex::new(String::new()),
            processed: AtomicU32::new(0),
            total: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            tx: None,
        }
    }

    /// Progress wired to a channel; the receiver gets one update per tick.
    pub fn channel() -> (Self, Receiver<ProgressUpdate>) {
        let (tx, rx) = unbounded();
        let mut progress = Self::new();
        progress.tx = Some(tx);
        (progress, rx)
    }

    /// Progress over a bounded channel. A zero capacity makes every update
    /// a rendezvous: the operation blocks at each tick until the receiver
    /// takes it, which gives callers backpressure and a deterministic
    /// interleaving point.
    pub fn bounded_channel(capacity: usize) -> (Self, Receiver<ProgressUpdate>) {
        let (tx, rx) = bounded(capacity);
        let mut progress = Self::new();
        progress.tx = Some(tx);
        (progress, rx)
    }

    /// Begin a named step with a fresh item count.
    pub fn start_step(&self, name: &str, total: u32) {
        *self.step.lock() = name.to_string();
        self.processed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.emit();
    }

    /// Mark one item of the current step as processed.
    pub fn tick(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.emit();
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProgressUpdate {
        ProgressUpdate {
            step: self.step.lock().clone(),
            processed: self.processed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    fn emit(&self) {
        if let Some(tx) = &self.tx {
            // A dropped receiver must not abort the operation.
            let _ = tx.send(self.snapshot());
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}
