// Progress monitor
//
// A single background thread polls the shared frame counter and republishes
// "Processed X of Y files (approx.)" to the status sink. It lives until the
// controller drops its cancel sender, which wakes the thread immediately
// instead of waiting for the next poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::frontend::StatusSink;

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Frames written in the current run
///
/// The dispatcher is the only writer; the monitor thread only reads.
#[derive(Debug, Clone, Default)]
pub struct FrameCounter(Arc<AtomicU64>);

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame, returning its zero-based index
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel)
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Human readable progress line
pub fn progress_text(written: u64, expected: Option<u64>) -> String {
    match expected {
        Some(total) => format!("Processed {} of {} files (approx.)", written, total),
        None => format!("Processed {} files", written),
    }
}

/// Handle to the running monitor thread
pub struct ProgressMonitor {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    pub fn start(
        counter: FrameCounter,
        expected: Option<u64>,
        interval: Duration,
        status: Arc<dyn StatusSink>,
    ) -> std::io::Result<Self> {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("gusto-progress".into())
            .spawn(move || {
                log::debug!("Progress monitor started");
                loop {
                    match cancel_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            status.set_status(&progress_text(counter.get(), expected));
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("Progress monitor stopped at {} frames", counter.get());
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Progress monitor thread panicked");
            }
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
