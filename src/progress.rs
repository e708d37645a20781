use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, info};

use crate::engine::{FetchStats, Progress, ProgressObserver};

/// Logs transfer progress every time another tenth of the objects has been received.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_decile: Option<usize>,
}

impl ProgressObserver for LogProgress {
    fn on_progress(&mut self, stats: &FetchStats) -> Progress {
        if stats.total_objects == 0 {
            return Progress::Continue;
        }
        let decile = stats.received_objects * 10 / stats.total_objects;
        if self.last_decile != Some(decile) {
            self.last_decile = Some(decile);
            info!(
                "Received {}/{} objects ({} bytes), indexed {}",
                stats.received_objects,
                stats.total_objects,
                stats.received_bytes,
                stats.indexed_objects
            );
        }
        Progress::Continue
    }
}

/// Aborts the transfer once the shared flag is raised, otherwise defers to `inner`.
#[derive(Debug)]
pub struct CancelOnFlag<O> {
    flag: Arc<AtomicBool>,
    inner: O,
}

impl<O> CancelOnFlag<O> {
    pub fn new(flag: Arc<AtomicBool>, inner: O) -> Self {
        Self { flag, inner }
    }
}

impl<O: ProgressObserver> ProgressObserver for CancelOnFlag<O> {
    fn on_progress(&mut self, stats: &FetchStats) -> Progress {
        if self.flag.load(Ordering::SeqCst) {
            debug!("Cancellation requested, aborting transfer");
            return Progress::Abort;
        }
        self.inner.on_progress(stats)
    }
}
