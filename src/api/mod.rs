use std::sync::{atomic::AtomicBool, Arc};

use crate::{
    engine::{GitEngine, ProgressObserver},
    fetch::{FetchError, FetchOutcome, ShallowRefFetcher},
    model::FetchRequest,
    progress::{CancelOnFlag, LogProgress},
};

mod builder;

pub use builder::ShallowRefBuilder;

/// A [`ShallowRefFetcher`] over libgit2 that can be cancelled from another thread.
pub struct ShallowRef {
    fetcher: ShallowRefFetcher<GitEngine>,
    cancelled: Arc<AtomicBool>,
}

impl ShallowRef {
    pub fn builder() -> ShallowRefBuilder {
        ShallowRefBuilder::default()
    }

    /// Fetches and checks out `request`, logging transfer progress.
    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, FetchError> {
        self.fetch_with_progress(request, LogProgress::default())
    }

    pub fn fetch_with_progress(
        &self,
        request: &FetchRequest,
        observer: impl ProgressObserver,
    ) -> Result<FetchOutcome, FetchError> {
        let mut observer = CancelOnFlag::new(self.cancelled.clone(), observer);
        self.fetcher.fetch_single_ref_with(request, &mut observer)
    }

    /// Raising the returned flag aborts a running transfer at its next progress report.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}
