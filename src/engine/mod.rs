//! The narrow slice of a git engine needed to materialize a single ref.
//!
//! Every handle is an owned value released on drop. Remotes and resolved
//! objects borrow the repository they came from, so they can never outlive it.

mod git;
pub mod known_hosts;

use std::path::Path;

use git2::Oid;

pub use git::{active_sessions, GitEngine, GitSession};

pub trait Engine {
    /// Proof that the engine's process-wide state is initialized.
    type Session;
    type Repository;
    type Remote<'repo>;
    type Object<'repo>;

    fn init(&self) -> Result<Self::Session, git2::Error>;

    /// Creates a new non-bare repository rooted at `path`.
    fn create_repository(
        &self,
        session: &Self::Session,
        path: &Path,
    ) -> Result<Self::Repository, git2::Error>;

    fn create_remote<'repo>(
        &self,
        repository: &'repo Self::Repository,
        name: &str,
        url: &str,
    ) -> Result<Self::Remote<'repo>, git2::Error>;

    /// Fetches `refspecs` with the given history depth, blocking until the transfer ends.
    ///
    /// The transfer stops with an error as soon as `observer` returns [`Progress::Abort`].
    /// Fails with [`git2::ErrorCode::NotFound`] when no refspec matched a remote ref.
    fn fetch(
        &self,
        repository: &Self::Repository,
        remote: &mut Self::Remote<'_>,
        refspecs: &[&str],
        depth: i32,
        observer: &mut dyn ProgressObserver,
    ) -> Result<FetchStats, git2::Error>;

    fn is_shallow(&self, repository: &Self::Repository) -> bool;

    /// Resolves `spec` to the commit it names, peeling tags.
    fn resolve<'repo>(
        &self,
        repository: &'repo Self::Repository,
        spec: &str,
    ) -> Result<Self::Object<'repo>, git2::Error>;

    /// Hard reset of HEAD, index and working tree, overwriting every file.
    fn reset(
        &self,
        repository: &Self::Repository,
        target: &Self::Object<'_>,
    ) -> Result<(), git2::Error>;

    fn object_id(&self, object: &Self::Object<'_>) -> Oid;
}

/// Transfer statistics reported while a fetch is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub total_objects: usize,
    pub received_objects: usize,
    pub indexed_objects: usize,
    pub local_objects: usize,
    pub total_deltas: usize,
    pub indexed_deltas: usize,
    pub received_bytes: usize,
}

impl From<&git2::Progress<'_>> for FetchStats {
    fn from(progress: &git2::Progress<'_>) -> Self {
        FetchStats {
            total_objects: progress.total_objects(),
            received_objects: progress.received_objects(),
            indexed_objects: progress.indexed_objects(),
            local_objects: progress.local_objects(),
            total_deltas: progress.total_deltas(),
            indexed_deltas: progress.indexed_deltas(),
            received_bytes: progress.received_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    Abort,
}

pub trait ProgressObserver {
    fn on_progress(&mut self, stats: &FetchStats) -> Progress;
}

/// Ignores progress and never aborts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _stats: &FetchStats) -> Progress {
        Progress::Continue
    }
}

impl<F> ProgressObserver for F
where
    F: FnMut(&FetchStats) -> Progress,
{
    fn on_progress(&mut self, stats: &FetchStats) -> Progress {
        self(stats)
    }
}
