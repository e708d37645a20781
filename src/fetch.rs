use std::{
    fmt::Display,
    io,
    path::{Path, PathBuf},
};

use git2::{ErrorClass, ErrorCode, Oid};
use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::{
    engine::{Engine, FetchStats, NoProgress, Progress, ProgressObserver},
    model::{FailurePolicy, FetchRequest},
};

pub const REMOTE_NAME: &str = "origin";
pub const FETCH_DEPTH: i32 = 1;
/// Written by the fetch, names the commit it brought in.
pub const FETCH_HEAD: &str = "FETCH_HEAD";

/// Steps of a single materialization, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    PrepareDestination,
    InitEngine,
    CreateRepository,
    CreateRemote,
    Fetch,
    Resolve,
    Checkout,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Stage::PrepareDestination => f.write_str("prepare destination"),
            Stage::InitEngine => f.write_str("initialize engine"),
            Stage::CreateRepository => f.write_str("create repository"),
            Stage::CreateRemote => f.write_str("create remote"),
            Stage::Fetch => f.write_str("fetch"),
            Stage::Resolve => f.write_str("resolve"),
            Stage::Checkout => f.write_str("checkout"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferFailure {
    /// The remote does not have the requested ref or commit.
    NotFound,
    Authentication,
    Network,
    /// The progress observer stopped the transfer.
    Aborted,
    Other,
}

impl TransferFailure {
    fn classify(error: &git2::Error, aborted: bool) -> TransferFailure {
        if aborted || error.code() == ErrorCode::User {
            return TransferFailure::Aborted;
        }
        if error.code() == ErrorCode::Auth || error.code() == ErrorCode::Certificate {
            return TransferFailure::Authentication;
        }
        let message = error.message().to_lowercase();
        if error.code() == ErrorCode::NotFound
            || message.contains("couldn't find remote ref")
            || message.contains("not our ref")
            || message.contains("not found")
        {
            return TransferFailure::NotFound;
        }
        if message.contains("authentication") || message.contains("unauthorized") {
            return TransferFailure::Authentication;
        }
        match error.class() {
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl
            | ErrorClass::Os => TransferFailure::Network,
            _ => TransferFailure::Other,
        }
    }
}

impl Display for TransferFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransferFailure::NotFound => f.write_str("not found"),
            TransferFailure::Authentication => f.write_str("authentication failed"),
            TransferFailure::Network => f.write_str("network error"),
            TransferFailure::Aborted => f.write_str("aborted"),
            TransferFailure::Other => f.write_str("failed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Could not prepare destination {}: {source}", .path.display())]
    Filesystem { path: PathBuf, source: io::Error },
    #[error("Could not initialize the git engine: {0}")]
    EngineInit(#[source] git2::Error),
    #[error("Could not create repository at {}: {source}", .path.display())]
    Repository { path: PathBuf, source: git2::Error },
    #[error("Could not add remote {url}: {source}")]
    Remote { url: String, source: git2::Error },
    #[error("Fetching {ref_spec} {kind}: {source}")]
    Transfer {
        ref_spec: String,
        kind: TransferFailure,
        source: git2::Error,
    },
    #[error("Could not resolve {spec} after fetch: {source}")]
    Resolve { spec: String, source: git2::Error },
    #[error("Could not check out fetched commit: {source}")]
    Checkout { source: git2::Error },
}

impl FetchError {
    pub fn stage(&self) -> Stage {
        match self {
            FetchError::Filesystem { .. } => Stage::PrepareDestination,
            FetchError::EngineInit(_) => Stage::InitEngine,
            FetchError::Repository { .. } => Stage::CreateRepository,
            FetchError::Remote { .. } => Stage::CreateRemote,
            FetchError::Transfer { .. } => Stage::Fetch,
            FetchError::Resolve { .. } => Stage::Resolve,
            FetchError::Checkout { .. } => Stage::Checkout,
        }
    }

    /// Process exit code for this kind of failure. 2 is left to usage errors.
    pub fn exit_code(&self) -> u8 {
        match self.stage() {
            Stage::PrepareDestination => 3,
            Stage::InitEngine => 4,
            Stage::CreateRepository => 5,
            Stage::CreateRemote => 6,
            Stage::Fetch => 7,
            Stage::Resolve => 8,
            Stage::Checkout => 9,
        }
    }

    pub fn transfer_failure(&self) -> Option<TransferFailure> {
        match self {
            FetchError::Transfer { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    pub commit: Oid,
    pub shallow: bool,
    pub stats: FetchStats,
}

/// Fetches a single ref at depth 1 and force-checks it out into a fresh directory.
pub struct ShallowRefFetcher<E> {
    engine: E,
    failure_policy: FailurePolicy,
}

impl<E: Engine> ShallowRefFetcher<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn fetch_single_ref(&self, request: &FetchRequest) -> Result<FetchOutcome, FetchError> {
        self.fetch_single_ref_with(request, &mut NoProgress)
    }

    pub fn fetch_single_ref_with(
        &self,
        request: &FetchRequest,
        observer: &mut dyn ProgressObserver,
    ) -> Result<FetchOutcome, FetchError> {
        info!("Fetching {}", request);

        debug!("Stage: {}", Stage::PrepareDestination);
        prepare_destination(request.destination())?;

        // All engine handles are released when `materialize` returns
        let result = self.materialize(request, observer);

        if let Err(error) = &result {
            warn!("Failed to {}: {}", error.stage(), error);
            if self.failure_policy == FailurePolicy::Remove {
                info!(
                    "Removing partially initialized {}",
                    request.destination().display()
                );
                if let Err(remove_error) = remove_path(request.destination()) {
                    warn!(
                        "Could not remove {}: {}",
                        request.destination().display(),
                        remove_error
                    );
                }
            }
        }

        result
    }

    fn materialize(
        &self,
        request: &FetchRequest,
        observer: &mut dyn ProgressObserver,
    ) -> Result<FetchOutcome, FetchError> {
        let destination = request.destination();

        debug!("Stage: {}", Stage::InitEngine);
        let session = self.engine.init().map_err(FetchError::EngineInit)?;

        debug!("Stage: {}", Stage::CreateRepository);
        let repository = self
            .engine
            .create_repository(&session, destination)
            .map_err(|source| FetchError::Repository {
                path: destination.to_path_buf(),
                source,
            })?;

        debug!("Stage: {}", Stage::CreateRemote);
        let mut remote = self
            .engine
            .create_remote(&repository, REMOTE_NAME, &request.remote_url)
            .map_err(|source| FetchError::Remote {
                url: request.remote_url.clone(),
                source,
            })?;

        debug!("Stage: {}", Stage::Fetch);
        let transport = request.transport();
        debug!(
            "Fetching {} at depth {} over {}",
            request.ref_spec, FETCH_DEPTH, transport
        );
        if transport.is_local() {
            warn!(
                "libgit2 does not support shallow fetches over the local transport, \
                 the fetch is likely to fail"
            );
        }
        let mut tracking = AbortTracking {
            inner: observer,
            aborted: false,
        };
        let stats = self
            .engine
            .fetch(
                &repository,
                &mut remote,
                &[request.ref_spec.as_str()],
                FETCH_DEPTH,
                &mut tracking,
            )
            .map_err(|source| FetchError::Transfer {
                ref_spec: request.ref_spec.clone(),
                kind: TransferFailure::classify(&source, tracking.aborted),
                source,
            })?;
        debug!(
            "Received {} objects ({} bytes)",
            stats.received_objects, stats.received_bytes
        );

        let shallow = self.engine.is_shallow(&repository);
        if shallow {
            debug!("Repository at {} is shallow", destination.display());
        } else {
            warn!(
                "Repository at {} does not report itself as shallow",
                destination.display()
            );
        }

        debug!("Stage: {}", Stage::Resolve);
        let target = self
            .engine
            .resolve(&repository, FETCH_HEAD)
            .map_err(|source| FetchError::Resolve {
                spec: FETCH_HEAD.to_string(),
                source,
            })?;
        let commit = self.engine.object_id(&target);
        trace!("{} resolved to {}", FETCH_HEAD, commit);

        debug!("Stage: {}", Stage::Checkout);
        self.engine
            .reset(&repository, &target)
            .map_err(|source| FetchError::Checkout { source })?;

        drop(target);
        drop(remote);
        drop(repository);
        drop(session);

        info!(
            "Checked out {} ({}) into {}",
            request.ref_spec,
            commit,
            destination.display()
        );

        Ok(FetchOutcome {
            commit,
            shallow,
            stats,
        })
    }
}

/// Records whether the wrapped observer asked to stop the transfer.
struct AbortTracking<'a> {
    inner: &'a mut dyn ProgressObserver,
    aborted: bool,
}

impl ProgressObserver for AbortTracking<'_> {
    fn on_progress(&mut self, stats: &FetchStats) -> Progress {
        let progress = self.inner.on_progress(stats);
        if progress == Progress::Abort {
            self.aborted = true;
        }
        progress
    }
}

/// Leaves `path` as an empty directory, whatever was there before.
pub fn prepare_destination(path: &Path) -> Result<(), FetchError> {
    let filesystem_error = |source: io::Error| FetchError::Filesystem {
        path: path.to_path_buf(),
        source,
    };

    match remove_path(path) {
        Ok(true) => debug!("Removed existing {}", path.display()),
        Ok(false) => {}
        Err(error) => return Err(filesystem_error(error)),
    }
    std::fs::create_dir_all(path).map_err(filesystem_error)?;
    trace!("Created empty directory {}", path.display());
    Ok(())
}

/// Removes a file, symlink or directory tree. Symlinks are not followed.
fn remove_path(path: &Path) -> io::Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(true)
}
