use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc},
};

use git2::Config;

use crate::{engine::GitEngine, fetch::ShallowRefFetcher, model::FailurePolicy, ShallowRef};

#[derive(Default)]
pub struct ShallowRefBuilder {
    failure_policy: Option<FailurePolicy>,
    known_hosts: Option<PathBuf>,
    git_config: Option<Config>,
    cancelled: Option<Arc<AtomicBool>>,
}

impl ShallowRefBuilder {
    /// What to do with the destination when the fetch fails.
    ///
    /// Defaults to [`FailurePolicy::Keep`].
    pub fn failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = Some(failure_policy);
        self
    }

    /// An additional known_hosts file consulted before `~/.ssh/known_hosts`.
    pub fn known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    /// Git configuration used for credential helpers.
    ///
    /// Defaults to the user's global git configuration.
    pub fn git_config(mut self, git_config: Config) -> Self {
        self.git_config = Some(git_config);
        self
    }

    /// Shares an existing cancellation flag instead of creating a new one.
    pub fn cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(cancelled);
        self
    }

    pub fn try_build(self) -> Result<ShallowRef, git2::Error> {
        let Self {
            failure_policy,
            known_hosts,
            git_config,
            cancelled,
        } = self;

        let git_config = match git_config {
            Some(git_config) => git_config,
            None => Config::open_default()?,
        };

        let engine = GitEngine::new(git_config, known_hosts);
        let fetcher =
            ShallowRefFetcher::new(engine).with_failure_policy(failure_policy.unwrap_or_default());

        Ok(ShallowRef {
            fetcher,
            cancelled: cancelled.unwrap_or_default(),
        })
    }
}
