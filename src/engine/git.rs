use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use git2::{
    build::CheckoutBuilder, cert::Cert, AutotagOption, CertificateCheckStatus, Config, Cred,
    CredentialType, ErrorClass, ErrorCode, FetchOptions, Object, ObjectType, Oid, Remote,
    RemoteCallbacks, Repository, ResetType, Version,
};
use log::{debug, trace, warn};

use super::{known_hosts::KnownHostsVerifier, Engine, FetchStats, Progress, ProgressObserver};

/// Oldest libgit2 able to negotiate shallow fetches.
const MIN_LIBGIT2_VERSION: (u32, u32, u32) = (1, 7, 0);
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

static ACTIVE_SESSIONS: AtomicUsize = AtomicUsize::new(0);

/// Number of [`GitSession`]s currently alive in this process.
pub fn active_sessions() -> usize {
    ACTIVE_SESSIONS.load(Ordering::SeqCst)
}

/// Balanced reference on libgit2's global state.
///
/// git2 initializes libgit2 lazily and never shuts it down, so the session
/// only accounts for its holders.
#[derive(Debug)]
pub struct GitSession {
    _private: (),
}

impl Drop for GitSession {
    fn drop(&mut self) {
        let remaining = ACTIVE_SESSIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        trace!("Released git engine session ({} still active)", remaining);
    }
}

/// [`Engine`] backed by libgit2.
pub struct GitEngine {
    git_config: Config,
    known_hosts: KnownHostsVerifier,
}

impl GitEngine {
    pub fn new(git_config: Config, extra_known_hosts: Option<PathBuf>) -> GitEngine {
        GitEngine {
            git_config,
            known_hosts: KnownHostsVerifier::new(extra_known_hosts),
        }
    }

    fn fetch_options<'a>(&'a self, observer: &'a mut dyn ProgressObserver) -> FetchOptions<'a> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempts = 0;
        callbacks.credentials(move |url, username, allowed_types| {
            trace!(
                "Requested credentials for {}, username {:?}, allowed types {:?}",
                url,
                username,
                allowed_types
            );
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Callback,
                    format!(
                        "authentication failed for {url} after {MAX_CREDENTIAL_ATTEMPTS} attempts"
                    ),
                ));
            }
            // Asking for ssh username
            if allowed_types.contains(CredentialType::USERNAME) {
                return Cred::username("git");
            }
            // SSH auth
            if allowed_types.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username.unwrap_or("git"));
            }
            // HTTP auth
            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Cred::credential_helper(&self.git_config, url, username);
            }
            Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Callback,
                "no valid authentication available",
            ))
        });

        callbacks.certificate_check(move |certificate, host| {
            self.check_certificate(certificate, host)
        });

        callbacks.transfer_progress(move |progress| {
            observer.on_progress(&FetchStats::from(&progress)) == Progress::Continue
        });

        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(callbacks)
            .download_tags(AutotagOption::None);
        fetch_options
    }

    fn check_certificate(
        &self,
        certificate: &Cert<'_>,
        host: &str,
    ) -> Result<CertificateCheckStatus, git2::Error> {
        if let Some(hostkey) = certificate.as_hostkey().and_then(|h| h.hostkey()) {
            if self.known_hosts.is_known(host, hostkey) {
                return Ok(CertificateCheckStatus::CertificateOk);
            }
        }
        Ok(CertificateCheckStatus::CertificatePassthrough)
    }
}

impl Engine for GitEngine {
    type Session = GitSession;
    type Repository = Repository;
    type Remote<'repo> = Remote<'repo>;
    type Object<'repo> = Object<'repo>;

    fn init(&self) -> Result<GitSession, git2::Error> {
        let version = Version::get();
        let libgit2 = version.libgit2_version();
        debug!(
            "Using libgit2 {}.{}.{} (https: {}, ssh: {}, threads: {})",
            libgit2.0,
            libgit2.1,
            libgit2.2,
            version.https(),
            version.ssh(),
            version.threads()
        );
        if libgit2 < MIN_LIBGIT2_VERSION {
            return Err(git2::Error::from_str(&format!(
                "libgit2 {}.{}.{} does not support shallow fetches, {}.{}.{} or newer is required",
                libgit2.0,
                libgit2.1,
                libgit2.2,
                MIN_LIBGIT2_VERSION.0,
                MIN_LIBGIT2_VERSION.1,
                MIN_LIBGIT2_VERSION.2
            )));
        }
        let active = ACTIVE_SESSIONS.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Acquired git engine session ({} active)", active);
        Ok(GitSession { _private: () })
    }

    fn create_repository(
        &self,
        _session: &GitSession,
        path: &Path,
    ) -> Result<Repository, git2::Error> {
        trace!("Creating a new repository at {}", path.display());
        Repository::init(path)
    }

    fn create_remote<'repo>(
        &self,
        repository: &'repo Repository,
        name: &str,
        url: &str,
    ) -> Result<Remote<'repo>, git2::Error> {
        trace!("Adding remote {} -> {}", name, url);
        repository.remote(name, url)
    }

    fn fetch(
        &self,
        repository: &Repository,
        remote: &mut Remote<'_>,
        refspecs: &[&str],
        depth: i32,
        observer: &mut dyn ProgressObserver,
    ) -> Result<FetchStats, git2::Error> {
        let mut fetch_options = self.fetch_options(observer);
        fetch_options.depth(depth);
        remote.fetch(refspecs, Some(&mut fetch_options), None)?;
        drop(fetch_options);
        ensure_fetched_refs(repository, refspecs)?;

        let stats = FetchStats::from(&remote.stats());
        if stats.received_objects == 0 && stats.local_objects == 0 {
            warn!("Fetch from {:?} transferred no objects", remote.url());
        }
        Ok(stats)
    }

    fn is_shallow(&self, repository: &Repository) -> bool {
        repository.is_shallow()
    }

    fn resolve<'repo>(
        &self,
        repository: &'repo Repository,
        spec: &str,
    ) -> Result<Object<'repo>, git2::Error> {
        repository.revparse_single(spec)?.peel(ObjectType::Commit)
    }

    fn reset(&self, repository: &Repository, target: &Object<'_>) -> Result<(), git2::Error> {
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repository.reset(target, ResetType::Hard, Some(&mut checkout))
    }

    fn object_id(&self, object: &Object<'_>) -> Oid {
        object.id()
    }
}

/// libgit2 does not fail a fetch whose refspecs match nothing on the remote,
/// it only leaves FETCH_HEAD empty.
fn ensure_fetched_refs(repository: &Repository, refspecs: &[&str]) -> Result<(), git2::Error> {
    let mut entries = 0;
    match repository.fetchhead_foreach(|name, _url, oid, _is_merge| {
        trace!("Fetched {} at {}", name, oid);
        entries += 1;
        true
    }) {
        Ok(()) => {}
        Err(error) if error.code() == ErrorCode::NotFound => {}
        Err(error) => return Err(error),
    }
    if entries == 0 {
        return Err(git2::Error::new(
            ErrorCode::NotFound,
            ErrorClass::Reference,
            format!("couldn't find remote ref {}", refspecs.join(" ")),
        ));
    }
    Ok(())
}
