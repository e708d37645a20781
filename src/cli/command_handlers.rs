use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use log::{info, warn};

use crate::{
    cli::args::CliArgs,
    config::ShallowRefConfig,
    fetch::FetchOutcome,
    model::{FailurePolicy, FetchRequest},
    ShallowRef,
};

/// Options after merging the command line over the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub request: FetchRequest,
    pub failure_policy: FailurePolicy,
    pub timeout: Option<Duration>,
    pub known_hosts: Option<std::path::PathBuf>,
}

impl FetchSettings {
    pub fn resolve(args: CliArgs, config: ShallowRefConfig) -> anyhow::Result<FetchSettings> {
        let request = FetchRequest::new(args.url, args.ref_spec, args.path)?;
        Ok(FetchSettings {
            request,
            failure_policy: args
                .on_failure
                .or(config.failure_policy)
                .unwrap_or_default(),
            timeout: args.timeout.map(Duration::from_secs).or(config.timeout),
            known_hosts: args.known_hosts.or(config.known_hosts),
        })
    }
}

/// Handler for the single fetch command.
///
/// The blocking fetch runs on its own thread; Ctrl-C or the timeout raise the
/// cancellation flag and the handler still waits for teardown to finish.
pub async fn do_fetch(settings: FetchSettings) -> anyhow::Result<FetchOutcome> {
    let cancelled = Arc::new(AtomicBool::new(false));

    let FetchSettings {
        request,
        failure_policy,
        timeout,
        known_hosts,
    } = settings;

    let flag = cancelled.clone();
    let mut task = tokio::task::spawn_blocking(move || -> anyhow::Result<FetchOutcome> {
        let mut builder = ShallowRef::builder()
            .failure_policy(failure_policy)
            .cancel_flag(flag);
        if let Some(known_hosts) = known_hosts {
            builder = builder.known_hosts(known_hosts);
        }
        let shallow_ref = builder
            .try_build()
            .context("Could not load git configuration")?;
        Ok(shallow_ref.fetch(&request)?)
    });

    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = &mut task => return result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Could not listen for Ctrl-C")?;
            warn!("Interrupted, aborting the transfer");
        }
        _ = deadline => {
            warn!("Timed out after {:?}, aborting the transfer", timeout.unwrap_or_default());
        }
    }
    cancelled.store(true, Ordering::SeqCst);

    let outcome = task.await??;
    info!("Transfer completed before the cancellation took effect");
    Ok(outcome)
}
