use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::model::FailurePolicy;

/// Settings read from `SHALLOWREF_*` environment variables.
pub struct ShallowRefConfig {
    pub failure_policy: Option<FailurePolicy>,
    pub timeout: Option<Duration>,
    pub known_hosts: Option<PathBuf>,
}

impl ShallowRefConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self {
            failure_policy: raw_config.failure.policy,
            timeout: raw_config.fetch.timeout.map(Duration::from_secs),
            known_hosts: raw_config.ssh.knownhosts,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    failure: FailureConfig,
    #[serde(default)]
    fetch: FetchConfig,
    #[serde(default)]
    ssh: SshConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct FailureConfig {
    policy: Option<FailurePolicy>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct FetchConfig {
    /// Seconds
    timeout: Option<u64>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct SshConfig {
    knownhosts: Option<PathBuf>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("SHALLOWREF")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
