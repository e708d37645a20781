use std::path::PathBuf;

use home::home_dir;
use log::trace;
use ssh_key::{known_hosts::HostPatterns, KnownHosts};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";

/// Matches SSH host keys against OpenSSH known_hosts files.
#[derive(Debug, Clone)]
pub struct KnownHostsVerifier {
    files: Vec<PathBuf>,
}

impl KnownHostsVerifier {
    /// Reads the user's and the system's known_hosts, plus `extra` if given.
    pub fn new(extra: Option<PathBuf>) -> KnownHostsVerifier {
        let mut files = Vec::new();
        files.extend(extra);
        if let Some(home) = home_dir() {
            files.push(home.join(".ssh").join("known_hosts"));
        }
        files.push(PathBuf::from(GLOBAL_KNOWN_HOSTS));
        KnownHostsVerifier { files }
    }

    #[cfg(test)]
    pub(crate) fn with_files(files: Vec<PathBuf>) -> KnownHostsVerifier {
        KnownHostsVerifier { files }
    }

    pub fn is_known(&self, host: &str, hostkey: &[u8]) -> bool {
        let host = host.to_lowercase();
        for file in &self.files {
            trace!("Loading {}", file.display());
            let entries = match KnownHosts::read_file(file) {
                Ok(entries) => entries,
                Err(error) => {
                    trace!("Could not load {}: {}", file.display(), error);
                    continue;
                }
            };
            for entry in entries {
                if host_matches_patterns(&host, entry.host_patterns()) {
                    trace!(
                        "Found known host entry for {} ({})",
                        host,
                        entry.public_key().algorithm()
                    );
                    if entry.public_key().to_bytes().as_deref() == Ok(hostkey) {
                        trace!("Known host entry matches the host key");
                        return true;
                    }
                }
            }
        }
        trace!("No known host entry matched the host key for {}", host);
        false
    }
}

pub(crate) fn host_matches_patterns(host: &str, patterns: &HostPatterns) -> bool {
    match patterns {
        HostPatterns::Patterns(patterns) => {
            let mut match_found = false;
            for pattern in patterns {
                let pattern = pattern.to_lowercase();
                // * and ? wildcards are not supported
                if let Some(pattern) = pattern.strip_prefix('!') {
                    if pattern == host {
                        return false;
                    }
                } else {
                    match_found |= pattern == host;
                }
            }
            match_found
        }
        HostPatterns::HashedName { .. } => false,
    }
}
