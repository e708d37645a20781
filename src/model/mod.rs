use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
    sync::OnceLock,
};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing value for `{0}`")]
    MissingValue(&'static str),
    #[error("Invalid failure policy `{0}` (expected `keep` or `remove`)")]
    InvalidFailurePolicy(String),
}

/// A single shallow materialization: which ref to take from which remote, and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub remote_url: String,
    pub ref_spec: String,
    pub destination_path: PathBuf,
}

impl FetchRequest {
    pub fn new(
        remote_url: impl Into<String>,
        ref_spec: impl Into<String>,
        destination_path: impl Into<PathBuf>,
    ) -> Result<FetchRequest, ParseError> {
        let request = FetchRequest {
            remote_url: remote_url.into(),
            ref_spec: ref_spec.into(),
            destination_path: destination_path.into(),
        };
        if request.remote_url.trim().is_empty() {
            return Err(ParseError::MissingValue("url"));
        }
        if request.ref_spec.trim().is_empty() {
            return Err(ParseError::MissingValue("ref"));
        }
        if request.destination_path.as_os_str().is_empty() {
            return Err(ParseError::MissingValue("path"));
        }
        Ok(request)
    }

    pub fn destination(&self) -> &Path {
        &self.destination_path
    }

    pub fn transport(&self) -> Transport {
        Transport::detect(&self.remote_url)
    }
}

impl Display for FetchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}@{} -> {}",
            self.remote_url,
            self.ref_spec,
            self.destination_path.display()
        )
    }
}

/// How a remote URL will be reached by the git engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transport {
    Https,
    Http,
    Ssh,
    /// `user@host:path`
    Scp,
    Git,
    File,
    /// A plain filesystem path.
    Local,
    Other(String),
}

impl Transport {
    pub fn detect(url: &str) -> Transport {
        static SCHEME: OnceLock<Regex> = OnceLock::new();
        static SCP: OnceLock<Regex> = OnceLock::new();

        let scheme = SCHEME.get_or_init(|| {
            Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://").expect("valid scheme regex")
        });
        if let Some(captures) = scheme.captures(url) {
            let scheme = captures["scheme"].to_ascii_lowercase();
            return match scheme.as_str() {
                "https" => Transport::Https,
                "http" => Transport::Http,
                "ssh" | "git+ssh" | "ssh+git" => Transport::Ssh,
                "git" => Transport::Git,
                "file" => Transport::File,
                _ => Transport::Other(scheme),
            };
        }

        let scp = SCP.get_or_init(|| {
            Regex::new(r"^(?:[^@/]+@)?(?P<host>[^:/]+):(?P<path>.*)$").expect("valid scp regex")
        });
        match scp.captures(url) {
            // A single letter before the colon is a Windows drive, not a host
            Some(captures) if captures["host"].len() > 1 => Transport::Scp,
            _ => Transport::Local,
        }
    }

    /// Whether the engine reaches the remote through its local (filesystem) transport.
    pub fn is_local(&self) -> bool {
        matches!(self, Transport::File | Transport::Local)
    }
}

impl Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Transport::Https => f.write_str("https"),
            Transport::Http => f.write_str("http"),
            Transport::Ssh => f.write_str("ssh"),
            Transport::Scp => f.write_str("ssh (scp-like)"),
            Transport::Git => f.write_str("git"),
            Transport::File => f.write_str("file"),
            Transport::Local => f.write_str("local"),
            Transport::Other(scheme) => f.write_str(scheme),
        }
    }
}

/// What happens to the destination directory when a step after its preparation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum FailurePolicy {
    /// Leave the partially initialized repository for inspection.
    #[default]
    #[serde(rename = "keep")]
    Keep,
    #[serde(rename = "remove")]
    Remove,
}

impl FromStr for FailurePolicy {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.to_ascii_lowercase();
        match value.as_str() {
            "keep" => Ok(FailurePolicy::Keep),
            "remove" => Ok(FailurePolicy::Remove),
            _ => Err(ParseError::InvalidFailurePolicy(value)),
        }
    }
}

impl TryFrom<String> for FailurePolicy {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FailurePolicy::Keep => f.write_str("keep"),
            FailurePolicy::Remove => f.write_str("remove"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn detect_url_transports() {
        let cases = [
            ("https://github.com/org/repo.git", Transport::Https),
            ("HTTP://example.test/repo", Transport::Http),
            ("ssh://git@github.com/org/repo.git", Transport::Ssh),
            ("git+ssh://git@github.com/org/repo.git", Transport::Ssh),
            ("git://example.test/repo", Transport::Git),
            ("file:///srv/git/repo.git", Transport::File),
            ("git@github.com:org/repo.git", Transport::Scp),
            ("github.com:org/repo.git", Transport::Scp),
            ("/srv/git/repo.git", Transport::Local),
            ("../repo", Transport::Local),
            ("C:\\git\\repo", Transport::Local),
            ("s3://bucket/repo", Transport::Other("s3".to_string())),
        ];
        for (url, expected) in cases {
            assert_eq!(Transport::detect(url), expected, "{url}");
        }
    }

    #[test]
    fn local_transports() {
        assert!(Transport::Local.is_local());
        assert!(Transport::File.is_local());
        assert!(!Transport::Scp.is_local());
        assert!(!Transport::Https.is_local());
    }

    #[test]
    fn request_rejects_empty_values() {
        assert_eq!(
            FetchRequest::new("", "main", "/tmp/out"),
            Err(ParseError::MissingValue("url"))
        );
        assert_eq!(
            FetchRequest::new("https://example.test/repo.git", " ", "/tmp/out"),
            Err(ParseError::MissingValue("ref"))
        );
        assert_eq!(
            FetchRequest::new("https://example.test/repo.git", "main", ""),
            Err(ParseError::MissingValue("path"))
        );
    }

    #[test]
    fn request_display() {
        let request =
            FetchRequest::new("https://example.test/repo.git", "v1.2.3", "/tmp/out").unwrap();
        assert_eq!(
            request.to_string(),
            "https://example.test/repo.git@v1.2.3 -> /tmp/out"
        );
        assert_eq!(request.transport(), Transport::Https);
    }

    #[test]
    fn parse_failure_policy() {
        assert_eq!(FailurePolicy::from_str("keep"), Ok(FailurePolicy::Keep));
        assert_eq!(FailurePolicy::from_str("Remove"), Ok(FailurePolicy::Remove));
        assert_eq!(
            FailurePolicy::from_str("wipe"),
            Err(ParseError::InvalidFailurePolicy("wipe".to_string()))
        );
        assert_eq!(FailurePolicy::default(), FailurePolicy::Keep);
    }
}
