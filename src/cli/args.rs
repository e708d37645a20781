use std::path::PathBuf;

use clap::Parser;

use crate::model::FailurePolicy;

/// Fetches a single branch, tag or commit at depth 1 and checks it out into a clean directory.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    /// Remote repository URL
    pub url: String,
    /// Branch, tag or commit to fetch
    #[clap(value_name = "REF")]
    pub ref_spec: String,
    /// Destination directory, wiped and recreated if it exists
    pub path: PathBuf,
    /// What to do with the destination if the fetch fails
    #[clap(long, value_name = "keep|remove")]
    pub on_failure: Option<FailurePolicy>,
    /// Abort the transfer after this many seconds
    #[clap(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
    /// Additional known_hosts file used to verify SSH host keys
    #[clap(long, value_name = "FILE")]
    pub known_hosts: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_positional_arguments() {
        let args = CliArgs::try_parse_from([
            "shallowref",
            "https://example.test/repo.git",
            "main",
            "/tmp/out",
        ])
        .unwrap();
        assert_eq!(args.url, "https://example.test/repo.git");
        assert_eq!(args.ref_spec, "main");
        assert_eq!(args.path, PathBuf::from("/tmp/out"));
        assert_eq!(args.on_failure, None);
        assert_eq!(args.timeout, None);
    }

    #[test]
    fn parse_options() {
        let args = CliArgs::try_parse_from([
            "shallowref",
            "--on-failure",
            "remove",
            "--timeout",
            "30",
            "git@example.test:org/repo.git",
            "v1.2.3",
            "out",
        ])
        .unwrap();
        assert_eq!(args.on_failure, Some(FailurePolicy::Remove));
        assert_eq!(args.timeout, Some(30));
    }

    #[test]
    fn missing_path_is_a_usage_error() {
        let error =
            CliArgs::try_parse_from(["shallowref", "https://example.test/repo.git", "main"])
                .unwrap_err();
        assert_eq!(error.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn invalid_failure_policy_is_rejected() {
        assert!(CliArgs::try_parse_from([
            "shallowref",
            "--on-failure",
            "wipe",
            "https://example.test/repo.git",
            "main",
            "out",
        ])
        .is_err());
    }
}
