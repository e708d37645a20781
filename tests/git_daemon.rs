//! End-to-end fetches over the `git://` protocol from a local `git daemon`.
//!
//! Skipped when `git daemon` cannot be started.

use std::{
    net::{Ipv4Addr, TcpListener, TcpStream},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use git2::{Config, Oid, Repository, Signature};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use shallowref::{
    fetch::{Stage, TransferFailure},
    FetchRequest, ShallowRef,
};

/// An upstream repository served by `git daemon` on a free local port.
struct Upstream {
    dir: TempDir,
    daemon: Child,
    port: u16,
    first: Oid,
    second: Oid,
}

impl Upstream {
    /// Two commits on `main`, the first one tagged `v1.2.3` (annotated).
    fn start() -> Option<Self> {
        let dir = TempDir::new().expect("failed to create temp dir");
        let repo = Repository::init(dir.path().join("up")).unwrap();
        repo.set_head("refs/heads/main").unwrap();
        repo.config()
            .unwrap()
            .set_bool("uploadpack.allowReachableSHA1InWant", true)
            .unwrap();
        let first = commit_files(&repo, &[("a.txt", "first\n")], "first");
        let second = commit_files(&repo, &[("a.txt", "second\n"), ("b.txt", "b\n")], "second");
        let signature = Signature::now("Test User", "test@example.com").unwrap();
        repo.tag(
            "v1.2.3",
            &repo.find_object(first, None).unwrap(),
            &signature,
            "release",
            false,
        )
        .unwrap();

        let port = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .ok()?
            .local_addr()
            .ok()?
            .port();
        let base = dir.path().to_string_lossy().to_string();
        let daemon = Command::new("git")
            .arg("daemon")
            .arg("--reuseaddr")
            .arg("--export-all")
            .arg("--listen=127.0.0.1")
            .arg(format!("--port={port}"))
            .arg(format!("--base-path={base}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .ok()?;

        let upstream = Upstream {
            dir,
            daemon,
            port,
            first,
            second,
        };
        upstream.wait_until_listening().then_some(upstream)
    }

    fn wait_until_listening(&self) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if TcpStream::connect((Ipv4Addr::LOCALHOST, self.port)).is_ok() {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        eprintln!("git daemon did not start listening on port {}", self.port);
        false
    }

    fn url(&self) -> String {
        format!("git://127.0.0.1:{}/up", self.port)
    }

    fn destination(&self) -> PathBuf {
        self.dir.path().join("out")
    }
}

impl Drop for Upstream {
    fn drop(&mut self) {
        let _ = self.daemon.kill();
        let _ = self.daemon.wait();
    }
}

macro_rules! upstream_or_skip {
    () => {
        match Upstream::start() {
            Some(upstream) => upstream,
            None => {
                eprintln!("skipping: git daemon is not available");
                return;
            }
        }
    };
}

fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (name, content) in files {
        std::fs::write(workdir.join(name), content).unwrap();
        index.add_path(Path::new(name)).unwrap();
    }
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::now("Test User", "test@example.com").unwrap();
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
}

fn shallow_ref() -> ShallowRef {
    ShallowRef::builder()
        .git_config(Config::new().unwrap())
        .try_build()
        .unwrap()
}

fn reachable_commits(path: &Path) -> usize {
    let repo = Repository::open(path).unwrap();
    let mut walk = repo.revwalk().unwrap();
    walk.push_head().unwrap();
    walk.count()
}

#[test]
fn fetches_branch_tip_shallow_into_clean_directory() {
    let upstream = upstream_or_skip!();
    let request = FetchRequest::new(upstream.url(), "main", upstream.destination()).unwrap();
    std::fs::create_dir_all(request.destination()).unwrap();
    std::fs::write(request.destination().join("stale.txt"), "old").unwrap();

    let outcome = shallow_ref().fetch(&request).unwrap();

    assert_eq!(outcome.commit, upstream.second);
    assert!(outcome.shallow);
    assert!(!request.destination().join("stale.txt").exists());
    assert_eq!(
        std::fs::read_to_string(request.destination().join("a.txt")).unwrap(),
        "second\n"
    );
    assert!(request.destination().join("b.txt").is_file());
    assert!(Repository::open(request.destination()).unwrap().is_shallow());
    assert_eq!(reachable_commits(request.destination()), 1);
}

#[test]
fn fetches_annotated_tag_as_its_commit() {
    let upstream = upstream_or_skip!();
    let request = FetchRequest::new(upstream.url(), "v1.2.3", upstream.destination()).unwrap();

    let outcome = shallow_ref().fetch(&request).unwrap();

    assert_eq!(outcome.commit, upstream.first);
    let repo = Repository::open(request.destination()).unwrap();
    assert_eq!(repo.head().unwrap().peel_to_commit().unwrap().id(), upstream.first);
    assert_eq!(
        std::fs::read_to_string(request.destination().join("a.txt")).unwrap(),
        "first\n"
    );
    assert!(!request.destination().join("b.txt").exists());
}

#[test]
fn fetches_commit_by_full_sha() {
    let upstream = upstream_or_skip!();
    let request = FetchRequest::new(
        upstream.url(),
        upstream.second.to_string(),
        upstream.destination(),
    )
    .unwrap();

    let outcome = shallow_ref().fetch(&request).unwrap();

    assert_eq!(outcome.commit, upstream.second);
}

#[test]
fn missing_ref_fails_at_fetch_as_not_found() {
    let upstream = upstream_or_skip!();
    let request = FetchRequest::new(upstream.url(), "nope", upstream.destination()).unwrap();

    let error = shallow_ref().fetch(&request).unwrap_err();

    assert_eq!(error.stage(), Stage::Fetch);
    assert_eq!(error.transfer_failure(), Some(TransferFailure::NotFound));
    assert_eq!(error.exit_code(), 7);
    // The default policy keeps the initialized repository
    assert!(request.destination().join(".git").is_dir());
}
