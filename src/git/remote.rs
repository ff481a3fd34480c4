use std::cell::Cell;
use std::path::Path;
use std::time::{Duration, Instant};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{CertificateCheckStatus, FetchOptions, RemoteCallbacks, Repository};

use crate::sync::error::FetchError;
use crate::sync::fetch::{Snapshot, SnapshotFetcher};

/// An upstream reference: `URL` or `URL#REF` where REF is a branch, tag or commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRef<'a> {
    pub url: &'a str,
    pub rev: Option<&'a str>,
}

impl<'a> UpstreamRef<'a> {
    pub fn parse(reference: &'a str) -> Result<Self, FetchError> {
        let malformed = |reason: &str| FetchError::Malformed {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(malformed("reference is empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(malformed("reference contains whitespace"));
        }

        let (url, rev) = match trimmed.split_once('#') {
            Some((url, rev)) => (url, Some(rev)),
            None => (trimmed, None),
        };
        if url.is_empty() {
            return Err(malformed("no repository location before `#`"));
        }
        if rev.is_some_and(|rev| rev.is_empty() || rev.contains('#')) {
            return Err(malformed("expected exactly one ref after `#`"));
        }
        Ok(Self { url, rev })
    }

    /// Remote transports support shallow fetches; local paths do not
    pub fn is_network(&self) -> bool {
        const SCHEMES: [&str; 4] = ["http://", "https://", "ssh://", "git://"];
        if SCHEMES.iter().any(|scheme| self.url.starts_with(scheme)) {
            return true;
        }
        // scp-like syntax: git@host:org/repo
        match self.url.split_once(':') {
            Some((host, _)) => host.contains('@') && !host.contains('/'),
            None => false,
        }
    }
}

/// Point in time after which a fetch is abandoned
#[derive(Debug, Clone, Copy)]
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// Bound how long libgit2 waits on a silent server while connecting or reading
fn limit_server_waits(timeout: Duration) {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX).max(1);
    // SAFETY: fetches run one after another, so no other libgit2 call reads these
    // options while they are being written
    let applied = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)
            .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(millis))
    };
    if let Err(e) = applied {
        tracing::debug!("Could not set git server timeouts: {}", e.message());
    }
}

/// Fetches lesson snapshots by cloning with git2
#[derive(Debug, Clone)]
pub struct GitFetcher {
    timeout: Duration,
    shallow: bool,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), true)
    }
}

impl GitFetcher {
    pub fn new(timeout: Duration, shallow: bool) -> Self {
        Self { timeout, shallow }
    }

    fn timeout_error(&self, reference: &str) -> FetchError {
        FetchError::Timeout {
            reference: reference.to_string(),
            after: self.timeout,
        }
    }

    fn clone_into(
        &self,
        upstream: &UpstreamRef<'_>,
        reference: &str,
        dest: &Path,
        deadline: Deadline,
    ) -> Result<Repository, FetchError> {
        let timed_out = Cell::new(false);
        let check = || {
            let expired = deadline.expired();
            if expired {
                timed_out.set(true);
            }
            expired
        };

        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|progress| {
            tracing::trace!(
                "Received {}/{} objects",
                progress.received_objects(),
                progress.total_objects()
            );
            !check()
        });
        callbacks.sideband_progress(|data| {
            tracing::trace!("remote: {}", String::from_utf8_lossy(data).trim_end());
            !check()
        });
        callbacks.certificate_check(|_, host| {
            if check() {
                let message = format!("deadline passed while connecting to {host}");
                return Err(git2::Error::from_str(&message));
            }
            Ok(CertificateCheckStatus::CertificatePassthrough)
        });

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);
        if upstream.is_network() {
            limit_server_waits(self.timeout);
            // A specific ref may sit deeper than the tip, so only plain clones go shallow
            if self.shallow && upstream.rev.is_none() {
                fetch_options.depth(1);
            }
        }

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options);

        let result = builder.clone(upstream.url, dest);
        let server_timeout = matches!(&result, Err(e) if e.message().contains("timed out"));
        if timed_out.get() || server_timeout || deadline.expired() {
            return Err(self.timeout_error(reference));
        }
        result.map_err(|e| FetchError::Unreachable {
            reference: reference.to_string(),
            message: e.message().to_string(),
        })
    }

    fn checkout_rev(repo: &Repository, rev: &str, reference: &str) -> Result<(), FetchError> {
        let unreachable = |e: git2::Error| FetchError::Unreachable {
            reference: reference.to_string(),
            message: e.message().to_string(),
        };

        let object = repo
            .revparse_single(rev)
            .or_else(|_| repo.revparse_single(&format!("origin/{rev}")))
            .map_err(|_| FetchError::Unreachable {
                reference: reference.to_string(),
                message: format!("ref `{rev}` not found"),
            })?;
        let commit = object.peel_to_commit().map_err(unreachable)?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        repo.checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(unreachable)?;
        repo.set_head_detached(commit.id()).map_err(unreachable)?;

        tracing::debug!("Checked out {} ({})", rev, commit.id());
        Ok(())
    }
}

impl SnapshotFetcher for GitFetcher {
    fn fetch(&self, reference: &str) -> Result<Snapshot, FetchError> {
        let upstream = UpstreamRef::parse(reference)?;
        let io_error = |source| FetchError::Io {
            reference: reference.to_string(),
            source,
        };

        let staging = tempfile::Builder::new()
            .prefix("lessonsync-")
            .tempdir()
            .map_err(io_error)?;
        let root = staging.path().join("snapshot");

        let deadline = Deadline::after(self.timeout);
        tracing::debug!("Cloning {} into {}", upstream.url, root.display());
        let repo = self.clone_into(&upstream, reference, &root, deadline)?;
        if let Some(rev) = upstream.rev {
            Self::checkout_rev(&repo, rev, reference)?;
            if deadline.expired() {
                return Err(self.timeout_error(reference));
            }
        }
        drop(repo);

        std::fs::remove_dir_all(root.join(".git")).map_err(io_error)?;

        let empty = std::fs::read_dir(&root).map_err(io_error)?.next().is_none();
        if empty {
            return Err(FetchError::Empty {
                reference: reference.to_string(),
            });
        }

        tracing::info!("Fetched snapshot of {}", reference);
        Ok(Snapshot::staged(root, staging))
    }
}
