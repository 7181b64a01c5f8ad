/// Tag-relative version labels.
pub mod describe;
/// Tree-to-tree diffs turned into per-file records.
pub(crate) mod diff;
/// Incremental commit history walk.
pub mod hist;
/// Progress forwarding during a transfer.
pub mod progress;
/// Reference snapshots.
pub mod refs;
/// Histogram rendering for per-file stats.
pub mod stat;
/// Cloning and checkout.
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

use std::fmt;
use std::path::{Path, PathBuf};

use git2::Repository;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tracing::info;

use crate::{AppError, AppResult};

pub(crate) use describe::{describe, describe_with};
pub(crate) use diff::FileAction;
pub(crate) use hist::{Commit, compute_incremental_diffs};
pub(crate) use refs::Reference;
pub(crate) use sync::{Credentials, SyncOptions, checkout, sync};

/// An opened working copy.
pub struct RepoHandle {
    repo: Repository,
    path: PathBuf,
}

impl fmt::Debug for RepoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RepoHandle {
    /// Open an existing repository (bare or not) at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let repo = Repository::open(&path).map_err(|source| AppError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self { repo, path })
    }

    pub(crate) fn from_parts(repo: Repository, path: PathBuf) -> Self {
        Self { repo, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }
}

/// Everything a sync hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub branch_head: String,
    pub version: String,
    pub needs_checkout: bool,
    pub references: Vec<Reference>,
    pub commits: Vec<Commit>,
}

/// Clone `options.url`, check out the branch and collect every commit after
/// `previous_commit` along with the version label of the branch head.
///
/// All or nothing: any failing stage discards the partial results.
#[tracing::instrument(
    name = "Synchronizing repository",
    level = "info",
    skip(options, progress),
    fields(url = %options.url, branch = %options.branch)
)]
pub async fn synchronize<W>(
    options: &SyncOptions,
    previous_commit: &str,
    progress: &mut W,
) -> AppResult<SyncReport>
where
    W: AsyncWrite + Unpin,
{
    let outcome = sync(options, progress).await?;
    let branch = options.branch.clone();
    let previous_commit = previous_commit.to_string();

    let report = tokio::task::spawn_blocking(move || -> AppResult<SyncReport> {
        checkout(
            &outcome.repo,
            &branch,
            outcome.branch_head,
            outcome.needs_checkout,
        )?;
        let commits = compute_incremental_diffs(&outcome.repo, &previous_commit)?;
        let version = describe_with(
            outcome.repo.repository(),
            &outcome.references,
            outcome.branch_head,
        )?;
        Ok(SyncReport {
            branch_head: outcome.branch_head.to_string(),
            version,
            needs_checkout: outcome.needs_checkout,
            references: outcome.references,
            commits,
        })
    })
    .await??;

    info!(
        "Synchronized {} new commit(s) into {}, head {} ({})",
        report.commits.len(),
        options.destination.display(),
        report.branch_head,
        if report.version.is_empty() {
            "untagged"
        } else {
            report.version.as_str()
        }
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testutil::Fixture;
    use std::time::Duration;

    fn options(fixture: &Fixture, dest: &Path, branch: &str) -> SyncOptions {
        SyncOptions {
            destination: dest.to_path_buf(),
            url: fixture.url(),
            branch: branch.to_string(),
            credentials: Credentials::None,
            timeout: Duration::from_secs(60),
            insecure_tls: false,
        }
    }

    #[tokio::test]
    async fn five_commit_history_with_tag_on_the_third() {
        let fixture = Fixture::linear(5);
        fixture.tag_lightweight("v1.0.0", 2);
        let dest = tempfile::TempDir::new().unwrap();

        let mut progress = Vec::new();
        let report = synchronize(&options(&fixture, dest.path(), "main"), "", &mut progress)
            .await
            .unwrap();

        let head = fixture.commits[4];
        assert_eq!(report.branch_head, head.to_string());
        assert!(!report.needs_checkout);

        let hashes: Vec<String> = report.commits.iter().map(|c| c.hash.clone()).collect();
        let expected: Vec<String> = fixture.commits[1..].iter().map(|c| c.to_string()).collect();
        assert_eq!(hashes, expected);

        assert_eq!(
            report.version,
            format!("v1.0.0-2-g{}", &head.to_string()[..7])
        );
    }

    #[tokio::test]
    async fn syncing_from_the_previous_head_yields_nothing() {
        let fixture = Fixture::linear(3);
        let dest = tempfile::TempDir::new().unwrap();
        let opts = options(&fixture, dest.path(), "main");

        let first = synchronize(&opts, "", &mut tokio::io::sink()).await.unwrap();
        assert_eq!(first.commits.len(), 2);

        let second = synchronize(&opts, &first.branch_head, &mut tokio::io::sink())
            .await
            .unwrap();
        assert!(second.commits.is_empty());
        assert_eq!(second.branch_head, first.branch_head);
    }

    #[tokio::test]
    async fn repeated_syncs_are_identical() {
        let mut fixture = Fixture::linear(2);
        let content = Fixture::content(2);
        fixture.commit("rename", &[("file.txt", None), ("moved.txt", Some(&content))]);
        let dest = tempfile::TempDir::new().unwrap();
        let opts = options(&fixture, dest.path(), "main");
        let boundary = fixture.commits[0].to_string();

        let first = synchronize(&opts, &boundary, &mut tokio::io::sink()).await.unwrap();
        let second = synchronize(&opts, &boundary, &mut tokio::io::sink()).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.commits.len(), 2);
    }
}
