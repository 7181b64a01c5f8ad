use std::collections::VecDeque;

use git2::{Oid, Repository, Revwalk, Sort};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, trace, warn};

use crate::git::RepoHandle;
use crate::git::diff::{FileDiff, diff_trees};
use crate::time_utils::git_time_to_datetime;
use crate::{AppError, AppResult};

/// A commit after the sync boundary together with what it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    #[serde(with = "crate::serde_helpers::offset_datetime")]
    pub time: OffsetDateTime,
    pub committer_name: String,
    pub committer_email: String,
    pub short_message: String,
    pub files: Vec<FileDiff>,
    pub modified_lines: usize,
}

/// Walk every commit reachable from any reference, newest first.
///
/// Topological order keeps children ahead of their parents when timestamps
/// tie or go backwards.
pub(crate) fn walk_all(repo: &Repository) -> AppResult<Revwalk<'_>> {
    let mut revwalk = repo.revwalk().map_err(AppError::RefResolution)?;
    revwalk
        .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
        .map_err(AppError::RefResolution)?;
    revwalk.push_glob("*").map_err(AppError::RefResolution)?;
    Ok(revwalk)
}

/// Turn the caller's boundary into a commit id.
///
/// Empty means a first sync. Full hashes are taken as is and simply never match
/// if they are unknown. Anything else goes through rev-parse, and an
/// unresolvable value also falls back to the full history.
fn resolve_boundary(repo: &Repository, boundary: &str) -> Option<Oid> {
    let boundary = boundary.trim();
    if boundary.is_empty() {
        return None;
    }
    if boundary.len() == 40
        && let Ok(oid) = Oid::from_str(boundary)
    {
        return (!oid.is_zero()).then_some(oid);
    }
    match repo
        .revparse_single(boundary)
        .and_then(|object| object.peel_to_commit())
    {
        Ok(commit) => Some(commit.id()),
        Err(e) => {
            warn!(
                "Boundary {} does not resolve ({}), diffing the full history",
                boundary, e
            );
            None
        }
    }
}

/// Oldest-first chain ending at the newest commit, starting at `boundary`
/// (inclusive) or at the root when the boundary is absent or never seen.
pub(crate) fn chronological_since(
    repo: &Repository,
    boundary: Option<Oid>,
) -> AppResult<VecDeque<Oid>> {
    let mut chain = VecDeque::new();
    for oid in walk_all(repo)? {
        let oid = oid.map_err(AppError::RefResolution)?;
        chain.push_front(oid);
        if Some(oid) == boundary {
            trace!("Reached boundary {}", oid);
            return Ok(chain);
        }
    }
    if let Some(boundary) = boundary {
        debug!("Boundary {} not in history, starting from the root", boundary);
    }
    Ok(chain)
}

fn to_record(commit: &git2::Commit<'_>, files: Vec<FileDiff>) -> AppResult<Commit> {
    let committer = commit.committer();
    let message = String::from_utf8_lossy(commit.message_bytes()).into_owned();
    let short_message = commit
        .summary()
        .map(str::to_owned)
        .unwrap_or_else(|| message.lines().next().unwrap_or_default().to_string());
    Ok(Commit {
        hash: commit.id().to_string(),
        time: git_time_to_datetime(commit.time())?,
        committer_name: String::from_utf8_lossy(committer.name_bytes()).into_owned(),
        committer_email: String::from_utf8_lossy(committer.email_bytes()).into_owned(),
        short_message,
        modified_lines: files.iter().map(|f| f.modified_lines).sum(),
        files,
        message,
    })
}

/// Every commit after `boundary`, oldest first, each diffed against the one
/// before it in the chain.
///
/// The first commit of the chain (the boundary itself, or the root on a first
/// sync) only seeds the previous tree and is not part of the result.
#[tracing::instrument(name = "Computing incremental diffs", level = "debug", skip(handle))]
pub fn compute_incremental_diffs(handle: &RepoHandle, boundary: &str) -> AppResult<Vec<Commit>> {
    let repo = handle.repository();
    let boundary = resolve_boundary(repo, boundary);
    let mut chain = chronological_since(repo, boundary)?;

    let Some(anchor) = chain.pop_front() else {
        debug!("Repository has no commits");
        return Ok(Vec::new());
    };
    let tree_of = |oid: Oid| {
        repo.find_commit(oid)
            .and_then(|commit| commit.tree().map(|tree| (commit, tree)))
            .map_err(|source| AppError::Diff {
                commit: oid.to_string(),
                source,
            })
    };

    let (_, mut previous_tree) = tree_of(anchor)?;
    let mut commits = Vec::with_capacity(chain.len());
    for oid in chain {
        let (commit, tree) = tree_of(oid)?;
        let files = diff_trees(repo, &previous_tree, &tree, oid)?;
        trace!("Commit {} touched {} file(s)", oid, files.len());
        commits.push(to_record(&commit, files)?);
        previous_tree = tree;
    }

    info!("Collected {} commit(s) after {}", commits.len(), anchor);
    Ok(commits)
}
