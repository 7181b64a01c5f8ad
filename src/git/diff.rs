use std::path::Path;

use git2::{Delta, DiffFindOptions, DiffOptions, Oid, Patch, Repository, Tree};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::git::stat::{self, FileStat};
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileAction {
    Add,
    Modify,
    Delete,
    Rename,
}

/// One changed path within a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub action: FileAction,
    pub name: String,
    /// Source path of a rename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub stat: String,
    pub additions: usize,
    pub deletions: usize,
    pub modified_lines: usize,
}

/// Map a delta status to an action.
///
/// Distinct, non-empty source and destination paths always make a rename,
/// whatever libgit2 reported (copies included).
pub fn classify(status: Delta, old_path: Option<&str>, new_path: Option<&str>) -> FileAction {
    if let (Some(old), Some(new)) = (old_path, new_path)
        && !old.is_empty()
        && !new.is_empty()
        && old != new
    {
        return FileAction::Rename;
    }
    match status {
        Delta::Added | Delta::Untracked => FileAction::Add,
        Delta::Deleted => FileAction::Delete,
        Delta::Renamed => FileAction::Rename,
        _ => FileAction::Modify,
    }
}

#[tracing::instrument(level = "trace")]
fn get_diff_opts() -> DiffOptions {
    let mut opts = DiffOptions::new();
    opts.reverse(false)
        .include_typechange(true)
        .ignore_filemode(false)
        .ignore_submodules(false)
        .ignore_case(false)
        .skip_binary_check(false)
        .force_text(false)
        .ignore_whitespace(false)
        .minimal(false)
        .patience(true)
        .indent_heuristic(true);
    opts
}

fn path_string(path: Option<&Path>) -> Option<String> {
    path.map(|p| p.to_string_lossy().into_owned())
}

struct Change {
    action: FileAction,
    name: String,
    from: Option<String>,
    additions: usize,
    deletions: usize,
}

/// Diff `old` against `new` and turn every changed path into a [`FileDiff`].
///
/// `commit` only labels errors.
#[tracing::instrument(level = "trace", skip(repo, old, new))]
pub(crate) fn diff_trees(
    repo: &Repository,
    old: &Tree<'_>,
    new: &Tree<'_>,
    commit: Oid,
) -> AppResult<Vec<FileDiff>> {
    let diff_err = |source| AppError::Diff {
        commit: commit.to_string(),
        source,
    };

    let mut diff = repo
        .diff_tree_to_tree(Some(old), Some(new), Some(&mut get_diff_opts()))
        .map_err(diff_err)?;
    let mut find_opts = DiffFindOptions::new();
    find_opts.renames(true);
    diff.find_similar(Some(&mut find_opts)).map_err(diff_err)?;

    let mut changes = Vec::new();
    for (idx, delta) in diff.deltas().enumerate() {
        let old_path = path_string(delta.old_file().path());
        let new_path = path_string(delta.new_file().path());
        let action = classify(delta.status(), old_path.as_deref(), new_path.as_deref());

        // Binary files have no patch text and count as zero lines.
        let (additions, deletions) = match Patch::from_diff(&diff, idx).map_err(diff_err)? {
            Some(patch) => {
                let (_, additions, deletions) = patch.line_stats().map_err(diff_err)?;
                (additions, deletions)
            }
            None => (0, 0),
        };

        let name = match action {
            FileAction::Delete => old_path.clone().or(new_path),
            _ => new_path.or_else(|| old_path.clone()),
        }
        .unwrap_or_default();
        let from = if action == FileAction::Rename {
            old_path
        } else {
            None
        };
        trace!(
            "{:?} {} (+{} -{}) in {}",
            action, name, additions, deletions, commit
        );
        changes.push(Change {
            action,
            name,
            from,
            additions,
            deletions,
        });
    }

    let stats: Vec<FileStat<'_>> = changes
        .iter()
        .map(|change| FileStat {
            name: &change.name,
            additions: change.additions,
            deletions: change.deletions,
        })
        .collect();
    let rendered = stat::render(&stats);
    let fragments = rendered.lines().map(str::to_owned);

    Ok(changes
        .into_iter()
        .zip(fragments)
        .map(|(change, stat)| FileDiff {
            action: change.action,
            name: change.name,
            from: change.from,
            stat,
            additions: change.additions,
            deletions: change.deletions,
            modified_lines: change.additions + change.deletions,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testutil::Fixture;

    #[test]
    fn distinct_paths_are_always_a_rename() {
        for status in [Delta::Modified, Delta::Added, Delta::Deleted, Delta::Copied] {
            assert_eq!(classify(status, Some("a.txt"), Some("b.txt")), FileAction::Rename);
        }
    }

    #[test]
    fn same_or_missing_paths_keep_the_status() {
        assert_eq!(classify(Delta::Added, Some("a"), Some("a")), FileAction::Add);
        assert_eq!(classify(Delta::Deleted, Some("a"), Some("a")), FileAction::Delete);
        assert_eq!(classify(Delta::Modified, Some("a"), Some("a")), FileAction::Modify);
        assert_eq!(classify(Delta::Copied, Some(""), Some("b")), FileAction::Modify);
        assert_eq!(classify(Delta::Typechange, None, Some("b")), FileAction::Modify);
    }

    fn tree_of<'r>(fixture: &'r Fixture, index: usize) -> Tree<'r> {
        fixture
            .repo
            .find_commit(fixture.commits[index])
            .unwrap()
            .tree()
            .unwrap()
    }

    #[test]
    fn counts_lines_and_renders_stats() {
        let mut fixture = Fixture::new();
        fixture.commit(
            "base",
            &[("keep.txt", Some("a\nb\nc\n")), ("gone.txt", Some("x\ny\n"))],
        );
        fixture.commit(
            "change",
            &[
                ("keep.txt", Some("a\nB\nc\nd\n")),
                ("gone.txt", None),
                ("new.txt", Some("1\n2\n3\n")),
            ],
        );

        let files = diff_trees(
            &fixture.repo,
            &tree_of(&fixture, 0),
            &tree_of(&fixture, 1),
            fixture.commits[1],
        )
        .unwrap();

        let summary: Vec<(FileAction, &str, usize, usize, &str)> = files
            .iter()
            .map(|f| {
                (
                    f.action,
                    f.name.as_str(),
                    f.additions,
                    f.deletions,
                    f.stat.as_str(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (FileAction::Delete, "gone.txt", 0, 2, "2 --"),
                (FileAction::Modify, "keep.txt", 2, 1, "3 ++-"),
                (FileAction::Add, "new.txt", 3, 0, "3 +++"),
            ]
        );
        assert!(files.iter().all(|f| f.modified_lines == f.additions + f.deletions));
    }

    #[test]
    fn moved_file_is_reported_as_a_rename() {
        let mut fixture = Fixture::new();
        let body: String = (0..20).map(|i| format!("row {i}\n")).collect();
        fixture.commit("base", &[("old.txt", Some(&body))]);
        fixture.commit("move", &[("old.txt", None), ("new.txt", Some(&body))]);

        let files = diff_trees(
            &fixture.repo,
            &tree_of(&fixture, 0),
            &tree_of(&fixture, 1),
            fixture.commits[1],
        )
        .unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].action, FileAction::Rename);
        assert_eq!(files[0].name, "new.txt");
        assert_eq!(files[0].from.as_deref(), Some("old.txt"));
        assert_eq!(files[0].modified_lines, 0);
    }

    #[test]
    fn identical_trees_have_no_files() {
        let mut fixture = Fixture::new();
        fixture.commit("base", &[("a.txt", Some("a\n"))]);
        fixture.commit("empty", &[]);

        let files = diff_trees(
            &fixture.repo,
            &tree_of(&fixture, 0),
            &tree_of(&fixture, 1),
            fixture.commits[1],
        )
        .unwrap();
        assert!(files.is_empty());
    }
}
