//! Deterministic repositories for tests.

use git2::{Oid, Repository, Signature, Time};
use tempfile::TempDir;

use crate::git::RepoHandle;

const EPOCH: i64 = 1_700_000_000;

/// A bare repository whose `HEAD` is `refs/heads/main`.
pub(crate) struct Fixture {
    pub dir: TempDir,
    pub repo: Repository,
    /// Commits in creation order.
    pub commits: Vec<Oid>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let repo = Repository::init_bare(dir.path()).expect("init bare repository");
        repo.set_head("refs/heads/main").expect("point HEAD at main");
        Self {
            dir,
            repo,
            commits: Vec::new(),
        }
    }

    /// `count` commits on main, the n-th one growing `file.txt` to n lines.
    pub fn linear(count: usize) -> Self {
        let mut fixture = Self::new();
        for n in 1..=count {
            let content = Self::content(n);
            fixture.commit(&format!("commit {n}"), &[("file.txt", Some(&content))]);
        }
        fixture
    }

    /// Content of `file.txt` after `n` commits of [`Fixture::linear`].
    pub fn content(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    pub fn url(&self) -> String {
        self.dir.path().display().to_string()
    }

    pub fn handle(&self) -> RepoHandle {
        RepoHandle::open(self.dir.path()).expect("open fixture")
    }

    /// Commit on top of main.
    pub fn commit(&mut self, message: &str, changes: &[(&str, Option<&str>)]) -> Oid {
        let parents: Vec<Oid> = self
            .repo
            .refname_to_id("refs/heads/main")
            .into_iter()
            .collect();
        self.commit_on("refs/heads/main", &parents, message, changes)
    }

    /// Commit with explicit parents, starting from the first parent's tree.
    ///
    /// `None` content removes the file. Paths are top-level file names.
    pub fn commit_on(
        &mut self,
        refname: &str,
        parents: &[Oid],
        message: &str,
        changes: &[(&str, Option<&str>)],
    ) -> Oid {
        let repo = &self.repo;
        let parent_commits: Vec<git2::Commit<'_>> = parents
            .iter()
            .map(|oid| repo.find_commit(*oid).expect("parent commit"))
            .collect();
        let base_tree = parent_commits
            .first()
            .map(|commit| commit.tree().expect("parent tree"));

        let mut builder = repo.treebuilder(base_tree.as_ref()).expect("treebuilder");
        for (path, content) in changes {
            match content {
                Some(content) => {
                    let blob = repo.blob(content.as_bytes()).expect("blob");
                    builder.insert(path, blob, 0o100644).expect("insert");
                }
                None => builder.remove(path).expect("remove"),
            }
        }
        let tree = repo
            .find_tree(builder.write().expect("write tree"))
            .expect("tree");

        let when = Time::new(EPOCH + 60 * self.commits.len() as i64, 0);
        let sig = Signature::new("Fixture", "fixture@example.com", &when).expect("signature");
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();
        let oid = repo
            .commit(Some(refname), &sig, &sig, message, &tree, &parent_refs)
            .expect("commit");
        self.commits.push(oid);
        oid
    }

    /// Delete a loose object, leaving anything that points at it dangling.
    pub fn remove_object(&self, oid: Oid) {
        let hex = oid.to_string();
        let path = self.dir.path().join("objects").join(&hex[..2]).join(&hex[2..]);
        std::fs::remove_file(path).expect("remove loose object");
    }

    pub fn tag_lightweight(&self, name: &str, index: usize) {
        let target = self
            .repo
            .find_object(self.commits[index], None)
            .expect("tag target");
        self.repo
            .tag_lightweight(name, &target, false)
            .expect("lightweight tag");
    }

    pub fn tag_annotated(&self, name: &str, index: usize) {
        let target = self
            .repo
            .find_object(self.commits[index], None)
            .expect("tag target");
        let when = Time::new(EPOCH, 0);
        let sig = Signature::new("Fixture", "fixture@example.com", &when).expect("signature");
        self.repo
            .tag(name, &target, &sig, &format!("release {name}"), false)
            .expect("annotated tag");
    }
}
