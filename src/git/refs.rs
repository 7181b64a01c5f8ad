use git2::{Oid, Repository};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{AppError, AppResult};

/// What a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// Local or remote-tracking branch (and any other direct reference).
    Branch,
    Tag,
    Symbolic,
}

/// Read-only snapshot of one reference, taken right after a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    /// Commit the reference resolves to. Tags are peeled, so annotated and
    /// lightweight tags both report the tagged commit. Zero when the
    /// reference does not resolve to a commit.
    pub target: String,
    pub kind: RefKind,
}

impl Reference {
    pub fn target_oid(&self) -> Option<Oid> {
        Oid::from_str(&self.target).ok().filter(|oid| !oid.is_zero())
    }

    /// Tag name without the `refs/tags/` prefix.
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix("refs/tags/")
            .or_else(|| self.name.strip_prefix("refs/heads/"))
            .or_else(|| self.name.strip_prefix("refs/remotes/"))
            .unwrap_or(&self.name)
    }
}

/// Enumerate every reference in the repository, sorted by name.
#[tracing::instrument(level = "debug", skip(repo))]
pub fn list_references(repo: &Repository) -> AppResult<Vec<Reference>> {
    let mut references = Vec::new();
    for reference in repo.references().map_err(AppError::RefResolution)? {
        let reference = reference.map_err(AppError::RefResolution)?;
        let Some(name) = reference.name() else {
            debug!("Skipping reference with a non-utf8 name");
            continue;
        };
        let kind = if reference.kind() == Some(git2::ReferenceType::Symbolic) {
            RefKind::Symbolic
        } else if reference.is_tag() {
            RefKind::Tag
        } else {
            RefKind::Branch
        };
        // Tags may point at trees or blobs; those resolve to zero.
        let target = reference
            .peel_to_commit()
            .map(|commit| commit.id())
            .unwrap_or_else(|_| Oid::zero());
        trace!("Found reference {} -> {}", name, target);
        references.push(Reference {
            name: name.to_string(),
            target: target.to_string(),
            kind,
        });
    }
    references.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(references)
}

/// Find a reference by full name in a snapshot.
pub fn find<'a>(references: &'a [Reference], name: &str) -> Option<&'a Reference> {
    references.iter().find(|reference| reference.name == name)
}
