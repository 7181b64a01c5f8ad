//! `<tag>-<distance>-g<hash>` labels relative to the closest reachable tag.
//!
//! Distance counts every commit the walk visits before reaching the tagged
//! one, across all parents of merges. On merge-heavy histories this is larger
//! than a first-parent count.

use std::collections::HashMap;

use git2::{Oid, Repository, Sort};
use tracing::{debug, trace};

use crate::git::RepoHandle;
use crate::git::refs::{RefKind, Reference, list_references};
use crate::{AppError, AppResult};

/// Length of the abbreviated head hash in a label.
pub const ABBREV_LEN: usize = 7;

/// Map tagged commits to tag names.
///
/// When several tags point at one commit the greatest name wins, so the
/// result does not depend on enumeration order.
fn tag_targets(references: &[Reference]) -> HashMap<Oid, &str> {
    let mut tags: HashMap<Oid, &str> = HashMap::new();
    for reference in references.iter().filter(|r| r.kind == RefKind::Tag) {
        let Some(target) = reference.target_oid() else {
            continue;
        };
        let name = reference.short_name();
        tags.entry(target)
            .and_modify(|current| {
                if name > *current {
                    *current = name;
                }
            })
            .or_insert(name);
    }
    tags
}

pub fn format_label(tag: &str, distance: usize, head: Oid) -> String {
    if distance == 0 {
        return tag.to_string();
    }
    let hex = head.to_string();
    format!("{tag}-{distance}-g{}", &hex[..ABBREV_LEN])
}

/// Label for `head` given an already enumerated reference set.
///
/// Empty when `head` is zero or no tag is reachable from it.
#[tracing::instrument(level = "debug", skip(repo, references))]
pub fn describe_with(repo: &Repository, references: &[Reference], head: Oid) -> AppResult<String> {
    if head.is_zero() {
        debug!("No branch head, nothing to describe");
        return Ok(String::new());
    }
    let tags = tag_targets(references);
    if tags.is_empty() {
        debug!("Repository has no tags");
        return Ok(String::new());
    }

    let mut revwalk = repo.revwalk().map_err(AppError::RefResolution)?;
    revwalk
        .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
        .map_err(AppError::RefResolution)?;
    revwalk.push(head).map_err(AppError::RefResolution)?;

    for (distance, oid) in revwalk.enumerate() {
        let oid = oid.map_err(AppError::RefResolution)?;
        if let Some(tag) = tags.get(&oid) {
            trace!("Closest tag {} is {} commit(s) away", tag, distance);
            return Ok(format_label(tag, distance, head));
        }
    }
    debug!("No tag reachable from {}", head);
    Ok(String::new())
}

/// Label for `head`, enumerating the repository's tags first.
pub fn describe(handle: &RepoHandle, head: Oid) -> AppResult<String> {
    if head.is_zero() {
        return Ok(String::new());
    }
    let references = list_references(handle.repository())?;
    describe_with(handle.repository(), &references, head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testutil::Fixture;

    fn abbrev(oid: Oid) -> String {
        oid.to_string()[..ABBREV_LEN].to_string()
    }

    #[test]
    fn head_on_tag_is_the_bare_name() {
        let fixture = Fixture::linear(2);
        fixture.tag_lightweight("v1.0.0", 1);
        let label = describe(&fixture.handle(), fixture.commits[1]).unwrap();
        assert_eq!(label, "v1.0.0");
    }

    #[test]
    fn three_commits_after_the_tag() {
        let fixture = Fixture::linear(4);
        fixture.tag_lightweight("v1.0.0", 0);
        let head = fixture.commits[3];
        let label = describe(&fixture.handle(), head).unwrap();
        assert_eq!(label, format!("v1.0.0-3-g{}", abbrev(head)));
    }

    #[test]
    fn closest_tag_wins() {
        let fixture = Fixture::linear(5);
        fixture.tag_lightweight("v1.0.0", 0);
        fixture.tag_annotated("v1.1.0", 2);
        let head = fixture.commits[4];
        let label = describe(&fixture.handle(), head).unwrap();
        assert_eq!(label, format!("v1.1.0-2-g{}", abbrev(head)));
    }

    #[test]
    fn tags_on_one_commit_pick_the_greatest_name() {
        let fixture = Fixture::linear(1);
        fixture.tag_lightweight("v1.0.0", 0);
        fixture.tag_lightweight("v1.0.0-rc1", 0);
        let label = describe(&fixture.handle(), fixture.commits[0]).unwrap();
        assert_eq!(label, "v1.0.0-rc1");
    }

    #[test]
    fn no_tag_or_no_head_is_empty() {
        let fixture = Fixture::linear(3);
        assert_eq!(describe(&fixture.handle(), fixture.commits[2]).unwrap(), "");

        fixture.tag_lightweight("v0.1.0", 0);
        assert_eq!(describe(&fixture.handle(), Oid::zero()).unwrap(), "");
    }

    #[test]
    fn tags_ahead_of_head_are_not_reachable() {
        let fixture = Fixture::linear(3);
        fixture.tag_lightweight("v2.0.0", 2);
        assert_eq!(describe(&fixture.handle(), fixture.commits[1]).unwrap(), "");
    }

    #[test]
    fn merge_distance_counts_both_parents() {
        // tag -- c2 -------- merge
        //    \-- side ----/
        let mut fixture = Fixture::linear(1);
        fixture.tag_lightweight("v1.0.0", 0);
        let tagged = fixture.commits[0];
        let main = fixture.commit("c2", &[("main.txt", Some("main\n"))]);
        let side = fixture.commit_on(
            "refs/heads/side",
            &[tagged],
            "side",
            &[("side.txt", Some("side\n"))],
        );
        let merge = fixture.commit_on(
            "refs/heads/main",
            &[main, side],
            "merge",
            &[("side.txt", Some("side\n"))],
        );

        let label = describe(&fixture.handle(), merge).unwrap();
        // first-parent distance would be 2
        assert_eq!(label, format!("v1.0.0-3-g{}", abbrev(merge)));
    }
}
