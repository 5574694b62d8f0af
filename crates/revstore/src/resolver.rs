//! Sharded path derivation and revision resolution.
//!
//! ```text
//! root / [M{id/1_000_000:03}] / [k{(id/1000)%1000:03}] / {id%1000:03} / {revision:03}
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use revstore_config::{log_resolve_debug, RevisionPolicy};

use crate::error::{Result, StoreError};
use crate::{DocId, Revision};

/// Directory segments between the repository root and the revision segment.
pub fn shard_segments(id: DocId) -> Vec<String> {
    let id = id.get();
    let mut segments = Vec::with_capacity(3);
    if id > 999_999 {
        segments.push(format!("M{:03}", id / 1_000_000));
    }
    if id > 999 {
        segments.push(format!("k{:03}", (id / 1000) % 1000));
    }
    segments.push(format!("{:03}", id % 1000));
    segments
}

/// The ones-level shard directory: parent of every revision directory of `id`.
pub fn shard_dir(root: &Path, id: DocId) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in shard_segments(id) {
        path.push(segment);
    }
    path
}

/// Directory holding the payload of (`id`, `revision`).
pub fn revision_dir(root: &Path, id: DocId, revision: Revision) -> PathBuf {
    shard_dir(root, id).join(revision.segment())
}

/// True for non-empty names made only of ASCII digits.
pub fn is_numeric_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// Invert [`revision_dir`]: map a path relative to the root back to its
/// (`id`, `revision`). Only canonical layouts are accepted.
pub fn parse_shard_path(relative: &Path) -> Option<(DocId, Revision)> {
    let segments = relative
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<&str>>>()?;

    let (rev, shards) = segments.split_last()?;
    if !is_numeric_name(rev) || rev.len() != 3 || shards.is_empty() || shards.len() > 3 {
        return None;
    }

    let three_digits = |s: &str| -> Option<u64> {
        if s.len() == 3 && is_numeric_name(s) {
            s.parse().ok()
        } else {
            None
        }
    };

    let (ones, prefixes) = shards.split_last()?;
    let mut id = three_digits(*ones)?;
    for prefix in prefixes {
        if let Some(k) = prefix.strip_prefix('k') {
            id += three_digits(k)? * 1000;
        } else if let Some(m) = prefix.strip_prefix('M') {
            id += three_digits(m)? * 1_000_000;
        } else {
            return None;
        }
    }

    let id = DocId::new(id).ok()?;
    let revision = Revision::new(rev.parse().ok()?).ok()?;

    // Reject e.g. "k000/005/000" or "M000/..." which no id produces.
    (shard_segments(id) == shards).then_some((id, revision))
}

/// Every numeric revision recorded for `id`, ascending.
///
/// A document with no shard directory yields an empty list; any other
/// listing failure is [`StoreError::RepositoryUnavailable`].
pub fn list_revisions(root: &Path, id: DocId) -> Result<Vec<Revision>> {
    require_root(root)?;
    let dir = shard_dir(root, id);
    match numeric_entries(&dir) {
        Ok(revs) => Ok(revs),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StoreError::unavailable(&dir, e)),
    }
}

fn numeric_entries(dir: &Path) -> io::Result<Vec<Revision>> {
    let mut revs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_numeric_name(name) {
            continue;
        }
        // Names beyond the three-digit range are not ours.
        if let Some(rev) = name.parse::<u32>().ok().and_then(|n| Revision::new(n).ok()) {
            revs.push(rev);
        }
    }
    revs.sort_unstable();
    revs.dedup();
    Ok(revs)
}

pub(crate) fn require_root(root: &Path) -> Result<()> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(StoreError::unavailable(
            root,
            io::Error::other("repository root is not a directory"),
        )),
        Err(e) => Err(StoreError::unavailable(root, e)),
    }
}

/// Resolves (root, id, revision?) to a revision directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryPathResolver {
    policy: RevisionPolicy,
}

impl RepositoryPathResolver {
    pub fn new(policy: RevisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RevisionPolicy {
        self.policy
    }

    /// Resolve with untyped inputs, validating them first.
    ///
    /// An explicit revision is used verbatim and its directory is not checked.
    /// An omitted revision is discovered from the shard directory according
    /// to the policy.
    pub fn resolve(&self, root: &Path, doc_id: u64, revision: Option<u32>) -> Result<PathBuf> {
        let id = DocId::new(doc_id)?;
        let revision = revision.map(Revision::new).transpose()?;
        self.resolve_id(root, id, revision)
    }

    pub fn resolve_id(&self, root: &Path, id: DocId, revision: Option<Revision>) -> Result<PathBuf> {
        require_root(root)?;

        let revision = match revision {
            Some(rev) => rev,
            None => self.discover(root, id)?,
        };

        let path = revision_dir(root, id, revision);
        log_resolve_debug!("Resolved", doc_id = id.get(), revision = revision.get());
        Ok(path)
    }

    fn discover(&self, root: &Path, id: DocId) -> Result<Revision> {
        let dir = shard_dir(root, id);
        let revs = numeric_entries(&dir).map_err(|e| StoreError::unavailable(&dir, e))?;
        let picked = match self.policy {
            RevisionPolicy::Lowest => revs.first(),
            RevisionPolicy::Highest => revs.last(),
        };
        picked
            .copied()
            .ok_or_else(|| StoreError::not_found(&dir, "no revisions recorded"))
    }
}

/// Resolve with the default (lowest-revision) policy.
pub fn repository_path(root: &Path, doc_id: u64, revision: Option<u32>) -> Result<PathBuf> {
    RepositoryPathResolver::default().resolve(root, doc_id, revision)
}
