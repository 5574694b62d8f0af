//! The document store: id allocation, ingestion and checkout.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use revstore_config::{
    log_store_debug, log_store_error, log_store_info, log_store_warn, Config, RevisionPolicy,
    DEFAULT_NEXT_ID, DEFAULT_PERMISSIONS,
};
use tracing::field;
use tracing::instrument;
use walkdir::WalkDir;

use crate::error::{ErrorReporter, Result, StoreError};
use crate::fsops::{self, CopyError};
use crate::resolver::{self, RepositoryPathResolver};
use crate::{DocId, Revision};

/// Revision-controlled document store rooted at one directory.
///
/// Construction never touches the filesystem; the root only has to exist
/// once a path is resolved.
#[derive(Debug)]
pub struct DocumentStore {
    root: PathBuf,
    permissions: u32,
    resolver: RepositoryPathResolver,
    cleanup_on_failure: bool,
    next_id: Mutex<u64>,
    errors: ErrorReporter,
}

impl DocumentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            permissions: DEFAULT_PERMISSIONS,
            resolver: RepositoryPathResolver::default(),
            cleanup_on_failure: false,
            next_id: Mutex::new(DEFAULT_NEXT_ID),
            errors: ErrorReporter::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.repository_root())
            .with_permissions(config.repository.repository_permissions)
            .with_next_id(config.repository.next_id)
            .with_policy(config.resolve.latest)
            .with_cleanup_on_failure(config.write.cleanup_on_failure)
    }

    /// Mode for directories created by `add`.
    pub fn with_permissions(mut self, mode: u32) -> Self {
        self.permissions = mode;
        self
    }

    pub fn with_next_id(self, next_id: u64) -> Self {
        *self.counter() = next_id;
        self
    }

    pub fn with_policy(mut self, policy: RevisionPolicy) -> Self {
        self.resolver = RepositoryPathResolver::new(policy);
        self
    }

    /// Remove directories created by a failed add.
    pub fn with_cleanup_on_failure(mut self, enabled: bool) -> Self {
        self.cleanup_on_failure = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn permissions(&self) -> u32 {
        self.permissions
    }

    pub fn policy(&self) -> RevisionPolicy {
        self.resolver.policy()
    }

    /// Id the next successful `add` will return.
    pub fn next_id(&self) -> u64 {
        *self.counter()
    }

    /// Message of the most recent failed call, `""` if it succeeded.
    pub fn last_error(&self) -> String {
        self.errors.last_error()
    }

    /// Directory for (`doc_id`, `revision`), discovering the revision if omitted.
    pub fn repository_path(&self, doc_id: u64, revision: Option<u32>) -> Result<PathBuf> {
        self.errors
            .track(|| self.resolver.resolve(&self.root, doc_id, revision))
    }

    /// Register `source` as a new document at revision 0.
    ///
    /// The id is spent once the store starts writing, so a failed write is
    /// retried under a fresh id. A revision directory that already holds a
    /// payload is never overwritten.
    pub fn add<P: AsRef<Path>>(&self, source: P) -> Result<DocId> {
        self.add_with_revision(source, 0)
    }

    /// Register `source` as a new document at an explicit revision.
    pub fn add_with_revision<P: AsRef<Path>>(&self, source: P, revision: u32) -> Result<DocId> {
        self.errors
            .track(|| self.add_inner(source.as_ref(), revision))
    }

    /// Store another revision of an existing document.
    ///
    /// With `revision = None` the new revision is one past the highest one
    /// already recorded.
    pub fn add_revision<P: AsRef<Path>>(
        &self,
        doc_id: u64,
        source: P,
        revision: Option<u32>,
    ) -> Result<Revision> {
        self.errors
            .track(|| self.add_revision_inner(doc_id, source.as_ref(), revision))
    }

    /// Copy the stored payload of (`doc_id`, `revision`) into `dest_dir`.
    ///
    /// Returns the stored file's base name.
    pub fn checkout<P: AsRef<Path>>(
        &self,
        dest_dir: P,
        doc_id: u64,
        revision: Option<u32>,
    ) -> Result<String> {
        self.errors
            .track(|| self.checkout_inner(dest_dir.as_ref(), doc_id, revision))
    }

    /// Every revision of `doc_id`, ascending. Empty for unknown documents.
    pub fn revisions(&self, doc_id: u64) -> Result<Vec<Revision>> {
        self.errors.track(|| {
            let id = DocId::new(doc_id)?;
            resolver::list_revisions(&self.root, id)
        })
    }

    /// Full path of the stored payload file.
    pub fn payload_path(&self, doc_id: u64, revision: Option<u32>) -> Result<PathBuf> {
        self.errors.track(|| {
            let dir = self.resolver.resolve(&self.root, doc_id, revision)?;
            let name = stored_payload(&dir)?;
            Ok(dir.join(name))
        })
    }

    /// Every id with at least one revision directory, ascending.
    pub fn documents(&self) -> Result<Vec<DocId>> {
        self.errors.track(|| {
            let mut ids = BTreeSet::new();
            self.walk_revisions(|id, _, _| {
                ids.insert(id);
                Ok(())
            })?;
            Ok(ids.into_iter().collect())
        })
    }

    /// Statistics about the repository.
    ///
    /// Traverses every canonical revision directory under the root.
    pub fn stats(&self) -> Result<StoreStats> {
        self.errors.track(|| {
            let mut ids = BTreeSet::new();
            let mut stats = StoreStats::default();
            self.walk_revisions(|id, _, dir| {
                ids.insert(id);
                stats.revision_count += 1;
                stats.total_bytes += revision_bytes(dir)?;
                Ok(())
            })?;
            stats.document_count = ids.len() as u64;
            Ok(stats)
        })
    }

    /// Move the counter past every id already on disk. Never lowers it.
    pub fn recover_next_id(&self) -> Result<u64> {
        self.errors.track(|| {
            let mut max = 0u64;
            self.walk_revisions(|id, _, _| {
                max = max.max(id.get());
                Ok(())
            })?;
            let mut next = self.counter();
            *next = (*next).max(max + 1);
            log_store_info!("Recovered id counter", next_id = *next);
            Ok(*next)
        })
    }

    #[instrument(skip(self, source), fields(source = %source.display()), level = "debug")]
    fn add_inner(&self, source: &Path, revision: u32) -> Result<DocId> {
        let name = validate_source(source)?;
        let revision = Revision::new(revision)?;

        // Held for the whole add so concurrent callers never share an id.
        let mut next = self.counter();
        let id = match *next {
            0 => return Err(StoreError::invalid("id counter must start at 1, not 0")),
            n if n > DocId::MAX => {
                return Err(StoreError::invalid(format!("document id space exhausted at {}", n)))
            }
            n => DocId::new(n)?,
        };

        let target = self.resolver.resolve_id(&self.root, id, Some(revision))?;

        // Storage is touched from here on: the id is spent even if the write fails.
        *next += 1;
        if let Err(err) = self.write_payload(&target, source, &name, OnExisting::Reject) {
            log_store_error!(
                "Add failed after allocating id",
                doc_id = id.get(),
                error = field::display(&err),
            );
            return Err(err);
        }

        log_store_info!(
            "Document added",
            doc_id = id.get(),
            revision = revision.get(),
            name = field::display(name.to_string_lossy()),
        );
        Ok(id)
    }

    #[instrument(skip(self, source), fields(source = %source.display()), level = "debug")]
    fn add_revision_inner(
        &self,
        doc_id: u64,
        source: &Path,
        revision: Option<u32>,
    ) -> Result<Revision> {
        let id = DocId::new(doc_id)?;
        let requested = revision.map(Revision::new).transpose()?;
        let name = validate_source(source)?;

        let existing = resolver::list_revisions(&self.root, id)?;
        let Some(highest) = existing.last() else {
            return Err(StoreError::not_found(
                &resolver::shard_dir(&self.root, id),
                format!("document {} has no revisions", id),
            ));
        };
        let revision = match requested {
            Some(rev) => rev,
            None => highest.next()?,
        };

        let target = self.resolver.resolve_id(&self.root, id, Some(revision))?;
        self.write_payload(&target, source, &name, OnExisting::Replace)?;

        log_store_info!(
            "Revision added",
            doc_id = id.get(),
            revision = revision.get(),
            name = field::display(name.to_string_lossy()),
        );
        Ok(revision)
    }

    #[instrument(skip(self, dest_dir), fields(dest = %dest_dir.display()), level = "debug")]
    fn checkout_inner(&self, dest_dir: &Path, doc_id: u64, revision: Option<u32>) -> Result<String> {
        let id = DocId::new(doc_id)?;
        let revision = revision.map(Revision::new).transpose()?;
        if !dest_dir.is_dir() {
            return Err(StoreError::invalid(format!(
                "destination {} is not an existing directory",
                dest_dir.display()
            )));
        }

        let dir = self.resolver.resolve_id(&self.root, id, revision)?;
        let name = stored_payload(&dir)?;
        let src = dir.join(&name);

        let bytes = copy_out(&src, dest_dir, &name)?;

        let name = name.to_string_lossy().into_owned();
        log_store_debug!("Checked out", doc_id = id.get(), name = name.as_str(), bytes = bytes);
        Ok(name)
    }

    /// Create `target` and copy `source` into it, keeping it a single-payload directory.
    fn write_payload(
        &self,
        target: &Path,
        source: &Path,
        name: &OsString,
        on_existing: OnExisting,
    ) -> Result<()> {
        let mut created = Vec::new();
        let result = fsops::create_dir_tree(target, self.permissions, &mut created)
            .map_err(|e| StoreError::write(target, e))
            .and_then(|()| self.replace_payload(target, source, name, on_existing));

        if result.is_err() && self.cleanup_on_failure {
            if let Some(top) = created.first() {
                match fs::remove_dir_all(top) {
                    Ok(()) => log_store_debug!("Removed partial tree", path = field::display(top.display())),
                    Err(e) => log_store_warn!(
                        "Failed to remove partial tree",
                        path = field::display(top.display()),
                        error = field::display(&e),
                    ),
                }
            }
        }
        result
    }

    fn replace_payload(
        &self,
        target: &Path,
        source: &Path,
        name: &OsString,
        on_existing: OnExisting,
    ) -> Result<()> {
        let existing = fsops::list_payloads(target).map_err(|e| StoreError::write(target, e))?;
        if on_existing == OnExisting::Reject {
            if let Some(held) = existing.first() {
                return Err(StoreError::write(
                    &target.join(held),
                    io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "revision directory already holds a payload",
                    ),
                ));
            }
        }
        for stale in existing.iter().filter(|n| *n != name) {
            let path = target.join(stale);
            log_store_warn!("Replacing existing payload", path = field::display(path.display()));
            fs::remove_file(&path).map_err(|e| StoreError::write(&path, e))?;
        }

        fsops::copy_atomic(source, target, name).map_err(|e| match e {
            CopyError::Read(e) | CopyError::Write(e) => StoreError::write(&target.join(name), e),
        })?;
        Ok(())
    }

    fn walk_revisions(
        &self,
        mut visit: impl FnMut(DocId, Revision, &Path) -> Result<()>,
    ) -> Result<()> {
        resolver::require_root(&self.root)?;

        let walker = WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(4)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !fsops::is_hidden(e.file_name()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                StoreError::unavailable(&path, e.into())
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if let Some((id, rev)) = resolver::parse_shard_path(relative) {
                visit(id, rev, entry.path())?;
            }
        }
        Ok(())
    }

    fn counter(&self) -> MutexGuard<'_, u64> {
        self.next_id.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What `write_payload` does with payloads already in the target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnExisting {
    /// A fresh id must land in an empty directory.
    Reject,
    /// A re-written revision drops whatever it held before.
    Replace,
}

/// Copy a stored payload out of the repository.
fn copy_out(src: &Path, dest_dir: &Path, name: &OsString) -> Result<u64> {
    fsops::copy_atomic(src, dest_dir, name).map_err(|e| match e {
        CopyError::Read(e) => StoreError::read(src, e),
        CopyError::Write(e) => StoreError::write(&dest_dir.join(name), e),
    })
}

/// Payload bytes held by one revision directory.
fn revision_bytes(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for name in fsops::list_payloads(dir).map_err(|e| StoreError::unavailable(dir, e))? {
        let path = dir.join(&name);
        total += fs::metadata(&path)
            .map_err(|e| StoreError::unavailable(&path, e))?
            .len();
    }
    Ok(total)
}

fn validate_source(source: &Path) -> Result<OsString> {
    let meta = fs::metadata(source).map_err(|e| {
        StoreError::invalid(format!("source file {}: {}", source.display(), e))
    })?;
    if !meta.is_file() {
        return Err(StoreError::invalid(format!(
            "source {} is not a regular file",
            source.display()
        )));
    }
    fs::File::open(source).map_err(|e| {
        StoreError::invalid(format!("source file {} is not readable: {}", source.display(), e))
    })?;
    source
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| StoreError::invalid(format!("source {} has no file name", source.display())))
}

fn stored_payload(dir: &Path) -> Result<OsString> {
    let names = fsops::list_payloads(dir).map_err(|e| StoreError::not_found(dir, e.to_string()))?;
    names
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::not_found(dir, "no payload file"))
}

/// Statistics about the repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Documents with at least one revision
    pub document_count: u64,
    /// Revision directories across all documents
    pub revision_count: u64,
    /// Payload bytes across all revisions
    pub total_bytes: u64,
}

impl StoreStats {
    pub fn avg_payload_size(&self) -> u64 {
        if self.revision_count == 0 {
            0
        } else {
            self.total_bytes / self.revision_count
        }
    }
}
