//! Filesystem-backed entry store.
//!
//! Each entry occupies one directory under the library root; the three
//! artifacts inside it (metadata record, snapshot, annotation collection)
//! share the entry's lifecycle but are read and written independently.
//! Entry existence is defined by the presence of the metadata record.
//!
//! Record writes are full-file replaces through a temp-file-then-rename,
//! so a crash mid-write can never leave a record that parses as
//! valid-but-wrong. Read-modify-write cycles on one entry are serialized
//! with a per-entry async mutex; operations on distinct entries share no
//! mutable state.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

use super::annotations::{self, Annotation};
use super::entry::{EntryId, Metadata, MetadataPatch};

const METADATA_FILE: &str = "metadata.json";
const SNAPSHOT_FILE: &str = "index.html";
const ANNOTATIONS_FILE: &str = "annotations.json";

/// Handle on one library root.
///
/// Holds no global state: open as many independent libraries (and tests)
/// in one process as needed.
pub struct Library {
    root: PathBuf,

    /// Per-entry locks serializing read-modify-write cycles. Entries are
    /// never pruned so a delete and a late writer on the same id keep
    /// contending on the same mutex.
    locks: Mutex<HashMap<EntryId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Library {
    /// Open a library rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(&root, e))?;

        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The library root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory an entry id maps to. Pure and deterministic.
    pub fn entry_dir(&self, id: EntryId) -> PathBuf {
        self.root.join(id.dir_name())
    }

    /// Location of the immutable snapshot document for an entry.
    pub fn snapshot_path(&self, id: EntryId) -> PathBuf {
        self.entry_dir(id).join(SNAPSHOT_FILE)
    }

    fn metadata_path(&self, id: EntryId) -> PathBuf {
        self.entry_dir(id).join(METADATA_FILE)
    }

    fn annotations_path(&self, id: EntryId) -> PathBuf {
        self.entry_dir(id).join(ANNOTATIONS_FILE)
    }

    /// Whether an entry exists (its metadata record is present).
    pub fn exists(&self, id: EntryId) -> bool {
        self.metadata_path(id).exists()
    }

    fn ensure_entry(&self, id: EntryId) -> Result<()> {
        if self.exists(id) {
            Ok(())
        } else {
            Err(StoreError::EntryNotFound { id })
        }
    }

    fn entry_lock(&self, id: EntryId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(id).or_default().clone()
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Read an entry's metadata record.
    pub async fn metadata(&self, id: EntryId) -> Result<Metadata> {
        self.read_metadata(id).await
    }

    /// Merge a partial-field patch into an entry's metadata and return
    /// the resulting full record.
    pub async fn update_metadata(&self, id: EntryId, patch: MetadataPatch) -> Result<Metadata> {
        let lock = self.entry_lock(id);
        let _guard = lock.lock().await;

        let mut meta = self.read_metadata(id).await?;
        meta.apply(patch);
        self.write_metadata(&meta).await?;
        Ok(meta)
    }

    /// Enumerate all entries whose metadata record is present and parses.
    ///
    /// One unreadable entry never fails the listing: it is logged and
    /// skipped. Hidden directories (import staging lives in them) are
    /// ignored. Most recently imported entries come first.
    pub async fn list(&self) -> Result<Vec<Metadata>> {
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        while let Some(dirent) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            if let Some(name) = dirent.file_name().to_str() {
                if name.starts_with('.') {
                    continue;
                }
                if !dirent
                    .file_type()
                    .await
                    .map_err(|e| StoreError::io(dirent.path(), e))?
                    .is_dir()
                {
                    continue;
                }

                let id: EntryId = match name.parse() {
                    Ok(id) => id,
                    Err(_) => {
                        warn!("Skipping unrecognized directory in library root: {}", name);
                        continue;
                    }
                };

                match self.read_metadata(id).await {
                    Ok(meta) => entries.push(meta),
                    Err(e) => warn!("Skipping unreadable entry {}: {}", id, e),
                }
            }
        }

        entries.sort_by(|a, b| {
            b.imported_date
                .cmp(&a.imported_date)
                .then_with(|| a.id.dir_name().cmp(&b.id.dir_name()))
        });

        Ok(entries)
    }

    async fn read_metadata(&self, id: EntryId) -> Result<Metadata> {
        let path = self.metadata_path(id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::EntryNotFound { id })
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        serde_json::from_str(&raw).map_err(|source| StoreError::CorruptState { id, path, source })
    }

    async fn write_metadata(&self, meta: &Metadata) -> Result<()> {
        let path = self.metadata_path(meta.id);
        atomic_write(&path, encode(meta)?.as_bytes()).await
    }

    // ------------------------------------------------------------------
    // Annotations
    // ------------------------------------------------------------------

    /// Read an entry's annotation collection in stored order.
    ///
    /// An entry with no annotation file yields an empty collection, not
    /// an error.
    pub async fn annotations(&self, id: EntryId) -> Result<Vec<Annotation>> {
        self.ensure_entry(id)?;
        self.read_annotations(id).await
    }

    /// Merge incoming annotations into an entry's collection, by id.
    ///
    /// Callers send only the deltas: existing ids are replaced in place,
    /// new ids appended in the order received.
    pub async fn upsert_annotations(&self, id: EntryId, incoming: Vec<Annotation>) -> Result<()> {
        if incoming.iter().any(|a| a.id.is_empty()) {
            return Err(StoreError::Validation {
                reason: "annotation id must be a non-empty string".to_string(),
            });
        }

        let lock = self.entry_lock(id);
        let _guard = lock.lock().await;

        self.ensure_entry(id)?;
        let mut stored = self.read_annotations(id).await?;
        annotations::merge(&mut stored, incoming);
        self.write_annotations(id, &stored).await
    }

    /// Remove every annotation whose id appears in `ids`; unknown ids are
    /// ignored.
    pub async fn delete_annotations(&self, id: EntryId, ids: &[String]) -> Result<()> {
        let lock = self.entry_lock(id);
        let _guard = lock.lock().await;

        self.ensure_entry(id)?;
        let mut stored = self.read_annotations(id).await?;
        let removed = annotations::remove(&mut stored, ids);
        debug!("Removed {} of {} requested annotations from {}", removed, ids.len(), id);
        self.write_annotations(id, &stored).await
    }

    async fn read_annotations(&self, id: EntryId) -> Result<Vec<Annotation>> {
        let path = self.annotations_path(id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        serde_json::from_str(&raw).map_err(|source| StoreError::CorruptState { id, path, source })
    }

    async fn write_annotations(&self, id: EntryId, stored: &[Annotation]) -> Result<()> {
        let path = self.annotations_path(id);
        atomic_write(&path, encode(&stored)?.as_bytes()).await
    }

    // ------------------------------------------------------------------
    // Entry lifecycle
    // ------------------------------------------------------------------

    /// Atomically create a fully-formed entry: snapshot, metadata record,
    /// empty annotation collection.
    ///
    /// The artifacts are staged in a hidden directory and published with a
    /// single rename, so readers and the listing either see the complete
    /// entry or nothing. Used by the import pipeline.
    pub async fn create_entry(&self, meta: &Metadata, snapshot: &str) -> Result<()> {
        let staging = self.root.join(format!(".import-{}", meta.id));
        let target = self.entry_dir(meta.id);

        if let Err(e) = self.stage_entry(&staging, meta, snapshot).await {
            remove_staging(&staging).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&staging, &target).await {
            remove_staging(&staging).await;
            return Err(StoreError::io(&target, e));
        }

        Ok(())
    }

    async fn stage_entry(&self, staging: &Path, meta: &Metadata, snapshot: &str) -> Result<()> {
        fs::create_dir_all(staging)
            .await
            .map_err(|e| StoreError::io(staging, e))?;

        let snapshot_path = staging.join(SNAPSHOT_FILE);
        fs::write(&snapshot_path, snapshot)
            .await
            .map_err(|e| StoreError::io(&snapshot_path, e))?;

        let annotations_path = staging.join(ANNOTATIONS_FILE);
        fs::write(&annotations_path, "[]")
            .await
            .map_err(|e| StoreError::io(&annotations_path, e))?;

        let metadata_path = staging.join(METADATA_FILE);
        fs::write(&metadata_path, encode(meta)?)
            .await
            .map_err(|e| StoreError::io(&metadata_path, e))?;

        Ok(())
    }

    /// Delete an entry and everything inside it.
    ///
    /// Idempotent: deleting an id with no entry succeeds.
    pub async fn delete(&self, id: EntryId) -> Result<()> {
        let lock = self.entry_lock(id);
        let _guard = lock.lock().await;

        let dir = self.entry_dir(id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }

    /// Read an entry's sanitized snapshot document.
    pub async fn snapshot(&self, id: EntryId) -> Result<String> {
        self.ensure_entry(id)?;
        let path = self.snapshot_path(id);
        fs::read_to_string(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| StoreError::Validation {
        reason: format!("unencodable record: {}", e),
    })
}

/// Write a record atomically: temp file in the same directory, sync,
/// rename over the target.
async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| StoreError::io(&temp_path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| StoreError::io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::io(&temp_path, e))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

async fn remove_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to clean up staging dir {}: {}", staging.display(), e);
        }
    }
}
