//! Entry identifiers and metadata records.
//!
//! Every imported document lives in one directory named after its id. The
//! id is allocated once at import time and never changes; collision
//! freedom comes from the identifier's entropy, not from coordination
//! between importers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for one library entry (a UUID v4 rendered as text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Allocate a fresh id for a new entry.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The directory name this id maps to.
    pub fn dir_name(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Descriptive record stored alongside each snapshot.
///
/// Field names follow the on-disk JSON produced at import time; the `id`
/// inside the record always matches the entry's directory name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Entry identifier, duplicated into the record for self-description.
    pub id: EntryId,

    /// Display title derived at import time (editable afterwards).
    pub title: String,

    /// Origin URL the snapshot was imported from.
    pub url: String,

    /// When the import completed.
    pub imported_date: DateTime<Utc>,

    /// User-assigned labels, ordered.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Metadata {
    /// Create the record written at import time.
    pub fn new(id: EntryId, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            imported_date: Utc::now(),
            tags: Vec::new(),
        }
    }

    /// Apply a partial-field patch, replacing each present field whole.
    ///
    /// `id` and `importedDate` are not patchable; a patched `tags` list
    /// replaces the previous list rather than merging into it.
    pub fn apply(&mut self, patch: MetadataPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(url) = patch.url {
            self.url = url;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
    }
}

/// Partial metadata update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    pub title: Option<String>,
    pub url: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl MetadataPatch {
    /// Patch that replaces only the title.
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Patch that replaces the whole tag list.
    pub fn tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags),
            ..Self::default()
        }
    }
}
