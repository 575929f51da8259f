//! Document library: persistent storage for imported snapshots.
//!
//! One directory per entry holds three independently read/written
//! artifacts that share the entry's lifecycle.
//!
//! # Storage Layout
//!
//! ```text
//! ~/.snapshelf/
//! └── library/
//!     └── <entry-id>/           # UUID v4
//!         ├── metadata.json     # Title, URL, import date, tags
//!         ├── index.html        # Sanitized snapshot (immutable)
//!         └── annotations.json  # Reader annotations, ordered
//! ```

pub mod annotations;
pub mod entry;
pub mod store;

pub use annotations::{Annotation, AnnotationTag, TagKind};
pub use entry::{EntryId, Metadata, MetadataPatch};
pub use store::Library;
