//! snapshelf - filesystem-backed document library
//!
//! A single-user store for imported web documents: each import fetches a
//! page, rewrites it into a self-contained snapshot, and persists it with
//! its metadata and reader annotations under a stable identifier.
//!
//! # Modules
//!
//! - `library`: Entry storage (metadata, snapshots, annotations)
//! - `import`: Fetch, sanitize and atomically create new entries
//! - `config`: Path and fetch configuration
//! - `error`: Typed store errors
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Import a document
//! snapshelf import https://arxiv.org/html/2301.00001
//!
//! # Browse the library
//! snapshelf list
//!
//! # Re-tag an entry
//! snapshelf tag <id> papers,to-read
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod library;

// Re-export main types at crate root for convenience
pub use error::StoreError;
pub use import::{FetchOptions, Importer};
pub use library::{Annotation, AnnotationTag, EntryId, Library, Metadata, MetadataPatch, TagKind};
