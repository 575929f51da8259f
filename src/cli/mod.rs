//! Command-line interface for snapshelf.
//!
//! Provides commands for importing documents, browsing the library,
//! editing metadata, and reconciling reader annotations.

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, ResolvedConfig};
use crate::error::StoreError;
use crate::import::Importer;
use crate::library::{Annotation, EntryId, Library, Metadata, MetadataPatch};

/// snapshelf - filesystem-backed document library
#[derive(Parser, Debug)]
#[command(name = "snapshelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a document from a URL
    Import {
        /// URL to fetch and snapshot
        url: String,

        /// Tags to apply to the new entry (comma-separated)
        #[arg(short, long)]
        tags: Option<String>,
    },

    /// List entries in the library
    List {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show an entry's metadata
    Show {
        /// Entry id
        id: String,
    },

    /// Replace an entry's title
    Rename {
        /// Entry id
        id: String,

        /// New title
        title: String,
    },

    /// Replace an entry's tag list
    Tag {
        /// Entry id
        id: String,

        /// New tags (comma-separated; empty string clears them)
        tags: String,
    },

    /// Delete an entry with its snapshot and annotations
    Delete {
        /// Entry id
        id: String,
    },

    /// List an entry's annotations
    Annotations {
        /// Entry id
        id: String,
    },

    /// Merge annotations into an entry from a JSON array
    Annotate {
        /// Entry id
        id: String,

        /// JSON file with an array of annotations (reads stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Remove annotations from an entry by annotation id
    Unannotate {
        /// Entry id
        id: String,

        /// Annotation ids to remove
        annotation_ids: Vec<String>,
    },

    /// Print an entry's snapshot document
    Snapshot {
        /// Entry id
        id: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Import { url, tags } => import_document(&url, tags).await,
            Commands::List { limit } => list_entries(limit).await,
            Commands::Show { id } => show_entry(&id).await,
            Commands::Rename { id, title } => rename_entry(&id, title).await,
            Commands::Tag { id, tags } => tag_entry(&id, &tags).await,
            Commands::Delete { id } => delete_entry(&id).await,
            Commands::Annotations { id } => list_annotations(&id).await,
            Commands::Annotate { id, input } => annotate_entry(&id, input).await,
            Commands::Unannotate { id, annotation_ids } => {
                unannotate_entry(&id, annotation_ids).await
            }
            Commands::Snapshot { id, output } => dump_snapshot(&id, output).await,
            Commands::Config => show_config(),
        }
    }
}

async fn open_library() -> Result<(Library, ResolvedConfig)> {
    let config = config::resolve()?;
    let library = Library::open(&config.library).await?;
    Ok((library, config))
}

fn parse_id(raw: &str) -> Result<EntryId> {
    raw.parse()
        .with_context(|| format!("Invalid entry id: {}", raw))
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut)
}

fn print_metadata(meta: &Metadata) {
    println!("Id:       {}", meta.id);
    println!("Title:    {}", meta.title);
    println!("Url:      {}", meta.url);
    println!("Imported: {}", meta.imported_date);
    println!(
        "Tags:     {}",
        if meta.tags.is_empty() {
            "-".to_string()
        } else {
            meta.tags.join(", ")
        }
    );
}

/// Import a document and optionally tag it right away
async fn import_document(url: &str, tags: Option<String>) -> Result<()> {
    let (library, config) = open_library().await?;
    let importer = Importer::new(config.fetch.clone());

    let mut meta = importer.import(&library, url).await?;

    if let Some(raw_tags) = tags {
        let tag_list = split_tags(&raw_tags);
        if !tag_list.is_empty() {
            meta = library
                .update_metadata(meta.id, MetadataPatch::tags(tag_list))
                .await?;
        }
    }

    println!("Imported '{}'", meta.title);
    print_metadata(&meta);
    Ok(())
}

/// List library entries, most recently imported first
async fn list_entries(limit: usize) -> Result<()> {
    let (library, _) = open_library().await?;
    let entries = library.list().await?;

    if entries.is_empty() {
        println!("Library is empty. Import something with: snapshelf import <url>");
        return Ok(());
    }

    println!("{:<38} {:<20} {}", "ID", "IMPORTED", "TITLE");
    println!("{}", "-".repeat(100));

    for meta in entries.iter().take(limit) {
        println!(
            "{:<38} {:<20} {}",
            meta.id,
            meta.imported_date.format("%Y-%m-%d %H:%M:%S"),
            truncate(&meta.title, 40)
        );
    }

    if entries.len() > limit {
        println!("... and {} more", entries.len() - limit);
    }

    Ok(())
}

/// Show one entry's metadata and annotation count
async fn show_entry(raw_id: &str) -> Result<()> {
    let id = parse_id(raw_id)?;
    let (library, _) = open_library().await?;

    let meta = library.metadata(id).await?;
    print_metadata(&meta);

    match library.annotations(id).await {
        Ok(annotations) => println!("Annotations: {}", annotations.len()),
        Err(StoreError::CorruptState { .. }) => println!("Annotations: unreadable"),
        Err(e) => return Err(e.into()),
    }
    println!("Snapshot: {}", library.snapshot_path(id).display());

    Ok(())
}

async fn rename_entry(raw_id: &str, title: String) -> Result<()> {
    let id = parse_id(raw_id)?;
    let (library, _) = open_library().await?;

    let meta = library
        .update_metadata(id, MetadataPatch::title(title))
        .await?;
    println!("Renamed {} to '{}'", id, meta.title);
    Ok(())
}

async fn tag_entry(raw_id: &str, raw_tags: &str) -> Result<()> {
    let id = parse_id(raw_id)?;
    let (library, _) = open_library().await?;

    let meta = library
        .update_metadata(id, MetadataPatch::tags(split_tags(raw_tags)))
        .await?;
    println!(
        "Tagged {}: {}",
        id,
        if meta.tags.is_empty() {
            "-".to_string()
        } else {
            meta.tags.join(", ")
        }
    );
    Ok(())
}

async fn delete_entry(raw_id: &str) -> Result<()> {
    let id = parse_id(raw_id)?;
    let (library, _) = open_library().await?;

    library.delete(id).await?;
    println!("Deleted {}", id);
    Ok(())
}

async fn list_annotations(raw_id: &str) -> Result<()> {
    let id = parse_id(raw_id)?;
    let (library, _) = open_library().await?;

    let annotations = library.annotations(id).await?;
    if annotations.is_empty() {
        println!("No annotations");
        return Ok(());
    }

    println!("{:<24} {:<12} {}", "ID", "KIND", "TAGS");
    println!("{}", "-".repeat(60));
    for annotation in &annotations {
        let kind = annotation
            .payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let tags = annotation
            .tags
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<24} {:<12} {}",
            truncate(&annotation.id, 24),
            kind,
            tags
        );
    }

    Ok(())
}

/// Read an annotation batch from a file or stdin and merge it in
async fn annotate_entry(raw_id: &str, input: Option<PathBuf>) -> Result<()> {
    let id = parse_id(raw_id)?;

    let raw = if let Some(path) = input {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read annotation file: {}", path.display()))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read annotations from stdin")?;
        buffer
    };

    let annotations = parse_annotation_batch(&raw)?;
    let count = annotations.len();

    let (library, _) = open_library().await?;
    library.upsert_annotations(id, annotations).await?;

    println!("Stored {} annotation(s) for {}", count, id);
    Ok(())
}

/// Reject anything that is not a JSON array of annotation records before
/// touching the store.
fn parse_annotation_batch(raw: &str) -> Result<Vec<Annotation>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("Annotation payload is not valid JSON")?;

    if !value.is_array() {
        return Err(StoreError::Validation {
            reason: "annotation payload must be a JSON array".to_string(),
        }
        .into());
    }

    let annotations = serde_json::from_value(value).map_err(|e| StoreError::Validation {
        reason: format!("malformed annotation record: {}", e),
    })?;

    Ok(annotations)
}

async fn unannotate_entry(raw_id: &str, annotation_ids: Vec<String>) -> Result<()> {
    let id = parse_id(raw_id)?;
    if annotation_ids.is_empty() {
        anyhow::bail!("No annotation ids given");
    }

    let (library, _) = open_library().await?;
    library.delete_annotations(id, &annotation_ids).await?;

    println!("Removed matching annotations from {}", id);
    Ok(())
}

async fn dump_snapshot(raw_id: &str, output: Option<PathBuf>) -> Result<()> {
    let id = parse_id(raw_id)?;
    let (library, _) = open_library().await?;

    let snapshot = library.snapshot(id).await?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, snapshot)
                .await
                .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
            println!("Wrote snapshot of {} to {}", id, path.display());
        }
        None => print!("{}", snapshot),
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let config = config::resolve()?;

    println!("Home:        {}", config.home.display());
    println!("Library:     {}", config.library.display());
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none found)"),
    }
    println!("Fetch:");
    println!("  timeout:       {:?}", config.fetch.timeout);
    println!("  max redirects: {}", config.fetch.max_redirects);
    println!("  user agent:    {}", config.fetch.user_agent);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_tags(" , "), Vec::<String>::new());
        assert_eq!(split_tags(""), Vec::<String>::new());
    }

    #[test]
    fn test_parse_annotation_batch_rejects_non_array() {
        assert!(parse_annotation_batch("{\"id\": \"a\"}").is_err());
        assert!(parse_annotation_batch("not json").is_err());
        assert!(parse_annotation_batch("[]").unwrap().is_empty());
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly-ten", 11), "exactly-ten");
        assert_eq!(truncate("much longer than that", 8), "much lo…");
    }
}
