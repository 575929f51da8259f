//! Store Integration Tests
//!
//! Exercises the entry store end to end on a temporary library root:
//! entry lifecycle, metadata patching, annotation reconciliation, and
//! tolerance of damaged entries.

use std::sync::Arc;

use snapshelf::{Annotation, EntryId, Library, Metadata, MetadataPatch, StoreError};
use tempfile::TempDir;

async fn open_temp_library() -> (Library, TempDir) {
    let temp = TempDir::new().unwrap();
    let library = Library::open(temp.path().join("library")).await.unwrap();
    (library, temp)
}

async fn seed_entry(library: &Library, title: &str) -> Metadata {
    let meta = Metadata::new(EntryId::generate(), title, "https://example.com/doc.html");
    library
        .create_entry(&meta, "<html><body>snapshot</body></html>")
        .await
        .unwrap();
    meta
}

fn annotation(id: &str, comment: &str) -> Annotation {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "type": "highlight",
        "comment": comment,
        "tags": [{ "name": "note", "type": "user" }]
    }))
    .unwrap()
}

fn stored_ids(stored: &[Annotation]) -> Vec<&str> {
    stored.iter().map(|a| a.id.as_str()).collect()
}

#[tokio::test]
async fn test_created_entry_is_fully_readable() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "A Document").await;

    let stored = library.metadata(meta.id).await.unwrap();
    assert_eq!(stored.title, "A Document");
    assert_eq!(stored.url, "https://example.com/doc.html");

    let snapshot = library.snapshot(meta.id).await.unwrap();
    assert!(snapshot.contains("snapshot"));

    let annotations = library.annotations(meta.id).await.unwrap();
    assert!(annotations.is_empty());

    let listed = library.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, meta.id);
}

#[tokio::test]
async fn test_update_title_leaves_other_fields_untouched() {
    let (library, _temp) = open_temp_library().await;
    let mut meta = seed_entry(&library, "Before").await;
    meta = library
        .update_metadata(meta.id, MetadataPatch::tags(vec!["keep".to_string()]))
        .await
        .unwrap();

    let updated = library
        .update_metadata(meta.id, MetadataPatch::title("After"))
        .await
        .unwrap();

    assert_eq!(updated.title, "After");
    assert_eq!(updated.url, meta.url);
    assert_eq!(updated.tags, vec!["keep".to_string()]);
    assert_eq!(updated.imported_date, meta.imported_date);

    // And the change is durable, not just in the returned record.
    let reread = library.metadata(meta.id).await.unwrap();
    assert_eq!(reread.title, "After");
}

#[tokio::test]
async fn test_update_tags_replaces_whole_list() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "Doc").await;

    library
        .update_metadata(
            meta.id,
            MetadataPatch::tags(vec!["a".to_string(), "b".to_string()]),
        )
        .await
        .unwrap();

    let updated = library
        .update_metadata(meta.id, MetadataPatch::tags(vec!["c".to_string()]))
        .await
        .unwrap();

    assert_eq!(updated.tags, vec!["c".to_string()]);
}

#[tokio::test]
async fn test_operations_on_missing_entry_fail_typed() {
    let (library, _temp) = open_temp_library().await;
    let id = EntryId::generate();

    assert!(matches!(
        library.metadata(id).await.unwrap_err(),
        StoreError::EntryNotFound { .. }
    ));
    assert!(matches!(
        library
            .update_metadata(id, MetadataPatch::title("X"))
            .await
            .unwrap_err(),
        StoreError::EntryNotFound { .. }
    ));
    assert!(matches!(
        library.annotations(id).await.unwrap_err(),
        StoreError::EntryNotFound { .. }
    ));
    assert!(matches!(
        library
            .upsert_annotations(id, vec![annotation("a", "x")])
            .await
            .unwrap_err(),
        StoreError::EntryNotFound { .. }
    ));
    assert!(matches!(
        library.snapshot(id).await.unwrap_err(),
        StoreError::EntryNotFound { .. }
    ));
}

#[tokio::test]
async fn test_listing_skips_corrupt_entries() {
    let (library, _temp) = open_temp_library().await;
    let good = seed_entry(&library, "Good").await;
    let bad = seed_entry(&library, "Bad").await;

    let bad_metadata = library.entry_dir(bad.id).join("metadata.json");
    std::fs::write(&bad_metadata, "{ not json").unwrap();

    let listed = library.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, good.id);

    // Direct reads of the damaged entry surface the corruption.
    assert!(matches!(
        library.metadata(bad.id).await.unwrap_err(),
        StoreError::CorruptState { .. }
    ));
}

#[tokio::test]
async fn test_listing_ignores_foreign_and_hidden_directories() {
    let (library, _temp) = open_temp_library().await;
    seed_entry(&library, "Only").await;

    std::fs::create_dir(library.root().join("not-an-entry")).unwrap();
    std::fs::create_dir(library.root().join(".hidden")).unwrap();

    let listed = library.list().await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_listing_is_most_recent_first() {
    let (library, _temp) = open_temp_library().await;

    let mut older = Metadata::new(EntryId::generate(), "Older", "https://example.com/1");
    older.imported_date = older.imported_date - chrono::Duration::hours(1);
    library.create_entry(&older, "<html></html>").await.unwrap();

    let newer = seed_entry(&library, "Newer").await;

    let listed = library.list().await.unwrap();
    assert_eq!(listed[0].id, newer.id);
    assert_eq!(listed[1].id, older.id);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "Doomed").await;

    library.delete(meta.id).await.unwrap();
    assert!(library.list().await.unwrap().is_empty());
    assert!(!library.entry_dir(meta.id).exists());

    // Deleting again, and deleting an id that never existed, both succeed.
    library.delete(meta.id).await.unwrap();
    library.delete(EntryId::generate()).await.unwrap();
}

#[tokio::test]
async fn test_upsert_appends_and_replaces_by_id() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "Doc").await;

    library
        .upsert_annotations(meta.id, vec![annotation("a", "one"), annotation("b", "two")])
        .await
        .unwrap();

    // Replace one record, append another; untouched order is preserved.
    library
        .upsert_annotations(
            meta.id,
            vec![annotation("a", "revised"), annotation("c", "three")],
        )
        .await
        .unwrap();

    let stored = library.annotations(meta.id).await.unwrap();
    assert_eq!(stored_ids(&stored), vec!["a", "b", "c"]);
    assert_eq!(stored[0].payload["comment"], "revised");
    assert_eq!(stored[1].payload["comment"], "two");
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "Doc").await;

    let batch = vec![annotation("a", "one"), annotation("b", "two")];
    library
        .upsert_annotations(meta.id, batch.clone())
        .await
        .unwrap();
    let once = library.annotations(meta.id).await.unwrap();

    library.upsert_annotations(meta.id, batch).await.unwrap();
    let twice = library.annotations(meta.id).await.unwrap();

    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_delete_annotations_ignores_unknown_ids() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "Doc").await;

    library
        .upsert_annotations(meta.id, vec![annotation("a", "one"), annotation("b", "two")])
        .await
        .unwrap();

    let request = vec!["b".to_string(), "missing".to_string()];
    library.delete_annotations(meta.id, &request).await.unwrap();

    let stored = library.annotations(meta.id).await.unwrap();
    assert_eq!(stored_ids(&stored), vec!["a"]);

    // Replaying the same request is a no-op.
    library.delete_annotations(meta.id, &request).await.unwrap();
    let stored = library.annotations(meta.id).await.unwrap();
    assert_eq!(stored_ids(&stored), vec!["a"]);
}

#[tokio::test]
async fn test_corrupt_annotations_fail_only_that_collection() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "Doc").await;

    let annotations_path = library.entry_dir(meta.id).join("annotations.json");
    std::fs::write(&annotations_path, "[{ broken").unwrap();

    assert!(matches!(
        library.annotations(meta.id).await.unwrap_err(),
        StoreError::CorruptState { .. }
    ));
    // An upsert must not clobber the damaged collection either.
    assert!(matches!(
        library
            .upsert_annotations(meta.id, vec![annotation("a", "x")])
            .await
            .unwrap_err(),
        StoreError::CorruptState { .. }
    ));

    // Metadata and listing are unaffected.
    assert!(library.metadata(meta.id).await.is_ok());
    assert_eq!(library.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_upsert_rejects_empty_annotation_id() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "Doc").await;

    let err = library
        .upsert_annotations(meta.id, vec![annotation("", "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }));

    // Rejected before any mutation
    assert!(library.annotations(meta.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_upserts_on_one_entry_lose_nothing() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "Doc").await;
    let library = Arc::new(library);

    let mut handles = Vec::new();
    for i in 0..10 {
        let library = Arc::clone(&library);
        let id = meta.id;
        handles.push(tokio::spawn(async move {
            library
                .upsert_annotations(id, vec![annotation(&format!("ann-{}", i), "x")])
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stored = library.annotations(meta.id).await.unwrap();
    assert_eq!(stored.len(), 10);
}

#[tokio::test]
async fn test_record_writes_leave_no_temp_files() {
    let (library, _temp) = open_temp_library().await;
    let meta = seed_entry(&library, "Doc").await;

    library
        .update_metadata(meta.id, MetadataPatch::title("X"))
        .await
        .unwrap();
    library
        .upsert_annotations(meta.id, vec![annotation("a", "x")])
        .await
        .unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(library.entry_dir(meta.id))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
