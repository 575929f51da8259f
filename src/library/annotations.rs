//! Annotation records and the merge/delete rules applied to them.
//!
//! Annotations are produced by the reader component; the store treats
//! everything except `id` and `tags` as an opaque payload that must
//! round-trip unchanged. Ids are assigned by the producing client, never
//! by the store.

use serde::{Deserialize, Serialize};

/// One annotation inside an entry's collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Client-assigned id, unique within the entry.
    pub id: String,

    /// Ordered labels attached to this annotation.
    #[serde(default)]
    pub tags: Vec<AnnotationTag>,

    /// Reader-owned fields (position, content, color, kind, dates, …).
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// A label on an annotation, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationTag {
    pub name: String,

    /// Whether the tag was assigned by the user or by the system.
    #[serde(rename = "type")]
    pub kind: TagKind,
}

/// Provenance of an annotation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    User,
    System,
}

/// Merge incoming annotations into an existing collection.
///
/// An incoming record whose id already exists fully replaces the stored
/// record in place; everything else is appended in the order received.
/// Untouched records keep their positions, so applying the same batch
/// twice is a no-op.
pub fn merge(existing: &mut Vec<Annotation>, incoming: Vec<Annotation>) {
    for annotation in incoming {
        if let Some(slot) = existing.iter_mut().find(|a| a.id == annotation.id) {
            *slot = annotation;
        } else {
            existing.push(annotation);
        }
    }
}

/// Remove every annotation whose id appears in `ids`.
///
/// Ids with no matching annotation are silently ignored, so the same
/// delete request can be replayed safely. Returns how many records were
/// actually removed.
pub fn remove(existing: &mut Vec<Annotation>, ids: &[String]) -> usize {
    let before = existing.len();
    existing.retain(|a| !ids.iter().any(|id| id == &a.id));
    before - existing.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(id: &str, comment: &str) -> Annotation {
        let mut payload = serde_json::Map::new();
        payload.insert("comment".to_string(), serde_json::json!(comment));
        Annotation {
            id: id.to_string(),
            tags: Vec::new(),
            payload,
        }
    }

    fn ids(list: &[Annotation]) -> Vec<&str> {
        list.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_merge_appends_new_annotations_in_order() {
        let mut stored = vec![annotation("a", "first")];
        merge(
            &mut stored,
            vec![annotation("b", "second"), annotation("c", "third")],
        );
        assert_eq!(ids(&stored), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_replaces_in_place() {
        let mut stored = vec![
            annotation("a", "first"),
            annotation("b", "second"),
            annotation("c", "third"),
        ];
        merge(&mut stored, vec![annotation("b", "revised")]);

        assert_eq!(ids(&stored), vec!["a", "b", "c"]);
        assert_eq!(stored[1].payload["comment"], "revised");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![annotation("a", "x"), annotation("b", "y")];

        let mut once = Vec::new();
        merge(&mut once, batch.clone());

        let mut twice = Vec::new();
        merge(&mut twice, batch.clone());
        merge(&mut twice, batch);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_disjoint_merges_compose() {
        let a = vec![annotation("1", "a"), annotation("2", "b")];
        let b = vec![annotation("3", "c")];

        let mut sequential = Vec::new();
        merge(&mut sequential, a.clone());
        merge(&mut sequential, b.clone());

        let mut single = Vec::new();
        merge(&mut single, a.into_iter().chain(b).collect());

        assert_eq!(sequential, single);
    }

    #[test]
    fn test_remove_ignores_unknown_ids() {
        let mut stored = vec![annotation("a", "x"), annotation("b", "y")];
        let removed = remove(
            &mut stored,
            &["b".to_string(), "missing".to_string()],
        );

        assert_eq!(removed, 1);
        assert_eq!(ids(&stored), vec!["a"]);

        // Replaying the same delete changes nothing.
        let removed = remove(&mut stored, &["b".to_string(), "missing".to_string()]);
        assert_eq!(removed, 0);
        assert_eq!(ids(&stored), vec!["a"]);
    }

    #[test]
    fn test_payload_fields_roundtrip() {
        let json = serde_json::json!({
            "id": "ann-1",
            "type": "highlight",
            "color": "#ffd400",
            "position": { "start": 12, "end": 40 },
            "tags": [{ "name": "method", "type": "user" }]
        });

        let parsed: Annotation = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(parsed.id, "ann-1");
        assert_eq!(parsed.tags[0].kind, TagKind::User);
        assert_eq!(parsed.payload["type"], "highlight");

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["position"]["end"], 40);
        assert_eq!(back["tags"][0]["type"], "user");
    }
}
