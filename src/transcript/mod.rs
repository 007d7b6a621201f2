//! Transcript & index builder (component J): a deterministic depth-first
//! walk of a document's `Node` tree that renders a flat, human-readable
//! transcript plus a path index, one page at a time.
//!
//! Grounded on `scrapers/configurable/extract.rs`'s dotted-path JSON
//! traversal (`extract_path`), here walking the extraction `Node` tagged
//! union instead of scraped HTML-derived JSON.

use std::time::Instant;

use crate::models::node::{LeafKind, Node};
use crate::models::{DocumentTranscript, TranscriptIndexEntry};

/// One page's extracted tree, keyed by page number (1-indexed).
pub struct PageTree<'a> {
    pub page_number: i32,
    pub tree: &'a Node,
}

/// Build a document's transcript: one `--- PAGE n ---` section per page,
/// each field rendered as `path: value`, with arrays of same-keyed objects
/// rendered as a `Table:` heading followed by indexed rows. Returns the
/// transcript text, its path index, and the time spent generating it.
pub fn build_transcript(document_id: &str, pages: &[PageTree<'_>]) -> (DocumentTranscript, i64) {
    let start = Instant::now();
    let mut text = String::new();
    let mut index = Vec::new();

    for page in pages {
        let heading = format!("--- PAGE {} ---\n", page.page_number);
        text.push_str(&heading);
        render_node(page.tree, "", &mut text, &mut index);
    }

    let generation_time_ms = start.elapsed().as_millis() as i64;
    let transcript = DocumentTranscript::new(document_id.to_string(), text, index);
    (transcript, generation_time_ms)
}

fn render_node(node: &Node, prefix: &str, text: &mut String, index: &mut Vec<TranscriptIndexEntry>) {
    match node {
        Node::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                render_node(child, &path, text, index);
            }
        }
        Node::Array(items) => {
            if is_table(items) {
                text.push_str(&format!("Table: {prefix} ({} rows)\n", items.len()));
            }
            for (i, child) in items.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                render_node(child, &path, text, index);
            }
        }
        Node::Leaf { kind, value } => {
            let rendered = render_value(*kind, value);
            let line = format!("{prefix}: {rendered}\n");
            let start = text.len();
            text.push_str(&line);
            let end = text.len();
            index.push(TranscriptIndexEntry { field_path: prefix.to_string(), start, end });
        }
    }
}

/// An array counts as a table when every element is an object: same-keyed
/// rows render better as a labeled table than as bare indexed leaves.
fn is_table(items: &[Node]) -> bool {
    !items.is_empty() && items.iter().all(|item| matches!(item, Node::Object(_)))
}

fn render_value(kind: LeafKind, value: &serde_json::Value) -> String {
    match kind {
        LeafKind::Null => "null".to_string(),
        _ => match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use serde_json::json;

    #[test]
    fn renders_page_headings_and_leaf_lines() {
        let mut root = BTreeMap::new();
        root.insert("balance".to_string(), Node::leaf(json!(1000)));
        let tree = Node::Object(root);
        let pages = vec![PageTree { page_number: 1, tree: &tree }];

        let (transcript, _ms) = build_transcript("doc-1", &pages);
        assert!(transcript.transcript_text.contains("--- PAGE 1 ---"));
        assert!(transcript.transcript_text.contains("balance: 1000"));
        assert_eq!(transcript.index().len(), 1);
    }

    #[test]
    fn arrays_of_objects_render_as_tables() {
        let mut row = BTreeMap::new();
        row.insert("date".to_string(), Node::leaf(json!("2024-01-01")));
        let tree = Node::Array(vec![Node::Object(row)]);
        let pages = vec![PageTree { page_number: 1, tree: &tree }];

        let (transcript, _ms) = build_transcript("doc-1", &pages);
        assert!(transcript.transcript_text.contains("Table: (1 rows)"));
    }

    #[test]
    fn index_offsets_locate_the_rendered_line() {
        let mut root = BTreeMap::new();
        root.insert("name".to_string(), Node::leaf(json!("Alice")));
        let tree = Node::Object(root);
        let pages = vec![PageTree { page_number: 1, tree: &tree }];

        let (transcript, _ms) = build_transcript("doc-1", &pages);
        let entry = &transcript.index()[0];
        assert_eq!(&transcript.transcript_text[entry.start..entry.end], "name: Alice\n");
    }
}
