//! Normalizes a vision-LLM response's JSON blob into a flat list of fields
//! (§4.E step 8) and reconstructs a page's `Node` tree from that flat list
//! for the transcript builder (§4.J), rather than walking the model's raw
//! JSON directly (which carries wrapper keys like `confidence`/`label`
//! alongside each value).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::node::{split_path, PathSegment};
use crate::models::node::{LeafKind, Node};

/// One field recovered from a vision response, before it's turned into a
/// persisted `ExtractedField` (which additionally needs job/document ids,
/// a page number, and a `field_order`).
#[derive(Debug, Clone)]
pub struct ParsedField {
    pub path: String,
    pub value: Value,
    pub confidence: f64,
    pub label: Option<String>,
    pub section_name: Option<String>,
    pub source_location: Option<String>,
    pub extraction_context: Option<String>,
    pub page: Option<i32>,
    pub flagged: bool,
}

/// Keys the model may emit alongside field data that aren't fields
/// themselves (table-continuation context, document-level metadata).
const RESERVED_KEYS: [&str; 3] = ["_table_headers", "document_type", "is_continuation"];

/// Flatten a response's `sections` object (or the whole response, for
/// tasks that don't nest under `sections`) into dotted-path fields. A
/// table row's cells become `parent[index].column` paths, matching
/// `Node`'s own array-index convention.
pub fn flatten_response(value: &Value) -> Vec<ParsedField> {
    let mut out = Vec::new();
    let root = value.get("sections").unwrap_or(value);
    walk(root, "", None, &mut out);
    out
}

fn walk(value: &Value, prefix: &str, section: Option<&str>, out: &mut Vec<ParsedField>) {
    match value {
        Value::Object(map) => {
            if is_field_wrapper(map) {
                out.push(ParsedField {
                    path: prefix.to_string(),
                    value: map.get("value").cloned().unwrap_or(Value::Null),
                    confidence: map.get("confidence").and_then(Value::as_f64).unwrap_or(1.0),
                    label: map.get("label").and_then(Value::as_str).map(str::to_string),
                    section_name: section.map(str::to_string),
                    source_location: map.get("source_location").and_then(Value::as_str).map(str::to_string),
                    extraction_context: map
                        .get("extraction_context")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    page: map.get("page").and_then(Value::as_i64).map(|n| n as i32),
                    flagged: map.get("needs_review").and_then(Value::as_bool).unwrap_or(false),
                });
                return;
            }
            for (key, child) in map {
                if RESERVED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                let next_section = section.or(Some(key.as_str()));
                walk(child, &path, next_section, out);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                walk(item, &path, section, out);
            }
        }
        other => {
            if prefix.is_empty() {
                return;
            }
            out.push(ParsedField {
                path: prefix.to_string(),
                value: other.clone(),
                confidence: 1.0,
                label: None,
                section_name: section.map(str::to_string),
                source_location: None,
                extraction_context: None,
                page: None,
                flagged: false,
            });
        }
    }
}

/// A field wrapper is an object that carries a `value` key plus at least
/// one of the metadata keys the extraction prompt asks the model to emit;
/// without that it's just a plain nested object (a section).
fn is_field_wrapper(map: &serde_json::Map<String, Value>) -> bool {
    map.contains_key("value") && (map.contains_key("confidence") || map.contains_key("label"))
}

/// The `ExtractedField.field_type` string for a raw JSON value.
pub fn field_type_str(value: &Value) -> &'static str {
    match LeafKind::infer(value) {
        LeafKind::String => "string",
        LeafKind::Number => "number",
        LeafKind::Boolean => "boolean",
        LeafKind::Date => "date",
        LeafKind::Null => "null",
    }
}

/// Rebuild a page's `Node` tree from its flat `(path, value)` pairs, so the
/// transcript builder can walk real nesting (and detect tables) instead of
/// a flat key-per-path object.
pub fn build_page_tree(fields: &[(&str, &Value)]) -> Node {
    let mut root = Node::Object(BTreeMap::new());
    for (path, value) in fields {
        insert_path(&mut root, path, Node::leaf((*value).clone()));
    }
    root
}

fn insert_path(node: &mut Node, path: &str, leaf: Node) {
    let segments = split_path(path);
    insert_segments(node, &segments, leaf);
}

fn insert_segments(node: &mut Node, segments: &[PathSegment], leaf: Node) {
    let Some((first, rest)) = segments.split_first() else {
        *node = leaf;
        return;
    };
    match first {
        PathSegment::Key(key) => {
            if !matches!(node, Node::Object(_)) {
                *node = Node::Object(BTreeMap::new());
            }
            let Node::Object(map) = node else { unreachable!() };
            let child = map.entry(key.clone()).or_insert_with(|| default_container(rest));
            insert_segments(child, rest, leaf);
        }
        PathSegment::Index(idx) => {
            if !matches!(node, Node::Array(_)) {
                *node = Node::Array(Vec::new());
            }
            let Node::Array(items) = node else { unreachable!() };
            while items.len() <= *idx {
                items.push(default_container(rest));
            }
            insert_segments(&mut items[*idx], rest, leaf);
        }
    }
}

fn default_container(remaining: &[PathSegment]) -> Node {
    match remaining.first() {
        Some(PathSegment::Index(_)) => Node::Array(Vec::new()),
        Some(PathSegment::Key(_)) => Node::Object(BTreeMap::new()),
        None => Node::leaf(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_field_wrapper_objects() {
        let response = json!({
            "sections": {
                "account": {
                    "holder_name": {"value": "Jane Doe", "confidence": 0.95, "label": "Account Holder"},
                },
            },
        });
        let fields = flatten_response(&response);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].path, "account.holder_name");
        assert_eq!(fields[0].value, json!("Jane Doe"));
        assert_eq!(fields[0].confidence, 0.95);
        assert_eq!(fields[0].section_name.as_deref(), Some("account"));
    }

    #[test]
    fn flattens_table_rows_into_indexed_column_paths() {
        let response = json!({
            "transactions": [
                {"date": {"value": "2024-01-01", "confidence": 0.9}, "amount": {"value": 100, "confidence": 0.9}},
            ],
        });
        let fields = flatten_response(&response);
        let paths: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert!(paths.contains(&"transactions[0].date"));
        assert!(paths.contains(&"transactions[0].amount"));
    }

    #[test]
    fn reserved_keys_are_excluded_from_flattening() {
        let response = json!({
            "_table_headers": ["Date", "Amount"],
            "document_type": "bank_statement",
            "balance": {"value": "500", "confidence": 0.8},
        });
        let fields = flatten_response(&response);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].path, "balance");
    }

    #[test]
    fn build_page_tree_reconstructs_nested_table_rows() {
        let entries = vec![
            ("transactions[0].date", &json!("2024-01-01")),
            ("transactions[0].amount", &json!(100)),
            ("transactions[1].date", &json!("2024-01-02")),
            ("transactions[1].amount", &json!(50)),
        ];
        let tree = build_page_tree(&entries);
        let row0 = tree.get_path("transactions[0].date").unwrap();
        assert_eq!(row0, &Node::leaf(json!("2024-01-01")));
        if let Node::Object(root) = &tree {
            if let Some(Node::Array(rows)) = root.get("transactions") {
                assert_eq!(rows.len(), 2);
            } else {
                panic!("expected transactions to be an array");
            }
        } else {
            panic!("expected object root");
        }
    }
}
