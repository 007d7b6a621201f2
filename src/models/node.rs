//! The dynamic hierarchical extraction value: a tagged union over object,
//! array, and leaf, per the design note that the extraction output shape is
//! not known at compile time (it follows whatever field schema the caller
//! configured for a document type).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a leaf value, carried alongside the raw JSON so the template
/// engine and transcript builder can make type-aware decisions (e.g. date
/// parsing only applies to `Date`-kinded leaves) without re-inferring it
/// from the JSON representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafKind {
    String,
    Number,
    Boolean,
    Date,
    Null,
}

impl LeafKind {
    /// Infer a leaf kind from a raw JSON value when the schema didn't pin
    /// one down explicitly (e.g. a provider returned a bare string).
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::String(_) => LeafKind::String,
            Value::Number(_) => LeafKind::Number,
            Value::Bool(_) => LeafKind::Boolean,
            Value::Null => LeafKind::Null,
            _ => LeafKind::String,
        }
    }
}

/// A node in the extracted-field tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Object(BTreeMap<String, Node>),
    Array(Vec<Node>),
    Leaf { kind: LeafKind, value: Value },
}

impl Node {
    pub fn leaf(value: Value) -> Self {
        let kind = LeafKind::infer(&value);
        Node::Leaf { kind, value }
    }

    pub fn leaf_with_kind(kind: LeafKind, value: Value) -> Self {
        Node::Leaf { kind, value }
    }

    /// Walk the tree, calling `visit` with the dotted path and leaf for
    /// every `Leaf` node. Array indices are rendered as `[n]` segments,
    /// matching the teacher's `extract_path` dotted-path convention.
    pub fn walk_leaves(&self, mut visit: impl FnMut(&str, LeafKind, &Value)) {
        fn go(node: &Node, prefix: &str, visit: &mut dyn FnMut(&str, LeafKind, &Value)) {
            match node {
                Node::Object(map) => {
                    for (key, child) in map {
                        let path = if prefix.is_empty() {
                            key.clone()
                        } else {
                            format!("{prefix}.{key}")
                        };
                        go(child, &path, visit);
                    }
                }
                Node::Array(items) => {
                    for (i, child) in items.iter().enumerate() {
                        let path = format!("{prefix}[{i}]");
                        go(child, &path, visit);
                    }
                }
                Node::Leaf { kind, value } => visit(prefix, *kind, value),
            }
        }
        go(self, "", &mut visit);
    }

    /// Fetch a child by dotted path, e.g. `"account.balance"` or
    /// `"transactions[2].amount"`.
    pub fn get_path(&self, path: &str) -> Option<&Node> {
        let mut current = self;
        for segment in split_path(path) {
            current = match (&segment, current) {
                (PathSegment::Key(key), Node::Object(map)) => map.get(key)?,
                (PathSegment::Index(i), Node::Array(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

pub(crate) enum PathSegment {
    Key(String),
    Index(usize),
}

pub(crate) fn split_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for raw in path.split('.') {
        let mut rest = raw;
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(close) = rest.find(']') {
                if let Ok(idx) = rest[1..close].parse::<usize>() {
                    segments.push(PathSegment::Index(idx));
                }
                rest = &rest[close + 1..];
            }
        } else if !rest.is_empty() {
            segments.push(PathSegment::Key(rest.to_string()));
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_nested_leaves_in_dotted_order() {
        let mut account = BTreeMap::new();
        account.insert("balance".to_string(), Node::leaf(json!(1234.5)));
        let mut root = BTreeMap::new();
        root.insert("account".to_string(), Node::Object(account));
        root.insert(
            "transactions".to_string(),
            Node::Array(vec![Node::leaf(json!("deposit"))]),
        );
        let tree = Node::Object(root);

        let mut seen = Vec::new();
        tree.walk_leaves(|path, _kind, value| seen.push((path.to_string(), value.clone())));

        assert!(seen.contains(&("account.balance".to_string(), json!(1234.5))));
        assert!(seen.contains(&("transactions[0]".to_string(), json!("deposit"))));
    }

    #[test]
    fn get_path_resolves_array_index() {
        let tree = Node::Object(BTreeMap::from([(
            "transactions".to_string(),
            Node::Array(vec![Node::leaf(json!("first")), Node::leaf(json!("second"))]),
        )]));

        let found = tree.get_path("transactions[1]").unwrap();
        assert_eq!(found, &Node::leaf(json!("second")));
        assert!(tree.get_path("transactions[9]").is_none());
    }
}
