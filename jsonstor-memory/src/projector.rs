//! Projection of result documents.

use serde_json::Value;
use std::collections::HashMap;

use jsonstor_core::{
    document::{Document, ID_FIELD},
    error::DocumentStoreResult,
    projection::Projection,
};

/// Returns the projected copy of `document`.
///
/// Inclusion keeps the listed paths in the document's own field order and the
/// identifier unless it was excluded. Exclusion drops the listed paths. Numeric
/// segments select array elements and keep the array shape: included elements
/// stay in their original order, excluded elements are removed. Paths that do
/// not resolve are ignored in both modes.
pub fn project(document: &Document, projection: Option<&Projection>) -> DocumentStoreResult<Document> {
    Ok(match projection {
        None => document.clone(),
        Some(Projection::Include { fields, id }) => {
            let tree = PathTree::new(fields);
            let mut result = Document::new();

            for (key, value) in document {
                if key == ID_FIELD {
                    if *id {
                        result.insert(key.clone(), value.clone());
                    }
                    continue;
                }

                if let Some(kept) = tree.children.get(key.as_str()).and_then(|node| node.include(value)) {
                    result.insert(key.clone(), kept);
                }
            }

            result
        }
        Some(Projection::Exclude { fields }) => PathTree::new(fields).exclude_fields(document),
    })
}

/// Projection paths merged by segment.
#[derive(Debug, Default)]
struct PathTree<'a> {
    /// The path ends here, so the whole value is selected.
    leaf: bool,
    children: HashMap<&'a str, PathTree<'a>>,
}

impl<'a> PathTree<'a> {
    fn new(fields: &'a [String]) -> Self {
        let mut root = Self::default();

        for field in fields {
            let mut node = &mut root;
            for segment in field.split('.') {
                node = node.children.entry(segment).or_default();
            }
            node.leaf = true;
        }

        root
    }

    fn child(&self, segment: &str) -> Option<&PathTree<'a>> {
        self.children.get(segment)
    }

    /// The selected part of `value`, or `None` when nothing below it resolves.
    fn include(&self, value: &Value) -> Option<Value> {
        if self.leaf {
            return Some(value.clone());
        }

        match value {
            Value::Object(map) => {
                let kept: Document = map
                    .iter()
                    .filter_map(|(key, item)| Some((key.clone(), self.child(key)?.include(item)?)))
                    .collect();
                (!kept.is_empty()).then_some(Value::Object(kept))
            }
            Value::Array(items) => {
                let kept: Vec<Value> = items
                    .iter()
                    .enumerate()
                    .filter_map(|(index, item)| self.child(&index.to_string())?.include(item))
                    .collect();
                (!kept.is_empty()).then_some(Value::Array(kept))
            }
            _ => None,
        }
    }

    fn exclude_fields(&self, map: &Document) -> Document {
        map.iter()
            .filter_map(|(key, item)| match self.child(key) {
                None => Some((key.clone(), item.clone())),
                Some(node) => Some((key.clone(), node.exclude(item)?)),
            })
            .collect()
    }

    /// `value` without the selected parts, or `None` when all of it is selected.
    fn exclude(&self, value: &Value) -> Option<Value> {
        if self.leaf {
            return None;
        }

        Some(match value {
            Value::Object(map) => Value::Object(self.exclude_fields(map)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(index, item)| match self.child(&index.to_string()) {
                        None => Some(item.clone()),
                        Some(node) => node.exclude(item),
                    })
                    .collect(),
            ),
            other => other.clone(),
        })
    }
}
