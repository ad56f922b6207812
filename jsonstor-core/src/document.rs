//! Document representation and field-path utilities.
//!
//! A document is a JSON object. Field order is preserved (serde_json is built with
//! `preserve_order`), so documents keep the column order they were inserted with.
//!
//! Paths are dot-separated (`"address.city"`). A segment that parses as an unsigned
//! integer addresses an array element (`"tags.0"`).

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A single stored record: a mapping from field name to JSON value.
pub type Document = Map<String, Value>;

/// The field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// How many null slots a write past the end of an array may pad.
pub const MAX_ARRAY_PADDING: usize = 1024;

/// Converts a JSON value into a [`Document`].
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] if the value is not an object.
pub fn into_document(value: Value) -> DocumentStoreResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected an object, found {}",
            type_name(&other)
        ))),
    }
}

/// Generates a fresh identifier value.
pub fn generate_id() -> Value {
    Value::String(Uuid::new_v4().simple().to_string())
}

/// Returns the document's identifier, treating `null` as absent.
pub fn document_id(document: &Document) -> Option<&Value> {
    document.get(ID_FIELD).filter(|id| !id.is_null())
}

/// Computes the canonical identity key of an identifier value.
///
/// Numbers are keyed by their f64 value, so `1` and `1.0` (or `9300000000000000000`
/// and `9.3e18`) address the same document, matching the numeric equality used by
/// criteria.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] for identifiers that are not
/// strings or numbers.
pub fn identity_key(id: &Value) -> DocumentStoreResult<String> {
    match id {
        Value::String(_) => Ok(id.to_string()),
        Value::Number(number) => match number.as_f64() {
            // -0.0 == 0.0 under criteria equality
            Some(f) if f == 0.0 => Ok("0".to_string()),
            Some(f) => Ok(f.to_string()),
            None => Ok(number.to_string()),
        },
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "identifier must be a string or a number, found {}",
            type_name(other)
        ))),
    }
}

/// Makes sure the document carries an identifier, generating one if it is missing
/// or `null`. Generated identifiers are placed first. Returns the identity key.
pub fn ensure_id(document: Document) -> DocumentStoreResult<(String, Document)> {
    if let Some(id) = document_id(&document) {
        let key = identity_key(id)?;
        return Ok((key, document));
    }

    let id = generate_id();
    let key = identity_key(&id)?;
    let mut with_id = Document::new();
    with_id.insert(ID_FIELD.to_string(), id);
    with_id.extend(document.into_iter().filter(|(k, _)| k != ID_FIELD));

    Ok((key, with_id))
}

/// Resolves a dotted path against a document.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = step(current, segment)?;
    }

    Some(current)
}

/// Resolves a dotted path against a document, returning a mutable reference.
pub fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let mut current = document.get_mut(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Writes a value at a dotted path, creating intermediate objects as needed.
///
/// # Errors
///
/// Returns [`DocumentStoreError::TypeMismatch`] when the path crosses a scalar,
/// indexes an array with a non-numeric segment, or would pad an array with more
/// than [`MAX_ARRAY_PADDING`] nulls.
pub fn set_path(document: &mut Document, path: &str, value: Value) -> DocumentStoreResult<()> {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, path),
    };

    let container = match parent {
        None => return insert_into_map(document, last, value),
        Some(parent) => walk_or_create(document, parent)?,
    };

    match container {
        Value::Object(map) => insert_into_map(map, last, value),
        Value::Array(items) => {
            let index = array_index(path, last)?;
            *grow_to(path, items, index)? = value;
            Ok(())
        }
        other => Err(cannot_traverse(path, other)),
    }
}

/// Removes the value at a dotted path. Array elements are nulled rather than
/// removed so sibling positions stay stable.
pub fn remove_path(document: &mut Document, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => document.shift_remove(path),
        Some((parent, last)) => match get_path_mut(document, parent)? {
            Value::Object(map) => map.shift_remove(last),
            Value::Array(items) => {
                let slot = items.get_mut(last.parse::<usize>().ok()?)?;
                Some(std::mem::replace(slot, Value::Null))
            }
            _ => None,
        },
    }
}

/// Short human-readable name of a value's JSON type, used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

fn insert_into_map(map: &mut Document, key: &str, value: Value) -> DocumentStoreResult<()> {
    match map.get_mut(key) {
        Some(slot) => *slot = value,
        None => {
            map.insert(key.to_string(), value);
        }
    }

    Ok(())
}

fn walk_or_create<'a>(document: &'a mut Document, path: &str) -> DocumentStoreResult<&'a mut Value> {
    let mut segments = path.split('.');
    let first = segments.next().unwrap_or_default();
    let mut current = document
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Document::new()));

    for segment in segments {
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Document::new())),
            Value::Array(items) => {
                let index = array_index(path, segment)?;
                let slot = grow_to(path, items, index)?;
                if slot.is_null() {
                    *slot = Value::Object(Document::new());
                }
                slot
            }
            other => return Err(cannot_traverse(path, other)),
        };
    }

    Ok(current)
}

fn array_index(path: &str, segment: &str) -> DocumentStoreResult<usize> {
    segment.parse::<usize>().map_err(|_| {
        DocumentStoreError::TypeMismatch(format!(
            "cannot use non-numeric segment '{segment}' to index an array in '{path}'"
        ))
    })
}

/// Returns the slot at `index`, padding the array with nulls up to it.
fn grow_to<'a>(path: &str, items: &'a mut Vec<Value>, index: usize) -> DocumentStoreResult<&'a mut Value> {
    let padding = index.saturating_sub(items.len());
    if padding > MAX_ARRAY_PADDING {
        return Err(DocumentStoreError::TypeMismatch(format!(
            "index {index} in '{path}' is {padding} past the end of an array of {} (at most {MAX_ARRAY_PADDING})",
            items.len()
        )));
    }

    if index >= items.len() {
        items.resize(index + 1, Value::Null);
    }
    Ok(&mut items[index])
}

fn cannot_traverse(path: &str, value: &Value) -> DocumentStoreError {
    DocumentStoreError::TypeMismatch(format!(
        "cannot create field in '{path}': element is a {}",
        type_name(value)
    ))
}
