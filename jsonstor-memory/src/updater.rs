//! Application of update specifications to documents.
//!
//! Updates never touch the stored document directly: [`apply_update`] works on a
//! copy and returns it, so a failing operator leaves the collection unchanged.

use serde_json::{Number, Value};
use std::cmp::Ordering;

use jsonstor_core::{
    document::{
        Document, ID_FIELD, document_id, get_path, get_path_mut, identity_key, remove_path, set_path,
        type_name,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    query::Expr,
    update::{Update, UpdateOperator},
};

use crate::evaluator::{compare_values, matches, values_equal};

/// Applies `update` to a copy of `document` and returns the result.
///
/// A replacement keeps the original identifier; an operator update applies each
/// operator group in order.
///
/// # Errors
///
/// - [`DocumentStoreError::InvalidDocument`] if the update would change or remove `_id`
/// - [`DocumentStoreError::TypeMismatch`] if an operator targets a value of the wrong type
/// - [`DocumentStoreError::InvalidCriteria`] if a `$pull` condition is malformed
pub fn apply_update(document: &Document, update: &Update) -> DocumentStoreResult<Document> {
    match update {
        Update::Replace(replacement) => replace(document, replacement),
        Update::Operators(groups) => {
            let mut result = document.clone();

            for (op, args) in groups {
                for (path, operand) in args {
                    guard_identifier(document, *op, path, operand)?;
                    apply_operator(&mut result, *op, path, operand)?;
                }
            }

            Ok(result)
        }
    }
}

fn replace(document: &Document, replacement: &Document) -> DocumentStoreResult<Document> {
    let original = document_id(document);

    if let (Some(original), Some(requested)) = (original, document_id(replacement)) {
        if identity_key(original)? != identity_key(requested)? {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "replacement cannot change {ID_FIELD} from {original} to {requested}"
            )));
        }
    }

    let mut result = Document::new();
    if let Some(id) = original {
        result.insert(ID_FIELD.to_string(), id.clone());
    }
    result.extend(
        replacement
            .iter()
            .filter(|(k, _)| k.as_str() != ID_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
    );

    Ok(result)
}

fn touches_identifier(path: &str) -> bool {
    path == ID_FIELD || path.starts_with("_id.")
}

/// `true` when `path` lies strictly below `parent`.
fn is_subpath(path: &str, parent: &str) -> bool {
    path.strip_prefix(parent).is_some_and(|rest| rest.starts_with('.'))
}

fn guard_identifier(
    document: &Document,
    op: UpdateOperator,
    path: &str,
    operand: &Value,
) -> DocumentStoreResult<()> {
    let renames_onto_id = op == UpdateOperator::Rename && operand.as_str().is_some_and(touches_identifier);

    if !touches_identifier(path) && !renames_onto_id {
        return Ok(());
    }

    // Setting the identifier to its current value is a no-op.
    if op == UpdateOperator::Set && path == ID_FIELD {
        if let Some(current) = document_id(document) {
            if identity_key(current)? == identity_key(operand)? {
                return Ok(());
            }
        }
    }

    Err(DocumentStoreError::InvalidDocument(format!(
        "{} cannot modify {ID_FIELD}",
        op.name()
    )))
}

fn apply_operator(
    document: &mut Document,
    op: UpdateOperator,
    path: &str,
    operand: &Value,
) -> DocumentStoreResult<()> {
    match op {
        UpdateOperator::Set => set_path(document, path, operand.clone()),
        UpdateOperator::Unset => {
            remove_path(document, path);
            Ok(())
        }
        UpdateOperator::Inc => {
            let amount = numeric_operand(op, path, operand)?;
            let next = match get_path(document, path) {
                None => operand.clone(),
                Some(Value::Number(current)) => arithmetic(op, path, current, amount)?,
                Some(other) => return Err(wrong_target(op, path, "a number", other)),
            };
            set_path(document, path, next)
        }
        UpdateOperator::Mul => {
            let factor = numeric_operand(op, path, operand)?;
            let next = match get_path(document, path) {
                None if factor.is_f64() => Value::from(0.0),
                None => Value::from(0),
                Some(Value::Number(current)) => arithmetic(op, path, current, factor)?,
                Some(other) => return Err(wrong_target(op, path, "a number", other)),
            };
            set_path(document, path, next)
        }
        UpdateOperator::Min | UpdateOperator::Max => {
            let wanted = if op == UpdateOperator::Min { Ordering::Less } else { Ordering::Greater };
            let replace = match get_path(document, path) {
                None => true,
                current => compare_values(Some(operand), current) == wanted,
            };
            if replace {
                set_path(document, path, operand.clone())?;
            }
            Ok(())
        }
        UpdateOperator::Rename => {
            let target = operand.as_str().ok_or_else(|| {
                DocumentStoreError::TypeMismatch(format!(
                    "$rename target for '{path}' must be a string, found {}",
                    type_name(operand)
                ))
            })?;
            if target == path {
                return Err(DocumentStoreError::TypeMismatch(format!(
                    "$rename source and target are both '{path}'"
                )));
            }
            if is_subpath(target, path) || is_subpath(path, target) {
                return Err(DocumentStoreError::TypeMismatch(format!(
                    "$rename source '{path}' and target '{target}' overlap"
                )));
            }
            if let Some(value) = remove_path(document, path) {
                set_path(document, target, value)?;
            }
            Ok(())
        }
        UpdateOperator::Push => {
            let items = each_items(op, operand)?;
            match get_path_array(document, op, path)? {
                Some(array) => array.extend(items),
                None => set_path(document, path, Value::Array(items))?,
            }
            Ok(())
        }
        UpdateOperator::AddToSet => {
            let items = each_items(op, operand)?;
            match get_path_array(document, op, path)? {
                Some(array) => {
                    for item in items {
                        if !array.iter().any(|existing| values_equal(existing, &item)) {
                            array.push(item);
                        }
                    }
                }
                None => {
                    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
                    for item in items {
                        if !unique.iter().any(|existing| values_equal(existing, &item)) {
                            unique.push(item);
                        }
                    }
                    set_path(document, path, Value::Array(unique))?;
                }
            }
            Ok(())
        }
        UpdateOperator::Pull => {
            let condition = PullCondition::new(operand)?;
            if let Some(array) = get_path_array(document, op, path)? {
                let mut kept = Vec::with_capacity(array.len());
                for item in array.drain(..) {
                    if !condition.matches(&item)? {
                        kept.push(item);
                    }
                }
                *array = kept;
            }
            Ok(())
        }
        UpdateOperator::Pop => {
            let from_front = match operand.as_f64() {
                Some(n) if n == 1.0 => false,
                Some(n) if n == -1.0 => true,
                _ => {
                    return Err(DocumentStoreError::TypeMismatch(format!(
                        "$pop on '{path}' expects 1 or -1, found {operand}"
                    )));
                }
            };
            if let Some(array) = get_path_array(document, op, path)? {
                if from_front {
                    if !array.is_empty() {
                        array.remove(0);
                    }
                } else {
                    array.pop();
                }
            }
            Ok(())
        }
    }
}

/// Resolves an array target. A missing path yields `None`; any other non-array
/// value is a type mismatch.
fn get_path_array<'a>(
    document: &'a mut Document,
    op: UpdateOperator,
    path: &str,
) -> DocumentStoreResult<Option<&'a mut Vec<Value>>> {
    match get_path_mut(document, path) {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(other) => Err(wrong_target(op, path, "an array", other)),
    }
}

fn each_items(op: UpdateOperator, operand: &Value) -> DocumentStoreResult<Vec<Value>> {
    match operand {
        Value::Object(map) if map.contains_key("$each") => match (map.len(), map.get("$each")) {
            (1, Some(Value::Array(items))) => Ok(items.clone()),
            (1, Some(other)) => Err(DocumentStoreError::TypeMismatch(format!(
                "{} $each expects an array, found {}",
                op.name(),
                type_name(other)
            ))),
            _ => Err(DocumentStoreError::UnsupportedOperator(format!(
                "{} only supports the $each modifier",
                op.name()
            ))),
        },
        other => Ok(vec![other.clone()]),
    }
}

fn numeric_operand<'v>(op: UpdateOperator, path: &str, operand: &'v Value) -> DocumentStoreResult<&'v Number> {
    match operand {
        Value::Number(n) => Ok(n),
        other => Err(DocumentStoreError::TypeMismatch(format!(
            "{} on '{path}' expects a numeric operand, found {}",
            op.name(),
            type_name(other)
        ))),
    }
}

/// Integer arithmetic when both sides are integers and the result fits,
/// floating point otherwise.
fn arithmetic(op: UpdateOperator, path: &str, current: &Number, operand: &Number) -> DocumentStoreResult<Value> {
    if let (Some(a), Some(b)) = (current.as_i64(), operand.as_i64()) {
        let exact = match op {
            UpdateOperator::Mul => a.checked_mul(b),
            _ => a.checked_add(b),
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }

    let (a, b) = (current.as_f64().unwrap_or(f64::NAN), operand.as_f64().unwrap_or(f64::NAN));
    let result = match op {
        UpdateOperator::Mul => a * b,
        _ => a + b,
    };

    Number::from_f64(result).map(Value::Number).ok_or_else(|| {
        DocumentStoreError::TypeMismatch(format!(
            "{} on '{path}' produced a non-finite number",
            op.name()
        ))
    })
}

fn wrong_target(op: UpdateOperator, path: &str, expected: &str, found: &Value) -> DocumentStoreError {
    DocumentStoreError::TypeMismatch(format!(
        "{} on '{path}' requires {expected}, found {}",
        op.name(),
        type_name(found)
    ))
}

/// What a `$pull` removes: elements equal to a value, elements satisfying an
/// operator condition, or embedded documents matching criteria.
enum PullCondition<'v> {
    Equals(&'v Value),
    Operators(Expr),
    Criteria(Expr),
}

const PULL_ELEMENT: &str = "element";

impl<'v> PullCondition<'v> {
    fn new(operand: &'v Value) -> DocumentStoreResult<Self> {
        match operand {
            Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
                let mut wrapped = Document::new();
                wrapped.insert(PULL_ELEMENT.to_string(), operand.clone());
                Ok(PullCondition::Operators(Expr::parse(&Value::Object(wrapped))?))
            }
            Value::Object(_) => Ok(PullCondition::Criteria(Expr::parse(operand)?)),
            other => Ok(PullCondition::Equals(other)),
        }
    }

    fn matches(&self, item: &Value) -> DocumentStoreResult<bool> {
        match self {
            PullCondition::Equals(value) => Ok(values_equal(item, value)),
            PullCondition::Operators(expr) => {
                let mut wrapped = Document::new();
                wrapped.insert(PULL_ELEMENT.to_string(), item.clone());
                matches(&wrapped, expr)
            }
            PullCondition::Criteria(expr) => match item {
                Value::Object(embedded) => matches(embedded, expr),
                _ => Ok(false),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonstor_core::document::into_document;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        into_document(value).unwrap()
    }

    fn apply(document: Value, update: Value) -> DocumentStoreResult<Value> {
        apply_update(&doc(document), &Update::parse(&update).unwrap()).map(Value::Object)
    }

    #[test]
    fn test_set_and_unset() {
        let result = apply(
            json!({"_id": 1, "a": 1, "b": {"c": 2}}),
            json!({"$set": {"a": 5, "b.d": 3, "e.f": true}, "$unset": {"b.c": ""}}),
        )
        .unwrap();
        assert_eq!(result, json!({"_id": 1, "a": 5, "b": {"d": 3}, "e": {"f": true}}));
    }

    #[test]
    fn test_inc_keeps_integers() {
        let result = apply(json!({"_id": 1, "n": 5}), json!({"$inc": {"n": 2, "m": 3}})).unwrap();
        assert_eq!(result["n"], json!(7));
        assert!(result["n"].is_i64());
        assert_eq!(result["m"], json!(3));

        let result = apply(json!({"_id": 1, "n": 5}), json!({"$inc": {"n": 0.5}})).unwrap();
        assert_eq!(result["n"], json!(5.5));
    }

    #[test]
    fn test_inc_overflow_falls_back_to_float() {
        let result = apply(json!({"_id": 1, "n": i64::MAX}), json!({"$inc": {"n": 1}})).unwrap();
        assert!(result["n"].is_f64());
    }

    #[test]
    fn test_inc_type_mismatch() {
        let err = apply(json!({"_id": 1, "n": "five"}), json!({"$inc": {"n": 1}})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::TypeMismatch(_)));

        let err = apply(json!({"_id": 1, "n": 5}), json!({"$inc": {"n": "1"}})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::TypeMismatch(_)));
    }

    #[test]
    fn test_mul() {
        let result = apply(json!({"_id": 1, "n": 4}), json!({"$mul": {"n": 3, "m": 2}})).unwrap();
        assert_eq!(result["n"], json!(12));
        assert_eq!(result["m"], json!(0));
    }

    #[test]
    fn test_min_max() {
        let result = apply(
            json!({"_id": 1, "lo": 5, "hi": 5}),
            json!({"$min": {"lo": 3, "hi": 9}, "$max": {"hi": 7, "new": 1}}),
        )
        .unwrap();
        assert_eq!(result["lo"], json!(3));
        assert_eq!(result["hi"], json!(7));
        assert_eq!(result["new"], json!(1));
    }

    #[test]
    fn test_rename() {
        let result = apply(json!({"_id": 1, "old": "x"}), json!({"$rename": {"old": "fresh.name"}})).unwrap();
        assert_eq!(result, json!({"_id": 1, "fresh": {"name": "x"}}));

        let unchanged = apply(json!({"_id": 1}), json!({"$rename": {"old": "new"}})).unwrap();
        assert_eq!(unchanged, json!({"_id": 1}));
    }

    #[test]
    fn test_rename_into_own_subpath_fails() {
        for update in [json!({"$rename": {"a": "a.b"}}), json!({"$rename": {"a.b": "a"}})] {
            let err = apply(json!({"_id": 1, "a": {"b": 5}}), update).unwrap_err();
            assert!(matches!(err, DocumentStoreError::TypeMismatch(_)));
        }

        let sibling = apply(json!({"_id": 1, "a": 5}), json!({"$rename": {"a": "ab"}})).unwrap();
        assert_eq!(sibling, json!({"_id": 1, "ab": 5}));
    }

    #[test]
    fn test_push_and_each() {
        let result = apply(json!({"_id": 1, "tags": ["a"]}), json!({"$push": {"tags": "b"}})).unwrap();
        assert_eq!(result["tags"], json!(["a", "b"]));

        let result = apply(
            json!({"_id": 1}),
            json!({"$push": {"tags": {"$each": ["x", "y"]}}}),
        )
        .unwrap();
        assert_eq!(result["tags"], json!(["x", "y"]));

        let err = apply(json!({"_id": 1, "tags": "a"}), json!({"$push": {"tags": "b"}})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::TypeMismatch(_)));
    }

    #[test]
    fn test_add_to_set() {
        let result = apply(
            json!({"_id": 1, "tags": ["a", "b"]}),
            json!({"$addToSet": {"tags": {"$each": ["b", "c", "c"]}}}),
        )
        .unwrap();
        assert_eq!(result["tags"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_pull() {
        let result = apply(json!({"_id": 1, "n": [1, 2, 3, 2]}), json!({"$pull": {"n": 2}})).unwrap();
        assert_eq!(result["n"], json!([1, 3]));

        let result = apply(json!({"_id": 1, "n": [1, 5, 9]}), json!({"$pull": {"n": {"$gte": 5}}})).unwrap();
        assert_eq!(result["n"], json!([1]));

        let result = apply(
            json!({"_id": 1, "items": [{"k": "a", "q": 1}, {"k": "b", "q": 2}]}),
            json!({"$pull": {"items": {"k": "a"}}}),
        )
        .unwrap();
        assert_eq!(result["items"], json!([{"k": "b", "q": 2}]));
    }

    #[test]
    fn test_pop() {
        let result = apply(json!({"_id": 1, "n": [1, 2, 3]}), json!({"$pop": {"n": 1}})).unwrap();
        assert_eq!(result["n"], json!([1, 2]));

        let result = apply(json!({"_id": 1, "n": [1, 2, 3]}), json!({"$pop": {"n": -1}})).unwrap();
        assert_eq!(result["n"], json!([2, 3]));

        let err = apply(json!({"_id": 1, "n": [1]}), json!({"$pop": {"n": 2}})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::TypeMismatch(_)));
    }

    #[test]
    fn test_identifier_is_immutable() {
        let err = apply(json!({"_id": 1, "a": 1}), json!({"$set": {"_id": 2}})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));

        let err = apply(json!({"_id": 1}), json!({"$unset": {"_id": ""}})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));

        let err = apply(json!({"_id": 1, "a": 1}), json!({"$rename": {"a": "_id"}})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));

        let same = apply(json!({"_id": 1, "a": 1}), json!({"$set": {"_id": 1}})).unwrap();
        assert_eq!(same, json!({"_id": 1, "a": 1}));
    }

    #[test]
    fn test_replacement_keeps_identifier() {
        let result = apply(json!({"_id": "k", "a": 1, "b": 2}), json!({"c": 3})).unwrap();
        assert_eq!(result, json!({"_id": "k", "c": 3}));

        let result = apply(json!({"_id": "k", "a": 1}), json!({"_id": "k", "a": 2})).unwrap();
        assert_eq!(result, json!({"_id": "k", "a": 2}));

        let err = apply(json!({"_id": "k"}), json!({"_id": "other"})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[test]
    fn test_failure_leaves_original_untouched() {
        let original = doc(json!({"_id": 1, "a": 1, "s": "x"}));
        let update = Update::parse(&json!({"$set": {"a": 2}, "$inc": {"s": 1}})).unwrap();
        assert!(apply_update(&original, &update).is_err());
        assert_eq!(original["a"], json!(1));
    }
}
