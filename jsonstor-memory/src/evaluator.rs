//! Criteria evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for criteria expressions,
//! enabling filtering and comparison operations on JSON documents.

use regex::Regex;
use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap};

use jsonstor_core::{
    document::{Document, get_path, type_name},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Comparable representation of JSON values.
///
/// Numbers are normalized to f64, so `1` and `1.0` are equal. Values of different
/// types are never ordered relative to each other.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// String value
    String(&'a str),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(value) => Comparable::Number(value.as_f64().unwrap_or(f64::NAN)),
            Value::String(value) => Comparable::String(value),
            Value::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Value::Object(map) => Comparable::Map(
                map
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Returns `true` if two values are equal under the criteria equality rules.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Total ordering used for sorting and for `$min`/`$max`.
///
/// Values of the same type compare naturally; different types are ranked
/// missing < null < number < string < object < array < boolean.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Object(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Bool(_)) => 6,
        }
    }

    match (left, right) {
        (Some(a), Some(b)) if rank(left) == rank(right) => Comparable::from(a)
            .partial_cmp(&Comparable::from(b))
            .unwrap_or(Ordering::Equal),
        _ => rank(left).cmp(&rank(right)),
    }
}

/// Evaluates criteria against a single document.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidCriteria`] when an expression carries an
/// operand its operator cannot use (only possible for hand-built expressions;
/// parsed criteria are validated up front).
pub fn matches(document: &Document, criteria: &Expr) -> DocumentStoreResult<bool> {
    DocumentEvaluator::new(document).evaluate(criteria)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns references to the documents matching `expr`, in input order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        expr: &Expr,
    ) -> DocumentStoreResult<Vec<&'a Document>> {
        let mut matched = Vec::new();

        for doc in documents {
            if DocumentEvaluator::new(doc).evaluate(expr)? {
                matched.push(doc);
            }
        }

        Ok(matched)
    }
}

/// Equality as used by `$eq`/`$in`: missing equals `null`, and an array field
/// matches when it equals the target or contains an element equal to it.
fn equals_or_contains(field_value: Option<&Value>, target: &Value) -> bool {
    match field_value {
        None => target.is_null(),
        Some(value) => {
            let target = Comparable::from(target);
            match Comparable::from(value) {
                Comparable::Array(items) => {
                    items.iter().any(|item| item == &target) || Comparable::Array(items) == target
                }
                single => single == target,
            }
        }
    }
}

fn ordering_satisfies(op: FieldOp, ordering: Ordering) -> bool {
    match op {
        FieldOp::Gt => ordering == Ordering::Greater,
        FieldOp::Gte => ordering != Ordering::Less,
        FieldOp::Lt => ordering == Ordering::Less,
        FieldOp::Lte => ordering != Ordering::Greater,
        _ => false,
    }
}

fn compare_or_any(value: &Value, target: &Value, op: FieldOp) -> bool {
    let target = Comparable::from(target);

    match Comparable::from(value) {
        Comparable::Array(items) => items.iter().any(|item| {
            item.partial_cmp(&target)
                .is_some_and(|ordering| ordering_satisfies(op, ordering))
        }),
        single => single
            .partial_cmp(&target)
            .is_some_and(|ordering| ordering_satisfies(op, ordering)),
    }
}

fn operand_list<'v>(field: &str, op: FieldOp, value: &'v Value) -> DocumentStoreResult<&'v [Value]> {
    value.as_array().map(Vec::as_slice).ok_or_else(|| {
        DocumentStoreError::InvalidCriteria(format!(
            "{op:?} on '{field}' expects an array, found {}",
            type_name(value)
        ))
    })
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_nor(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_or(exprs)?)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(get_path(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Value) -> Result<Self::Output, Self::Error> {
        let field_value = get_path(self.document, field);

        match op {
            FieldOp::Eq => Ok(equals_or_contains(field_value, value)),
            FieldOp::Ne => Ok(!equals_or_contains(field_value, value)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                if matches!(value, Value::Array(_) | Value::Object(_)) {
                    return Err(DocumentStoreError::InvalidCriteria(format!(
                        "{op:?} on '{field}' cannot compare against {}",
                        type_name(value)
                    )));
                }

                Ok(match field_value {
                    Some(v) => compare_or_any(v, value, op),
                    // a missing field equals null, so only the inclusive bounds hold
                    None => value.is_null() && matches!(op, FieldOp::Gte | FieldOp::Lte),
                })
            }
            FieldOp::In => Ok(
                operand_list(field, op, value)?
                    .iter()
                    .any(|candidate| equals_or_contains(field_value, candidate))
            ),
            FieldOp::Nin => Ok(
                !operand_list(field, op, value)?
                    .iter()
                    .any(|candidate| equals_or_contains(field_value, candidate))
            ),
        }
    }

    fn visit_regex(&mut self, field: &str, pattern: &Regex) -> Result<Self::Output, Self::Error> {
        Ok(match get_path(self.document, field) {
            Some(Value::String(s)) => pattern.is_match(s),
            Some(Value::Array(items)) => items
                .iter()
                .any(|item| item.as_str().is_some_and(|s| pattern.is_match(s))),
            _ => false,
        })
    }
}
