//! Update specifications.
//!
//! An update is either a plain document, which replaces every field except the
//! identifier, or an operator document such as `{"$set": {...}, "$inc": {...}}`.
//! [`Update::parse`] validates the outer shape; operand checks happen while applying.

use serde_json::Value;

use crate::{
    document::{Document, type_name},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Field-level update operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    /// `$set`: writes a value, creating intermediate objects.
    Set,
    /// `$unset`: removes a field.
    Unset,
    /// `$inc`: adds to a number.
    Inc,
    /// `$mul`: multiplies a number.
    Mul,
    /// `$min`: keeps the smaller of the current and given value.
    Min,
    /// `$max`: keeps the larger of the current and given value.
    Max,
    /// `$rename`: moves a field to a new name.
    Rename,
    /// `$push`: appends to an array (supports `$each`).
    Push,
    /// `$addToSet`: appends values not already present (supports `$each`).
    AddToSet,
    /// `$pull`: removes array elements equal to a value or matching a condition.
    Pull,
    /// `$pop`: removes the first (`-1`) or last (`1`) array element.
    Pop,
}

impl UpdateOperator {
    /// Looks up an operator by its `$`-prefixed name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$set" => UpdateOperator::Set,
            "$unset" => UpdateOperator::Unset,
            "$inc" => UpdateOperator::Inc,
            "$mul" => UpdateOperator::Mul,
            "$min" => UpdateOperator::Min,
            "$max" => UpdateOperator::Max,
            "$rename" => UpdateOperator::Rename,
            "$push" => UpdateOperator::Push,
            "$addToSet" => UpdateOperator::AddToSet,
            "$pull" => UpdateOperator::Pull,
            "$pop" => UpdateOperator::Pop,
            _ => return None,
        })
    }

    /// The `$`-prefixed name of the operator.
    pub fn name(&self) -> &'static str {
        match self {
            UpdateOperator::Set => "$set",
            UpdateOperator::Unset => "$unset",
            UpdateOperator::Inc => "$inc",
            UpdateOperator::Mul => "$mul",
            UpdateOperator::Min => "$min",
            UpdateOperator::Max => "$max",
            UpdateOperator::Rename => "$rename",
            UpdateOperator::Push => "$push",
            UpdateOperator::AddToSet => "$addToSet",
            UpdateOperator::Pull => "$pull",
            UpdateOperator::Pop => "$pop",
        }
    }
}

/// A parsed update specification.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Replace every field except the identifier.
    Replace(Document),
    /// Apply operators in order; each carries its `{path: operand}` arguments.
    Operators(Vec<(UpdateOperator, Document)>),
}

impl Update {
    /// Parses a JSON update specification.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidDocument`] if the value is not an object or
    ///   mixes operators with plain fields
    /// - [`DocumentStoreError::UnsupportedOperator`] for unknown `$` keys
    /// - [`DocumentStoreError::TypeMismatch`] if an operator's argument is not an object
    pub fn parse(update: &Value) -> DocumentStoreResult<Update> {
        let map = match update {
            Value::Object(map) => map,
            other => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "update must be an object, found {}",
                    type_name(other)
                )));
            }
        };

        if !map.keys().any(|k| k.starts_with('$')) {
            return Ok(Update::Replace(map.clone()));
        }

        if let Some(plain) = map.keys().find(|k| !k.starts_with('$')) {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "update mixes operators with plain field '{plain}'"
            )));
        }

        let mut operators = Vec::with_capacity(map.len());

        for (name, args) in map {
            let op = UpdateOperator::from_name(name)
                .ok_or_else(|| DocumentStoreError::UnsupportedOperator(name.clone()))?;

            match args {
                Value::Object(args) => operators.push((op, args.clone())),
                other => {
                    return Err(DocumentStoreError::TypeMismatch(format!(
                        "{name} expects an object, found {}",
                        type_name(other)
                    )));
                }
            }
        }

        Ok(Update::Operators(operators))
    }

    /// Creates a builder for an operator update.
    pub fn builder() -> UpdateBuilder {
        UpdateBuilder::default()
    }

    /// Returns `true` if this update replaces the whole document.
    pub fn is_replacement(&self) -> bool {
        matches!(self, Update::Replace(_))
    }
}

/// Conversion into a parsed [`Update`].
pub trait IntoUpdate {
    /// Converts `self` into an [`Update`].
    fn into_update(self) -> DocumentStoreResult<Update>;
}

impl IntoUpdate for Update {
    fn into_update(self) -> DocumentStoreResult<Update> {
        Ok(self)
    }
}

impl IntoUpdate for Value {
    fn into_update(self) -> DocumentStoreResult<Update> {
        Update::parse(&self)
    }
}

impl IntoUpdate for &Value {
    fn into_update(self) -> DocumentStoreResult<Update> {
        Update::parse(self)
    }
}

/// Fluent builder for operator updates.
///
/// ```ignore
/// let update = Update::builder().set("status", "active").inc("logins", 1).build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct UpdateBuilder {
    operators: Vec<(UpdateOperator, Document)>,
}

impl UpdateBuilder {
    /// Adds a `$set` of `field` to `value`.
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(UpdateOperator::Set, field.into(), value.into())
    }

    /// Adds an `$unset` of `field`.
    pub fn unset(self, field: impl Into<String>) -> Self {
        self.with(UpdateOperator::Unset, field.into(), Value::String(String::new()))
    }

    /// Adds an `$inc` of `field` by `amount`.
    pub fn inc(self, field: impl Into<String>, amount: impl Into<Value>) -> Self {
        self.with(UpdateOperator::Inc, field.into(), amount.into())
    }

    /// Adds a `$push` of `value` onto the array at `field`.
    pub fn push(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(UpdateOperator::Push, field.into(), value.into())
    }

    /// Adds a `$pull` of `value` from the array at `field`.
    pub fn pull(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(UpdateOperator::Pull, field.into(), value.into())
    }

    pub fn build(self) -> Update {
        Update::Operators(self.operators)
    }

    fn with(mut self, op: UpdateOperator, field: String, value: Value) -> Self {
        match self.operators.iter_mut().find(|(existing, _)| *existing == op) {
            Some((_, args)) => {
                args.insert(field, value);
            }
            None => {
                let mut args = Document::new();
                args.insert(field, value);
                self.operators.push((op, args));
            }
        }
        self
    }
}
