//! Projection specifications.
//!
//! A projection is either inclusion-only (`{"name": 1, "age": 1}`) or exclusion-only
//! (`{"password": 0}`). The identifier is kept in inclusion mode unless it is
//! excluded explicitly with `{"_id": 0}`, which is the one exclusion allowed next
//! to inclusions.

use serde_json::Value;

use crate::{
    document::{ID_FIELD, type_name},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// A parsed projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only the listed paths, plus the identifier when `id` is set.
    Include {
        /// Dotted paths to keep.
        fields: Vec<String>,
        /// Whether the identifier is kept.
        id: bool,
    },
    /// Drop the listed paths and keep everything else.
    Exclude {
        /// Dotted paths to drop.
        fields: Vec<String>,
    },
}

impl Projection {
    /// An inclusion projection of the given paths.
    pub fn include<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Projection::Include {
            fields: fields.into_iter().map(Into::into).collect(),
            id: true,
        }
    }

    /// An exclusion projection of the given paths.
    pub fn exclude<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Projection::Exclude {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Drops the identifier from the result.
    pub fn without_id(self) -> Self {
        match self {
            Projection::Include { fields, .. } => Projection::Include { fields, id: false },
            Projection::Exclude { mut fields } => {
                if !fields.iter().any(|f| f == ID_FIELD) {
                    fields.push(ID_FIELD.to_string());
                }
                Projection::Exclude { fields }
            }
        }
    }

    /// Parses a JSON projection. `null` and `{}` mean "no projection".
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidProjection`] for non-flag values and for
    /// projections that mix inclusion and exclusion on fields other than `_id`.
    pub fn parse(projection: &Value) -> DocumentStoreResult<Option<Projection>> {
        let map = match projection {
            Value::Null => return Ok(None),
            Value::Object(map) if map.is_empty() => return Ok(None),
            Value::Object(map) => map,
            other => {
                return Err(DocumentStoreError::InvalidProjection(format!(
                    "projection must be an object, found {}",
                    type_name(other)
                )));
            }
        };

        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut id_flag = None;

        for (field, flag) in map {
            let include = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64() != Some(0.0),
                other => {
                    return Err(DocumentStoreError::InvalidProjection(format!(
                        "flag for '{field}' must be 0/1 or a boolean, found {}",
                        type_name(other)
                    )));
                }
            };

            if field == ID_FIELD {
                id_flag = Some(include);
            } else if include {
                included.push(field.clone());
            } else {
                excluded.push(field.clone());
            }
        }

        if !included.is_empty() && !excluded.is_empty() {
            return Err(DocumentStoreError::InvalidProjection(format!(
                "cannot mix inclusion of {included:?} with exclusion of {excluded:?}"
            )));
        }

        Ok(Some(match (included.is_empty(), excluded.is_empty(), id_flag) {
            (false, _, id) => Projection::Include { fields: included, id: id.unwrap_or(true) },
            (true, false, Some(false)) => {
                excluded.push(ID_FIELD.to_string());
                Projection::Exclude { fields: excluded }
            }
            (true, false, _) => Projection::Exclude { fields: excluded },
            (true, true, Some(false)) => Projection::Exclude { fields: vec![ID_FIELD.to_string()] },
            (true, true, _) => Projection::Include { fields: Vec::new(), id: true },
        }))
    }
}

/// Conversion into an optional parsed [`Projection`].
pub trait IntoProjection {
    /// Converts `self` into a projection; `None` keeps documents whole.
    fn into_projection(self) -> DocumentStoreResult<Option<Projection>>;
}

impl IntoProjection for Projection {
    fn into_projection(self) -> DocumentStoreResult<Option<Projection>> {
        Ok(Some(self))
    }
}

impl IntoProjection for Option<Projection> {
    fn into_projection(self) -> DocumentStoreResult<Option<Projection>> {
        Ok(self)
    }
}

impl IntoProjection for Value {
    fn into_projection(self) -> DocumentStoreResult<Option<Projection>> {
        Projection::parse(&self)
    }
}

impl IntoProjection for &Value {
    fn into_projection(self) -> DocumentStoreResult<Option<Projection>> {
        Projection::parse(self)
    }
}
