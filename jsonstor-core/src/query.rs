//! Criteria construction, parsing, and the visitor used to evaluate it.
//!
//! Criteria arrive either as Mongo-style JSON objects or are built with the [`Filter`]
//! helpers. Both produce the same [`Expr`] tree, which is validated once up front so
//! malformed queries are rejected before any document is looked at.
//!
//! ```ignore
//! use jsonstor::query::{Expr, Filter};
//! use serde_json::json;
//!
//! let parsed = Expr::parse(&json!({ "age": { "$gt": 18 }, "status": "active" }))?;
//! let built = Filter::gt("age", 18).and(Filter::eq("status", "active"));
//! ```
//!
//! # Supported operators
//!
//! - Comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - Membership: `$in`, `$nin`
//! - Element: `$exists`
//! - Pattern: `$regex` (with `$options`)
//! - Logical: `$and`, `$or`, `$nor`, `$not`

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::{
    document::type_name,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9).
    Asc,
    /// Descending order (Z to A, 9 to 0).
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone)]
pub struct Sort {
    /// The (possibly dotted) field to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match, numbers compared by value).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field equals any value of the operand array.
    In,
    /// Field equals none of the values of the operand array.
    Nin,
}

/// A parsed, validated filter expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Logical AND of multiple expressions. An empty list matches everything.
    And(Vec<Expr>),
    /// Logical OR of multiple expressions.
    Or(Vec<Expr>),
    /// Logical NOR of multiple expressions (none may match).
    Nor(Vec<Expr>),
    /// Logical NOT of an expression.
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The dotted field path.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The operand.
        value: Value,
    },
    /// Pattern match against a string field.
    Regex {
        /// The dotted field path.
        field: String,
        /// The compiled pattern.
        pattern: Regex,
    },
}

impl Expr {
    /// An expression that matches every document.
    pub fn all() -> Self {
        Expr::And(Vec::new())
    }

    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Value) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Parses a Mongo-style criteria object.
    ///
    /// `null` and `{}` both match every document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCriteria`] for unknown operators and
    /// operands of the wrong type.
    pub fn parse(criteria: &Value) -> DocumentStoreResult<Expr> {
        match criteria {
            Value::Null => Ok(Expr::all()),
            Value::Object(map) => parse_document(map),
            other => Err(invalid(format!(
                "criteria must be an object, found {}",
                type_name(other)
            ))),
        }
    }
}

/// Conversion into a validated criteria expression.
///
/// Implemented for raw JSON criteria and for already-built [`Expr`] trees, so every
/// engine operation accepts either.
pub trait IntoCriteria {
    /// Converts `self` into an [`Expr`].
    fn into_criteria(self) -> DocumentStoreResult<Expr>;
}

impl IntoCriteria for Expr {
    fn into_criteria(self) -> DocumentStoreResult<Expr> {
        Ok(self)
    }
}

impl IntoCriteria for Value {
    fn into_criteria(self) -> DocumentStoreResult<Expr> {
        Expr::parse(&self)
    }
}

impl IntoCriteria for &Value {
    fn into_criteria(self) -> DocumentStoreResult<Expr> {
        Expr::parse(self)
    }
}

fn parse_document(map: &Map<String, Value>) -> DocumentStoreResult<Expr> {
    let mut exprs = Vec::with_capacity(map.len());

    for (key, value) in map {
        match key.as_str() {
            "$and" => exprs.push(Expr::And(parse_list(key, value)?)),
            "$or" => exprs.push(Expr::Or(parse_list(key, value)?)),
            "$nor" => exprs.push(Expr::Nor(parse_list(key, value)?)),
            "$not" => match value {
                Value::Object(inner) => exprs.push(parse_document(inner)?.not()),
                other => {
                    return Err(invalid(format!(
                        "$not expects an object, found {}",
                        type_name(other)
                    )));
                }
            },
            op if op.starts_with('$') => {
                return Err(invalid(format!("unknown top-level operator {op}")));
            }
            field => exprs.push(parse_field(field, value)?),
        }
    }

    Ok(collapse(exprs))
}

fn parse_list(op: &str, value: &Value) -> DocumentStoreResult<Vec<Expr>> {
    let items = match value {
        Value::Array(items) if !items.is_empty() => items,
        _ => return Err(invalid(format!("{op} expects a non-empty array"))),
    };

    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => parse_document(map),
            other => Err(invalid(format!(
                "{op} entries must be objects, found {}",
                type_name(other)
            ))),
        })
        .collect()
}

fn parse_field(field: &str, value: &Value) -> DocumentStoreResult<Expr> {
    let ops = match value {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => ops,
        _ => return Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone())),
    };

    if !ops.keys().all(|k| k.starts_with('$')) {
        return Err(invalid(format!(
            "field '{field}' mixes operators with plain keys"
        )));
    }

    let options = match ops.get("$options") {
        None => None,
        Some(Value::String(options)) if ops.contains_key("$regex") => Some(options.as_str()),
        Some(Value::String(_)) => return Err(invalid("$options requires $regex".to_string())),
        Some(other) => {
            return Err(invalid(format!(
                "$options expects a string, found {}",
                type_name(other)
            )));
        }
    };

    let mut exprs = Vec::with_capacity(ops.len());

    for (op, operand) in ops {
        let expr = match op.as_str() {
            "$eq" => Expr::field(field.to_string(), FieldOp::Eq, operand.clone()),
            "$ne" => Expr::field(field.to_string(), FieldOp::Ne, operand.clone()),
            "$gt" => comparison(field, op, FieldOp::Gt, operand)?,
            "$gte" => comparison(field, op, FieldOp::Gte, operand)?,
            "$lt" => comparison(field, op, FieldOp::Lt, operand)?,
            "$lte" => comparison(field, op, FieldOp::Lte, operand)?,
            "$in" => membership(field, op, FieldOp::In, operand)?,
            "$nin" => membership(field, op, FieldOp::Nin, operand)?,
            "$exists" => match operand {
                Value::Bool(flag) => Expr::Exists(field.to_string(), *flag),
                Value::Number(n) => Expr::Exists(field.to_string(), n.as_f64() != Some(0.0)),
                other => {
                    return Err(invalid(format!(
                        "$exists expects a boolean, found {}",
                        type_name(other)
                    )));
                }
            },
            "$regex" => match operand {
                Value::String(pattern) => Expr::Regex {
                    field: field.to_string(),
                    pattern: compile_regex(pattern, options)?,
                },
                other => {
                    return Err(invalid(format!(
                        "$regex expects a string, found {}",
                        type_name(other)
                    )));
                }
            },
            "$options" => continue,
            "$not" => match operand {
                Value::Object(_) => parse_field(field, operand)?.not(),
                other => {
                    return Err(invalid(format!(
                        "$not expects an object, found {}",
                        type_name(other)
                    )));
                }
            },
            other => return Err(invalid(format!("unknown operator {other} on field '{field}'"))),
        };

        exprs.push(expr);
    }

    Ok(collapse(exprs))
}

fn comparison(field: &str, name: &str, op: FieldOp, operand: &Value) -> DocumentStoreResult<Expr> {
    match operand {
        Value::Array(_) | Value::Object(_) => Err(invalid(format!(
            "{name} cannot compare against {}",
            type_name(operand)
        ))),
        _ => Ok(Expr::field(field.to_string(), op, operand.clone())),
    }
}

fn membership(field: &str, name: &str, op: FieldOp, operand: &Value) -> DocumentStoreResult<Expr> {
    match operand {
        Value::Array(_) => Ok(Expr::field(field.to_string(), op, operand.clone())),
        other => Err(invalid(format!(
            "{name} expects an array, found {}",
            type_name(other)
        ))),
    }
}

fn compile_regex(pattern: &str, options: Option<&str>) -> DocumentStoreResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);

    for flag in options.unwrap_or_default().chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(invalid(format!("unknown $options flag '{other}'"))),
        };
    }

    builder
        .build()
        .map_err(|e| invalid(format!("invalid $regex pattern: {e}")))
}

fn collapse(mut exprs: Vec<Expr>) -> Expr {
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::And(exprs)
    }
}

fn invalid(message: String) -> DocumentStoreError {
    DocumentStoreError::InvalidCriteria(message)
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names as `Into<String>` and values as `Into<Value>`.
///
/// ```ignore
/// use jsonstor::query::Filter;
///
/// let expr = Filter::eq("name", "Alice").and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::In,
            Value::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::Nin,
            Value::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Matches documents whose string field matches the pattern.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCriteria`] if the pattern does not compile.
    pub fn regex(field: impl Into<String>, pattern: &str) -> DocumentStoreResult<Expr> {
        Ok(Expr::Regex {
            field: field.into(),
            pattern: compile_regex(pattern, None)?,
        })
    }

    /// All expressions must match.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCriteria`] for an empty list, like
    /// `{"$and": []}`. Use [`Expr::all`] to match everything.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> DocumentStoreResult<Expr> {
        non_empty("$and", exprs).map(Expr::And)
    }

    /// Any expression may match.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCriteria`] for an empty list.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> DocumentStoreResult<Expr> {
        non_empty("$or", exprs).map(Expr::Or)
    }

    /// No expression may match.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCriteria`] for an empty list.
    pub fn nor(exprs: impl IntoIterator<Item = Expr>) -> DocumentStoreResult<Expr> {
        non_empty("$nor", exprs).map(Expr::Nor)
    }
}

fn non_empty(op: &str, exprs: impl IntoIterator<Item = Expr>) -> DocumentStoreResult<Vec<Expr>> {
    let exprs: Vec<Expr> = exprs.into_iter().collect();
    if exprs.is_empty() {
        return Err(invalid(format!("{op} expects a non-empty array")));
    }
    Ok(exprs)
}

/// Options for `FindMany`: ordering and windowing applied before projection.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Optional sort specification.
    pub sort: Option<Sort>,
    /// Number of matching documents to skip.
    pub skip: Option<usize>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Creates a new options builder.
    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    /// Sets the sort field and direction.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options.sort = Some(Sort { field: field.into(), direction });
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn build(self) -> FindOptions {
        self.options
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_nor(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        value: &Value,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_regex(&mut self, field: &str, pattern: &Regex) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Nor(exprs) => self.visit_nor(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, *op, value),
            Expr::Regex { field, pattern } => self.visit_regex(field, pattern),
        }
    }
}
