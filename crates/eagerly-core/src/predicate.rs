//! Filter predicates: `{field, operator, value}` triples.
//!
//! A predicate field may be dot-qualified (`orders.status`,
//! `orders.items.sku`) to filter on a related entity's column. Shapes are
//! validated when the predicate is built so malformed input fails before any
//! SQL is generated.

use crate::error::{Error, Result, ValidationErrorKind};
use crate::value::Value;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    In,
    NotIn,
}

fn operator_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^\s*(=|!=|<>|<=|>=|<|>|(?:not\s+)?like|(?:not\s+)?in)\s*$").ok())
        .as_ref()
}

fn field_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").ok())
        .as_ref()
}

impl Operator {
    /// Parse an operator token such as `"="`, `"LIKE"` or `"not  in"`.
    pub fn parse(token: &str) -> Result<Self> {
        let normalized = match operator_pattern().and_then(|re| re.captures(token)) {
            Some(caps) => caps[1].split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
            None => {
                return Err(Error::validation(
                    "operator",
                    ValidationErrorKind::Operator,
                    format!("unsupported operator '{token}'"),
                ));
            }
        };
        Ok(match normalized.as_str() {
            "=" => Operator::Eq,
            "!=" | "<>" => Operator::NotEq,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "in" => Operator::In,
            _ => Operator::NotIn,
        })
    }

    /// SQL spelling of the operator.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }

    /// Whether the operator takes a list of values.
    pub const fn is_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One filter condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    field: String,
    op: Operator,
    value: Value,
}

impl Predicate {
    /// Build a validated predicate.
    ///
    /// `in` / `not in` need an array value; every other operator needs a
    /// scalar. The field must be a plain or dot-qualified identifier.
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Result<Self> {
        let field = field.into();
        let value = value.into();
        validate_field(&field)?;
        match (&value, op.is_list()) {
            (Value::Array(_), true) => {}
            (_, true) => {
                return Err(Error::validation(
                    &field,
                    ValidationErrorKind::Shape,
                    format!("operator {op} needs a list value, got {}", value.type_name()),
                ));
            }
            (v, false) if !v.is_scalar() => {
                return Err(Error::validation(
                    &field,
                    ValidationErrorKind::Shape,
                    format!("operator {op} needs a scalar value, got {}", v.type_name()),
                ));
            }
            _ => {}
        }
        Ok(Self { field, op, value })
    }

    /// Bare `{field: value}` equality.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::new(field, Operator::Eq, value)
    }

    /// Parse the `(field, operator, value)` triple form.
    pub fn parse(field: impl Into<String>, op: &str, value: impl Into<Value>) -> Result<Self> {
        Self::new(field, Operator::parse(op)?, value)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether the field walks a relation path.
    pub fn is_qualified(&self) -> bool {
        self.field.contains('.')
    }
}

fn validate_field(field: &str) -> Result<()> {
    let valid = match field_pattern() {
        Some(re) => re.is_match(field),
        None => !field.is_empty(),
    };
    if valid {
        Ok(())
    } else {
        Err(Error::validation(
            field,
            ValidationErrorKind::Shape,
            "field must be an identifier or a dot-separated identifier path",
        ))
    }
}

/// An ordered, conjunctive list of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicates(Vec<Predicate>);

impl Predicates {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.0.push(predicate);
    }

    /// Builder-style push.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.0.push(predicate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Predicate> {
        self.0.iter()
    }

    /// Whether any predicate walks a relation path.
    pub fn any_qualified(&self) -> bool {
        self.0.iter().any(Predicate::is_qualified)
    }

    /// Parse predicates from request JSON.
    ///
    /// Accepted shapes:
    /// - `{"status": "paid", "customer_id": 3}`: equality per key
    /// - `[["total", ">", 10], {"status": "paid"}]`: triples or equality objects
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let mut out = Self::new();
        match json {
            serde_json::Value::Null => {}
            serde_json::Value::Object(map) => {
                for (field, value) in map {
                    out.push(Predicate::eq(field.as_str(), Value::from_json(value))?);
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    match item {
                        serde_json::Value::Array(triple) => out.push(parse_triple(triple)?),
                        serde_json::Value::Object(map) => {
                            for (field, value) in map {
                                out.push(Predicate::eq(field.as_str(), Value::from_json(value))?);
                            }
                        }
                        other => {
                            return Err(Error::validation(
                                "predicates",
                                ValidationErrorKind::Shape,
                                format!("expected [field, operator, value] or {{field: value}}, got {other}"),
                            ));
                        }
                    }
                }
            }
            other => {
                return Err(Error::validation(
                    "predicates",
                    ValidationErrorKind::Shape,
                    format!("expected an object or a list of predicates, got {other}"),
                ));
            }
        }
        Ok(out)
    }
}

fn parse_triple(triple: &[serde_json::Value]) -> Result<Predicate> {
    match triple {
        [serde_json::Value::String(field), serde_json::Value::String(op), value] => {
            Predicate::parse(field.as_str(), op, Value::from_json(value))
        }
        _ => Err(Error::validation(
            "predicates",
            ValidationErrorKind::Shape,
            format!(
                "a predicate triple must be [field, operator, value], got {} element(s)",
                triple.len()
            ),
        )),
    }
}

impl<'a> IntoIterator for &'a Predicates {
    type Item = &'a Predicate;
    type IntoIter = std::slice::Iter<'a, Predicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Predicate> for Predicates {
    fn from_iter<I: IntoIterator<Item = Predicate>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Predicate>> for Predicates {
    fn from(v: Vec<Predicate>) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operator_tokens_normalize() {
        assert_eq!(Operator::parse("=").unwrap(), Operator::Eq);
        assert_eq!(Operator::parse("<>").unwrap(), Operator::NotEq);
        assert_eq!(Operator::parse(" LIKE ").unwrap(), Operator::Like);
        assert_eq!(Operator::parse("not   in").unwrap(), Operator::NotIn);
        assert!(Operator::parse("between").unwrap_err().is_validation());
    }

    #[test]
    fn value_shape_is_checked() {
        assert!(Predicate::new("id", Operator::In, vec![1i64, 2]).is_ok());
        assert!(Predicate::new("id", Operator::In, 1i64).is_err());
        assert!(Predicate::new("id", Operator::Eq, vec![1i64]).is_err());
        assert!(Predicate::eq("bad field", 1i64).is_err());
        assert!(Predicate::eq("orders.status", "paid").unwrap().is_qualified());
    }

    #[test]
    fn json_object_is_equality() {
        let preds = Predicates::from_json(&json!({"status": "paid", "customer_id": 3})).unwrap();
        assert_eq!(preds.len(), 2);
        assert!(preds.iter().all(|p| p.op() == Operator::Eq));
    }

    #[test]
    fn json_list_accepts_triples_and_objects() {
        let preds =
            Predicates::from_json(&json!([["total", ">=", 10], {"orders.status": "paid"}])).unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds.iter().next().unwrap().op(), Operator::Ge);
        assert!(preds.any_qualified());
    }

    #[test]
    fn malformed_json_fails_fast() {
        assert!(Predicates::from_json(&json!([["total", ">"]])).is_err());
        assert!(Predicates::from_json(&json!([42])).is_err());
        assert!(Predicates::from_json(&json!("status")).is_err());
        assert!(Predicates::from_json(&json!([["total", "~", 1]])).is_err());
        assert!(Predicates::from_json(&json!(null)).unwrap().is_empty());
    }
}
