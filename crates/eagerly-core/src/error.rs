//! Error types for repository operations.
//!
//! Store failures (`Connection`, `Query`) are passed through untouched.
//! Everything the engine detects on its own is either a `Config` error (the
//! catalog is wrong and no call can succeed) or a `Validation` error (this
//! call's input is wrong).

use std::fmt;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum Error {
    /// The store could not be reached
    Connection(ConnectionError),
    /// The store rejected a statement
    Query(QueryError),
    /// A value had the wrong shape for the requested conversion
    Type(TypeError),
    /// Catalog or repository configuration is unusable
    Config(ConfigError),
    /// Caller input is malformed
    Validation(ValidationError),
    /// Reading a view or configuration file failed
    Io(std::io::Error),
    /// JSON input could not be decoded
    Serde(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<BoxedSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    Connect,
    Disconnected,
    Busy,
}

/// A statement failed in the store. `sql` is the rendered text when the
/// driver reports it.
#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<BoxedSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    Syntax,
    /// Unique, foreign key or not-null violation
    Constraint,
    /// Missing table or column
    NotFound,
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub attribute: Option<String>,
}

/// Fatal: the catalog or configuration can never produce a correct query.
#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
    pub source: Option<BoxedSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A relation points at an entity the catalog does not know
    UnknownTarget,
    /// An entity name was requested that is not registered
    UnknownEntity,
    /// A relation name shadows a column or computed attribute
    NameCollision,
    /// The same entity name was registered twice
    DuplicateEntity,
    /// A configuration document could not be parsed
    Invalid,
}

/// One or more problems with caller input, by field.
#[derive(Debug, Clone, Default)]
pub struct ValidationError {
    pub errors: Vec<FieldValidationError>,
}

#[derive(Debug, Clone)]
pub struct FieldValidationError {
    /// Predicate field, attribute, relation or request key at fault
    pub field: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Unknown predicate operator
    Operator,
    /// Predicate or request has the wrong shape
    Shape,
    /// A date attribute did not parse
    Date,
    /// A virtual column path ended on a relation instead of a value
    Leaf,
    /// The relation cannot be used for this operation
    Relation,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new();
        error.push(field, kind, message);
        error
    }

    pub fn push(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The first problem reported for `field`.
    pub fn for_field(&self, field: &str) -> Option<&FieldValidationError> {
        self.errors.iter().find(|e| e.field == field)
    }
}

impl Error {
    /// A validation error on one field.
    pub fn validation(
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation(ValidationError::single(field, kind, message))
    }

    /// A configuration error without a source.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// SQL of the statement the store rejected, if known.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "store unavailable: {e}"),
            Error::Query(e) => write!(f, "statement failed: {e}"),
            Error::Type(e) => write!(f, "type mismatch: {e}"),
            Error::Config(e) => write!(f, "invalid catalog: {e}"),
            Error::Validation(e) => write!(f, "invalid input: {e}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Serde(msg) => write!(f, "malformed JSON: {msg}"),
        }
    }
}

fn boxed(source: Option<&BoxedSource>) -> Option<&(dyn std::error::Error + 'static)> {
    source.map(|err| err.as_ref() as &(dyn std::error::Error + 'static))
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => boxed(e.source.as_ref()),
            Error::Query(e) => boxed(e.source.as_ref()),
            Error::Config(e) => boxed(e.source.as_ref()),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(name) => write!(f, "'{name}' is {}, expected {}", self.actual, self.expected),
            None => write!(f, "got {}, expected {}", self.actual, self.expected),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_lists_every_field() {
        let single = ValidationError::single("status", ValidationErrorKind::Operator, "unknown operator '~'");
        assert_eq!(single.to_string(), "status: unknown operator '~'");

        let mut many = ValidationError::new();
        many.push("born_on", ValidationErrorKind::Date, "not a date");
        many.push("columns", ValidationErrorKind::Shape, "no usable columns");
        assert_eq!(many.to_string(), "born_on: not a date; columns: no usable columns");
        assert_eq!(
            many.for_field("columns").map(|e| e.kind),
            Some(ValidationErrorKind::Shape)
        );
        assert!(many.for_field("q").is_none());
    }

    #[test]
    fn config_helper_sets_kind() {
        let err = Error::config(ConfigErrorKind::UnknownTarget, "no entity 'ghost'");
        assert!(err.is_config());
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "invalid catalog: no entity 'ghost'");
        match err {
            Error::Config(c) => assert_eq!(c.kind, ConfigErrorKind::UnknownTarget),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn query_error_keeps_sql_and_source() {
        let io = std::io::Error::other("disk gone");
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Database,
            sql: Some("SELECT 1".to_string()),
            message: "disk gone".to_string(),
            source: Some(Box::new(io)),
        });
        assert_eq!(err.sql(), Some("SELECT 1"));
        assert_eq!(err.to_string(), "statement failed: disk gone");
        assert!(std::error::Error::source(&err).is_some());
    }
}
