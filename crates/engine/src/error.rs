use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Fatal pipeline error. Anything that can be recovered from per record is a
/// [`RecordError`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ClashError {
    /// Settings file could not be read or is not valid TOML.
    ConfigParse(String),
    /// A setting or override value is malformed.
    ConfigValidation(String),
    /// A required option has no value after overrides were applied.
    MissingOption(&'static str),
    /// Override key is not one of the known options.
    UnknownOption(String),
    /// Grouping threshold must be a finite number greater than zero.
    InvalidThreshold(f64),
    /// Legacy INI path order document is malformed.
    PathOrder(String),
    /// Input artifact cannot be opened or parsed.
    Ingest { path: PathBuf, message: String },
    /// Required column absent from the input header.
    MissingColumn { path: PathBuf, column: String },
    /// Input was readable but produced no usable records.
    NoValidRows { path: PathBuf, skipped: usize },
    /// Output destination cannot be written.
    Write { path: PathBuf, message: String },
}

/// The three fatal error classes surfaced to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Configuration,
    Ingest,
    Write,
}

impl ClashError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ConfigParse(_)
            | Self::ConfigValidation(_)
            | Self::MissingOption(_)
            | Self::UnknownOption(_)
            | Self::InvalidThreshold(_)
            | Self::PathOrder(_) => ErrorClass::Configuration,
            Self::Ingest { .. } | Self::MissingColumn { .. } | Self::NoValidRows { .. } => {
                ErrorClass::Ingest
            }
            Self::Write { .. } => ErrorClass::Write,
        }
    }

    pub fn ingest(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Ingest { path: path.into(), message: message.to_string() }
    }

    pub fn write(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Write { path: path.into(), message: message.to_string() }
    }
}

impl fmt::Display for ClashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingOption(name) => write!(f, "missing required option '{name}'"),
            Self::UnknownOption(name) => write!(f, "unknown option '{name}'"),
            Self::InvalidThreshold(value) => {
                write!(f, "grouping threshold must be a positive number, got {value}")
            }
            Self::PathOrder(msg) => write!(f, "path order error: {msg}"),
            Self::Ingest { path, message } => {
                write!(f, "cannot read {}: {message}", path.display())
            }
            Self::MissingColumn { path, column } => {
                write!(f, "{}: missing column '{column}'", path.display())
            }
            Self::NoValidRows { path, skipped } => {
                write!(f, "{}: no valid clash records ({skipped} skipped)", path.display())
            }
            Self::Write { path, message } => {
                write!(f, "cannot write {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for ClashError {}

// ---------------------------------------------------------------------------
// Recoverable, per-record errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordErrorKind {
    MissingField { field: String },
    InvalidNumber { field: String, value: String },
    DuplicateId { id: String },
    NoBlamePath { paths: Vec<String> },
    NonFiniteCoordinates,
}

/// A single row or clash that was skipped (ingest) or excluded (grouping).
///
/// `row` is 1-based: the data row for delimited input (header excluded), the
/// clash ordinal for XML input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(flatten)]
    pub kind: RecordErrorKind,
}

impl RecordError {
    pub fn new(row: usize, record_id: Option<String>, kind: RecordErrorKind) -> Self {
        Self { row, record_id, kind }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.row)?;
        if let Some(ref id) = self.record_id {
            write!(f, " ({id})")?;
        }
        match &self.kind {
            RecordErrorKind::MissingField { field } => write!(f, ": missing value for '{field}'"),
            RecordErrorKind::InvalidNumber { field, value } => {
                write!(f, ": cannot parse '{field}' value '{value}' as a number")
            }
            RecordErrorKind::DuplicateId { id } => write!(f, ": duplicate clash id '{id}'"),
            RecordErrorKind::NoBlamePath { paths } => write!(
                f,
                ": none of the configured blame paths match [{}]",
                paths.join(", ")
            ),
            RecordErrorKind::NonFiniteCoordinates => write!(f, ": clash point is not finite"),
        }
    }
}

impl std::error::Error for RecordError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(ClashError::InvalidThreshold(-1.0).class(), ErrorClass::Configuration);
        assert_eq!(ClashError::UnknownOption("x".into()).class(), ErrorClass::Configuration);
        assert_eq!(
            ClashError::NoValidRows { path: "a.csv".into(), skipped: 0 }.class(),
            ErrorClass::Ingest
        );
        assert_eq!(ClashError::write("out.csv", "denied").class(), ErrorClass::Write);
    }

    #[test]
    fn record_error_display() {
        let err = RecordError::new(
            3,
            Some("c-3".into()),
            RecordErrorKind::InvalidNumber { field: "x".into(), value: "abc".into() },
        );
        assert_eq!(err.to_string(), "row 3 (c-3): cannot parse 'x' value 'abc' as a number");

        let err = RecordError::new(
            7,
            None,
            RecordErrorKind::NoBlamePath { paths: vec!["a.nwc".into(), "b.nwc".into()] },
        );
        assert!(err.to_string().contains("[a.nwc, b.nwc]"));
    }

    #[test]
    fn record_error_json_is_flat() {
        let err = RecordError::new(2, None, RecordErrorKind::MissingField { field: "id".into() });
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["row"], 2);
        assert_eq!(json["kind"], "missing_field");
        assert_eq!(json["field"], "id");
        assert!(json.get("record_id").is_none());
    }
}
