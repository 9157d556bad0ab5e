// Caller-supplied configuration overrides (CLI flags, `--set key=value`).

use std::path::PathBuf;
use std::str::FromStr;

use clashgroup_engine::{ClashError, DistanceMetric, FieldMap, OutputFormat};

/// One typed override. Applied after the settings file, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    InputPath(PathBuf),
    OutputPath(PathBuf),
    Threshold(f64),
    Metric(DistanceMetric),
    JoinOnAttribute(bool),
    Format(OutputFormat),
    BlamePaths(Vec<String>),
    PathOrderFile(PathBuf),
    /// Logical field name -> input column.
    Field { field: String, column: String },
}

impl FromStr for Override {
    type Err = ClashError;

    /// Parse `key=value`. Unknown keys and malformed values are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once('=').ok_or_else(|| {
            ClashError::ConfigValidation(format!("override '{s}' is not of the form key=value"))
        })?;
        let key = key.trim();
        let value = value.trim();

        let invalid = |msg: String| ClashError::ConfigValidation(format!("{key}: {msg}"));

        match key {
            "input" => Ok(Self::InputPath(non_empty_path(key, value)?)),
            "output" => Ok(Self::OutputPath(non_empty_path(key, value)?)),
            "threshold" | "box_size" => value
                .parse::<f64>()
                .map(Self::Threshold)
                .map_err(|_| invalid(format!("'{value}' is not a number"))),
            "metric" => value.parse().map(Self::Metric).map_err(invalid),
            "join_on_attribute" | "join" => parse_bool(value)
                .map(Self::JoinOnAttribute)
                .ok_or_else(|| invalid(format!("'{value}' is not a boolean"))),
            "format" => value.parse().map(Self::Format).map_err(invalid),
            "blame_paths" => Ok(Self::BlamePaths(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect(),
            )),
            "path_order_file" => Ok(Self::PathOrderFile(non_empty_path(key, value)?)),
            _ => {
                if let Some(field) = key.strip_prefix("field.") {
                    if !FieldMap::FIELDS.contains(&field) {
                        return Err(ClashError::UnknownOption(key.to_string()));
                    }
                    if value.is_empty() {
                        return Err(invalid("column name is empty".into()));
                    }
                    return Ok(Self::Field { field: field.to_string(), column: value.to_string() });
                }
                Err(ClashError::UnknownOption(key.to_string()))
            }
        }
    }
}

fn non_empty_path(key: &str, value: &str) -> Result<PathBuf, ClashError> {
    if value.is_empty() {
        Err(ClashError::ConfigValidation(format!("{key}: path is empty")))
    } else {
        Ok(PathBuf::from(value))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
