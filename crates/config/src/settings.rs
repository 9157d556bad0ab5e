// Run configuration
// Loaded from clashgroup.toml (or ~/.config/clashgroup/settings.toml) plus overrides

use std::path::{Path, PathBuf};

use serde::Deserialize;

use clashgroup_engine::group::validate_threshold;
use clashgroup_engine::{ClashError, DistanceMetric, FieldMap, GroupingOptions, OutputFormat};

use crate::overrides::Override;
use crate::path_order::parse_path_order;

/// Box size used when neither the settings file nor an override sets one.
pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// File name looked up in the working directory before the user config dir.
pub const LOCAL_SETTINGS_FILE: &str = "clashgroup.toml";

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    paths: PathsSection,
    grouping: GroupingSection,
    output: OutputSection,
    fields: FieldMap,
    blame: BlameSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PathsSection {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    path_order_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GroupingSection {
    threshold: Option<f64>,
    metric: Option<DistanceMetric>,
    join_on_attribute: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OutputSection {
    format: Option<OutputFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BlameSection {
    paths: Vec<String>,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Immutable per-run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub threshold: f64,
    pub metric: DistanceMetric,
    pub join_on_attribute: bool,
    pub format: OutputFormat,
    pub field_map: FieldMap,
    /// Blame precedence, highest first.
    pub blame_paths: Vec<String>,
}

impl Configuration {
    pub fn grouping_options(&self) -> GroupingOptions {
        GroupingOptions {
            threshold: self.threshold,
            metric: self.metric,
            join_on_attribute: self.join_on_attribute,
        }
    }

    /// Output path with the format's extension guaranteed.
    pub fn resolved_output_path(&self) -> PathBuf {
        self.format.ensure_extension(&self.output_path)
    }
}

/// Values collected from the file and overrides before validation.
#[derive(Debug, Default)]
struct Draft {
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    path_order_file: Option<PathBuf>,
    threshold: Option<f64>,
    metric: Option<DistanceMetric>,
    join_on_attribute: Option<bool>,
    format: Option<OutputFormat>,
    field_map: FieldMap,
    blame_paths: Vec<String>,
}

impl Draft {
    fn from_file(file: SettingsFile, base_dir: &Path) -> Self {
        let resolve = |p: PathBuf| if p.is_relative() { base_dir.join(p) } else { p };
        Self {
            input_path: file.paths.input.map(resolve),
            output_path: file.paths.output.map(resolve),
            path_order_file: file.paths.path_order_file.map(resolve),
            threshold: file.grouping.threshold,
            metric: file.grouping.metric,
            join_on_attribute: file.grouping.join_on_attribute,
            format: file.output.format,
            field_map: file.fields,
            blame_paths: file.blame.paths,
        }
    }

    fn apply(&mut self, ov: &Override) {
        match ov {
            Override::InputPath(p) => self.input_path = Some(p.clone()),
            Override::OutputPath(p) => self.output_path = Some(p.clone()),
            Override::Threshold(t) => self.threshold = Some(*t),
            Override::Metric(m) => self.metric = Some(*m),
            Override::JoinOnAttribute(j) => self.join_on_attribute = Some(*j),
            Override::Format(f) => self.format = Some(*f),
            Override::BlamePaths(paths) => self.blame_paths = paths.clone(),
            Override::PathOrderFile(p) => self.path_order_file = Some(p.clone()),
            Override::Field { field, column } => {
                // Field names are checked when the override is parsed.
                self.field_map.set(field, column.clone());
            }
        }
    }

    fn finish(self) -> Result<Configuration, ClashError> {
        let threshold = self.threshold.unwrap_or(DEFAULT_THRESHOLD);
        validate_threshold(threshold)?;

        let input_path = self.input_path.ok_or(ClashError::MissingOption("input"))?;
        let output_path = self.output_path.ok_or(ClashError::MissingOption("output"))?;

        let mut blame_paths = match self.path_order_file {
            Some(ref path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ClashError::PathOrder(format!("cannot read {}: {e}", path.display()))
                })?;
                parse_path_order(&text).map_err(|e| {
                    ClashError::PathOrder(format!("{}: {e}", path.display()))
                })?
            }
            None => Vec::new(),
        };
        blame_paths.extend(self.blame_paths);

        let format = self
            .format
            .unwrap_or_else(|| OutputFormat::from_path(&output_path));

        Ok(Configuration {
            input_path,
            output_path,
            threshold,
            metric: self.metric.unwrap_or_default(),
            join_on_attribute: self.join_on_attribute.unwrap_or(false),
            format,
            field_map: self.field_map,
            blame_paths,
        })
    }
}

/// Load the run configuration.
///
/// `settings_path` is optional; without it only built-in defaults and
/// `overrides` apply. Overrides win over file values for the same key.
/// Relative paths in the settings file resolve against the file's directory.
pub fn load_configuration(
    settings_path: Option<&Path>,
    overrides: &[Override],
) -> Result<Configuration, ClashError> {
    let mut draft = match settings_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                ClashError::ConfigParse(format!("cannot read {}: {e}", path.display()))
            })?;
            let file = parse_settings(&text)?;
            let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
            Draft::from_file(file, base_dir)
        }
        None => Draft::default(),
    };

    for ov in overrides {
        draft.apply(ov);
    }

    let config = draft.finish()?;
    tracing::debug!(
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        threshold = config.threshold,
        metric = %config.metric,
        blame_paths = config.blame_paths.len(),
        "configuration loaded"
    );
    Ok(config)
}

fn parse_settings(text: &str) -> Result<SettingsFile, ClashError> {
    toml::from_str(text).map_err(|e| ClashError::ConfigParse(e.to_string()))
}

/// `clashgroup.toml` in the working directory, else the per-user settings file.
pub fn default_settings_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_SETTINGS_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|d| d.join("clashgroup").join("settings.toml"))
        .filter(|p| p.is_file())
}
