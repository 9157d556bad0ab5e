//! One grouping run: ingest -> group -> write -> summarise.

use std::path::Path;

use clashgroup_config::Configuration;
use clashgroup_engine::{compute_summary, group_with, ClashError, RunSummary};
use clashgroup_io::{ingest, run_scoped_output_path, write_results};

/// Run the pipeline for one configuration.
///
/// The threshold is checked before the input is opened, and nothing is
/// written unless ingest and grouping both succeed.
pub fn run(config: &Configuration) -> Result<RunSummary, ClashError> {
    let options = config.grouping_options();
    clashgroup_engine::group::validate_threshold(options.threshold)?;

    let ingested = ingest(&config.input_path, &config.field_map, &config.blame_paths)?;
    let grouping = group_with(&ingested.records, &options)?;
    tracing::info!(
        groups = grouping.group_count,
        excluded = grouping.excluded.len(),
        threshold = options.threshold,
        metric = %options.metric,
        "clashes grouped"
    );

    let report = write_results(&ingested.records, &grouping, &config.output_path, config.format)?;
    Ok(compute_summary(&ingested, &grouping, &report.groups, report.outputs))
}

/// Swap the output path for a unique run-scoped one in the same directory.
pub fn with_unique_output(mut config: Configuration) -> Configuration {
    let path = config.resolved_output_path();
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clash_group".into());
    config.output_path = run_scoped_output_path(dir, &stem, config.format);
    config
}
