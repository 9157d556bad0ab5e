// clashgroup - group Navisworks clash results by proximity

mod exit_codes;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use clashgroup_cli::pipeline;
use clashgroup_config::{default_settings_path, load_configuration, Configuration, Override};
use clashgroup_engine::{ClashError, DistanceMetric, OutputFormat, RunSummary};

use exit_codes::{clash_exit_code, EXIT_SUCCESS, EXIT_USAGE, EXIT_WRITE};

#[derive(Parser)]
#[command(name = "clashgroup")]
#[command(about = "Group clash-detection results into clusters of nearby clashes")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Only log warnings and errors (RUST_LOG overrides)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    /// Per-axis distance within the box size
    Box,
    /// Straight-line distance within the threshold
    Euclidean,
}

impl From<Metric> for DistanceMetric {
    fn from(m: Metric) -> Self {
        match m {
            Metric::Box => DistanceMetric::Box,
            Metric::Euclidean => DistanceMetric::Euclidean,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest clashes, group them, and write the grouped result
    #[command(after_help = "\
Examples:
  clashgroup run clashes.xml -o out/clash_group
  clashgroup run clashes.xml -o out/clash_group --xlsx -b 2.5 -j
  clashgroup run --config project.toml --set blame_paths=S-Model,M-Model
  clashgroup run clashes.csv -o groups.csv --set field.id='Clash GUID' --json
  clashgroup run --config project.toml --unique-output")]
    Run {
        /// Clash report (.xml) or clash table (.csv/.tsv)
        input: Option<PathBuf>,

        /// Settings file (default: ./clashgroup.toml, then the user config dir)
        #[arg(long, short = 'c', env = "CLASHGROUP_CONFIG")]
        config: Option<PathBuf>,

        /// Output path (extension added when missing)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Box size / distance threshold
        #[arg(long = "box-size", short = 'b', value_name = "SIZE", allow_negative_numbers = true)]
        box_size: Option<f64>,

        /// Distance metric
        #[arg(long, value_enum)]
        metric: Option<Metric>,

        /// Also join clashes that blame the same element
        #[arg(long, short = 'j')]
        join: bool,

        /// Write an Excel workbook instead of CSV
        #[arg(long)]
        xlsx: bool,

        /// Override a setting. Repeatable.
        /// Keys: input, output, threshold, metric, join, format, blame_paths,
        /// path_order_file, field.<name>
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Write to a unique timestamped file next to the output path
        #[arg(long)]
        unique_output: bool,

        /// Print the run summary as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the configuration without running
    #[command(after_help = "\
Examples:
  clashgroup validate --config project.toml
  clashgroup validate --set input=clashes.xml --set output=out.csv --set threshold=2")]
    Validate {
        /// Settings file
        #[arg(long, short = 'c', env = "CLASHGROUP_CONFIG")]
        config: Option<PathBuf>,

        /// Override a setting. Repeatable.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Read a written result back and list group sizes
    #[command(after_help = "\
Examples:
  clashgroup inspect out/clash_group.csv
  clashgroup inspect out/clash_group.xlsx --json")]
    Inspect {
        /// Result file (.csv or .xlsx)
        result: PathBuf,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  clashgroup-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let result = match cli.command {
        Commands::Run {
            input,
            config,
            output,
            box_size,
            metric,
            join,
            xlsx,
            set,
            unique_output,
            json,
        } => {
            let mut overrides = Vec::new();
            if let Some(path) = input {
                overrides.push(Override::InputPath(path));
            }
            if let Some(path) = output {
                overrides.push(Override::OutputPath(path));
            }
            if let Some(size) = box_size {
                overrides.push(Override::Threshold(size));
            }
            if let Some(m) = metric {
                overrides.push(Override::Metric(m.into()));
            }
            if join {
                overrides.push(Override::JoinOnAttribute(true));
            }
            if xlsx {
                overrides.push(Override::Format(OutputFormat::Xlsx));
            }
            cmd_run(config, overrides, set, unique_output, json, cli.quiet)
        }
        Commands::Validate { config, set } => cmd_validate(config, set),
        Commands::Inspect { result, json } => cmd_inspect(result, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ClashError> for CliError {
    fn from(err: ClashError) -> Self {
        let hint = match &err {
            ClashError::MissingOption(_) => {
                Some("pass it as an argument, with --set, or in the settings file".to_string())
            }
            ClashError::UnknownOption(_) => Some(
                "known keys: input, output, threshold, metric, join, format, blame_paths, path_order_file, field.<name>"
                    .to_string(),
            ),
            ClashError::MissingColumn { .. } => {
                Some("map the column with --set field.<name>=<column>".to_string())
            }
            _ => None,
        };
        Self { code: clash_exit_code(&err), message: err.to_string(), hint }
    }
}

/// Settings file plus `--set` overrides, with flag overrides applied last.
fn resolve_configuration(
    config: Option<PathBuf>,
    set: Vec<String>,
    flags: Vec<Override>,
) -> Result<Configuration, CliError> {
    let mut overrides = set
        .iter()
        .map(|s| s.parse::<Override>())
        .collect::<Result<Vec<_>, _>>()?;
    overrides.extend(flags);

    let settings_path = config.or_else(default_settings_path);
    if let Some(ref path) = settings_path {
        tracing::debug!(settings = %path.display(), "using settings file");
    }
    Ok(load_configuration(settings_path.as_deref(), &overrides)?)
}

fn cmd_run(
    config: Option<PathBuf>,
    flags: Vec<Override>,
    set: Vec<String>,
    unique_output: bool,
    json: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let mut configuration = resolve_configuration(config, set, flags)?;
    if unique_output {
        configuration = pipeline::with_unique_output(configuration);
    }

    let summary = pipeline::run(&configuration)?;

    if json {
        let out = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError { code: EXIT_WRITE, message: format!("JSON serialization error: {e}"), hint: None })?;
        println!("{out}");
    }
    if !quiet {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(s: &RunSummary) {
    eprintln!(
        "{} clashes -> {} groups (largest {}), {} skipped, {} excluded",
        s.total_records, s.total_groups, s.largest_group, s.skipped_rows, s.excluded_records,
    );
    for path in &s.outputs {
        eprintln!("wrote {}", path.display());
    }
}

fn cmd_validate(config: Option<PathBuf>, set: Vec<String>) -> Result<(), CliError> {
    let c = resolve_configuration(config, set, Vec::new())?;
    eprintln!("input:     {}", c.input_path.display());
    eprintln!("output:    {}", c.resolved_output_path().display());
    eprintln!("threshold: {} ({})", c.threshold, c.metric);
    eprintln!("join:      {}", c.join_on_attribute);
    if !c.blame_paths.is_empty() {
        eprintln!("blame:     {}", c.blame_paths.join(" > "));
    }
    eprintln!("ok");
    Ok(())
}

fn cmd_inspect(result: PathBuf, json: bool) -> Result<(), CliError> {
    if !result.is_file() {
        return Err(CliError::args(format!("no such file: {}", result.display()))
            .with_hint("pass a .csv or .xlsx written by `clashgroup run`"));
    }
    let assignments = clashgroup_io::read_assignments(&result)?;

    let mut sizes: BTreeMap<u32, usize> = BTreeMap::new();
    for (_, group_id) in &assignments {
        *sizes.entry(*group_id).or_default() += 1;
    }

    if json {
        let groups: Vec<serde_json::Value> = sizes
            .iter()
            .map(|(id, count)| serde_json::json!({ "group": id, "count": count }))
            .collect();
        let out = serde_json::json!({
            "records": assignments.len(),
            "groups": groups,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
    } else {
        println!("{} records in {} groups", assignments.len(), sizes.len());
        for (id, count) in &sizes {
            println!("{id:>6}  {count}");
        }
    }
    Ok(())
}
