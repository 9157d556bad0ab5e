// Result artifacts: dispatch between CSV and XLSX, shared row layout

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clashgroup_engine::{build_groups, ClashError, ClashRecord, Group, Grouping, OutputFormat};

/// Columns of the per-record table.
pub const RECORD_HEADER: [&str; 11] = [
    "Group",
    "Clash Test",
    "Clash ID",
    "Clash Name",
    "X",
    "Y",
    "Z",
    "Status",
    "Path Blame",
    "Attribute Name",
    "Attribute Value",
];

/// Columns of the per-group summary table.
pub const SUMMARY_HEADER: [&str; 13] = [
    "Group",
    "Clash Test",
    "Origin Clash",
    "Group Count",
    "Centroid X",
    "Centroid Y",
    "Centroid Z",
    "Origin Path Blame",
    "Origin Attribute Name",
    "Origin Attribute Value",
    "Group Attribute Names",
    "Group Attribute Values",
    "Clash Group",
];

pub const RECORDS_SHEET: &str = "Clash Groups";
pub const SUMMARY_SHEET: &str = "Summary";

#[derive(Debug, Clone, PartialEq)]
pub struct WriteReport {
    /// Every file written, records artifact first.
    pub outputs: Vec<PathBuf>,
    pub rows: usize,
    pub groups: Vec<Group>,
}

pub fn format_coord(v: f64) -> String {
    v.to_string()
}

/// Group id per record index; `None` for records left out of grouping.
pub fn group_by_index(len: usize, grouping: &Grouping) -> Vec<Option<u32>> {
    let mut out = vec![None; len];
    for a in &grouping.assignments {
        if let Some(slot) = out.get_mut(a.index) {
            *slot = Some(a.group_id);
        }
    }
    out
}

/// Summary table rows as text, one per group.
pub fn summary_rows(records: &[ClashRecord], groups: &[Group]) -> Vec<Vec<String>> {
    groups
        .iter()
        .map(|g| {
            let origin = &records[g.origin];
            let names: Vec<&str> = g.members.iter().map(|&i| records[i].name.as_str()).collect();
            vec![
                g.id.to_string(),
                g.test.clone(),
                origin.name.clone(),
                g.count().to_string(),
                format_coord(g.centroid.x),
                format_coord(g.centroid.y),
                format_coord(g.centroid.z),
                origin.blame_path().to_string(),
                origin.blame_attribute_name().to_string(),
                origin.blame_attribute_value().to_string(),
                g.attribute_names.join(", "),
                g.attribute_values.join(", "),
                names.join(", "),
            ]
        })
        .collect()
}

/// `out/clash_group.csv` -> `out/clash_group.summary.csv`
pub fn summary_path_for(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clash_group".into());
    output_path.with_file_name(format!("{stem}.summary.csv"))
}

/// Unique per-run output path: `<dir>/<stem>_<YYYY-MM-DD-HHMM>_<8 hex>.<ext>`.
pub fn run_scoped_output_path(dir: &Path, stem: &str, format: OutputFormat) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d-%H%M");
    let run_id = uuid::Uuid::new_v4().simple().to_string();
    dir.join(format!("{stem}_{stamp}_{}.{}", &run_id[..8], format.extension()))
}

/// Write grouped records plus the group summary.
///
/// The format's extension is appended to `output_path` when missing. Existing
/// files are overwritten.
pub fn write_results(
    records: &[ClashRecord],
    grouping: &Grouping,
    output_path: &Path,
    format: OutputFormat,
) -> Result<WriteReport, ClashError> {
    let path = format.ensure_extension(output_path);
    let groups = build_groups(records, grouping);

    let outputs = match format {
        OutputFormat::Csv => {
            let summary_path = summary_path_for(&path);
            let file = File::create(&path).map_err(|e| ClashError::write(&path, e))?;
            crate::csv::write_records_csv(records, grouping, BufWriter::new(file))
                .map_err(|e| ClashError::write(&path, e))?;
            let summary = File::create(&summary_path)
                .map_err(|e| e.to_string())
                .and_then(|file| crate::csv::write_summary_csv(records, &groups, BufWriter::new(file)));
            if let Err(e) = summary {
                // No half-written run: the records file goes too.
                let _ = std::fs::remove_file(&path);
                return Err(ClashError::write(&summary_path, e));
            }
            vec![path, summary_path]
        }
        OutputFormat::Xlsx => {
            crate::xlsx::write_results_xlsx(records, grouping, &groups, &path)
                .map_err(|e| ClashError::write(&path, e))?;
            vec![path]
        }
    };

    tracing::info!(
        output = %outputs[0].display(),
        rows = records.len(),
        groups = groups.len(),
        "results written"
    );

    Ok(WriteReport {
        outputs,
        rows: records.len(),
        groups,
    })
}

/// Read `(clash id, group id)` pairs back from a written records artifact.
pub fn read_assignments(path: &Path) -> Result<Vec<(String, u32)>, ClashError> {
    match OutputFormat::from_path(path) {
        OutputFormat::Csv => {
            let content = crate::csv::read_file_as_utf8(path).map_err(|e| ClashError::ingest(path, e))?;
            crate::csv::read_assignments_csv(&content).map_err(|e| ClashError::ingest(path, e))
        }
        OutputFormat::Xlsx => {
            crate::xlsx::read_assignments_xlsx(path).map_err(|e| ClashError::ingest(path, e))
        }
    }
}
