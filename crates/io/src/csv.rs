// CSV/TSV clash import, result export and read-back

use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

use clashgroup_engine::error::{RecordError, RecordErrorKind};
use clashgroup_engine::{ClashError, ClashObject, ClashRecord, FieldMap, Group, Grouping, Ingested, Point3};

use crate::results::{format_coord, RECORD_HEADER, SUMMARY_HEADER};

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // More columns breaks ties: a real delimiter splits the header widely.
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            // Excel-exported CSVs are commonly Windows-1252
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

struct Columns {
    id: usize,
    x: usize,
    y: usize,
    z: usize,
    name: Option<usize>,
    test: Option<usize>,
    status: Option<usize>,
    path: Option<usize>,
    attribute_name: Option<usize>,
    attribute_value: Option<usize>,
}

impl Columns {
    fn resolve(headers: &[String], map: &FieldMap, source: &Path) -> Result<Self, ClashError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| ClashError::MissingColumn {
                path: source.to_path_buf(),
                column: name.to_string(),
            })
        };
        Ok(Self {
            id: require(&map.id)?,
            x: require(&map.x)?,
            y: require(&map.y)?,
            z: require(&map.z)?,
            name: find(&map.name),
            test: find(&map.test),
            status: find(&map.status),
            path: find(&map.path),
            attribute_name: find(&map.attribute_name),
            attribute_value: find(&map.attribute_value),
        })
    }

    fn mapped(&self) -> HashSet<usize> {
        [self.id, self.x, self.y, self.z]
            .into_iter()
            .chain(
                [
                    self.name,
                    self.test,
                    self.status,
                    self.path,
                    self.attribute_name,
                    self.attribute_value,
                ]
                .into_iter()
                .flatten(),
            )
            .collect()
    }
}

/// Parse delimited clash rows through `field_map`.
///
/// Rows with an empty required cell or an unparsable coordinate are skipped and
/// reported; a required column missing from the header is fatal.
pub fn parse_clash_rows(
    content: &str,
    delimiter: u8,
    field_map: &FieldMap,
    source: &Path,
) -> Result<Ingested, ClashError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ClashError::ingest(source, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let cols = Columns::resolve(&headers, field_map, source)?;
    let mapped = cols.mapped();

    let mut ingested = Ingested::default();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for (i, result) in reader.records().enumerate() {
        let row = i + 1;
        let record = result.map_err(|e| ClashError::ingest(source, e))?;
        let cell = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");
        let opt_cell = |idx: Option<usize>| idx.map(cell).unwrap_or("");

        let id = cell(cols.id);
        let skip = |kind: RecordErrorKind| {
            let err = RecordError::new(row, (!id.is_empty()).then(|| id.to_string()), kind);
            tracing::warn!("skipping {err}");
            err
        };

        if id.is_empty() {
            ingested.skipped.push(skip(RecordErrorKind::MissingField { field: field_map.id.clone() }));
            continue;
        }

        let mut coords = [0.0f64; 3];
        let mut failed = None;
        for (slot, (idx, column)) in [(cols.x, &field_map.x), (cols.y, &field_map.y), (cols.z, &field_map.z)]
            .into_iter()
            .enumerate()
        {
            match parse_coord(cell(idx), column) {
                Ok(v) => coords[slot] = v,
                Err(kind) => {
                    failed = Some(kind);
                    break;
                }
            }
        }
        if let Some(kind) = failed {
            ingested.skipped.push(skip(kind));
            continue;
        }

        if !seen_ids.insert(id.to_string()) {
            ingested.skipped.push(skip(RecordErrorKind::DuplicateId { id: id.to_string() }));
            continue;
        }

        let name = match opt_cell(cols.name) {
            "" => id,
            n => n,
        };

        let mut metadata = BTreeMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if !mapped.contains(&idx) {
                metadata.insert(header.clone(), cell(idx).to_string());
            }
        }

        ingested.records.push(ClashRecord {
            row,
            id: id.to_string(),
            name: name.to_string(),
            test: opt_cell(cols.test).to_string(),
            point: Point3::new(coords[0], coords[1], coords[2]),
            status: opt_cell(cols.status).to_string(),
            objects: vec![ClashObject {
                attribute_name: opt_cell(cols.attribute_name).to_string(),
                attribute_value: opt_cell(cols.attribute_value).to_string(),
                path: opt_cell(cols.path).to_string(),
            }],
            blame: 0,
            metadata,
        });
    }

    Ok(ingested)
}

fn parse_coord(value: &str, column: &str) -> Result<f64, RecordErrorKind> {
    if value.is_empty() {
        return Err(RecordErrorKind::MissingField { field: column.to_string() });
    }
    value.parse::<f64>().map_err(|_| RecordErrorKind::InvalidNumber {
        field: column.to_string(),
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// One row per record, in input order. Records without a group get a blank group cell.
pub fn write_records_csv(
    records: &[ClashRecord],
    grouping: &Grouping,
    writer: impl Write,
) -> Result<(), String> {
    let group_of = crate::results::group_by_index(records.len(), grouping);

    let mut csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    csv.write_record(RECORD_HEADER)
        .map_err(|e| format!("CSV write error: {e}"))?;

    for (record, group_id) in records.iter().zip(&group_of) {
        let group = group_id.map(|g| g.to_string()).unwrap_or_default();
        let (x, y, z) = (
            format_coord(record.point.x),
            format_coord(record.point.y),
            format_coord(record.point.z),
        );
        csv.write_record([
            group.as_str(),
            record.test.as_str(),
            record.id.as_str(),
            record.name.as_str(),
            x.as_str(),
            y.as_str(),
            z.as_str(),
            record.status.as_str(),
            record.blame_path(),
            record.blame_attribute_name(),
            record.blame_attribute_value(),
        ])
        .map_err(|e| format!("CSV write error: {e}"))?;
    }

    csv.flush().map_err(|e| format!("CSV flush error: {e}"))?;
    Ok(())
}

/// One row per group, ordered by group id.
pub fn write_summary_csv(
    records: &[ClashRecord],
    groups: &[Group],
    writer: impl Write,
) -> Result<(), String> {
    let mut csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    csv.write_record(SUMMARY_HEADER)
        .map_err(|e| format!("CSV write error: {e}"))?;

    for row in crate::results::summary_rows(records, groups) {
        csv.write_record(&row)
            .map_err(|e| format!("CSV write error: {e}"))?;
    }

    csv.flush().map_err(|e| format!("CSV flush error: {e}"))?;
    Ok(())
}

/// Read `(clash id, group id)` pairs back from a records CSV.
pub fn read_assignments_csv(content: &str) -> Result<Vec<(String, u32)>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let group_idx = headers
        .iter()
        .position(|h| h == RECORD_HEADER[0])
        .ok_or_else(|| format!("missing column '{}'", RECORD_HEADER[0]))?;
    let id_idx = headers
        .iter()
        .position(|h| h == RECORD_HEADER[2])
        .ok_or_else(|| format!("missing column '{}'", RECORD_HEADER[2]))?;

    let mut out = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| e.to_string())?;
        let group = record.get(group_idx).unwrap_or("");
        if group.is_empty() {
            continue;
        }
        let group_id = group
            .parse::<u32>()
            .map_err(|_| format!("row {}: invalid group id '{group}'", i + 1))?;
        out.push((record.get(id_idx).unwrap_or("").to_string(), group_id));
    }
    Ok(out)
}
