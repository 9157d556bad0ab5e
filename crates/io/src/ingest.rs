// Input dispatch: Navisworks XML reports or delimited clash tables

use std::path::Path;

use clashgroup_engine::{ClashError, ClashObject, FieldMap, Ingested};

use crate::csv::{parse_clash_rows, read_file_as_utf8, sniff_delimiter};
use crate::navisworks::parse_clash_xml;

/// Index of the object to blame for a clash.
///
/// `blame_paths` are checked in precedence order; the first one contained in
/// any object's source path wins. With no paths configured the first object is
/// blamed. `None` when paths are configured and none match.
pub fn select_blame(objects: &[ClashObject], blame_paths: &[String]) -> Option<usize> {
    if blame_paths.is_empty() {
        return Some(0);
    }
    blame_paths
        .iter()
        .filter(|p| !p.is_empty())
        .find_map(|p| objects.iter().position(|o| o.path.contains(p.as_str())))
}

/// Load clash records from `path`.
///
/// `.xml` files are read as Navisworks clash reports and `blame_paths` picks the
/// blamed object. Anything else is read as a delimited table mapped through
/// `field_map`. An input that yields no usable record is an error.
pub fn ingest(path: &Path, field_map: &FieldMap, blame_paths: &[String]) -> Result<Ingested, ClashError> {
    let content = read_file_as_utf8(path).map_err(|e| ClashError::ingest(path, e))?;

    let is_xml = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("xml"))
        .unwrap_or(false);

    let ingested = if content.trim().is_empty() {
        Ingested::default()
    } else if is_xml {
        parse_clash_xml(&content, blame_paths, path)?
    } else {
        parse_clash_rows(&content, sniff_delimiter(&content), field_map, path)?
    };

    if ingested.records.is_empty() {
        return Err(ClashError::NoValidRows {
            path: path.to_path_buf(),
            skipped: ingested.skipped.len(),
        });
    }

    tracing::info!(
        input = %path.display(),
        format = if is_xml { "xml" } else { "delimited" },
        records = ingested.records.len(),
        skipped = ingested.skipped.len(),
        "input ingested"
    );
    Ok(ingested)
}
