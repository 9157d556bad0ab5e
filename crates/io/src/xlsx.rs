// Excel (.xlsx) result export and read-back

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, Worksheet};

use clashgroup_engine::{ClashRecord, Group, Grouping};

use crate::results::{group_by_index, RECORDS_SHEET, RECORD_HEADER, SUMMARY_HEADER, SUMMARY_SHEET};

/// Excel's per-cell text limit, in characters.
const CELL_TEXT_LIMIT: usize = 32_767;

/// Write a two-sheet workbook: per-record rows and per-group summary.
pub fn write_results_xlsx(
    records: &[ClashRecord],
    grouping: &Grouping,
    groups: &[Group],
    path: &Path,
) -> Result<(), String> {
    let mut workbook = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();

    let sheet = workbook
        .add_worksheet()
        .set_name(RECORDS_SHEET)
        .map_err(|e| format!("Failed to create sheet '{RECORDS_SHEET}': {e}"))?;
    write_header(sheet, &RECORD_HEADER, &header_format)?;

    let group_of = group_by_index(records.len(), grouping);
    for (i, (record, group_id)) in records.iter().zip(&group_of).enumerate() {
        let row = (i + 1) as u32;
        if let Some(g) = group_id {
            sheet.write_number(row, 0, *g).map_err(cell_err)?;
        }
        sheet.write_string(row, 1, &record.test).map_err(cell_err)?;
        sheet.write_string(row, 2, &record.id).map_err(cell_err)?;
        sheet.write_string(row, 3, &record.name).map_err(cell_err)?;
        sheet.write_number(row, 4, record.point.x).map_err(cell_err)?;
        sheet.write_number(row, 5, record.point.y).map_err(cell_err)?;
        sheet.write_number(row, 6, record.point.z).map_err(cell_err)?;
        sheet.write_string(row, 7, &record.status).map_err(cell_err)?;
        sheet.write_string(row, 8, record.blame_path()).map_err(cell_err)?;
        sheet.write_string(row, 9, record.blame_attribute_name()).map_err(cell_err)?;
        sheet.write_string(row, 10, record.blame_attribute_value()).map_err(cell_err)?;
    }
    sheet.set_freeze_panes(1, 0).map_err(cell_err)?;

    let sheet = workbook
        .add_worksheet()
        .set_name(SUMMARY_SHEET)
        .map_err(|e| format!("Failed to create sheet '{SUMMARY_SHEET}': {e}"))?;
    write_header(sheet, &SUMMARY_HEADER, &header_format)?;

    for (i, g) in groups.iter().enumerate() {
        let row = (i + 1) as u32;
        let origin = &records[g.origin];
        let names: Vec<&str> = g.members.iter().map(|&m| records[m].name.as_str()).collect();
        sheet.write_number(row, 0, g.id).map_err(cell_err)?;
        sheet.write_string(row, 1, &g.test).map_err(cell_err)?;
        sheet.write_string(row, 2, &origin.name).map_err(cell_err)?;
        sheet.write_number(row, 3, g.count() as f64).map_err(cell_err)?;
        sheet.write_number(row, 4, g.centroid.x).map_err(cell_err)?;
        sheet.write_number(row, 5, g.centroid.y).map_err(cell_err)?;
        sheet.write_number(row, 6, g.centroid.z).map_err(cell_err)?;
        sheet.write_string(row, 7, origin.blame_path()).map_err(cell_err)?;
        sheet.write_string(row, 8, origin.blame_attribute_name()).map_err(cell_err)?;
        sheet.write_string(row, 9, origin.blame_attribute_value()).map_err(cell_err)?;
        sheet.write_string(row, 10, join_within_cell_limit(&g.attribute_names)).map_err(cell_err)?;
        sheet.write_string(row, 11, join_within_cell_limit(&g.attribute_values)).map_err(cell_err)?;
        sheet.write_string(row, 12, join_within_cell_limit(&names)).map_err(cell_err)?;
    }
    sheet.set_freeze_panes(1, 0).map_err(cell_err)?;

    workbook
        .save(path)
        .map_err(|e| format!("Failed to save workbook: {e}"))
}

/// `", "`-join that fits one cell. Items past the limit are dropped and
/// counted in a trailing `… (+N more)`; the records sheet keeps every member.
fn join_within_cell_limit<S: AsRef<str>>(items: &[S]) -> String {
    let total: usize = items.iter().map(|s| s.as_ref().chars().count()).sum::<usize>()
        + 2 * items.len().saturating_sub(1);
    if total <= CELL_TEXT_LIMIT {
        return items.iter().map(|s| s.as_ref()).collect::<Vec<&str>>().join(", ");
    }

    let budget = CELL_TEXT_LIMIT - format!(", … (+{} more)", items.len()).chars().count();
    let mut out = String::new();
    let mut used = 0;
    let mut kept = 0;
    for item in items {
        let item: &str = item.as_ref();
        let sep = if kept == 0 { 0 } else { 2 };
        let len = item.chars().count();
        if used + sep + len > budget {
            break;
        }
        if sep > 0 {
            out.push_str(", ");
        }
        out.push_str(item);
        used += sep + len;
        kept += 1;
    }
    if kept > 0 {
        out.push_str(", ");
    }
    out.push_str(&format!("… (+{} more)", items.len() - kept));
    out
}

fn write_header(sheet: &mut Worksheet, header: &[&str], format: &Format) -> Result<(), String> {
    for (col, title) in header.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *title, format)
            .map_err(cell_err)?;
    }
    Ok(())
}

fn cell_err(e: rust_xlsxwriter::XlsxError) -> String {
    format!("Failed to write cell: {e}")
}

/// Read `(clash id, group id)` pairs from the records sheet.
pub fn read_assignments_xlsx(path: &Path) -> Result<Vec<(String, u32)>, String> {
    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| format!("Failed to open workbook: {e}"))?;
    let range = workbook
        .worksheet_range(RECORDS_SHEET)
        .map_err(|e| format!("Failed to read sheet '{RECORDS_SHEET}': {e}"))?;

    let mut rows = range.rows();
    let header = rows.next().ok_or("records sheet is empty")?;
    let position = |title: &str| {
        header
            .iter()
            .position(|c| matches!(c, Data::String(s) if s == title))
            .ok_or_else(|| format!("missing column '{title}'"))
    };
    let group_idx = position(RECORD_HEADER[0])?;
    let id_idx = position(RECORD_HEADER[2])?;

    let mut out = Vec::new();
    for (i, row) in rows.enumerate() {
        let group_id = match row.get(group_idx) {
            Some(Data::Float(f)) => *f as u32,
            Some(Data::Int(n)) => *n as u32,
            Some(Data::String(s)) if !s.is_empty() => s
                .parse()
                .map_err(|_| format!("row {}: invalid group id '{s}'", i + 1))?,
            _ => continue,
        };
        let id = row.get(id_idx).map(|c| c.to_string()).unwrap_or_default();
        out.push((id, group_id));
    }
    Ok(out)
}
