use std::path::PathBuf;

use serde::Serialize;

use crate::error::RecordError;
use crate::model::{ClashRecord, Group, Grouping, Ingested, Point3};

/// Expand assignments into full groups, ordered by group id.
pub fn build_groups(records: &[ClashRecord], grouping: &Grouping) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::with_capacity(grouping.group_count);

    for assignment in &grouping.assignments {
        let record = &records[assignment.index];
        // Ids are dense from the base, so the slot is id - base.
        let slot = (assignment.group_id - crate::model::GROUP_ID_BASE) as usize;
        if slot == groups.len() {
            groups.push(Group {
                id: assignment.group_id,
                test: record.test.clone(),
                members: Vec::new(),
                member_ids: Vec::new(),
                origin: assignment.index,
                centroid: Point3::new(0.0, 0.0, 0.0),
                attribute_names: Vec::new(),
                attribute_values: Vec::new(),
            });
        }
        let group = &mut groups[slot];
        group.members.push(assignment.index);
        group.member_ids.push(record.id.clone());
        push_distinct(&mut group.attribute_names, record.blame_attribute_name());
        push_distinct(&mut group.attribute_values, record.blame_attribute_value());
    }

    for group in &mut groups {
        let n = group.members.len() as f64;
        let (sx, sy, sz) = group.members.iter().fold((0.0, 0.0, 0.0), |acc, &i| {
            let p = records[i].point;
            (acc.0 + p.x, acc.1 + p.y, acc.2 + p.z)
        });
        group.centroid = Point3::new(sx / n, sy / n, sz / n);
    }

    groups
}

fn push_distinct(values: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_records: usize,
    pub grouped_records: usize,
    pub total_groups: usize,
    pub skipped_rows: usize,
    pub excluded_records: usize,
    pub largest_group: usize,
    pub record_errors: Vec<RecordError>,
    pub outputs: Vec<PathBuf>,
    pub engine_version: String,
    pub run_at: String,
}

pub fn compute_summary(
    ingested: &Ingested,
    grouping: &Grouping,
    groups: &[Group],
    outputs: Vec<PathBuf>,
) -> RunSummary {
    let record_errors: Vec<RecordError> = ingested
        .skipped
        .iter()
        .chain(grouping.excluded.iter())
        .cloned()
        .collect();

    RunSummary {
        total_records: ingested.records.len(),
        grouped_records: grouping.assignments.len(),
        total_groups: grouping.group_count,
        skipped_rows: ingested.skipped.len(),
        excluded_records: grouping.excluded.len(),
        largest_group: groups.iter().map(Group::count).max().unwrap_or(0),
        record_errors,
        outputs,
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        run_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordErrorKind;
    use crate::group::group;
    use crate::model::ClashObject;
    use std::collections::BTreeMap;

    fn rec(id: &str, x: f64, element: &str) -> ClashRecord {
        ClashRecord {
            row: 0,
            id: id.into(),
            name: format!("Clash {id}"),
            test: "Test 1".into(),
            point: Point3::new(x, 0.0, 1.0),
            status: "new".into(),
            objects: vec![ClashObject {
                attribute_name: "Element ID".into(),
                attribute_value: element.into(),
                path: "struct.nwc".into(),
            }],
            blame: 0,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn groups_carry_centroid_and_attributes() {
        let records = vec![
            rec("a", 0.0, "10"),
            rec("b", 2.0, "11"),
            rec("c", 50.0, "12"),
            rec("d", 1.0, "10"),
        ];
        let grouping = group(&records, 3.0).unwrap();
        let groups = build_groups(&records, &grouping);

        assert_eq!(groups.len(), 2);
        let first = &groups[0];
        assert_eq!(first.id, 1);
        assert_eq!(first.members, vec![0, 1, 3]);
        assert_eq!(first.origin, 0);
        assert_eq!(first.centroid, Point3::new(1.0, 0.0, 1.0));
        assert_eq!(first.attribute_names, vec!["Element ID"]);
        assert_eq!(first.attribute_values, vec!["10", "11"]);
        assert_eq!(groups[1].member_ids, vec!["c"]);
    }

    #[test]
    fn summary_counts() {
        let records = vec![rec("a", 0.0, "1"), rec("b", 0.5, "2"), rec("c", 10.0, "3")];
        let ingested = Ingested {
            records,
            skipped: vec![RecordError::new(
                4,
                None,
                RecordErrorKind::MissingField { field: "x".into() },
            )],
        };
        let grouping = group(&ingested.records, 1.0).unwrap();
        let groups = build_groups(&ingested.records, &grouping);
        let summary = compute_summary(&ingested, &grouping, &groups, vec!["out.csv".into()]);

        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.grouped_records, 3);
        assert_eq!(summary.total_groups, 2);
        assert_eq!(summary.skipped_rows, 1);
        assert_eq!(summary.excluded_records, 0);
        assert_eq!(summary.largest_group, 2);
        assert_eq!(summary.record_errors.len(), 1);
    }
}
