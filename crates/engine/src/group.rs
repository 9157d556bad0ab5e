//! Transitive proximity grouping.
//!
//! Two records are neighbours when they share a clash test and their points
//! fall within the threshold under the configured metric, or (optionally) when
//! they blame the same element. Groups are the connected components of that
//! relation, computed with a disjoint-set forest. Candidate pairs come from a
//! spatial hash so only records in adjacent cells are compared.

use rustc_hash::FxHashMap;

use crate::error::{ClashError, RecordError, RecordErrorKind};
use crate::model::{
    ClashRecord, DistanceMetric, GroupAssignment, Grouping, GroupingOptions, Point3, GROUP_ID_BASE,
};

/// Cell edge is this factor above the threshold so a pair exactly at the
/// threshold never lands two cells apart through rounding.
const CELL_SLACK: f64 = 1.0 + 1e-9;

/// Group with the default box metric and no attribute join.
pub fn group(records: &[ClashRecord], threshold: f64) -> Result<Grouping, ClashError> {
    group_with(records, &GroupingOptions::new(threshold))
}

pub fn validate_threshold(threshold: f64) -> Result<(), ClashError> {
    if threshold.is_finite() && threshold > 0.0 {
        Ok(())
    } else {
        Err(ClashError::InvalidThreshold(threshold))
    }
}

pub fn group_with(
    records: &[ClashRecord],
    options: &GroupingOptions,
) -> Result<Grouping, ClashError> {
    validate_threshold(options.threshold)?;

    let mut excluded = Vec::new();
    let mut active = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        if record.point.is_finite() {
            active.push(idx);
        } else {
            tracing::warn!(row = record.row, id = %record.id, "excluding clash with non-finite point");
            excluded.push(RecordError::new(
                record.row,
                Some(record.id.clone()),
                RecordErrorKind::NonFiniteCoordinates,
            ));
        }
    }

    let mut sets = DisjointSet::new(records.len());
    link_spatial(records, &active, options, &mut sets);
    if options.join_on_attribute {
        link_shared_attribute(records, &active, &mut sets);
    }

    // Ids follow the earliest member of each component.
    let mut ids: FxHashMap<usize, u32> = FxHashMap::default();
    let mut next_id = GROUP_ID_BASE;
    let mut assignments = Vec::with_capacity(active.len());
    for &idx in &active {
        let root = sets.find(idx);
        let group_id = *ids.entry(root).or_insert_with(|| {
            let id = next_id;
            next_id += 1;
            id
        });
        assignments.push(GroupAssignment {
            index: idx,
            record_id: records[idx].id.clone(),
            group_id,
        });
    }

    tracing::debug!(
        records = active.len(),
        groups = ids.len(),
        excluded = excluded.len(),
        metric = %options.metric,
        threshold = options.threshold,
        "grouping complete"
    );

    Ok(Grouping {
        assignments,
        excluded,
        group_count: ids.len(),
    })
}

pub fn within(a: &Point3, b: &Point3, threshold: f64, metric: DistanceMetric) -> bool {
    let dx = (a.x - b.x).abs();
    let dy = (a.y - b.y).abs();
    let dz = (a.z - b.z).abs();
    match metric {
        DistanceMetric::Box => dx <= threshold && dy <= threshold && dz <= threshold,
        DistanceMetric::Euclidean => dx * dx + dy * dy + dz * dz <= threshold * threshold,
    }
}

type CellKey<'a> = (&'a str, [i64; 3]);

fn cell_of(point: &Point3, edge: f64) -> [i64; 3] {
    // `as` saturates, so far-out coordinates collapse into the outermost cell.
    [
        (point.x / edge).floor() as i64,
        (point.y / edge).floor() as i64,
        (point.z / edge).floor() as i64,
    ]
}

fn link_spatial(
    records: &[ClashRecord],
    active: &[usize],
    options: &GroupingOptions,
    sets: &mut DisjointSet,
) {
    let edge = options.threshold * CELL_SLACK;
    let mut cells: FxHashMap<CellKey<'_>, Vec<usize>> = FxHashMap::default();
    for &idx in active {
        let record = &records[idx];
        cells
            .entry((record.test.as_str(), cell_of(&record.point, edge)))
            .or_default()
            .push(idx);
    }

    for (&(test, cell), members) in &cells {
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                for dz in -1i64..=1 {
                    let neighbour = [
                        cell[0].saturating_add(dx),
                        cell[1].saturating_add(dy),
                        cell[2].saturating_add(dz),
                    ];
                    let Some(others) = cells.get(&(test, neighbour)) else {
                        continue;
                    };
                    for &a in members {
                        for &b in others {
                            if a < b
                                && within(
                                    &records[a].point,
                                    &records[b].point,
                                    options.threshold,
                                    options.metric,
                                )
                            {
                                sets.union(a, b);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn link_shared_attribute(records: &[ClashRecord], active: &[usize], sets: &mut DisjointSet) {
    let mut first_by_value: FxHashMap<(&str, &str), usize> = FxHashMap::default();
    for &idx in active {
        let record = &records[idx];
        let value = record.blame_attribute_value();
        if value.is_empty() {
            continue;
        }
        match first_by_value.get(&(record.test.as_str(), value)) {
            Some(&first) => {
                sets.union(first, idx);
            }
            None => {
                first_by_value.insert((record.test.as_str(), value), idx);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Disjoint-set forest
// ---------------------------------------------------------------------------

struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut idx: usize) -> usize {
        let mut root = idx;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[idx] != root {
            let next = self.parent[idx];
            self.parent[idx] = root;
            idx = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }
}
