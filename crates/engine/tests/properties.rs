// Property-based tests for the grouping engine.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::{BTreeMap, BTreeSet, HashMap};

use proptest::prelude::*;

use clashgroup_engine::model::{ClashObject, ClashRecord, DistanceMetric, GroupingOptions, Point3};
use clashgroup_engine::{build_groups, group_with};

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn arb_record() -> impl Strategy<Value = (f64, f64, f64, u8, u8)> {
    (
        -20.0f64..20.0,
        -20.0f64..20.0,
        -5.0f64..5.0,
        0u8..2,  // clash test
        0u8..6,  // element id
    )
}

fn arb_records() -> impl Strategy<Value = Vec<ClashRecord>> {
    prop::collection::vec(arb_record(), 0..60).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (x, y, z, test, element))| ClashRecord {
                row: i + 1,
                id: format!("c{i}"),
                name: format!("Clash{i}"),
                test: format!("Test {test}"),
                point: Point3::new(x, y, z),
                status: "new".into(),
                objects: vec![ClashObject {
                    attribute_name: "Element ID".into(),
                    attribute_value: element.to_string(),
                    path: "model.nwc".into(),
                }],
                blame: 0,
                metadata: BTreeMap::new(),
            })
            .collect()
    })
}

fn arb_options() -> impl Strategy<Value = GroupingOptions> {
    (0.1f64..8.0, prop::bool::ANY, prop::bool::ANY).prop_map(|(threshold, euclid, join)| {
        GroupingOptions {
            threshold,
            metric: if euclid { DistanceMetric::Euclidean } else { DistanceMetric::Box },
            join_on_attribute: join,
        }
    })
}

/// Map each group id to its member record ids.
fn partition(records: &[ClashRecord], options: &GroupingOptions) -> HashMap<u32, BTreeSet<String>> {
    let grouping = group_with(records, options).unwrap();
    let mut out: HashMap<u32, BTreeSet<String>> = HashMap::new();
    for a in &grouping.assignments {
        out.entry(a.group_id).or_default().insert(a.record_id.clone());
    }
    out
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn every_record_in_exactly_one_group(records in arb_records(), options in arb_options()) {
        let grouping = group_with(&records, &options).unwrap();
        prop_assert_eq!(grouping.assignments.len(), records.len());

        let indices: Vec<usize> = grouping.assignments.iter().map(|a| a.index).collect();
        let expected: Vec<usize> = (0..records.len()).collect();
        prop_assert_eq!(indices, expected);

        let groups = build_groups(&records, &grouping);
        let total: usize = groups.iter().map(|g| g.count()).sum();
        prop_assert_eq!(total, records.len());
        prop_assert_eq!(groups.len(), grouping.group_count);
    }

    #[test]
    fn group_ids_are_contiguous_and_ordered(records in arb_records(), options in arb_options()) {
        let grouping = group_with(&records, &options).unwrap();
        let mut max_seen = 0u32;
        for a in &grouping.assignments {
            // A new id is always exactly the next one.
            prop_assert!(a.group_id <= max_seen + 1);
            max_seen = max_seen.max(a.group_id);
        }
        prop_assert_eq!(max_seen as usize, grouping.group_count);
    }

    #[test]
    fn grouping_is_deterministic(records in arb_records(), options in arb_options()) {
        let first = group_with(&records, &options).unwrap();
        let second = group_with(&records, &options).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn larger_threshold_never_splits(
        records in arb_records(),
        options in arb_options(),
        extra in 0.0f64..5.0,
    ) {
        let small = partition(&records, &options);
        let mut wider = options;
        wider.threshold += extra;
        let grouping = group_with(&records, &wider).unwrap();
        let group_of: HashMap<&str, u32> = grouping
            .assignments
            .iter()
            .map(|a| (a.record_id.as_str(), a.group_id))
            .collect();

        for members in small.values() {
            let ids: BTreeSet<u32> = members.iter().map(|m| group_of[m.as_str()]).collect();
            prop_assert_eq!(ids.len(), 1, "group split when threshold grew");
        }
    }

    #[test]
    fn groups_stay_within_one_test(records in arb_records(), options in arb_options()) {
        let grouping = group_with(&records, &options).unwrap();
        for g in build_groups(&records, &grouping) {
            prop_assert!(g.members.iter().all(|&i| records[i].test == g.test));
        }
    }
}
