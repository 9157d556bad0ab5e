// Ingest -> group -> write -> read back, through real files.

use std::fs;

use clashgroup_engine::{group_with, ClashError, DistanceMetric, FieldMap, GroupingOptions, OutputFormat};
use clashgroup_io::{ingest, read_assignments, write_results};

const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<exchange>
  <batchtest name="Coordination">
    <clashtests>
      <clashtest name="Structure vs MEP">
        <clashresults>
          <clashresult name="Clash1" guid="g1" status="new">
            <clashpoint><pos3f x="0" y="0" z="0"/></clashpoint>
            <clashobjects>
              <clashobject>
                <objectattribute><name>Element ID</name><value>815</value></objectattribute>
                <pathlink><node>File</node><node>Project</node><node>S-Beams.nwc</node></pathlink>
              </clashobject>
            </clashobjects>
          </clashresult>
          <clashresult name="Clash2" guid="g2" status="new">
            <clashpoint><pos3f x="3" y="3" z="3"/></clashpoint>
            <clashobjects>
              <clashobject>
                <objectattribute><name>Element ID</name><value>816</value></objectattribute>
                <pathlink><node>File</node><node>Project</node><node>S-Beams.nwc</node></pathlink>
              </clashobject>
            </clashobjects>
          </clashresult>
          <clashresult name="Clash3" guid="g3" status="new">
            <clashpoint><pos3f x="3.1" y="0" z="0"/></clashpoint>
            <clashobjects>
              <clashobject>
                <objectattribute><name>Element ID</name><value>815</value></objectattribute>
                <pathlink><node>File</node><node>Project</node><node>S-Beams.nwc</node></pathlink>
              </clashobject>
            </clashobjects>
          </clashresult>
        </clashresults>
      </clashtest>
    </clashtests>
  </batchtest>
</exchange>
"#;

#[test]
fn xml_box_rule_and_join_through_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.xml");
    fs::write(&input, REPORT).unwrap();

    let ingested = ingest(&input, &FieldMap::default(), &[]).unwrap();
    assert_eq!(ingested.records.len(), 3);

    // g1-g2 touch corner to corner; g3 is 3.1 out on x from g1 but within 3 of g2 on x
    // (|3.1-3| = 0.1) and |0-3| = 3 on y and z, so all three chain together.
    let options = GroupingOptions::new(3.0);
    let grouping = group_with(&ingested.records, &options).unwrap();
    assert_eq!(grouping.group_count, 1);

    // Euclidean distance g1-g2 is ~5.2, g2-g3 ~4.2, g1-g3 3.1: nothing links.
    let options = GroupingOptions { metric: DistanceMetric::Euclidean, ..GroupingOptions::new(3.0) };
    let grouping = group_with(&ingested.records, &options).unwrap();
    assert_eq!(grouping.group_count, 3);

    // Joining on the blamed element links g1 and g3.
    let options = GroupingOptions { join_on_attribute: true, ..options };
    let grouping = group_with(&ingested.records, &options).unwrap();
    assert_eq!(grouping.group_count, 2);

    let report = write_results(&ingested.records, &grouping, &dir.path().join("out"), OutputFormat::Csv).unwrap();
    assert_eq!(report.outputs, vec![dir.path().join("out.csv"), dir.path().join("out.summary.csv")]);
    assert_eq!(report.rows, 3);

    let back = read_assignments(&report.outputs[0]).unwrap();
    assert_eq!(back, vec![("g1".into(), 1), ("g2".into(), 2), ("g3".into(), 1)]);
}

#[test]
fn csv_to_xlsx_overwrites_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clashes.tsv");
    fs::write(&input, "id\tx\ty\tz\na\t0\t0\t0\nb\t1\t1\t1\nc\t9\t9\t9\n").unwrap();
    let output = dir.path().join("groups.xlsx");
    fs::write(&output, "stale").unwrap();

    let ingested = ingest(&input, &FieldMap::default(), &[]).unwrap();
    let grouping = group_with(&ingested.records, &GroupingOptions::new(3.0)).unwrap();
    let report = write_results(&ingested.records, &grouping, &output, OutputFormat::Xlsx).unwrap();
    assert_eq!(report.outputs, vec![output.clone()]);
    assert_eq!(report.groups.len(), 2);

    let back = read_assignments(&output).unwrap();
    assert_eq!(back, vec![("a".into(), 1), ("b".into(), 1), ("c".into(), 2)]);
}

#[test]
fn windows_1252_input_is_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("latin.csv");
    // "Gebäude" in Windows-1252
    let mut bytes = b"id,name,x,y,z\n1,Geb".to_vec();
    bytes.push(0xE4);
    bytes.extend_from_slice(b"ude,0,0,0\n");
    fs::write(&input, bytes).unwrap();

    let ingested = ingest(&input, &FieldMap::default(), &[]).unwrap();
    assert_eq!(ingested.records[0].name, "Gebäude");
}

#[test]
fn write_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("c.csv");
    fs::write(&input, "id,x,y,z\na,0,0,0\n").unwrap();
    let ingested = ingest(&input, &FieldMap::default(), &[]).unwrap();
    let grouping = group_with(&ingested.records, &GroupingOptions::new(1.0)).unwrap();

    let err = write_results(
        &ingested.records,
        &grouping,
        &dir.path().join("no/such/dir/out.csv"),
        OutputFormat::Csv,
    )
    .unwrap_err();
    assert!(matches!(err, ClashError::Write { .. }));
}
