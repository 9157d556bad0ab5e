//! Navisworks clash-test XML reports.
//!
//! ```xml
//! <exchange>
//!   <batchtest name="...">
//!     <clashtests>
//!       <clashtest name="Structure vs MEP">
//!         <clashresults>
//!           <clashresult name="Clash1" guid="..." status="new" distance="-0.1">
//!             <clashpoint><pos3f x="1.0" y="2.0" z="3.0"/></clashpoint>
//!             <clashobjects>
//!               <clashobject>
//!                 <objectattribute><name>Element ID</name><value>4711</value></objectattribute>
//!                 <pathlink><node>File</node><node>Project</node><node>S-Model.nwc</node></pathlink>
//!               </clashobject>
//!             </clashobjects>
//!           </clashresult>
//! ```
//!
//! The third `pathlink` node is the object's source file, which blame paths
//! are matched against.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;

use clashgroup_engine::error::{RecordError, RecordErrorKind};
use clashgroup_engine::{ClashError, ClashObject, ClashRecord, Ingested, Point3};

use crate::ingest::select_blame;

#[derive(Default)]
struct DraftClash {
    ordinal: usize,
    name: String,
    guid: String,
    status: String,
    point: Option<Result<Point3, RecordErrorKind>>,
    objects: Vec<ClashObject>,
    metadata: BTreeMap<String, String>,
}

#[derive(Default)]
struct DraftObject {
    attribute_name: Option<String>,
    attribute_value: Option<String>,
    in_attribute: bool,
    nodes: Vec<String>,
}

impl DraftObject {
    fn finish(self) -> ClashObject {
        // Source file is the third pathlink node; shorter links fall back to the last.
        let path = self
            .nodes
            .get(2)
            .or_else(|| self.nodes.last())
            .cloned()
            .unwrap_or_default();
        ClashObject {
            attribute_name: self.attribute_name.unwrap_or_default(),
            attribute_value: self.attribute_value.unwrap_or_default(),
            path,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    AttributeName,
    AttributeValue,
    Node,
}

/// Parse every clash result of every clash test in document order.
pub fn parse_clash_xml(
    content: &str,
    blame_paths: &[String],
    source: &Path,
) -> Result<Ingested, ClashError> {
    let mut reader = Reader::from_str(content);

    let mut ingested = Ingested::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut test_name = String::new();
    let mut ordinal = 0usize;
    let mut clash: Option<DraftClash> = None;
    let mut object: Option<DraftObject> = None;
    let mut capture = Capture::None;
    let mut text = String::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            ClashError::ingest(
                source,
                format!("XML parse error at position {}: {e}", reader.buffer_position()),
            )
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = e.name().as_ref().to_vec();
                let parent = stack.last().map(Vec::as_slice);

                match name.as_slice() {
                    b"clashtest" => {
                        test_name = attr(e, b"name").unwrap_or_default();
                    }
                    b"clashresult" => {
                        ordinal += 1;
                        clash = Some(start_clash(e, ordinal));
                    }
                    b"pos3f" if parent == Some(b"clashpoint".as_slice()) => {
                        if let Some(ref mut c) = clash {
                            c.point = Some(parse_point(e));
                        }
                    }
                    b"clashobject" => object = Some(DraftObject::default()),
                    b"objectattribute" => {
                        if let Some(ref mut o) = object {
                            // Only the first objectattribute identifies the element.
                            o.in_attribute = o.attribute_name.is_none();
                        }
                    }
                    b"name" if parent == Some(b"objectattribute".as_slice()) => {
                        capture = Capture::AttributeName;
                    }
                    b"value" if parent == Some(b"objectattribute".as_slice()) => {
                        capture = Capture::AttributeValue;
                    }
                    b"node" if parent == Some(b"pathlink".as_slice()) => capture = Capture::Node,
                    _ => {}
                }
                text.clear();

                if is_empty {
                    // Self-closing elements end immediately.
                    end_element(
                        &name,
                        &mut capture,
                        &mut text,
                        &mut object,
                        &mut clash,
                        &test_name,
                        blame_paths,
                        &mut seen,
                        &mut ingested,
                    );
                } else {
                    stack.push(name);
                }
            }
            Event::Text(ref e) if capture != Capture::None => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Event::GeneralRef(ref e) if capture != Capture::None => push_reference(&mut text, e),
            Event::CData(ref e) if capture != Capture::None => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                end_element(
                    &name,
                    &mut capture,
                    &mut text,
                    &mut object,
                    &mut clash,
                    &test_name,
                    blame_paths,
                    &mut seen,
                    &mut ingested,
                );
            }
            Event::Eof => break,
            _ => {}
        }
    }

    tracing::debug!(
        records = ingested.records.len(),
        skipped = ingested.skipped.len(),
        "parsed clash XML"
    );
    Ok(ingested)
}

#[allow(clippy::too_many_arguments)]
fn end_element(
    name: &[u8],
    capture: &mut Capture,
    text: &mut String,
    object: &mut Option<DraftObject>,
    clash: &mut Option<DraftClash>,
    test_name: &str,
    blame_paths: &[String],
    seen: &mut HashSet<String>,
    ingested: &mut Ingested,
) {
    match (name, *capture) {
        (b"name", Capture::AttributeName) => {
            if let Some(o) = object.as_mut().filter(|o| o.in_attribute) {
                o.attribute_name = Some(take_trimmed(text));
            }
            *capture = Capture::None;
        }
        (b"value", Capture::AttributeValue) => {
            if let Some(o) = object.as_mut().filter(|o| o.in_attribute) {
                o.attribute_value = Some(take_trimmed(text));
            }
            *capture = Capture::None;
        }
        (b"node", Capture::Node) => {
            if let Some(o) = object.as_mut() {
                o.nodes.push(take_trimmed(text));
            }
            *capture = Capture::None;
        }
        _ => {}
    }

    match name {
        b"objectattribute" => {
            if let Some(o) = object.as_mut() {
                o.in_attribute = false;
            }
        }
        b"clashobject" => {
            if let (Some(o), Some(c)) = (object.take(), clash.as_mut()) {
                c.objects.push(o.finish());
            }
        }
        b"clashresult" => {
            if let Some(c) = clash.take() {
                match finish_clash(c, test_name, blame_paths, seen) {
                    Ok(record) => ingested.records.push(record),
                    Err(err) => {
                        tracing::warn!("skipping clash {err}");
                        ingested.skipped.push(err);
                    }
                }
            }
        }
        _ => {}
    }
}

fn start_clash(e: &BytesStart<'_>, ordinal: usize) -> DraftClash {
    let mut draft = DraftClash { ordinal, ..DraftClash::default() };
    for a in e.attributes().flatten() {
        let value = attr_value(&a);
        match a.key.as_ref() {
            b"name" => draft.name = value,
            b"guid" => draft.guid = value,
            b"status" => draft.status = value,
            key => {
                draft
                    .metadata
                    .insert(String::from_utf8_lossy(key).into_owned(), value);
            }
        }
    }
    draft
}

fn parse_point(e: &BytesStart<'_>) -> Result<Point3, RecordErrorKind> {
    let coord = |axis: &str| -> Result<f64, RecordErrorKind> {
        let value = attr(e, axis.as_bytes())
            .ok_or_else(|| RecordErrorKind::MissingField { field: format!("pos3f.{axis}") })?;
        value.trim().parse::<f64>().map_err(|_| RecordErrorKind::InvalidNumber {
            field: format!("pos3f.{axis}"),
            value,
        })
    };
    Ok(Point3::new(coord("x")?, coord("y")?, coord("z")?))
}

fn finish_clash(
    draft: DraftClash,
    test_name: &str,
    blame_paths: &[String],
    seen: &mut HashSet<String>,
) -> Result<ClashRecord, RecordError> {
    let id = (!draft.guid.is_empty()).then(|| draft.guid.clone());
    let fail = |kind| RecordError::new(draft.ordinal, id.clone().or_else(|| non_empty(&draft.name)), kind);

    if draft.guid.is_empty() {
        return Err(fail(RecordErrorKind::MissingField { field: "guid".into() }));
    }
    let point = match draft.point {
        Some(Ok(p)) => p,
        Some(Err(kind)) => return Err(fail(kind)),
        None => return Err(fail(RecordErrorKind::MissingField { field: "clashpoint".into() })),
    };
    let blame = select_blame(&draft.objects, blame_paths).ok_or_else(|| {
        fail(RecordErrorKind::NoBlamePath {
            paths: draft.objects.iter().map(|o| o.path.clone()).collect(),
        })
    })?;
    if !seen.insert(draft.guid.clone()) {
        return Err(fail(RecordErrorKind::DuplicateId { id: draft.guid.clone() }));
    }

    let name = if draft.name.is_empty() { draft.guid.clone() } else { draft.name };
    Ok(ClashRecord {
        row: draft.ordinal,
        id: draft.guid,
        name,
        test: test_name.to_string(),
        point,
        status: draft.status,
        objects: draft.objects,
        blame,
        metadata: draft.metadata,
    })
}

fn take_trimmed(text: &mut String) -> String {
    let out = text.trim().to_string();
    text.clear();
    out
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| attr_value(&a))
}

/// Unescaped attribute value; the raw text when it holds an unknown entity.
fn attr_value(a: &Attribute<'_>) -> String {
    let raw = String::from_utf8_lossy(&a.value);
    match unescape(&raw) {
        Ok(value) => value.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// Character and predefined entity references in text. Anything else is kept as written.
fn push_reference(text: &mut String, e: &BytesRef<'_>) {
    if let Ok(Some(c)) = e.resolve_char_ref() {
        text.push(c);
        return;
    }
    let name = String::from_utf8_lossy(e.as_ref());
    match resolve_predefined_entity(&name) {
        Some(resolved) => text.push_str(resolved),
        None => {
            text.push('&');
            text.push_str(&name);
            text.push(';');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<exchange>
  <batchtest name="Coordination">
    <clashtests>
      <clashtest name="Structure vs MEP">
        <clashresults>
          <clashresult name="Clash1" guid="g-1" status="new" distance="-0.12">
            <clashpoint><pos3f x="0.0" y="0.0" z="10.0"/></clashpoint>
            <clashobjects>
              <clashobject>
                <objectattribute><name>Element ID</name><value>4711</value></objectattribute>
                <pathlink><node>File</node><node>Project</node><node>M-Ducts.nwc</node></pathlink>
              </clashobject>
              <clashobject>
                <objectattribute><name>Element ID</name><value>815</value></objectattribute>
                <pathlink><node>File</node><node>Project</node><node>S-Beams.nwc</node></pathlink>
              </clashobject>
            </clashobjects>
          </clashresult>
          <clashresult name="Clash2" guid="g-2" status="active">
            <clashpoint><pos3f x="1.0" y="0.5" z="10.0"/></clashpoint>
            <clashobjects>
              <clashobject>
                <objectattribute><name>Entity Handle</name><value>1F3</value></objectattribute>
                <smarttags><smarttag><name>Item Name</name><value>Duct &amp; Fitting</value></smarttag></smarttags>
                <pathlink><node>File</node><node>Project</node><node>M-Ducts.nwc</node></pathlink>
              </clashobject>
            </clashobjects>
          </clashresult>
        </clashresults>
      </clashtest>
      <clashtest name="Architecture vs MEP">
        <clashresults>
          <clashresult name="Clash1" guid="g-3" status="new">
            <clashpoint><pos3f x="0.0" y="0.0" z="10.0"/></clashpoint>
            <clashobjects>
              <clashobject>
                <objectattribute><name>Element ID</name><value>99</value></objectattribute>
                <pathlink><node>File</node><node>Project</node><node>A-Walls.nwc</node></pathlink>
              </clashobject>
            </clashobjects>
          </clashresult>
        </clashresults>
      </clashtest>
    </clashtests>
  </batchtest>
</exchange>
"#;

    fn parse(paths: &[&str]) -> Ingested {
        let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        parse_clash_xml(REPORT, &paths, Path::new("report.xml")).unwrap()
    }

    #[test]
    fn reads_all_tests_in_order() {
        let ingested = parse(&[]);
        assert!(ingested.skipped.is_empty());
        let ids: Vec<&str> = ingested.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["g-1", "g-2", "g-3"]);

        let first = &ingested.records[0];
        assert_eq!(first.row, 1);
        assert_eq!(first.name, "Clash1");
        assert_eq!(first.test, "Structure vs MEP");
        assert_eq!(first.status, "new");
        assert_eq!(first.point, Point3::new(0.0, 0.0, 10.0));
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.metadata.get("distance").map(String::as_str), Some("-0.12"));
        // No configured paths: first object is blamed.
        assert_eq!(first.blame_path(), "M-Ducts.nwc");

        assert_eq!(ingested.records[2].test, "Architecture vs MEP");
    }

    #[test]
    fn smarttag_names_do_not_replace_object_attribute() {
        let ingested = parse(&[]);
        let second = &ingested.records[1];
        assert_eq!(second.blame_attribute_name(), "Entity Handle");
        assert_eq!(second.blame_attribute_value(), "1F3");
    }

    #[test]
    fn blame_follows_configured_precedence() {
        let ingested = parse(&["S-", "M-", "A-"]);
        assert_eq!(ingested.records[0].blame_path(), "S-Beams.nwc");
        assert_eq!(ingested.records[0].blame_attribute_value(), "815");
        assert_eq!(ingested.records[1].blame_path(), "M-Ducts.nwc");
    }

    #[test]
    fn unmatched_blame_path_skips_clash() {
        let ingested = parse(&["S-"]);
        let ids: Vec<&str> = ingested.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["g-1"]);
        assert_eq!(ingested.skipped.len(), 2);
        assert_eq!(
            ingested.skipped[0].kind,
            RecordErrorKind::NoBlamePath { paths: vec!["M-Ducts.nwc".into()] }
        );
        assert_eq!(ingested.skipped[0].row, 2);
    }

    #[test]
    fn missing_point_and_bad_coordinates() {
        let xml = r#"<exchange><clashtests><clashtest name="T"><clashresults>
<clashresult name="NoPoint" guid="a"><clashobjects/></clashresult>
<clashresult name="Bad" guid="b"><clashpoint><pos3f x="1" y="oops" z="0"/></clashpoint></clashresult>
<clashresult name="NoGuid"><clashpoint><pos3f x="1" y="1" z="0"/></clashpoint></clashresult>
<clashresult name="Good" guid="c"><clashpoint><pos3f x="1" y="1" z="0"/></clashpoint></clashresult>
<clashresult name="Again" guid="c"><clashpoint><pos3f x="2" y="2" z="0"/></clashpoint></clashresult>
</clashresults></clashtest></clashtests></exchange>"#;
        let ingested = parse_clash_xml(xml, &[], Path::new("t.xml")).unwrap();
        assert_eq!(ingested.records.len(), 1);
        assert_eq!(ingested.records[0].id, "c");
        let kinds: Vec<&RecordErrorKind> = ingested.skipped.iter().map(|e| &e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &RecordErrorKind::MissingField { field: "clashpoint".into() },
                &RecordErrorKind::InvalidNumber { field: "pos3f.y".into(), value: "oops".into() },
                &RecordErrorKind::MissingField { field: "guid".into() },
                &RecordErrorKind::DuplicateId { id: "c".into() },
            ]
        );
        assert_eq!(ingested.skipped[2].record_id.as_deref(), Some("NoGuid"));
    }

    #[test]
    fn malformed_xml_is_fatal() {
        let err = parse_clash_xml("<exchange><clashtest></exchange>", &[], Path::new("bad.xml")).unwrap_err();
        assert_eq!(err.class(), clashgroup_engine::ErrorClass::Ingest);
    }

    #[test]
    fn entities_in_attributes_and_text() {
        let xml = r#"<exchange><clashtests><clashtest name="Walls &amp; Ducts"><clashresults>
<clashresult name="Pipe &lt;1&gt; &#65;&#x42;" guid="g&amp;1" note="&bogus;">
  <clashpoint><pos3f x="1" y="2" z="3"/></clashpoint>
  <clashobjects><clashobject>
    <objectattribute><name>Element ID</name><value>A&amp;B &#x43; &nbsp;</value></objectattribute>
    <pathlink><node>File</node><node>Project</node><node>S&amp;M.nwc</node></pathlink>
  </clashobject></clashobjects>
</clashresult>
</clashresults></clashtest></clashtests></exchange>"#;
        let ingested = parse_clash_xml(xml, &[], Path::new("e.xml")).unwrap();
        let record = &ingested.records[0];
        assert_eq!(record.test, "Walls & Ducts");
        assert_eq!(record.name, "Pipe <1> AB");
        assert_eq!(record.id, "g&1");
        // Unknown entities survive verbatim.
        assert_eq!(record.metadata.get("note").map(String::as_str), Some("&bogus;"));
        assert_eq!(record.blame_attribute_value(), "A&B C &nbsp;");
        assert_eq!(record.blame_path(), "S&M.nwc");
    }
}
