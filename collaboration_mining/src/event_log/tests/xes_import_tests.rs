use std::io::Write;

use flate2::{write::GzEncoder, Compression};

use super::HOSPITAL_XES;
use crate::event_log::{
    import_xes::{import_xes_file, import_xes_slice, import_xes_str, XESImportOptions, XESParseError},
    AttributeValue, XESEditableAttribute,
};

#[test]
fn test_xes_str_import() {
    let log = import_xes_str(HOSPITAL_XES, &XESImportOptions::default()).unwrap();
    assert_eq!(log.traces.len(), 2);
    assert_eq!(log.traces[0].events.len(), 3);
    assert!(log.traces[1].events.is_empty());
    assert_eq!(
        log.attributes.get_by_key("concept:name").map(|a| &a.value),
        Some(&AttributeValue::String("hospital".to_string()))
    );

    let send = &log.traces[0].events[1];
    assert_eq!(
        send.attributes.get_by_key("msgInstanceId").map(|a| &a.value),
        Some(&AttributeValue::Int(17))
    );
    // Nested list children are not lifted to event level
    assert!(send.attributes.get_by_key("label").is_none());
    assert!(send.attributes.get_by_key("labels").is_some());
    assert!(send
        .attributes
        .get_by_key("time:timestamp")
        .and_then(|a| a.value.try_as_date())
        .is_some());
}

#[test]
fn test_xes_gz_import() {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(HOSPITAL_XES.as_bytes()).unwrap();
    let gz = enc.finish().unwrap();
    let log = import_xes_slice(&gz, true, &XESImportOptions::default()).unwrap();
    assert_eq!(log.traces.len(), 2);

    let mut file = tempfile::Builder::new().suffix(".xes.gz").tempfile().unwrap();
    file.write_all(&gz).unwrap();
    let path = file.path().to_string_lossy().to_string();
    let from_file = import_xes_file(&path, &XESImportOptions::default()).unwrap();
    assert_eq!(from_file, log);
}

#[test]
fn test_sort_events_on_import() {
    let xes = r#"<log>
      <trace>
        <event><string key="concept:name" value="b"/><date key="time:timestamp" value="2024-01-02T00:00:00+00:00"/></event>
        <event><string key="concept:name" value="a"/><date key="time:timestamp" value="2024-01-01T00:00:00+00:00"/></event>
      </trace>
    </log>"#;
    let options = XESImportOptions {
        sort_events_with_timestamp_key: Some("time:timestamp".to_string()),
        ..Default::default()
    };
    let log = import_xes_str(xes, &options).unwrap();
    let names: Vec<_> = log.traces[0]
        .events
        .iter()
        .filter_map(|e| e.attributes.get_by_key("concept:name"))
        .filter_map(|a| a.value.try_as_string())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_missing_log_tag() {
    let res = import_xes_str("<trace></trace>", &XESImportOptions::default());
    assert!(matches!(res, Err(XESParseError::NoTopLevelLog)));
}

#[test]
fn test_event_outside_trace() {
    let res = import_xes_str("<log><event/></log>", &XESImportOptions::default());
    assert!(matches!(res, Err(XESParseError::EventOutsideTrace)));
}
