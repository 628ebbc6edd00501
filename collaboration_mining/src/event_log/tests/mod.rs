use crate::event_log::{
    import_xes::{import_xes_str, XESImportOptions},
    XESEditableAttribute,
};

mod xes_import_tests;

pub(crate) const HOSPITAL_XES: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<log xes.version="1.0" xes.features="nested-attributes">
  <extension name="Concept" prefix="concept" uri="http://www.xes-standard.org/concept.xesext"/>
  <global scope="trace">
    <string key="concept:name" value="__INVALID__"/>
  </global>
  <global scope="event">
    <string key="msgType" value="none"/>
  </global>
  <classifier name="Activity" keys="concept:name"/>
  <string key="concept:name" value="hospital"/>
  <trace>
    <string key="concept:name" value="case-1"/>
    <event>
      <string key="concept:name" value="Register patient"/>
      <date key="time:timestamp" value="2024-03-01T10:00:00.000+01:00"/>
    </event>
    <event>
      <string key="concept:name" value="Send blood sample"/>
      <date key="time:timestamp" value="2024-03-01T10:30:00.000+01:00"/>
      <string key="msgType" value="send"/>
      <int key="msgInstanceId" value="17"/>
      <list key="labels">
        <string key="label" value="urgent"/>
      </list>
    </event>
    <event>
      <string key="concept:name" value="Receive results"/>
      <date key="time:timestamp" value="2024-03-01T12:00:00.000+01:00"/>
      <string key="msgType" value="receive"/>
      <string key="msgInstanceId" value="18"/>
    </event>
  </trace>
  <trace>
  </trace>
</log>"#;

#[test]
fn test_global_attribute_fallback() {
    let log = import_xes_str(HOSPITAL_XES, &XESImportOptions::default()).unwrap();
    let first = &log.traces[0].events[0];
    let msg_type = first
        .attributes
        .get_by_key_or_global("msgType", &log.global_event_attrs)
        .and_then(|a| a.value.try_as_string())
        .unwrap();
    assert_eq!(msg_type, "none");
    let case_id = log.traces[1]
        .attributes
        .get_by_key_or_global("concept:name", &log.global_trace_attrs)
        .and_then(|a| a.value.try_as_string())
        .unwrap();
    assert_eq!(case_id, "__INVALID__");
}

#[test]
fn test_typed_attribute_access() {
    let log = import_xes_str(HOSPITAL_XES, &XESImportOptions::default()).unwrap();
    let send = &log.traces[0].events[1];
    let id = &send.attributes.get_by_key("msgInstanceId").unwrap().value;
    assert!(id.try_as_string().is_none());
    assert!(id.try_as_date().is_none());
    assert_eq!(id.as_key_string().as_deref(), Some("17"));
    let ts = &send.attributes.get_by_key("time:timestamp").unwrap().value;
    assert!(ts.try_as_date().is_some());
    assert!(ts.as_key_string().is_none());
}
