use std::fs::File;
use std::io::{BufRead, BufReader};

use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::bufread::GzDecoder;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Error as QuickXMLError;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::event_log::event_log_struct::{
    Attribute, AttributeValue, Attributes, Event, EventLog, Trace, XESEditableAttribute,
};

///
/// Error encountered while parsing XES
///
#[derive(Debug, Clone)]
pub enum XESParseError {
    /// An Attribute was encountered outside an open `<log>` tag
    AttributeOutsideLog,
    /// There is not top-level `<log>`
    NoTopLevelLog,
    /// An `<event>` was opened outside of a `<trace>`
    EventOutsideTrace,
    /// IO errror
    IOError(std::rc::Rc<std::io::Error>),
    /// XML error (e.g., incorrect XML format )
    XMLParsingError(QuickXMLError),
}

impl std::fmt::Display for XESParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse XES: {:?}", self)
    }
}

impl std::error::Error for XESParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XESParseError::IOError(e) => Some(e.as_ref()),
            XESParseError::XMLParsingError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for XESParseError {
    fn from(e: std::io::Error) -> Self {
        Self::IOError(std::rc::Rc::new(e))
    }
}

impl From<QuickXMLError> for XESParseError {
    fn from(e: QuickXMLError) -> Self {
        Self::XMLParsingError(e)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
///
/// Options for XES Import
///
pub struct XESImportOptions {
    /// Optional date format to use when parsing `DateTimes` (first trying [`chrono::DateTime`] then falling back to [`chrono::NaiveDateTime`] with UTC timezone).
    ///
    /// Will fall back to default formats (e.g., rfc3339) if parsing fails using passed `date_format`
    pub date_format: Option<String>,
    /// Sort events via timestamp key directly when parsing:
    /// * If None: No sorting (i.e., events of traces are included in order of occurence in event log)
    /// * If Some(key): Stable sort of the events of each trace by the timestamp stored under key;
    ///   events without a valid timestamp are placed before all other events
    pub sort_events_with_timestamp_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    Log,
    GlobalTraceAttributes,
    GlobalEventAttributes,
    Trace,
    Event,
}

fn is_attribute_tag(name: &[u8]) -> bool {
    matches!(
        name,
        b"string" | b"date" | b"int" | b"float" | b"boolean" | b"id" | b"list" | b"container"
    )
}

/// Parse XES from the given reader
///
/// Nested attributes (children of lists and containers) are skipped.
pub fn import_xes<T>(reader: T, options: &XESImportOptions) -> Result<EventLog, XESParseError>
where
    T: BufRead,
{
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();

    let mut log = EventLog::default();
    let mut global_trace_attrs: Attributes = Vec::new();
    let mut global_event_attrs: Attributes = Vec::new();
    let mut encountered_log = false;
    let mut mode = Mode::None;
    let mut current_trace: Option<Trace> = None;
    let mut current_event: Option<Event> = None;
    // Depth inside of attributes which have child elements
    let mut nested_depth: usize = 0;

    loop {
        buf.clear();
        let (t, has_children) = match reader.read_event_into(&mut buf)? {
            XmlEvent::Start(t) => (t.into_owned(), true),
            XmlEvent::Empty(t) => (t.into_owned(), false),
            XmlEvent::End(t) => {
                match t.name().as_ref() {
                    b"log" => mode = Mode::None,
                    b"global" => mode = Mode::Log,
                    b"trace" => {
                        if let Some(trace) = current_trace.take() {
                            log.traces.push(trace);
                        }
                        mode = Mode::Log;
                    }
                    b"event" => {
                        if let (Some(trace), Some(event)) =
                            (current_trace.as_mut(), current_event.take())
                        {
                            trace.events.push(event);
                        }
                        mode = Mode::Trace;
                    }
                    name if is_attribute_tag(name) => {
                        nested_depth = nested_depth.saturating_sub(1);
                    }
                    _ => {}
                }
                continue;
            }
            XmlEvent::Eof => break,
            _ => continue,
        };

        match t.name().as_ref() {
            b"log" => {
                encountered_log = true;
                mode = Mode::Log;
            }
            b"global" => {
                mode = match get_attribute_string(&t, "scope").as_str() {
                    "trace" => Mode::GlobalTraceAttributes,
                    _ => Mode::GlobalEventAttributes,
                };
                if !has_children {
                    mode = Mode::Log;
                }
            }
            b"trace" => {
                mode = Mode::Trace;
                let trace = Trace {
                    attributes: Vec::new(),
                    events: Vec::new(),
                };
                if has_children {
                    current_trace = Some(trace);
                } else {
                    log.traces.push(trace);
                    mode = Mode::Log;
                }
            }
            b"event" => {
                let Some(trace) = current_trace.as_mut() else {
                    return Err(XESParseError::EventOutsideTrace);
                };
                let event = Event {
                    attributes: Vec::new(),
                };
                if has_children {
                    current_event = Some(event);
                    mode = Mode::Event;
                } else {
                    trace.events.push(event);
                }
            }
            name if is_attribute_tag(name) => {
                if nested_depth == 0 {
                    let attr = Attribute::new(
                        get_attribute_string(&t, "key"),
                        parse_attribute_value_from_tag(&t, options),
                    );
                    match mode {
                        Mode::None => return Err(XESParseError::AttributeOutsideLog),
                        Mode::Log => log.attributes.add_attribute(attr),
                        Mode::GlobalTraceAttributes => global_trace_attrs.add_attribute(attr),
                        Mode::GlobalEventAttributes => global_event_attrs.add_attribute(attr),
                        Mode::Trace => {
                            if let Some(trace) = current_trace.as_mut() {
                                trace.attributes.add_attribute(attr);
                            }
                        }
                        Mode::Event => {
                            if let Some(event) = current_event.as_mut() {
                                event.attributes.add_attribute(attr);
                            }
                        }
                    }
                }
                if has_children {
                    nested_depth += 1;
                }
            }
            // Extensions, classifiers and unknown tags carry no event data needed here
            _ => {}
        }
    }

    if !encountered_log {
        return Err(XESParseError::NoTopLevelLog);
    }
    if !global_trace_attrs.is_empty() {
        log.global_trace_attrs = Some(global_trace_attrs);
    }
    if !global_event_attrs.is_empty() {
        log.global_event_attrs = Some(global_event_attrs);
    }
    if let Some(key) = &options.sort_events_with_timestamp_key {
        sort_events_by_timestamp(&mut log, key);
    }
    Ok(log)
}

///
/// Stable sort of all events of each trace by the timestamp attribute with the given key
///
/// Events without a (valid) timestamp are placed before all other events.
///
pub fn sort_events_by_timestamp(log: &mut EventLog, key: &str) {
    let globals = log.global_event_attrs.clone();
    for trace in log.traces.iter_mut() {
        trace.events.sort_by_key(|e| {
            e.attributes
                .get_by_key_or_global(key, &globals)
                .and_then(|a| a.value.try_as_date())
                .copied()
        });
    }
}

///
/// Import a XES [`EventLog`] from a file path
///
/// Files ending in `.gz` are decompressed on the fly
///
pub fn import_xes_file(path: &str, options: &XESImportOptions) -> Result<EventLog, XESParseError> {
    let file = File::open(path)?;
    if path.ends_with(".gz") {
        let dec = GzDecoder::new(BufReader::new(file));
        import_xes(BufReader::new(dec), options)
    } else {
        import_xes(BufReader::new(file), options)
    }
}

///
/// Import a XES [`EventLog`] directly from a string
///
pub fn import_xes_str(xes_str: &str, options: &XESImportOptions) -> Result<EventLog, XESParseError> {
    import_xes(BufReader::new(xes_str.as_bytes()), options)
}

///
/// Import a XES [`EventLog`] from a byte slice (&\[u8\])
///
/// * `is_compressed_gz`: Parse the passed `xes_data` as a compressed .gz archive
///
pub fn import_xes_slice(
    xes_data: &[u8],
    is_compressed_gz: bool,
    options: &XESImportOptions,
) -> Result<EventLog, XESParseError> {
    if is_compressed_gz {
        let gz: GzDecoder<&[u8]> = GzDecoder::new(xes_data);
        return import_xes(BufReader::new(gz), options);
    }
    import_xes(BufReader::new(xes_data), options)
}

fn get_attribute_string(t: &BytesStart<'_>, key: &'static str) -> String {
    if let Ok(Some(attr)) = t.try_get_attribute(key) {
        return String::from_utf8_lossy(&attr.value).to_string();
    }
    tracing::debug!(key, "expected XML attribute missing, assuming empty string");
    String::new()
}

fn parse_attribute_value_from_tag(t: &BytesStart<'_>, options: &XESImportOptions) -> AttributeValue {
    let value = get_attribute_string(t, "value");
    match t.name().as_ref() {
        b"string" | b"id" => AttributeValue::String(
            unescape(value.as_str())
                .map(|v| v.to_string())
                .unwrap_or(value),
        ),
        b"date" => match parse_date_from_str(&value, &options.date_format) {
            Some(dt) => AttributeValue::Date(dt),
            None => {
                tracing::warn!(%value, "failed to parse date");
                AttributeValue::None()
            }
        },
        b"int" => value
            .parse::<i64>()
            .map(AttributeValue::Int)
            .unwrap_or(AttributeValue::None()),
        b"float" => value
            .parse::<f64>()
            .map(AttributeValue::Float)
            .unwrap_or(AttributeValue::None()),
        b"boolean" => value
            .parse::<bool>()
            .map(AttributeValue::Boolean)
            .unwrap_or(AttributeValue::None()),
        _ => AttributeValue::None(),
    }
}

fn parse_date_from_str(value: &str, date_format: &Option<String>) -> Option<DateTime<Utc>> {
    if let Some(date_format) = &date_format {
        if let Ok(dt) = DateTime::parse_from_str(value, date_format) {
            return Some(dt.into());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, date_format) {
            return Some(dt.and_utc());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.into());
    }

    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S:%f%:z") {
        return Some(dt.into());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }

    None
}
