use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::constants::{ACTIVITY_NAME, MESSAGE_ID_NAME, MESSAGE_TYPE_NAME, TRACE_ID_NAME};

///
/// Possible attribute values of events and traces
///
/// Tip: If you know the expected `AttributeValue` type, make use of the `try_as_xxx` functions (e.g., [`AttributeValue::try_as_string`])
///
/// ```rust
/// use collaboration_mining::event_log::AttributeValue;
/// let v = AttributeValue::String("Order received".to_string());
///
/// let s = v.try_as_string().unwrap();
/// assert_eq!(s, "Order received");
/// assert!(v.try_as_date().is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content")]
pub enum AttributeValue {
    /// String values
    String(String),
    #[serde(with = "ts_milliseconds")]
    /// DateTime values
    Date(DateTime<Utc>),
    /// Integer values
    Int(i64),
    /// Float values
    Float(f64),
    /// Boolean values
    Boolean(bool),
    /// Used to represent invalid or unsupported values (e.g., DateTime which could not be parsed)
    None(),
}

impl AttributeValue {
    ///
    /// Try to get attribute value as String
    ///
    /// Returns `Some()` of inner value if value is of variant [`AttributeValue::String`] and `None` otherwise
    ///
    pub fn try_as_string(&self) -> Option<&String> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }
    ///
    /// Try to get attribute value as date
    ///
    /// Returns `Some()` of inner value if value is of variant [`AttributeValue::Date`] and `None` otherwise
    ///
    pub fn try_as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            AttributeValue::Date(v) => Some(v),
            _ => None,
        }
    }
    ///
    /// Render the value as a correlation key
    ///
    /// Message ids are frequently stored as integers instead of strings, so both are accepted
    ///
    pub fn as_key_string(&self) -> Option<String> {
        match self {
            AttributeValue::String(v) => Some(v.clone()),
            AttributeValue::Int(v) => Some(v.to_string()),
            AttributeValue::Boolean(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
///
/// Attribute made up of the key and value
///
pub struct Attribute {
    /// Attribute key
    pub key: String,
    /// Attribute value
    pub value: AttributeValue,
}

impl Attribute {
    ///
    /// Helper to create a new attribute
    ///
    pub fn new(key: String, attribute_val: AttributeValue) -> Self {
        Self {
            key,
            value: attribute_val,
        }
    }
}

///
/// Attributes are [`Vec`]s of [`Attribute`]s
///
/// See the [`XESEditableAttribute`] trait for convenient functions to add or look up attributes by keys.
pub type Attributes = Vec<Attribute>;

///
/// Trait to easily add and look up attributes
///
pub trait XESEditableAttribute {
    ///
    /// Add a new attribute (with key and value)
    ///
    /// Note: Does _not_ check if attribute was already present.
    ///
    fn add_to_attributes(&mut self, key: String, value: AttributeValue);
    ///
    /// Add a new attribute
    ///
    fn add_attribute(&mut self, attr: Attribute);
    ///
    /// Get an attribute by key
    ///
    /// _Complexity_: Does linear lookup (i.e., in O(n)).
    fn get_by_key(&self, key: &str) -> Option<&Attribute>;
    ///
    /// Get an attribute by key or the default value (e.g., provided by global event or trace attributes)
    ///
    fn get_by_key_or_global<'a>(
        &'a self,
        key: &str,
        global_attrs: &'a Option<Attributes>,
    ) -> Option<&'a Attribute>;
}

impl XESEditableAttribute for Attributes {
    fn add_to_attributes(&mut self, key: String, value: AttributeValue) {
        self.push(Attribute::new(key, value));
    }

    fn add_attribute(&mut self, a: Attribute) {
        self.push(a);
    }

    fn get_by_key(&self, key: &str) -> Option<&Attribute> {
        self.iter().find(|attr| attr.key == key)
    }

    fn get_by_key_or_global<'a>(
        &'a self,
        key: &str,
        global_attrs: &'a Option<Attributes>,
    ) -> Option<&'a Attribute> {
        if let Some(attr) = self.iter().find(|attr| attr.key == key) {
            return Some(attr);
        }
        global_attrs.as_ref().and_then(|g| g.get_by_key(key))
    }
}

///
/// Direction of a message event
///
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// The event sends a message to another party
    Send,
    /// The event receives a message from another party
    Receive,
}

impl MessageKind {
    ///
    /// Parse a message flag (`send` / `receive`, case-insensitive)
    ///
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "send" | "sent" | "sender" => Some(MessageKind::Send),
            "receive" | "received" | "receiver" => Some(MessageKind::Receive),
            _ => None,
        }
    }

    /// Value written to the message type attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Send => "send",
            MessageKind::Receive => "receive",
        }
    }
}

///
/// An event consists of multiple (event) attributes ([Attributes])
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event attributes
    pub attributes: Attributes,
}

impl Event {
    /// Create a new event with the provided activity
    ///
    /// Uses [`ACTIVITY_NAME`] as key
    pub fn new(activity: String) -> Self {
        Event {
            attributes: vec![Attribute::new(
                ACTIVITY_NAME.to_string(),
                AttributeValue::String(activity),
            )],
        }
    }

    /// Create a new message event with the provided activity, direction and correlation id
    ///
    /// Uses [`MESSAGE_TYPE_NAME`] and [`MESSAGE_ID_NAME`] as keys
    pub fn new_message(activity: String, kind: MessageKind, correlation_id: String) -> Self {
        let mut event = Self::new(activity);
        event.attributes.add_to_attributes(
            MESSAGE_TYPE_NAME.to_string(),
            AttributeValue::String(kind.as_str().to_string()),
        );
        event.attributes.add_to_attributes(
            MESSAGE_ID_NAME.to_string(),
            AttributeValue::String(correlation_id),
        );
        event
    }

    /// Get the string value of an attribute, falling back to the global event attributes
    pub fn get_string<'a>(&'a self, key: &str, globals: &'a Option<Attributes>) -> Option<&'a String> {
        self.attributes
            .get_by_key_or_global(key, globals)
            .and_then(|a| a.value.try_as_string())
    }
}

///
/// A trace consists of a list of events and trace attributes (See also [`Event`] and [`Attributes`])
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trace {
    /// Trace-level attributes
    pub attributes: Attributes,
    /// Events contained in trace
    pub events: Vec<Event>,
}

impl Trace {
    /// Create a new trace with the given case id and events
    pub fn new(case_id: String, events: Vec<Event>) -> Self {
        Self {
            attributes: vec![Attribute::new(
                TRACE_ID_NAME.to_string(),
                AttributeValue::String(case_id),
            )],
            events,
        }
    }
}

///
/// Event log consisting of a list of [`Trace`]s and log [`Attributes`]
///
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventLog {
    /// Top-level attributes
    pub attributes: Attributes,
    /// Traces contained in log
    pub traces: Vec<Trace>,
    /// Global trace attributes
    pub global_trace_attrs: Option<Attributes>,
    ///  Global event attributes
    pub global_event_attrs: Option<Attributes>,
}

impl EventLog {
    ///
    /// Build an event log from plain activity sequences (one [`Trace`] per sequence)
    ///
    /// Case ids are assigned by position.
    ///
    pub fn from_activity_traces<S: AsRef<str>>(traces: &[Vec<S>]) -> Self {
        Self {
            traces: traces
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    Trace::new(
                        i.to_string(),
                        t.iter().map(|a| Event::new(a.as_ref().to_string())).collect(),
                    )
                })
                .collect(),
            ..Default::default()
        }
    }
}

///
/// One party of a collaboration: a process name together with the event log recorded by that party
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Party {
    /// Process (participant) name
    pub name: String,
    /// Event log of this party
    pub log: EventLog,
}

impl Party {
    /// Create a new party
    pub fn new<S: Into<String>>(name: S, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}
