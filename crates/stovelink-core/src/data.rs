//! Values carried in the `DATA` object of a result envelope.
//!
//! Field order is significant for downstream consumers, so [`DataMap`]
//! keeps insertion order instead of sorting keys.

use serde::ser::{Error as _, SerializeMap, Serializer};
use serde::Serialize;
use serde_json::value::RawValue;

/// A single `DATA` value.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Int(i64),
    /// Float rendered as a raw JSON number with exactly two decimals.
    Fixed2(f32),
    Text(String),
    Bool(bool),
    IntArray(Vec<u16>),
    TextArray(Vec<String>),
    Object(DataMap),
}

impl DataValue {
    /// Shorthand for a two-decimal float.
    pub fn fixed2(value: f32) -> Self {
        DataValue::Fixed2(value)
    }

    /// Render the value the way it is published on a flat MQTT topic.
    pub fn to_payload_string(&self) -> String {
        match self {
            DataValue::Int(v) => v.to_string(),
            DataValue::Fixed2(v) => format!("{:.2}", v),
            DataValue::Text(s) => s.clone(),
            DataValue::Bool(b) => b.to_string(),
            DataValue::IntArray(_) | DataValue::TextArray(_) | DataValue::Object(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Integer content, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text content, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DataValue::Int(v) => serializer.serialize_i64(*v),
            DataValue::Fixed2(v) if v.is_finite() => {
                let raw = RawValue::from_string(format!("{:.2}", v)).map_err(S::Error::custom)?;
                raw.serialize(serializer)
            }
            DataValue::Fixed2(_) => serializer.serialize_none(),
            DataValue::Text(s) => serializer.serialize_str(s),
            DataValue::Bool(b) => serializer.serialize_bool(*b),
            DataValue::IntArray(values) => values.serialize(serializer),
            DataValue::TextArray(values) => values.serialize(serializer),
            DataValue::Object(map) => map.serialize(serializer),
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for DataValue {
                fn from(v: $ty) -> Self {
                    DataValue::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(u8, u16, u32, i32, i64);

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Text(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Text(v.to_string())
    }
}

impl From<Vec<u16>> for DataValue {
    fn from(v: Vec<u16>) -> Self {
        DataValue::IntArray(v)
    }
}

impl From<[u16; 6]> for DataValue {
    fn from(v: [u16; 6]) -> Self {
        DataValue::IntArray(v.to_vec())
    }
}

impl From<Vec<String>> for DataValue {
    fn from(v: Vec<String>) -> Self {
        DataValue::TextArray(v)
    }
}

impl From<DataMap> for DataValue {
    fn from(v: DataMap) -> Self {
        DataValue::Object(v)
    }
}

/// Insertion-ordered string map used for `DATA`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataMap {
    entries: Vec<(String, DataValue)>,
}

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Compact JSON object, as pushed to the event stream.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Serialize for DataMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Counter rendering `H:MM`; hours are not padded.
pub fn format_hours_minutes(hours: u16, minutes: u16) -> String {
    format!("{}:{}{}", hours, minutes / 10, minutes % 10)
}

/// Clock rendering `HH:MM` used by chrono programs.
pub fn format_clock(hours: u8, minutes: u8) -> String {
    format!("{:02}:{:02}", hours, minutes)
}
