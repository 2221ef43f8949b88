//! MQTT topic resolution and payload strategies.
//!
//! A completed command is published in one of three shapes:
//!
//! | Strategy | Topic | Payload |
//! |---|---|---|
//! | `Generic` (0) | `<base>KEY` per key | value |
//! | `GenericJson` (1) | `<base>CAT` | `DATA` as JSON |
//! | `GenericCategorized` (2) | `<base>CAT/KEY` per key | value |
//!
//! `<base>` always ends with `/`, see [`prepare_base_topic`].

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::config::{defaults, HostInfo};
use crate::data::DataMap;

/// Configured MQTT payload shape, stored as its legacy number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PayloadStrategy {
    Generic = 0,
    GenericJson = 1,
    GenericCategorized = 2,
}

impl PayloadStrategy {
    fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for PayloadStrategy {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PayloadStrategy::Generic),
            1 => Ok(PayloadStrategy::GenericJson),
            2 => Ok(PayloadStrategy::GenericCategorized),
            other => Err(format!("unknown MQTT payload strategy {}", other)),
        }
    }
}

impl From<PayloadStrategy> for u8 {
    fn from(strategy: PayloadStrategy) -> Self {
        strategy as u8
    }
}

/// One MQTT publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl MqttMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    pub fn retained(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            retain: true,
            ..Self::new(topic, payload)
        }
    }
}

/// Turn one command result into the messages of `strategy`.
pub fn render(
    strategy: PayloadStrategy,
    base_topic: &str,
    category: Category,
    data: &DataMap,
) -> Vec<MqttMessage> {
    match strategy {
        PayloadStrategy::Generic => data
            .iter()
            .map(|(key, value)| {
                MqttMessage::new(format!("{}{}", base_topic, key), value.to_payload_string())
            })
            .collect(),
        PayloadStrategy::GenericJson => vec![MqttMessage::new(
            format!("{}{}", base_topic, category),
            data.to_json(),
        )],
        PayloadStrategy::GenericCategorized => data
            .iter()
            .map(|(key, value)| {
                MqttMessage::new(
                    format!("{}{}/{}", base_topic, category, key),
                    value.to_payload_string(),
                )
            })
            .collect(),
    }
}

/// Expand placeholders in a configured base topic and make it end with
/// exactly one `/`.
///
/// `$model$` becomes the product model, `$mac$` the compact MAC address and
/// `$label$` the bridge label.
pub fn prepare_base_topic(raw: &str, host: &HostInfo) -> String {
    let mut topic = raw
        .replace("$model$", defaults::MODEL)
        .replace("$mac$", &host.compact_mac())
        .replace("$label$", &host.label);
    while topic.ends_with('/') {
        topic.pop();
    }
    topic.push('/');
    topic
}

/// Discovery-relevant `DATA` fields and the category that carries them.
pub const TOPIC_TABLE: &[(&str, Category)] = &[
    ("STATUS", Category::Stat),
    ("T1", Category::Tmps),
    ("T2", Category::Tmps),
    ("T3", Category::Tmps),
    ("T4", Category::Tmps),
    ("T5", Category::Tmps),
    ("PQT", Category::Cntr),
    ("SERVICETIME", Category::Cntr),
    ("FDR", Category::Powr),
    ("DP_TARGET", Category::Dprs),
    ("DP_PRESS", Category::Dprs),
    ("SETP", Category::Setp),
    ("PWR", Category::Powr),
    ("F2L", Category::Fand),
    ("F3L", Category::Fand),
    ("F4L", Category::Fand),
];

fn category_of(field: &str) -> Option<Category> {
    TOPIC_TABLE
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, category)| *category)
}

/// Discovery `state_topic` of `field`, relative to `~` (the base topic).
pub fn state_topic(field: &str, strategy: PayloadStrategy) -> Option<String> {
    let category = category_of(field)?;
    let candidates = [
        format!("~/{}", field),
        format!("~/{}", category),
        format!("~/{}/{}", category, field),
    ];
    candidates.into_iter().nth(strategy.index())
}

/// Template extracting `field` from a JSON payload; `None` for flat payloads.
pub fn value_template(field: &str, strategy: PayloadStrategy) -> Option<String> {
    (strategy == PayloadStrategy::GenericJson).then(|| format!("{{{{ value_json.{} }}}}", field))
}

/// Expression reading `field` as an integer inside a larger template.
pub fn int_expr(field: &str, strategy: PayloadStrategy) -> String {
    match strategy {
        PayloadStrategy::GenericJson => format!("int(value_json.{})", field),
        _ => "int(value)".to_string(),
    }
}
