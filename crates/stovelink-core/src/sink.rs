//! Result fan-out to the event stream and MQTT.
//!
//! Only results of commands run with `publish = true` that completed and
//! carry a category leave through here; everything else is answered on
//! the transport that asked.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::category::Category;
use crate::envelope::ResultEnvelope;
use crate::error::PublishError;
use crate::topics::{render, MqttMessage, PayloadStrategy};

/// Default buffer of the event stream.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Payload of `<base>connected` while only the bridge is up.
pub const CONNECTED_BRIDGE_ONLY: &str = "1";

/// Payload of `<base>connected` once the stove answers.
pub const CONNECTED_WITH_STOVE: &str = "2";

/// Last will payload of `<base>connected`.
pub const DISCONNECTED: &str = "0";

/// Publish side of an MQTT client.
pub trait MqttSink: Send + Sync {
    fn is_connected(&self) -> bool;

    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), PublishError>;
}

/// Broadcasts serialized `DATA` objects to event stream subscribers.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns `true` if at least one subscriber received the event.
    pub fn broadcast(&self, data: String) -> bool {
        self.tx.send(data).is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes completed results to the event stream and MQTT, and tracks the
/// publish health of the current sweep.
pub struct FanOut {
    events: EventBroadcaster,
    mqtt: Option<Arc<dyn MqttSink>>,
    strategy: PayloadStrategy,
    base_topic: String,
    sweep_ok: bool,
    published_stove_connected: bool,
    discovery_due: bool,
}

impl FanOut {
    /// `mqtt` is `None` when the home automation protocol is disabled.
    pub fn new(
        events: EventBroadcaster,
        mqtt: Option<Arc<dyn MqttSink>>,
        strategy: PayloadStrategy,
        base_topic: impl Into<String>,
    ) -> Self {
        Self {
            events,
            mqtt,
            strategy,
            base_topic: base_topic.into(),
            sweep_ok: true,
            published_stove_connected: false,
            discovery_due: false,
        }
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub fn strategy(&self) -> PayloadStrategy {
        self.strategy
    }

    /// Base topic, always ending with `/`.
    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt.is_some()
    }

    pub fn mqtt_connected(&self) -> bool {
        self.mqtt.as_ref().is_some_and(|m| m.is_connected())
    }

    /// `<base>connected`.
    pub fn connected_topic(&self) -> String {
        format!("{}connected", self.base_topic)
    }

    /// `<base>cmd`.
    pub fn command_topic(&self) -> String {
        format!("{}cmd", self.base_topic)
    }

    /// `<base>result`.
    pub fn result_topic(&self) -> String {
        format!("{}result", self.base_topic)
    }

    /// Deliver one result. Returns whether every MQTT publish succeeded;
    /// nothing to publish counts as success.
    pub fn deliver(
        &mut self,
        envelope: &ResultEnvelope,
        category: Option<Category>,
        publish: bool,
    ) -> bool {
        let category = match category {
            Some(category) if publish && envelope.is_success() => category,
            _ => return true,
        };

        self.events.broadcast(envelope.data().to_json());

        let Some(mqtt) = self.mqtt.clone() else {
            return true;
        };

        let messages = render(self.strategy, &self.base_topic, category, envelope.data());
        let ok = publish_all(mqtt.as_ref(), &messages);
        if !ok {
            tracing::warn!(category = "fanout", topic_category = %category, "MQTT publish failed");
        }
        self.sweep_ok &= ok;
        ok
    }

    /// Reset the sweep publish flag.
    pub fn begin_sweep(&mut self) {
        self.sweep_ok = true;
    }

    /// Mark the running sweep as failed.
    pub fn fail_sweep(&mut self) {
        self.sweep_ok = false;
    }

    /// Whether every publish since the last [`begin_sweep`](Self::begin_sweep) succeeded.
    pub fn sweep_ok(&self) -> bool {
        self.sweep_ok
    }

    /// Publish the stove connectivity on `<base>connected` when it changed.
    pub fn report_stove_connectivity(&mut self, reachable: bool) {
        let Some(mqtt) = self.mqtt.clone() else {
            return;
        };
        if !mqtt.is_connected() || self.published_stove_connected == reachable {
            return;
        }

        let payload = if reachable {
            CONNECTED_WITH_STOVE
        } else {
            CONNECTED_BRIDGE_ONLY
        };
        if let Err(e) = mqtt.publish(&self.connected_topic(), payload, true) {
            tracing::warn!(category = "fanout", error = %e, "Failed to publish stove connectivity");
        }
        self.published_stove_connected = reachable;
        self.discovery_due = true;
    }

    /// The broker session started.
    pub fn mqtt_connected_event(&mut self) {
        self.discovery_due = true;
    }

    /// The broker session ended; the next connection republishes `1`.
    pub fn mqtt_disconnected_event(&mut self) {
        self.published_stove_connected = false;
    }

    pub fn discovery_due(&self) -> bool {
        self.discovery_due
    }

    pub fn clear_discovery_due(&mut self) {
        self.discovery_due = false;
    }

    /// Publish a batch on the MQTT client. `false` when disabled,
    /// disconnected, or any publish failed.
    pub fn publish_messages(&self, messages: &[MqttMessage]) -> bool {
        match &self.mqtt {
            Some(mqtt) => publish_all(mqtt.as_ref(), messages),
            None => false,
        }
    }
}

fn publish_all(mqtt: &dyn MqttSink, messages: &[MqttMessage]) -> bool {
    if !mqtt.is_connected() {
        return false;
    }
    messages.iter().fold(true, |ok, m| {
        let sent = mqtt.publish(&m.topic, &m.payload, m.retain);
        if let Err(e) = &sent {
            tracing::debug!(category = "fanout", topic = %m.topic, error = %e, "Publish rejected");
        }
        ok && sent.is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        offline: AtomicBool,
        reject: AtomicBool,
        sent: Mutex<Vec<MqttMessage>>,
    }

    impl MqttSink for Recorder {
        fn is_connected(&self) -> bool {
            !self.offline.load(Ordering::SeqCst)
        }

        fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), PublishError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(PublishError::Failed("queue full".into()));
            }
            self.sent.lock().unwrap().push(MqttMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
                retain,
            });
            Ok(())
        }
    }

    fn fanout(recorder: &Arc<Recorder>) -> FanOut {
        let sink: Arc<dyn MqttSink> = recorder.clone();
        FanOut::new(
            EventBroadcaster::new(),
            Some(sink),
            PayloadStrategy::GenericJson,
            "stove/",
        )
    }

    fn setp_envelope() -> ResultEnvelope {
        ResultEnvelope::success("GET SETP", DataMap::new().with("SETP", 21u8))
    }

    #[test]
    fn test_publish_false_is_silent() {
        let recorder = Arc::new(Recorder::default());
        let mut fan = fanout(&recorder);
        let mut rx = fan.events().subscribe();

        assert!(fan.deliver(&setp_envelope(), Some(Category::Setp), false));
        assert!(fan.deliver(&setp_envelope(), Some(Category::Setp), false));
        assert!(recorder.sent.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_no_category_or_failure_is_silent() {
        let recorder = Arc::new(Recorder::default());
        let mut fan = fanout(&recorder);

        fan.deliver(&setp_envelope(), None, true);
        fan.deliver(&ResultEnvelope::timeout("GET SETP"), Some(Category::Setp), true);
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_publish_reaches_both_sinks() {
        let recorder = Arc::new(Recorder::default());
        let mut fan = fanout(&recorder);
        let mut rx = fan.events().subscribe();

        assert!(fan.deliver(&setp_envelope(), Some(Category::Setp), true));
        assert_eq!(rx.try_recv().unwrap(), r#"{"SETP":21}"#);
        assert_eq!(
            *recorder.sent.lock().unwrap(),
            vec![MqttMessage::new("stove/SETP", r#"{"SETP":21}"#)]
        );
    }

    #[test]
    fn test_disconnected_degrades_sweep() {
        let recorder = Arc::new(Recorder::default());
        recorder.offline.store(true, Ordering::SeqCst);
        let mut fan = fanout(&recorder);

        fan.begin_sweep();
        assert!(!fan.deliver(&setp_envelope(), Some(Category::Setp), true));
        assert!(!fan.sweep_ok());

        recorder.offline.store(false, Ordering::SeqCst);
        assert!(fan.deliver(&setp_envelope(), Some(Category::Setp), true));
        assert!(!fan.sweep_ok());

        fan.begin_sweep();
        assert!(fan.sweep_ok());
    }

    #[test]
    fn test_rejected_publish_degrades_sweep() {
        let recorder = Arc::new(Recorder::default());
        recorder.reject.store(true, Ordering::SeqCst);
        let mut fan = fanout(&recorder);

        fan.begin_sweep();
        fan.deliver(&setp_envelope(), Some(Category::Setp), true);
        assert!(!fan.sweep_ok());
    }

    #[test]
    fn test_mqtt_disabled_still_streams_events() {
        let mut fan = FanOut::new(
            EventBroadcaster::new(),
            None,
            PayloadStrategy::Generic,
            "stove/",
        );
        let mut rx = fan.events().subscribe();
        assert!(fan.deliver(&setp_envelope(), Some(Category::Setp), true));
        assert!(rx.try_recv().is_ok());
        assert!(fan.sweep_ok());
    }

    #[test]
    fn test_stove_connectivity_published_on_change_only() {
        let recorder = Arc::new(Recorder::default());
        let mut fan = fanout(&recorder);

        fan.report_stove_connectivity(true);
        fan.report_stove_connectivity(true);
        fan.report_stove_connectivity(false);
        let sent = recorder.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                MqttMessage::retained("stove/connected", "2"),
                MqttMessage::retained("stove/connected", "1"),
            ]
        );
        assert!(fan.discovery_due());
    }

    #[test]
    fn test_disconnect_resets_connectivity() {
        let recorder = Arc::new(Recorder::default());
        let mut fan = fanout(&recorder);

        fan.report_stove_connectivity(true);
        fan.mqtt_disconnected_event();
        fan.report_stove_connectivity(true);
        assert_eq!(recorder.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_topics() {
        let recorder = Arc::new(Recorder::default());
        let fan = fanout(&recorder);
        assert_eq!(fan.connected_topic(), "stove/connected");
        assert_eq!(fan.command_topic(), "stove/cmd");
        assert_eq!(fan.result_topic(), "stove/result");
    }
}
