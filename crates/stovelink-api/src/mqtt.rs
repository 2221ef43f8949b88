//! MQTT transport over `rumqttc`.
//!
//! [`RumqttSink`] is handed to the engine for publishing; [`MqttConnection`]
//! drives the event loop, keeps the connected flag current and forwards
//! commands received on `<base>cmd` to the control loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use stovelink_core::sink::{CONNECTED_BRIDGE_ONLY, DISCONNECTED};
use stovelink_core::topics::prepare_base_topic;
use stovelink_core::{BridgeConfig, MqttSink, PublishError};

use crate::bridge::{BridgeHandle, BridgeRequest};
use crate::error::ApiError;

/// Outgoing request queue of the client.
const CLIENT_CAPACITY: usize = 256;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Pause before the event loop reconnects after an error.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Publishing half, shared with the engine.
pub struct RumqttSink {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttSink for RumqttSink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::Failed(e.to_string()))
    }
}

/// Event loop half.
pub struct MqttConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    connected_topic: String,
    command_topic: String,
}

/// Build the client from configuration. Nothing touches the network
/// until [`MqttConnection::run`] polls.
pub fn connect(config: &BridgeConfig) -> (Arc<RumqttSink>, MqttConnection) {
    let ha = &config.home_automation;
    let base_topic = prepare_base_topic(&ha.mqtt.base_topic, &config.host);
    let connected_topic = format!("{}connected", base_topic);

    let client_id = format!("{}-{}", config.host.label, uuid::Uuid::new_v4().simple());
    let mut options = MqttOptions::new(client_id, &ha.hostname, ha.mqtt.port);
    options.set_keep_alive(KEEP_ALIVE);
    if !ha.mqtt.username.is_empty() {
        options.set_credentials(&ha.mqtt.username, &ha.mqtt.password);
    }
    options.set_last_will(LastWill::new(
        &connected_topic,
        DISCONNECTED,
        QoS::AtMostOnce,
        true,
    ));

    let (client, eventloop) = AsyncClient::new(options, CLIENT_CAPACITY);
    let connected = Arc::new(AtomicBool::new(false));

    let sink = Arc::new(RumqttSink {
        client: client.clone(),
        connected: connected.clone(),
    });
    let connection = MqttConnection {
        client,
        eventloop,
        connected,
        connected_topic,
        command_topic: format!("{}cmd", base_topic),
    };
    (sink, connection)
}

impl MqttConnection {
    /// Poll forever, reconnecting after errors. Returns once the control
    /// loop is gone.
    pub async fn run(mut self, handle: BridgeHandle) {
        let mut first_connection = true;
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, Ordering::SeqCst);
                    tracing::info!(category = "mqtt", "MQTT connected");
                    if let Err(e) = self.on_connected(first_connection) {
                        tracing::warn!(category = "mqtt", error = %e, "MQTT session setup failed");
                    }
                    first_connection = false;
                    if handle.send(BridgeRequest::MqttConnected).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic != self.command_topic {
                        continue;
                    }
                    let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                    tracing::debug!(category = "mqtt", payload = %payload, "MQTT command received");
                    if handle
                        .send(BridgeRequest::MqttCommand { payload })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if self.connected.swap(false, Ordering::SeqCst) {
                        tracing::warn!(category = "mqtt", error = %e, "MQTT connection lost");
                        if handle.send(BridgeRequest::MqttDisconnected).await.is_err() {
                            break;
                        }
                    } else {
                        tracing::debug!(category = "mqtt", error = %e, "MQTT connection failed");
                    }
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
        tracing::info!(category = "mqtt", "MQTT event loop stopped");
    }

    /// Announce the bridge and subscribe to commands. Queued requests go
    /// out on the next poll.
    fn on_connected(&self, first_connection: bool) -> Result<(), ApiError> {
        let mqtt_err = |e: rumqttc::ClientError| ApiError::Mqtt(e.to_string());

        self.client
            .try_publish(
                &self.connected_topic,
                QoS::AtMostOnce,
                true,
                CONNECTED_BRIDGE_ONLY,
            )
            .map_err(mqtt_err)?;
        if first_connection {
            // Drop any retained command left on the broker.
            self.client
                .try_publish(&self.command_topic, QoS::AtMostOnce, true, "")
                .map_err(mqtt_err)?;
        }
        self.client
            .try_subscribe(&self.command_topic, QoS::AtMostOnce)
            .map_err(mqtt_err)
    }

    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stovelink_core::Protocol;

    fn mqtt_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.home_automation.protocol = Protocol::Mqtt;
        config.home_automation.hostname = "127.0.0.1".to_string();
        config.home_automation.mqtt.base_topic = "stoves/$label$/".to_string();
        config.host.label = "kitchen".to_string();
        config
    }

    #[tokio::test]
    async fn test_topics_from_config() {
        let (_, connection) = connect(&mqtt_config());
        assert_eq!(connection.command_topic(), "stoves/kitchen/cmd");
        assert_eq!(connection.connected_topic, "stoves/kitchen/connected");
    }

    #[tokio::test]
    async fn test_sink_refuses_while_disconnected() {
        let (sink, _connection) = connect(&mqtt_config());
        assert!(!sink.is_connected());
        assert_eq!(
            sink.publish("stoves/kitchen/SETP", "21", false),
            Err(PublishError::NotConnected)
        );
    }
}
