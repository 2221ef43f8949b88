//! The control loop.
//!
//! A single task owns the [`Engine`]. Transports talk to it through a
//! [`BridgeHandle`]; requests are served one at a time in arrival order,
//! interleaved with the periodic publish sweep.

use std::time::Duration;

use stovelink_core::{
    BackupOutcome, BridgeStatus, Engine, EventBroadcaster, ResultEnvelope, StoveDevice,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::error::ApiError;

/// Queue depth between transports and the control loop.
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

/// How often pending discovery is retried between other events.
pub const DISCOVERY_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// A message for the control loop.
#[derive(Debug)]
pub enum BridgeRequest {
    Execute {
        cmd: String,
        publish: bool,
        reply: oneshot::Sender<ResultEnvelope>,
    },
    /// `None` in the reply when `cmd` is not a backup command.
    Backup {
        cmd: String,
        reply: oneshot::Sender<Option<BackupOutcome>>,
    },
    Status {
        reply: oneshot::Sender<BridgeStatus>,
    },
    /// Raw payload received on `<base>cmd`.
    MqttCommand { payload: String },
    MqttConnected,
    MqttDisconnected,
}

/// Cloneable sender side of the control loop.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<BridgeRequest>,
    events: EventBroadcaster,
}

impl BridgeHandle {
    /// Event stream fed by published results.
    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub async fn execute(&self, cmd: impl Into<String>, publish: bool) -> Result<ResultEnvelope, ApiError> {
        let (reply, rx) = oneshot::channel();
        self.send(BridgeRequest::Execute {
            cmd: cmd.into(),
            publish,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ApiError::BridgeUnavailable)
    }

    pub async fn backup(&self, cmd: impl Into<String>) -> Result<Option<BackupOutcome>, ApiError> {
        let (reply, rx) = oneshot::channel();
        self.send(BridgeRequest::Backup {
            cmd: cmd.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ApiError::BridgeUnavailable)
    }

    pub async fn status(&self) -> Result<BridgeStatus, ApiError> {
        let (reply, rx) = oneshot::channel();
        self.send(BridgeRequest::Status { reply }).await?;
        rx.await.map_err(|_| ApiError::BridgeUnavailable)
    }

    /// Fire-and-forget notification (MQTT events).
    pub async fn send(&self, request: BridgeRequest) -> Result<(), ApiError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| ApiError::BridgeUnavailable)
    }
}

pub struct Bridge<D: StoveDevice> {
    engine: Engine<D>,
    rx: mpsc::Receiver<BridgeRequest>,
    upload_period: Duration,
}

impl<D: StoveDevice + 'static> Bridge<D> {
    pub fn new(engine: Engine<D>) -> (Self, BridgeHandle) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let handle = BridgeHandle {
            tx,
            events: engine.events().clone(),
        };
        let upload_period = Duration::from_secs(engine.config().home_automation.upload_period.max(1));
        let bridge = Self {
            engine,
            rx,
            upload_period,
        };
        (bridge, handle)
    }

    /// Serve requests until every [`BridgeHandle`] is dropped.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.upload_period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first sweep is one period in.
        sweep.tick().await;

        let mut discovery = tokio::time::interval(DISCOVERY_RETRY_INTERVAL);
        discovery.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            category = "bridge",
            upload_period = self.upload_period.as_secs(),
            "Control loop started"
        );

        loop {
            tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
                _ = sweep.tick() => {
                    self.engine.sweep();
                }
                _ = discovery.tick() => {}
            }
            self.engine.publish_discovery_if_due();
        }

        tracing::info!(category = "bridge", "Control loop stopped");
    }

    fn handle(&mut self, request: BridgeRequest) {
        match request {
            BridgeRequest::Execute {
                cmd,
                publish,
                reply,
            } => {
                let envelope = self.engine.execute(&cmd, publish);
                let _ = reply.send(envelope);
            }
            BridgeRequest::Backup { cmd, reply } => {
                let _ = reply.send(self.engine.handle_backup(&cmd));
            }
            BridgeRequest::Status { reply } => {
                let _ = reply.send(self.engine.status());
            }
            BridgeRequest::MqttCommand { payload } => {
                self.engine.execute_mqtt(&payload);
            }
            BridgeRequest::MqttConnected => self.engine.on_mqtt_connected(),
            BridgeRequest::MqttDisconnected => self.engine.on_mqtt_disconnected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stovelink_core::{BridgeConfig, SimulatedStove};

    fn spawn_bridge() -> BridgeHandle {
        let engine = Engine::new(
            BridgeConfig::default(),
            SimulatedStove::new(),
            EventBroadcaster::new(),
            None,
        );
        let (bridge, handle) = Bridge::new(engine);
        tokio::spawn(bridge.run());
        handle
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let handle = spawn_bridge();
        let env = handle.execute("GET SETP", false).await.unwrap();
        assert!(env.is_success());
        assert_eq!(env.info().cmd(), "GET SETP");
    }

    #[tokio::test]
    async fn test_requests_served_in_order() {
        let handle = spawn_bridge();
        handle.execute("SET SETP 25", false).await.unwrap();
        let env = handle.execute("GET SETP", false).await.unwrap();
        assert_eq!(env.data().to_json(), r#"{"SETP":25.00}"#);
    }

    #[tokio::test]
    async fn test_status_and_backup() {
        let handle = spawn_bridge();
        let status = handle.status().await.unwrap();
        assert_eq!(status.haprotocol, "Disabled");

        assert!(handle.backup("GET STAT").await.unwrap().is_none());
        assert!(matches!(
            handle.backup("BKP PARM JSON").await.unwrap(),
            Some(BackupOutcome::File { .. })
        ));
    }

    #[tokio::test]
    async fn test_published_results_reach_events() {
        let handle = spawn_bridge();
        let mut rx = handle.events().subscribe();
        handle.execute("GET SETP", true).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), r#"{"SETP":21.00}"#);
    }
}
