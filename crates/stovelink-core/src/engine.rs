//! The command engine.
//!
//! One [`Engine`] owns the device and every piece of mutable protocol
//! state: the status cache, the sweep publish flag and the MQTT
//! connectivity bookkeeping. Callers serialize access to it; nothing in
//! here locks.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::backup::{
    incorrect_file_type, parse_backup_command, render_backup, BackupFormat, BackupKind,
    BackupOutcome,
};
use crate::cache::StatusCache;
use crate::config::{BridgeConfig, HostInfo};
use crate::device::StoveDevice;
use crate::discovery::{bridge_messages, stove_messages, DiscoverySettings, StoveProfile};
use crate::dispatch::{dispatch, HandlerContext};
use crate::envelope::ResultEnvelope;
use crate::params::parse_command;
use crate::sink::{EventBroadcaster, FanOut, MqttSink};
use crate::topics::{prepare_base_topic, MqttMessage};

/// Read-only commands run by every publish sweep, in order.
pub const PUBLISH_SWEEP: [&str; 8] = [
    "GET STAT", "GET TMPS", "GET FAND", "GET CNTR", "GET TIME", "GET SETP", "GET POWR", "GET DPRS",
];

/// Outcome of one publish sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Commands that ran, the failing one included.
    pub executed: usize,
    /// A command failed and the rest of the sweep was skipped.
    pub aborted: bool,
    /// Every MQTT publish of the sweep succeeded.
    pub publish_ok: bool,
}

impl SweepReport {
    pub fn ok(&self) -> bool {
        !self.aborted && self.publish_ok
    }
}

/// Home automation health, as served on `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub haprotocol: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hamqttstatus: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hamqttlastpublish: Option<&'static str>,
}

pub struct Engine<D: StoveDevice> {
    config: BridgeConfig,
    device: D,
    cache: StatusCache,
    fanout: FanOut,
}

impl<D: StoveDevice> Engine<D> {
    /// `mqtt` is ignored unless the configured protocol is MQTT.
    pub fn new(
        config: BridgeConfig,
        device: D,
        events: EventBroadcaster,
        mqtt: Option<Arc<dyn MqttSink>>,
    ) -> Self {
        let mqtt_config = &config.home_automation.mqtt;
        let base_topic = prepare_base_topic(&mqtt_config.base_topic, &config.host);
        let mqtt = mqtt.filter(|_| config.mqtt_enabled());
        let fanout = FanOut::new(events, mqtt, mqtt_config.payload_strategy, base_topic);

        Self {
            config,
            device,
            cache: StatusCache::new(),
            fanout,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn host(&self) -> &HostInfo {
        &self.config.host
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    pub fn events(&self) -> &EventBroadcaster {
        self.fanout.events()
    }

    /// Run one command.
    pub fn execute(&mut self, cmd: &str, publish: bool) -> ResultEnvelope {
        self.execute_at(cmd, publish, Instant::now())
    }

    /// Run one command with an explicit clock, shared by calls of the same tick.
    pub fn execute_at(&mut self, cmd: &str, publish: bool, now: Instant) -> ResultEnvelope {
        let params = parse_command(cmd);
        let outcome = {
            let mut ctx = HandlerContext {
                params: &params,
                device: &mut self.device,
                host: &self.config.host,
                cache: &mut self.cache,
                now,
            };
            dispatch(cmd, self.config.developer_mode, &mut ctx)
        };

        let category = outcome.category();
        let reachable = outcome.stove_reachable();
        let envelope = outcome.into_envelope(cmd);

        tracing::debug!(
            category = "engine",
            cmd = %cmd,
            success = envelope.is_success(),
            "Command executed"
        );

        self.fanout.deliver(&envelope, category, publish);
        if let Some(reachable) = reachable {
            self.fanout.report_stove_connectivity(reachable);
        }
        envelope
    }

    /// Run a command received on `<base>cmd` and answer on `<base>result`.
    pub fn execute_mqtt(&mut self, payload: &str) -> ResultEnvelope {
        let cmd = payload.replace('+', " ");
        let envelope = self.execute(&cmd, true);

        let answer = MqttMessage::new(self.fanout.result_topic(), envelope.to_json());
        if !self.fanout.publish_messages(&[answer]) {
            tracing::warn!(category = "engine", cmd = %cmd, "Failed to publish MQTT result");
        }
        envelope
    }

    /// Run [`PUBLISH_SWEEP`], stopping at the first failed command.
    pub fn sweep(&mut self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&mut self, now: Instant) -> SweepReport {
        if self.fanout.mqtt_connected() {
            self.publish_status();
        }

        self.fanout.begin_sweep();
        let mut executed = 0;
        let mut aborted = false;
        for cmd in PUBLISH_SWEEP {
            executed += 1;
            if !self.execute_at(cmd, true, now).is_success() {
                aborted = true;
                self.fanout.fail_sweep();
                break;
            }
        }

        let report = SweepReport {
            executed,
            aborted,
            publish_ok: self.fanout.sweep_ok(),
        };
        if report.aborted {
            tracing::warn!(category = "engine", executed, "Publish sweep aborted");
        } else {
            tracing::debug!(category = "engine", publish_ok = report.publish_ok, "Publish sweep done");
        }
        report
    }

    /// Bridge status, retained on the base topic before each sweep.
    fn publish_status(&self) {
        let topic = self.fanout.base_topic().trim_end_matches('/');
        let payload = format!(r#"{{"stovelink":{}}}"#, self.status_json());
        if !self.fanout.publish_messages(&[MqttMessage::retained(topic, payload)]) {
            tracing::debug!(category = "engine", "Failed to publish bridge status");
        }
    }

    pub fn status(&self) -> BridgeStatus {
        if !self.config.mqtt_enabled() {
            return BridgeStatus {
                haprotocol: "Disabled",
                hamqttstatus: None,
                hamqttlastpublish: None,
            };
        }

        let connected = self.fanout.mqtt_connected();
        BridgeStatus {
            haprotocol: "MQTT",
            hamqttstatus: Some(if connected { "Connected" } else { "Disconnected" }),
            hamqttlastpublish: connected
                .then(|| if self.fanout.sweep_ok() { "OK" } else { "Failed" }),
        }
    }

    /// `{"haprotocol":..,"hamqttstatus":..,"hamqttlastpublish":..}`.
    pub fn status_json(&self) -> String {
        serde_json::to_string(&self.status()).unwrap_or_default()
    }

    /// Answer `BKP PARM <fmt>` / `BKP HPAR <fmt>`; `None` for any other command.
    pub fn handle_backup(&mut self, cmd: &str) -> Option<BackupOutcome> {
        let request = parse_backup_command(cmd)?;
        Some(match BackupFormat::parse(&request.format) {
            Some(format) => self.backup(request.kind, format),
            None => BackupOutcome::Envelope(incorrect_file_type(request.kind, &request.format)),
        })
    }

    /// Dump a parameter bank.
    pub fn backup(&mut self, kind: BackupKind, format: BackupFormat) -> BackupOutcome {
        let rendered = match kind {
            BackupKind::Parameters => self
                .device
                .get_all_parameters()
                .map(|values| render_backup(kind, format, &values)),
            BackupKind::HiddenParameters => self
                .device
                .get_all_hidden_parameters()
                .map(|values| render_backup(kind, format, &values)),
        };

        rendered.unwrap_or_else(|e| {
            tracing::warn!(category = "engine", backup = kind.code(), error = %e, "Backup failed");
            BackupOutcome::Envelope(ResultEnvelope::timeout(kind.command()))
        })
    }

    /// The broker session (re)started.
    pub fn on_mqtt_connected(&mut self) {
        self.fanout.mqtt_connected_event();
    }

    pub fn on_mqtt_disconnected(&mut self) {
        self.fanout.mqtt_disconnected_event();
    }

    fn discovery_settings(&self) -> DiscoverySettings {
        let mqtt = &self.config.home_automation.mqtt;
        DiscoverySettings {
            prefix: mqtt.hass_discovery_prefix.clone(),
            base_topic: self.fanout.base_topic().to_string(),
            strategy: self.fanout.strategy(),
        }
    }

    /// Publish discovery when it is enabled and due, then sweep right away.
    /// Returns whether discovery was published.
    pub fn publish_discovery_if_due(&mut self) -> bool {
        let enabled = self.config.home_automation.mqtt.hass_discovery_enabled;
        if !enabled || !self.fanout.discovery_due() || !self.publish_discovery() {
            return false;
        }
        self.fanout.clear_discovery_due();
        self.sweep();
        true
    }

    /// Publish every discovery message. The bridge entity goes out even
    /// when the stove cannot be read.
    pub fn publish_discovery(&mut self) -> bool {
        if !self.fanout.mqtt_connected() {
            return false;
        }
        tracing::info!(category = "engine", "Publishing Home Assistant discovery");

        let settings = self.discovery_settings();
        let mut ok = self
            .fanout
            .publish_messages(&bridge_messages(&settings, &self.config.host));

        let profile = self.device.get_static_data().and_then(|static_data| {
            let status = self.cache.get_or_refresh(Instant::now(), &mut self.device)?;
            Ok(StoveProfile::new(&static_data, &status))
        });
        match profile {
            Ok(profile) => {
                let messages = stove_messages(&settings, &self.config.host, &profile);
                ok &= self.fanout.publish_messages(&messages);
            }
            Err(e) => {
                tracing::warn!(category = "engine", error = %e, "Stove unreachable, discovery incomplete");
                ok = false;
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::simulator::SimulatedStove;

    fn engine() -> Engine<SimulatedStove> {
        Engine::new(
            BridgeConfig::default(),
            SimulatedStove::new(),
            EventBroadcaster::new(),
            None,
        )
    }

    #[test]
    fn test_execute_builds_envelope() {
        let mut engine = engine();
        let env = engine.execute("GET SETP", false);
        assert_eq!(
            env.to_json(),
            r#"{"INFO":{"CMD":"GET SETP","RSP":"OK"},"DATA":{"SETP":21.00},"SUCCESS":true}"#
        );

        let env = engine.execute("GET NOPE", false);
        assert_eq!(env.info().cmd(), "UNKNOWN");
    }

    #[test]
    fn test_device_failure_is_timeout() {
        let mut engine = engine();
        engine.device_mut().set_offline(true);
        let env = engine.execute("SET POWR 3", false);
        assert_eq!(env.info().cmd(), "SET POWR 3");
        assert_eq!(env.info().msg(), Some("Stove communication failed"));
    }

    #[test]
    fn test_status_json_disabled() {
        assert_eq!(engine().status_json(), r#"{"haprotocol":"Disabled"}"#);
    }

    #[test]
    fn test_status_json_mqtt_without_client() {
        let mut config = BridgeConfig::default();
        config.home_automation.protocol = Protocol::Mqtt;
        let engine = Engine::new(config, SimulatedStove::new(), EventBroadcaster::new(), None);
        let status: serde_json::Value = serde_json::from_str(&engine.status_json()).unwrap();
        assert_eq!(status["haprotocol"], "MQTT");
        assert_eq!(status["hamqttstatus"], "Disconnected");
        assert!(status.get("hamqttlastpublish").is_none());
    }

    #[test]
    fn test_sweep_runs_every_command() {
        let mut engine = engine();
        let mut rx = engine.events().subscribe();
        let report = engine.sweep();
        assert_eq!(report.executed, PUBLISH_SWEEP.len());
        assert!(report.ok());
        assert_eq!(engine.device().calls(), PUBLISH_SWEEP.len());

        let mut events = 0;
        while rx.try_recv().is_ok() {
            events += 1;
        }
        assert_eq!(events, PUBLISH_SWEEP.len());
    }

    #[test]
    fn test_backup_commands() {
        let mut engine = engine();
        assert!(engine.handle_backup("GET PARM 1").is_none());

        match engine.handle_backup("BKP PARM CSV") {
            Some(BackupOutcome::File { filename, body, .. }) => {
                assert_eq!(filename, "PARM.csv");
                assert!(body.starts_with("PARM;VALUE\r\n0;0\r\n1;1\r\n"));
                assert_eq!(body.lines().count(), 1 + crate::device::PARAMETER_COUNT);
            }
            other => panic!("unexpected {:?}", other),
        }

        match engine.handle_backup("BKP HPAR XML") {
            Some(BackupOutcome::Envelope(env)) => {
                assert_eq!(env.info().msg(), Some("Incorrect File Type : XML"));
            }
            other => panic!("unexpected {:?}", other),
        }

        engine.device_mut().set_offline(true);
        match engine.handle_backup("BKP HPAR JSON") {
            Some(BackupOutcome::Envelope(env)) => {
                assert_eq!(env.info().cmd(), "BKP HPAR");
                assert_eq!(env.info().msg(), Some("Stove communication failed"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_discovery_needs_connection() {
        let mut engine = engine();
        engine.on_mqtt_connected();
        assert!(!engine.publish_discovery());
        assert!(!engine.publish_discovery_if_due());
    }
}
