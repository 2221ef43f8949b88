//! Bridge configuration.
//!
//! Loaded from TOML (`--config <path>`, then `stovelink.toml`, then
//! defaults), with a few environment overrides applied on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::topics::PayloadStrategy;

/// Default values.
pub mod defaults {
    /// Model name substituted for `$model$` in the base topic.
    pub const MODEL: &str = "StoveLink";
    pub const LABEL: &str = "stovelink";
    pub const CONFIG_FILE: &str = "stovelink.toml";
    pub const UPLOAD_PERIOD_SECS: u64 = 60;
    pub const MQTT_PORT: u16 = 1883;
    pub const BASE_TOPIC: &str = "$model$";
    pub const HASS_DISCOVERY_PREFIX: &str = "homeassistant";
    pub const HTTP_BIND: &str = "0.0.0.0";
    pub const HTTP_PORT: u16 = 80;
    pub const UDP_PORT: u16 = 54549;
}

/// Environment variable names.
pub mod env_vars {
    pub const MQTT_HOST: &str = "STOVELINK_MQTT_HOST";
    pub const HTTP_PORT: &str = "STOVELINK_HTTP_PORT";
    pub const LOG_JSON: &str = "STOVELINK_LOG_JSON";
}

/// Home automation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Disabled,
    Mqtt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub payload_strategy: PayloadStrategy,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub base_topic: String,
    pub hass_discovery_enabled: bool,
    pub hass_discovery_prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            payload_strategy: PayloadStrategy::GenericJson,
            port: defaults::MQTT_PORT,
            username: String::new(),
            password: String::new(),
            base_topic: defaults::BASE_TOPIC.to_string(),
            hass_discovery_enabled: true,
            hass_discovery_prefix: defaults::HASS_DISCOVERY_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAutomationConfig {
    pub protocol: Protocol,
    /// MQTT broker host name.
    pub hostname: String,
    /// Seconds between two publish sweeps.
    pub upload_period: u64,
    pub mqtt: MqttConfig,
}

impl Default for HomeAutomationConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Disabled,
            hostname: String::new(),
            upload_period: defaults::UPLOAD_PERIOD_SECS,
            mqtt: MqttConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: defaults::HTTP_BIND.to_string(),
            port: defaults::HTTP_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: defaults::UDP_PORT,
        }
    }
}

/// Network identity of the bridge, reported by `GET LABL` / `GET STDT`
/// and used in topics and discovery identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostInfo {
    pub label: String,
    pub mac: String,
    pub ip: String,
    pub gateway: String,
    pub netmask: String,
    pub broadcast: String,
    pub dns: String,
    pub ssid: String,
    pub rssi: i32,
    pub channel: u8,
    pub station_mode: bool,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            label: defaults::LABEL.to_string(),
            mac: "00:00:00:00:00:00".to_string(),
            ip: "0.0.0.0".to_string(),
            gateway: "0.0.0.0".to_string(),
            netmask: "0.0.0.0".to_string(),
            broadcast: "0.0.0.0".to_string(),
            dns: "0.0.0.0".to_string(),
            ssid: String::new(),
            rssi: 0,
            channel: 0,
            station_mode: true,
        }
    }
}

impl HostInfo {
    /// MAC address without separators, as used in identifiers.
    pub fn compact_mac(&self) -> String {
        self.mac.replace(':', "")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Enables raw memory writes (`EXT ADWR`).
    pub developer_mode: bool,
    pub home_automation: HomeAutomationConfig,
    pub http: HttpConfig,
    pub udp: UdpConfig,
    pub host: HostInfo,
}

impl BridgeConfig {
    /// Load from an explicit path, else `stovelink.toml` if present, else
    /// defaults; then apply environment overrides and normalize.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = PathBuf::from(defaults::CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.normalize()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(category = "config", path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Apply overrides looked up through `lookup` (the process environment
    /// in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(env_vars::MQTT_HOST).filter(|h| !h.is_empty()) {
            self.home_automation.hostname = host;
            self.home_automation.protocol = Protocol::Mqtt;
        }
        if let Some(port) = lookup(env_vars::HTTP_PORT) {
            self.http.port = port.parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a port: {}", env_vars::HTTP_PORT, port))
            })?;
        }
        Ok(())
    }

    /// Fall back to a disabled protocol when MQTT cannot work, and reject
    /// values nothing can run with.
    pub fn normalize(&mut self) -> Result<(), ConfigError> {
        let ha = &mut self.home_automation;
        if ha.protocol == Protocol::Mqtt
            && (ha.hostname.is_empty() || ha.mqtt.base_topic.is_empty())
        {
            tracing::warn!(
                category = "config",
                "MQTT needs a broker hostname and a base topic; home automation disabled"
            );
            ha.protocol = Protocol::Disabled;
        }
        if ha.upload_period == 0 {
            return Err(ConfigError::Invalid(
                "upload_period must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.home_automation.protocol == Protocol::Mqtt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        let ha = &config.home_automation;
        assert_eq!(ha.protocol, Protocol::Disabled);
        assert_eq!(ha.upload_period, 60);
        assert_eq!(ha.mqtt.payload_strategy, PayloadStrategy::GenericJson);
        assert_eq!(ha.mqtt.port, 1883);
        assert_eq!(ha.mqtt.base_topic, "$model$");
        assert!(ha.mqtt.hass_discovery_enabled);
        assert_eq!(ha.mqtt.hass_discovery_prefix, "homeassistant");
        assert_eq!(config.udp.port, 54549);
        assert!(!config.developer_mode);
    }

    #[test]
    fn test_parse_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            developer_mode = true

            [home_automation]
            protocol = "mqtt"
            hostname = "broker.local"
            upload_period = 30

            [home_automation.mqtt]
            payload_strategy = 2
            base_topic = "stove/$mac$"

            [http]
            port = 8080
            "#,
        )
        .unwrap();

        assert!(config.developer_mode);
        assert!(config.mqtt_enabled());
        assert_eq!(config.home_automation.upload_period, 30);
        assert_eq!(
            config.home_automation.mqtt.payload_strategy,
            PayloadStrategy::GenericCategorized
        );
        assert_eq!(config.home_automation.mqtt.port, 1883);
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.bind, "0.0.0.0");
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result = BridgeConfig::from_toml_str(
            r#"
            [home_automation.mqtt]
            payload_strategy = 7
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_mqtt_without_host_is_disabled() {
        let mut config = BridgeConfig::default();
        config.home_automation.protocol = Protocol::Mqtt;
        config.normalize().unwrap();
        assert_eq!(config.home_automation.protocol, Protocol::Disabled);
    }

    #[test]
    fn test_mqtt_without_base_topic_is_disabled() {
        let mut config = BridgeConfig::default();
        config.home_automation.protocol = Protocol::Mqtt;
        config.home_automation.hostname = "broker".to_string();
        config.home_automation.mqtt.base_topic.clear();
        config.normalize().unwrap();
        assert!(!config.mqtt_enabled());
    }

    #[test]
    fn test_zero_upload_period_rejected() {
        let mut config = BridgeConfig::default();
        config.home_automation.upload_period = 0;
        assert!(matches!(config.normalize(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BridgeConfig::default();
        config
            .apply_env_overrides(|name| match name {
                env_vars::MQTT_HOST => Some("10.0.0.2".to_string()),
                env_vars::HTTP_PORT => Some("8081".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.home_automation.hostname, "10.0.0.2");
        assert!(config.mqtt_enabled());
        assert_eq!(config.http.port, 8081);
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = BridgeConfig::default();
        let result = config.apply_env_overrides(|name| {
            (name == env_vars::HTTP_PORT).then(|| "eighty".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = BridgeConfig::load(Some(Path::new("/nonexistent/stovelink.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_toml_roundtrip_keeps_strategy_numeric() {
        let text = BridgeConfig::default().to_toml_string().unwrap();
        assert!(text.contains("payload_strategy = 1"));
    }

    #[test]
    fn test_compact_mac() {
        let host = HostInfo {
            mac: "AA:BB:CC:00:11:22".to_string(),
            ..HostInfo::default()
        };
        assert_eq!(host.compact_mac(), "AABBCC001122");
    }
}
