//! Command engine of the StoveLink pellet stove bridge.
//!
//! Text commands (`GET STAT`, `SET POWR 3`, ...) are tokenized, dispatched
//! to the stove through [`StoveDevice`], answered with a [`ResultEnvelope`]
//! and, when requested, fanned out to the event stream and MQTT.

pub mod backup;
pub mod cache;
pub mod category;
pub mod config;
pub mod data;
pub mod device;
pub mod discovery;
pub mod dispatch;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod params;
pub mod simulator;
pub mod sink;
pub mod topics;

pub use backup::{BackupFormat, BackupKind, BackupOutcome};
pub use category::Category;
pub use config::{BridgeConfig, HostInfo, Protocol};
pub use data::{DataMap, DataValue};
pub use device::StoveDevice;
pub use engine::{BridgeStatus, Engine, SweepReport, PUBLISH_SWEEP};
pub use envelope::{CommandOutcome, ResultEnvelope, Rsp};
pub use error::{CommandError, ConfigError, DeviceError, DeviceResult, PublishError};
pub use simulator::SimulatedStove;
pub use sink::{EventBroadcaster, FanOut, MqttSink};
pub use topics::{MqttMessage, PayloadStrategy};
