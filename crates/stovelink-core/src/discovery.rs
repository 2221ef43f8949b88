//! Home Assistant MQTT discovery payloads.
//!
//! Every entity is published retained on
//! `<prefix>/<component>/<unique_id>/config`. State topics are written
//! relative to `~`, the base topic without its trailing `/`, and follow the
//! configured payload strategy through [`crate::topics`].

use serde_json::{json, Map, Value};

use crate::config::{defaults, HostInfo};
use crate::device::{AllStatus, StaticData};
use crate::topics::{int_expr, state_topic, value_template, MqttMessage, PayloadStrategy};

pub const MANUFACTURER: &str = "StoveLink";

const CONNECTED_TOPIC: &str = "~/connected";
const COMMAND_TOPIC: &str = "~/cmd";
const CELSIUS: &str = "°C";

/// `STATUS` codes and their display text.
const STATUS_TEXTS: &[(&[u16], &str)] = &[
    (&[0], "Off"),
    (&[1], "Off Timer"),
    (&[2], "Test Fire"),
    (&[3, 4, 5], "Ignition"),
    (&[6], "Burning"),
    (&[9], "Cool"),
    (&[10], "Fire Stop"),
    (&[11], "Clean Fire"),
    (&[12], "Cool"),
    (&[239], "MFDoor Alarm"),
    (&[240], "Fire Error"),
    (&[241], "Chimney Alarm"),
    (&[243], "Grate Error"),
    (&[244], "NTC2 Alarm"),
    (&[245], "NTC3 Alarm"),
    (&[247], "Door Alarm"),
    (&[248], "Pressure Alarm"),
    (&[249], "NTC1 Alarm"),
    (&[250], "TC1 Alarm"),
    (&[252], "Gas Alarm"),
    (&[253], "No Pellet Alarm"),
];

/// Where and how discovery is published.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub prefix: String,
    /// Base topic ending with `/`.
    pub base_topic: String,
    pub strategy: PayloadStrategy,
}

impl DiscoverySettings {
    fn tilde(&self) -> &str {
        self.base_topic.strip_suffix('/').unwrap_or(&self.base_topic)
    }

    fn config_topic(&self, component: &str, unique_id: &str) -> String {
        format!("{}/{}/{}/config", self.prefix, component, unique_id)
    }
}

/// What the stove reports about itself, reduced to what discovery needs.
#[derive(Debug, Clone, PartialEq)]
pub struct StoveProfile {
    pub serial_number: String,
    pub model: u16,
    pub version: u16,
    pub fw_date: String,
    pub setpoint_min: u16,
    pub setpoint_max: u16,
    pub ui_config: u8,
    pub main_probe: u8,
    pub stove_type: u8,
    pub fan2_type: u8,
    pub fan2_mode: u8,
    pub setpoint: f32,
    pub fan_limits: [u16; 6],
}

impl StoveProfile {
    pub fn new(static_data: &StaticData, status: &AllStatus) -> Self {
        Self {
            serial_number: static_data.serial_number.clone(),
            model: static_data.model,
            version: static_data.version,
            fw_date: static_data.fw_date.clone(),
            setpoint_min: static_data.setpoint_min,
            setpoint_max: static_data.setpoint_max,
            ui_config: static_data.ui_config,
            main_probe: static_data.main_probe,
            stove_type: static_data.stove_type,
            fan2_type: static_data.fan2_type,
            fan2_mode: static_data.fan2_mode,
            setpoint: status.setpoint,
            fan_limits: status.fan_limits,
        }
    }

    pub fn has_setpoint(&self) -> bool {
        self.setpoint != 0.0
    }

    pub fn has_power(&self) -> bool {
        self.stove_type != 8
    }

    pub fn has_on_off(&self) -> bool {
        !matches!(self.stove_type, 7 | 8)
    }

    pub fn has_room_fan(&self) -> bool {
        self.fan2_type > 1
    }

    // Fan 3 and fan 4 thresholds are swapped on the board.
    pub fn has_fan3(&self) -> bool {
        self.fan2_type > 3
    }

    pub fn has_fan4(&self) -> bool {
        self.fan2_type > 2
    }

    pub fn is_air(&self) -> bool {
        matches!(self.stove_type, 1 | 3 | 5 | 7 | 8)
    }

    pub fn is_hydro(&self) -> bool {
        matches!(self.stove_type, 2 | 4 | 6)
    }

    pub fn has_fan_auto(&self) -> bool {
        matches!(self.fan2_mode, 2 | 3)
    }

    /// A fan limited to 0..1 is a switch, anything else a number.
    fn fan_is_switch(&self, fan: usize) -> bool {
        let i = (fan - 3) * 2 + 2;
        self.fan_limits[i] == 0 && self.fan_limits[i + 1] == 1
    }

    /// Zero-based probe regulated by the thermostat.
    fn thermostat_probe(&self) -> u8 {
        if self.is_hydro() && matches!(self.ui_config, 1 | 3 | 4) {
            0
        } else {
            self.main_probe
        }
    }

    /// Zero-based probe and name of the main temperature sensor.
    fn main_sensor(&self) -> (u8, &'static str) {
        if !self.is_hydro() {
            return (self.main_probe, "Room");
        }
        match self.ui_config {
            1 => (1, "Return Water"),
            3 | 4 => (self.main_probe, "Tank Water"),
            10 => (4, "Room"),
            _ => (self.main_probe, "Room"),
        }
    }

    fn unique_id_prefix(&self) -> String {
        format!("{}_{}", defaults::MODEL, self.serial_number)
    }
}

/// One entity config under construction.
struct Entity {
    component: &'static str,
    unique_id: String,
    config: Map<String, Value>,
}

impl Entity {
    fn new(settings: &DiscoverySettings, component: &'static str, unique_id: String) -> Self {
        let mut config = Map::new();
        config.insert("~".to_string(), Value::from(settings.tilde()));
        config.insert("unique_id".to_string(), Value::from(unique_id.clone()));
        Self {
            component,
            unique_id,
            config,
        }
    }

    fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    fn set_opt(self, key: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// `state_topic` plus, for JSON payloads, the matching `value_template`.
    fn state(self, field: &str, strategy: PayloadStrategy) -> Self {
        self.set("state_topic", topic_of(field, strategy))
            .set_opt("value_template", value_template(field, strategy))
    }

    fn into_message(self, settings: &DiscoverySettings) -> MqttMessage {
        MqttMessage::retained(
            settings.config_topic(self.component, &self.unique_id),
            Value::Object(self.config).to_string(),
        )
    }
}

fn topic_of(field: &str, strategy: PayloadStrategy) -> String {
    state_topic(field, strategy).unwrap_or_else(|| format!("~/{}", field))
}

fn bridge_unique_id_prefix(host: &HostInfo) -> String {
    format!("{}_{}", defaults::MODEL, host.compact_mac())
}

fn availability() -> Value {
    json!({
        "topic": CONNECTED_TOPIC,
        "value_template": "{{ iif(int(value) > 0, 'online', 'offline') }}",
    })
}

fn status_text_template(strategy: PayloadStrategy) -> String {
    let list = STATUS_TEXTS
        .iter()
        .map(|(codes, text)| {
            let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
            format!("([{}],'{}')", codes.join(","), text)
        })
        .collect::<Vec<_>>()
        .join(",");
    let raw = match strategy {
        PayloadStrategy::GenericJson => "value_json.STATUS",
        _ => "value",
    };
    format!(
        "{{% set ns = namespace(found=false) %}}{{% set statusList=[{list}] %}}\
         {{% for num,text in statusList %}}{{% if {int} in num %}}{{{{ text }}}}\
         {{% set ns.found = true %}}{{% break %}}{{% endif %}}{{% endfor %}}\
         {{% if not ns.found %}}Unknown STATUS code {{{{ {raw} }}}}{{% endif %}}",
        list = list,
        int = int_expr("STATUS", strategy),
        raw = raw,
    )
}

fn pressure_template(field: &str, strategy: PayloadStrategy) -> String {
    let v = int_expr(field, strategy);
    format!("{{{{ iif({v} > 0x7FFF, {v} - 0x10000, {v}) * 1000 / 60 }}}}", v = v)
}

/// Discovery of the bridge itself.
pub fn bridge_messages(settings: &DiscoverySettings, host: &HostInfo) -> Vec<MqttMessage> {
    let prefix = bridge_unique_id_prefix(host);
    let device = json!({
        "configuration_url": format!("http://{}.local", host.label),
        "identifiers": [prefix],
        "manufacturer": MANUFACTURER,
        "model": defaults::MODEL,
        "name": host.label,
        "sw_version": env!("CARGO_PKG_VERSION"),
    });

    let connectivity = Entity::new(settings, "binary_sensor", format!("{}_Connectivity", prefix))
        .set("device_class", "connectivity")
        .set("device", device)
        .set("entity_category", "diagnostic")
        .set("object_id", format!("{}_connectivity", defaults::MODEL))
        .set("state_topic", CONNECTED_TOPIC)
        .set("value_template", "{{ iif(int(value) > 0, 'ON', 'OFF') }}");

    vec![connectivity.into_message(settings)]
}

/// Discovery of the stove and its entities.
pub fn stove_messages(
    settings: &DiscoverySettings,
    host: &HostInfo,
    stove: &StoveProfile,
) -> Vec<MqttMessage> {
    let s = settings.strategy;
    let prefix = stove.unique_id_prefix();
    let device = json!({
        "configuration_url": format!("http://{}.local", host.label),
        "identifiers": [prefix],
        "model": stove.model.to_string(),
        "name": "Stove",
        "sw_version": format!("{} ({})", stove.version, stove.fw_date),
        "via_device": bridge_unique_id_prefix(host),
    });

    // Entities of the stove device share availability and device blocks.
    let entity = |component: &'static str, suffix: &str| {
        Entity::new(settings, component, format!("{}_{}", prefix, suffix))
            .set("availability", availability())
            .set("device", device.clone())
    };

    let mut entities = Vec::new();

    entities.push(
        Entity::new(settings, "binary_sensor", format!("{}_Connectivity", prefix))
            .set("device_class", "connectivity")
            .set("device", device.clone())
            .set("entity_category", "diagnostic")
            .set("object_id", "stove_connectivity")
            .set("state_topic", CONNECTED_TOPIC)
            .set("value_template", "{{ iif(int(value) > 1, 'ON', 'OFF') }}"),
    );

    entities.push(
        entity("sensor", "STATUS")
            .set("entity_category", "diagnostic")
            .set("name", "Status")
            .set("object_id", "stove_status")
            .state("STATUS", s),
    );

    entities.push(
        entity("sensor", "STATUS_Text")
            .set("device_class", "enum")
            .set("name", "Status")
            .set("object_id", "stove_status_text")
            .set("state_topic", topic_of("STATUS", s))
            .set("value_template", status_text_template(s)),
    );

    entities.push(thermostat(entity("climate", "Thermostat"), stove, s));

    if stove.is_hydro() {
        entities.push(
            entity("sensor", "SupplyWaterTemp")
                .set("device_class", "temperature")
                .set("name", "Supply Water Temperature")
                .set("object_id", "stove_supplywatertemp")
                .set("suggested_display_precision", 1)
                .set("state_class", "measurement")
                .set("unit_of_measurement", CELSIUS)
                .state("T1", s),
        );
    }

    let (probe, name) = stove.main_sensor();
    let compact = name.replace(' ', "");
    entities.push(
        entity("sensor", &format!("{}_Temp", compact))
            .set("device_class", "temperature")
            .set("name", format!("{} Temperature", name))
            .set("object_id", format!("stove_{}temp", compact.to_lowercase()))
            .set("suggested_display_precision", 1)
            .set("state_class", "measurement")
            .set("unit_of_measurement", CELSIUS)
            .state(&format!("T{}", probe + 1), s),
    );

    entities.push(
        entity("sensor", "FlueGasTemp")
            .set("device_class", "temperature")
            .set("enabled_by_default", false)
            .set("name", "Flue Gas Temperature")
            .set("object_id", "stove_fluegastemp")
            .set("suggested_display_precision", 1)
            .set("state_class", "measurement")
            .set("unit_of_measurement", CELSIUS)
            .state("T3", s),
    );

    entities.push(
        entity("sensor", "PQT")
            .set("device_class", "weight")
            .set("icon", "mdi:chart-bell-curve-cumulative")
            .set("name", "Pellet Consumed")
            .set("object_id", "stove_pqt")
            .set("state_class", "total_increasing")
            .set("unit_of_measurement", "kg")
            .state("PQT", s),
    );

    entities.push(
        entity("sensor", "ServiceTimeCounter")
            .set("device_class", "duration")
            .set("icon", "mdi:account-wrench-outline")
            .set("name", "Service Time Counter")
            .set("object_id", "stove_servicetimecounter")
            .set("state_class", "total_increasing")
            .set("unit_of_measurement", "h")
            .state("SERVICETIME", s),
    );

    entities.push(
        entity("sensor", "Feeder")
            .set("enabled_by_default", false)
            .set("entity_category", "diagnostic")
            .set("name", "Feeder")
            .set("object_id", "stove_feeder")
            .state("FDR", s),
    );

    for (field, suffix, name) in [
        ("DP_TARGET", "TargetDifferentialPressure", "Target Differential Pressure"),
        ("DP_PRESS", "DifferentialPressure", "Differential Pressure"),
    ] {
        entities.push(
            entity("sensor", suffix)
                .set("device_class", "pressure")
                .set("enabled_by_default", false)
                .set("entity_category", "diagnostic")
                .set("name", name)
                .set("object_id", format!("stove_{}", suffix.to_lowercase()))
                .set("state_class", "measurement")
                .set("state_topic", topic_of(field, s))
                .set("unit_of_measurement", "mPa")
                .set("value_template", pressure_template(field, s)),
        );
    }

    if stove.has_on_off() {
        let status = int_expr("STATUS", s);
        entities.push(
            entity("switch", "ON_OFF")
                .set("command_topic", COMMAND_TOPIC)
                .set("icon", "mdi:power")
                .set("name", "On/Off")
                .set("object_id", "stove_on_off")
                .set("payload_off", "CMD+OFF")
                .set("payload_on", "CMD+ON")
                .set("state_off", "OFF")
                .set("state_on", "ON")
                .set("state_topic", topic_of("STATUS", s))
                .set(
                    "value_template",
                    format!(
                        "{{{{ iif({v} > 1 and {v} != 10, 'ON', 'OFF') }}}}",
                        v = status
                    ),
                ),
        );
    }

    if stove.has_setpoint() {
        entities.push(
            entity("number", "SETP")
                .set("command_template", "SET+SETP+{{ value }}")
                .set("command_topic", COMMAND_TOPIC)
                .set("device_class", "temperature")
                .set("min", stove.setpoint_min)
                .set("max", stove.setpoint_max)
                .set("mode", "slider")
                .set("name", "SetPoint")
                .set("object_id", "stove_setp")
                .set("unit_of_measurement", CELSIUS)
                .state("SETP", s),
        );
    }

    if stove.has_power() {
        entities.push(
            entity("number", "PWR")
                .set("command_template", "SET+POWR+{{ value }}")
                .set("command_topic", COMMAND_TOPIC)
                .set("icon", "mdi:signal")
                .set("min", 1)
                .set("max", 5)
                .set("mode", "slider")
                .set("name", "Power")
                .set("object_id", "stove_pwr")
                .state("PWR", s),
        );
    }

    if stove.has_room_fan() {
        // The level entity is unavailable while the fan runs in auto mode.
        let manual = json!({
            "topic": topic_of("F2L", s),
            "value_template": format!(
                "{{{{ iif({} < 7, 'online', 'offline') }}}}",
                int_expr("F2L", s)
            ),
        });
        entities.push(
            entity("number", "RFAN")
                .set("availability", json!([availability(), manual]))
                .set("availability_mode", "all")
                .set("command_template", "SET+RFAN+{{ value }}")
                .set("command_topic", COMMAND_TOPIC)
                .set("icon", "mdi:fan")
                .set("min", 0)
                .set("max", 6)
                .set("name", "Room Fan")
                .set("object_id", "stove_rfan")
                .set("payload_reset", "7")
                .state("F2L", s),
        );
    }

    if stove.is_air() && stove.has_fan_auto() {
        entities.push(
            entity("switch", "RFAN_Auto")
                .set("command_topic", COMMAND_TOPIC)
                .set("icon", "mdi:fan-auto")
                .set("name", "Room Fan Auto")
                .set("object_id", "stove_rfan_auto")
                .set("payload_off", "SET+RFAN+3")
                .set("payload_on", "SET+RFAN+7")
                .set("state_off", "OFF")
                .set("state_on", "ON")
                .set("state_topic", topic_of("F2L", s))
                .set(
                    "value_template",
                    format!("{{{{ iif({} == 7, 'ON', 'OFF') }}}}", int_expr("F2L", s)),
                ),
        );
    }

    for (fan, present, name, icon) in [
        (3usize, stove.has_fan3(), "Left Fan", "mdi:fan-speed-2"),
        (4usize, stove.has_fan4(), "Right Fan", "mdi:fan-speed-3"),
    ] {
        if !present {
            continue;
        }
        let limits = &stove.fan_limits[(fan - 3) * 2 + 2..(fan - 3) * 2 + 4];
        let is_switch = stove.fan_is_switch(fan);
        let base = entity(if is_switch { "switch" } else { "number" }, &format!("FAN{}", fan))
            .set("command_topic", COMMAND_TOPIC)
            .set("icon", icon)
            .set("name", name)
            .set("object_id", format!("stove_fan{}", fan))
            .state(&format!("F{}L", fan), s);
        let full = if is_switch {
            base.set("payload_off", format!("SET+FN{}L+0", fan))
                .set("payload_on", format!("SET+FN{}L+1", fan))
                .set("state_off", "0")
                .set("state_on", "1")
        } else {
            base.set("command_template", format!("SET+FN{}L+{{{{ value }}}}", fan))
                .set("min", limits[0])
                .set("max", limits[1])
                .set("mode", "slider")
        };
        entities.push(full);
    }

    entities
        .into_iter()
        .map(|e| e.into_message(settings))
        .collect()
}

fn thermostat(base: Entity, stove: &StoveProfile, s: PayloadStrategy) -> Entity {
    let status = int_expr("STATUS", s);
    let probe_field = format!("T{}", stove.thermostat_probe() + 1);

    let mut e = base
        .set(
            "action_template",
            format!(
                "{{% set intSTATUS = {} %}}{{{{ iif((1 < intSTATUS < 9) or intSTATUS == 11, 'heating', iif(intSTATUS > 0, 'idle', 'off')) }}}}",
                status
            ),
        )
        .set("action_topic", topic_of("STATUS", s))
        .set_opt("current_temperature_template", value_template(&probe_field, s))
        .set("current_temperature_topic", topic_of(&probe_field, s));

    if stove.has_room_fan() {
        let mut modes = vec!["off", "1", "2", "3", "4", "5", "high"];
        if stove.is_air() && stove.has_fan_auto() {
            modes.push("auto");
        }
        e = e
            .set(
                "fan_mode_command_template",
                "SET+RFAN+{{ {'off':0,'1':1,'2':2,'3':3,'4':4,'5':5,'high':6,'auto':7}[value] }}",
            )
            .set("fan_mode_command_topic", COMMAND_TOPIC)
            .set(
                "fan_mode_state_template",
                format!(
                    "{{{{ ['off',1,2,3,4,5,'high','auto'][{}] }}}}",
                    int_expr("F2L", s)
                ),
            )
            .set("fan_mode_state_topic", topic_of("F2L", s))
            .set("fan_modes", modes);
    }

    e.set("max_temp", stove.setpoint_max)
        .set("min_temp", stove.setpoint_min)
        .set("mode_command_template", "CMD+{{ iif(value == 'off', 'OFF', 'ON') }}")
        .set("mode_command_topic", COMMAND_TOPIC)
        .set(
            "mode_state_template",
            format!("{{{{ iif({} > 0, 'heat', 'off') }}}}", status),
        )
        .set("mode_state_topic", topic_of("STATUS", s))
        .set("modes", vec!["off", "heat"])
        .set("name", "Thermostat")
        .set("object_id", "stove_thermostat")
        .set("optimistic", false)
        .set("payload_off", "CMD+OFF")
        .set("payload_on", "CMD+ON")
        .set("power_command_topic", COMMAND_TOPIC)
        .set("temperature_command_template", "SET+SETP+{{ value|int }}")
        .set("temperature_command_topic", COMMAND_TOPIC)
        .set_opt("temperature_state_template", value_template("SETP", s))
        .set("temperature_state_topic", topic_of("SETP", s))
        .set("temperature_unit", "C")
}
