//! Stove device facade.
//!
//! The link layer (serial line, frame encoding, retries) belongs to an
//! external driver. The engine only sees [`StoveDevice`]: one method per
//! physical operation, returning a typed report or a [`DeviceError`].
//! Fields that only some boards provide are `Option`.

use crate::error::DeviceResult;

/// Number of parameters returned by a full parameter dump.
pub const PARAMETER_COUNT: usize = 0x6A;

/// Number of hidden parameters returned by a full hidden parameter dump.
pub const HIDDEN_PARAMETER_COUNT: usize = 0x6F;

/// `STATUS` / `LSTATUS` / `FSTATUS` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusReport {
    pub status: u16,
    pub lstatus: u16,
    pub fstatus: u16,
}

/// The five temperature probes `T1..T5`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Temperatures {
    pub probes: [f32; 5],
}

/// Full status block (`GET ALLS`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllStatus {
    pub mbtype: i32,
    pub model: u16,
    pub version: u16,
    pub core: u16,
    pub fw_date: String,
    pub appliance_timestamp: String,
    pub appliance_weekday: u16,
    pub chrono_status: u8,
    pub status: u16,
    pub lstatus: u16,
    pub mf_status: Option<u16>,
    pub setpoint: f32,
    pub pump: u8,
    pub pellet_qty: u16,
    pub f1v: u16,
    pub f1rpm: u16,
    pub f2l: u16,
    pub f2lf: u16,
    pub fan_limits: [u16; 6],
    pub f2v: u16,
    pub f3l_f4l: Option<(u16, u16)>,
    pub power: u8,
    pub feeder: f32,
    pub dp_target: u16,
    pub dp_press: u16,
    pub inputs: u8,
    pub outputs: u8,
    pub temperatures: Temperatures,
    pub serial_number: Option<String>,
}

/// One chrono program slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChronoProgram {
    pub setpoint: f32,
    pub start: (u8, u8),
    pub stop: (u8, u8),
}

/// Chrono thermostat configuration (`GET CHRD`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChronoData {
    pub chrono_status: u8,
    pub programs: [ChronoProgram; 6],
    /// Program number per day and memory slot, `0` meaning off.
    pub days: [[u8; 3]; 7],
}

/// Usage counters; times are `(hours, minutes)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub ignitions: u16,
    pub power_time: (u16, u16),
    pub heat_time: (u16, u16),
    pub service_time: (u16, u16),
    pub on_time: (u16, u16),
    pub overtemp_errors: u16,
    pub ignition_errors: u16,
    pub pellet_qty: u16,
}

/// Differential pressure (`GET DPRS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DPressure {
    pub target: u16,
    pub press: u16,
}

/// Fan block (`GET FAND`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FanData {
    pub f1v: u16,
    pub f2v: u16,
    pub f1rpm: u16,
    pub f2l: u16,
    pub f2lf: u16,
    pub f3s_f4s: Option<(f32, f32)>,
    pub f3l_f4l: Option<(u16, u16)>,
}

/// Digital inputs and outputs (`GET IOPT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoState {
    pub inputs: [u8; 4],
    pub outputs: [u8; 7],
}

/// Board model and firmware (`GET MDVE`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelVersion {
    pub model: u16,
    pub version: u16,
    pub core: u16,
    pub fw_date: String,
}

/// Static configuration of the stove (`GET STDT`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StaticData {
    pub serial_number: String,
    pub sn_check: u8,
    pub mbtype: i32,
    pub model: u16,
    pub version: u16,
    pub core: u16,
    pub fw_date: String,
    pub fluid: u16,
    pub setpoint_min: u16,
    pub setpoint_max: u16,
    pub ui_config: u8,
    pub hw_type: u8,
    pub display_type: u8,
    pub display_fw_version: u8,
    pub config: u8,
    pub pellet_type: u8,
    pub psens_type: u16,
    pub psens_lmax: u8,
    pub psens_ltsh: u8,
    pub psens_lmin: u8,
    pub main_probe: u8,
    pub stove_type: u8,
    pub fan2_type: u8,
    pub fan2_mode: u8,
    pub ble_mb_mode: u8,
    pub ble_dsp_mode: u8,
    pub chrono_type: u8,
    pub autonomy_type: u8,
    pub nominal_power: u8,
}

/// Stove clock, `datetime` formatted `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoveDateTime {
    pub datetime: String,
    pub weekday: u8,
}

/// Power level and feeder rate (`GET POWR`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerReport {
    pub power: u8,
    pub feeder: f32,
}

/// Answer to a room fan change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoomFanReport {
    pub power: Option<u8>,
    pub f2l: u16,
    pub f2lf: u16,
}

/// Answer to a power change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerChange {
    pub power: u8,
    pub f2l: Option<u16>,
    pub fan_limits: [u16; 6],
}

/// Answer to a silent mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SilentReport {
    pub silent: u8,
    pub power: u8,
    pub f2l: u16,
    pub f2lf: u16,
    pub f3l_f4l: Option<(u16, u16)>,
}

/// One method per physical stove operation.
///
/// Calls are synchronous and bounded by the driver's own timeout.
pub trait StoveDevice: Send {
    fn switch_off(&mut self) -> DeviceResult<StatusReport>;
    fn switch_on(&mut self) -> DeviceResult<StatusReport>;

    fn get_all_status(&mut self) -> DeviceResult<AllStatus>;
    fn get_chrono_data(&mut self) -> DeviceResult<ChronoData>;
    fn get_counters(&mut self) -> DeviceResult<Counters>;
    fn get_dpressure(&mut self) -> DeviceResult<DPressure>;
    fn get_fan_data(&mut self) -> DeviceResult<FanData>;
    fn get_hidden_parameter(&mut self, index: u16) -> DeviceResult<u16>;
    fn get_io(&mut self) -> DeviceResult<IoState>;
    fn get_model_version(&mut self) -> DeviceResult<ModelVersion>;
    fn get_parameter(&mut self, index: u16) -> DeviceResult<u8>;
    fn get_setpoint(&mut self) -> DeviceResult<f32>;
    fn get_status(&mut self) -> DeviceResult<StatusReport>;
    fn get_static_data(&mut self) -> DeviceResult<StaticData>;
    fn get_date_time(&mut self) -> DeviceResult<StoveDateTime>;
    fn get_temperatures(&mut self) -> DeviceResult<Temperatures>;
    fn get_power(&mut self) -> DeviceResult<PowerReport>;
    fn get_serial_number(&mut self) -> DeviceResult<String>;
    fn get_all_parameters(&mut self) -> DeviceResult<Vec<u8>>;
    fn get_all_hidden_parameters(&mut self) -> DeviceResult<Vec<u16>>;

    fn set_chrono_day(&mut self, day: u8, memory: u8, program: u8) -> DeviceResult<()>;
    #[allow(clippy::too_many_arguments)]
    fn set_chrono_program(
        &mut self,
        program: u8,
        setpoint: u8,
        start_hour: u8,
        start_minute: u8,
        stop_hour: u8,
        stop_minute: u8,
    ) -> DeviceResult<()>;
    fn set_chrono_setpoint(&mut self, program: u8, setpoint: u8) -> DeviceResult<()>;
    fn set_chrono_start_hour(&mut self, program: u8, hour: u8) -> DeviceResult<()>;
    fn set_chrono_start_minute(&mut self, program: u8, minute: u8) -> DeviceResult<()>;
    fn set_chrono_stop_hour(&mut self, program: u8, hour: u8) -> DeviceResult<()>;
    fn set_chrono_stop_minute(&mut self, program: u8, minute: u8) -> DeviceResult<()>;
    fn set_chrono_status(&mut self, enabled: u8) -> DeviceResult<u8>;

    fn room_fan_down(&mut self) -> DeviceResult<RoomFanReport>;
    fn room_fan_up(&mut self) -> DeviceResult<RoomFanReport>;
    fn set_room_fan(&mut self, level: u8) -> DeviceResult<RoomFanReport>;
    fn set_room_fan3(&mut self, level: u8) -> DeviceResult<u16>;
    fn set_room_fan4(&mut self, level: u8) -> DeviceResult<u16>;
    fn set_silent_mode(&mut self, mode: u8) -> DeviceResult<SilentReport>;

    fn set_hidden_parameter(&mut self, index: u16, value: u16) -> DeviceResult<()>;
    fn set_parameter(&mut self, index: u16, value: u8) -> DeviceResult<()>;

    fn set_power(&mut self, power: u8) -> DeviceResult<PowerChange>;
    fn power_down(&mut self) -> DeviceResult<PowerChange>;
    fn power_up(&mut self) -> DeviceResult<PowerChange>;

    fn set_setpoint(&mut self, setpoint: f32) -> DeviceResult<f32>;
    fn setpoint_down(&mut self) -> DeviceResult<f32>;
    fn setpoint_up(&mut self) -> DeviceResult<f32>;

    #[allow(clippy::too_many_arguments)]
    fn set_date_time(
        &mut self,
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> DeviceResult<StoveDateTime>;

    fn read_data(&mut self, address: u16, length: u16) -> DeviceResult<u16>;
    fn write_data(&mut self, address: u16, length: u16, value: u16) -> DeviceResult<()>;
}
