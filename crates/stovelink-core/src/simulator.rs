//! In-memory stove used by the `exec` and `serve` commands and by tests.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::device::*;
use crate::error::{DeviceError, DeviceResult};

const SETPOINT_MIN: u16 = 13;
const SETPOINT_MAX: u16 = 40;
const POWER_MIN: u8 = 1;
const POWER_MAX: u8 = 5;
const ROOM_FAN_AUTO: u16 = 7;

/// A stove that keeps its state in memory.
///
/// `set_offline(true)` makes every call fail; `set_fail_after(Some(n))`
/// lets the first `n` calls succeed and fails the rest.
#[derive(Debug, Clone)]
pub struct SimulatedStove {
    status: u16,
    setpoint: f32,
    power: u8,
    room_fan: u16,
    fan3: u16,
    fan4: u16,
    silent: u8,
    fan_limits: [u16; 6],
    temperatures: [f32; 5],
    chrono_status: u8,
    programs: [ChronoProgram; 6],
    days: [[u8; 3]; 7],
    parameters: Vec<u8>,
    hidden_parameters: Vec<u16>,
    memory: HashMap<u16, u16>,
    clock: NaiveDateTime,
    counters: Counters,
    static_data: StaticData,
    offline: bool,
    fail_after: Option<usize>,
    calls: usize,
}

impl Default for SimulatedStove {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedStove {
    pub fn new() -> Self {
        let clock = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap_or_default();

        Self {
            status: 0,
            setpoint: 21.0,
            power: 3,
            room_fan: 3,
            fan3: 0,
            fan4: 0,
            silent: 0,
            fan_limits: [0, 5, 0, 1, 0, 1],
            temperatures: [20.5, 19.0, 45.0, 0.0, 0.0],
            chrono_status: 0,
            programs: [ChronoProgram::default(); 6],
            days: [[0; 3]; 7],
            parameters: (0..PARAMETER_COUNT).map(|i| (i % 256) as u8).collect(),
            hidden_parameters: vec![0; HIDDEN_PARAMETER_COUNT],
            memory: HashMap::new(),
            clock,
            counters: Counters {
                ignitions: 42,
                power_time: (812, 5),
                heat_time: (790, 40),
                service_time: (120, 7),
                on_time: (1020, 0),
                overtemp_errors: 0,
                ignition_errors: 1,
                pellet_qty: 1530,
            },
            static_data: StaticData {
                serial_number: "LT201629480000000000000000".to_string(),
                sn_check: 1,
                mbtype: 0,
                model: 5,
                version: 57,
                core: 1,
                fw_date: "2021-09-21".to_string(),
                fluid: 0,
                setpoint_min: SETPOINT_MIN,
                setpoint_max: SETPOINT_MAX,
                ui_config: 1,
                hw_type: 2,
                display_type: 5,
                display_fw_version: 0,
                config: 1,
                pellet_type: 1,
                psens_type: 0,
                psens_lmax: 0,
                psens_ltsh: 0,
                psens_lmin: 0,
                main_probe: 1,
                stove_type: 1,
                fan2_type: 4,
                fan2_mode: 3,
                ble_mb_mode: 0,
                ble_dsp_mode: 0,
                chrono_type: 4,
                autonomy_type: 2,
                nominal_power: 8,
            },
            offline: false,
            fail_after: None,
            calls: 0,
        }
    }

    /// Make every following call fail (or succeed again).
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Fail every call after the first `calls` ones, counted from now.
    pub fn set_fail_after(&mut self, calls: Option<usize>) {
        self.fail_after = calls.map(|n| self.calls + n);
    }

    /// Number of device calls served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn static_data_mut(&mut self) -> &mut StaticData {
        &mut self.static_data
    }

    pub fn set_temperatures(&mut self, probes: [f32; 5]) {
        self.temperatures = probes;
    }

    fn call(&mut self) -> DeviceResult<()> {
        self.calls += 1;
        if self.offline {
            return Err(DeviceError::Communication("no answer from stove".to_string()));
        }
        match self.fail_after {
            Some(limit) if self.calls > limit => {
                Err(DeviceError::Communication("stove stopped answering".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn status_report(&self) -> StatusReport {
        StatusReport {
            status: self.status,
            lstatus: self.status,
            fstatus: 0,
        }
    }

    fn room_fan_report(&self) -> RoomFanReport {
        RoomFanReport {
            power: Some(self.power),
            f2l: self.room_fan,
            f2lf: self.room_fan.min(5),
        }
    }

    fn power_change(&self) -> PowerChange {
        PowerChange {
            power: self.power,
            f2l: Some(self.room_fan),
            fan_limits: self.fan_limits,
        }
    }

    fn date_time(&self) -> StoveDateTime {
        StoveDateTime {
            datetime: self.clock.format("%Y-%m-%d %H:%M:%S").to_string(),
            weekday: self.clock.weekday().number_from_monday() as u8,
        }
    }

    fn program_mut(&mut self, program: u8) -> DeviceResult<&mut ChronoProgram> {
        let index = usize::from(program)
            .checked_sub(1)
            .filter(|i| *i < 6)
            .ok_or_else(|| DeviceError::Communication(format!("no chrono program {}", program)))?;
        Ok(&mut self.programs[index])
    }

    fn set_power_level(&mut self, power: u8) -> PowerChange {
        self.power = power.clamp(POWER_MIN, POWER_MAX);
        self.power_change()
    }

    fn set_setpoint_value(&mut self, setpoint: f32) -> f32 {
        self.setpoint = setpoint.clamp(f32::from(SETPOINT_MIN), f32::from(SETPOINT_MAX));
        self.setpoint
    }
}

impl StoveDevice for SimulatedStove {
    fn switch_off(&mut self) -> DeviceResult<StatusReport> {
        self.call()?;
        self.status = 0;
        Ok(self.status_report())
    }

    fn switch_on(&mut self) -> DeviceResult<StatusReport> {
        self.call()?;
        self.status = 6;
        Ok(self.status_report())
    }

    fn get_all_status(&mut self) -> DeviceResult<AllStatus> {
        self.call()?;
        let clock = self.date_time();
        Ok(AllStatus {
            mbtype: self.static_data.mbtype,
            model: self.static_data.model,
            version: self.static_data.version,
            core: self.static_data.core,
            fw_date: self.static_data.fw_date.clone(),
            appliance_timestamp: clock.datetime,
            appliance_weekday: u16::from(clock.weekday),
            chrono_status: self.chrono_status,
            status: self.status,
            lstatus: self.status,
            mf_status: None,
            setpoint: self.setpoint,
            pump: 0,
            pellet_qty: self.counters.pellet_qty,
            f1v: if self.status == 0 { 0 } else { 1400 },
            f1rpm: if self.status == 0 { 0 } else { 1380 },
            f2l: self.room_fan,
            f2lf: self.room_fan.min(5),
            fan_limits: self.fan_limits,
            f2v: self.room_fan * 30,
            f3l_f4l: Some((self.fan3, self.fan4)),
            power: self.power,
            feeder: f32::from(self.power) * 0.45,
            dp_target: 55,
            dp_press: 54,
            inputs: 0,
            outputs: if self.status == 0 { 0 } else { 0b0000_0101 },
            temperatures: Temperatures {
                probes: self.temperatures,
            },
            serial_number: Some(self.static_data.serial_number.clone()),
        })
    }

    fn get_chrono_data(&mut self) -> DeviceResult<ChronoData> {
        self.call()?;
        Ok(ChronoData {
            chrono_status: self.chrono_status,
            programs: self.programs,
            days: self.days,
        })
    }

    fn get_counters(&mut self) -> DeviceResult<Counters> {
        self.call()?;
        Ok(self.counters)
    }

    fn get_dpressure(&mut self) -> DeviceResult<DPressure> {
        self.call()?;
        Ok(DPressure {
            target: 55,
            press: 54,
        })
    }

    fn get_fan_data(&mut self) -> DeviceResult<FanData> {
        self.call()?;
        Ok(FanData {
            f1v: if self.status == 0 { 0 } else { 1400 },
            f2v: self.room_fan * 30,
            f1rpm: if self.status == 0 { 0 } else { 1380 },
            f2l: self.room_fan,
            f2lf: self.room_fan.min(5),
            f3s_f4s: None,
            f3l_f4l: Some((self.fan3, self.fan4)),
        })
    }

    fn get_hidden_parameter(&mut self, index: u16) -> DeviceResult<u16> {
        self.call()?;
        self.hidden_parameters
            .get(usize::from(index))
            .copied()
            .ok_or_else(|| DeviceError::Communication(format!("no hidden parameter {}", index)))
    }

    fn get_io(&mut self) -> DeviceResult<IoState> {
        self.call()?;
        let on = u8::from(self.status != 0);
        Ok(IoState {
            inputs: [0; 4],
            outputs: [on, 0, on, 0, 0, 0, 0],
        })
    }

    fn get_model_version(&mut self) -> DeviceResult<ModelVersion> {
        self.call()?;
        Ok(ModelVersion {
            model: self.static_data.model,
            version: self.static_data.version,
            core: self.static_data.core,
            fw_date: self.static_data.fw_date.clone(),
        })
    }

    fn get_parameter(&mut self, index: u16) -> DeviceResult<u8> {
        self.call()?;
        self.parameters
            .get(usize::from(index))
            .copied()
            .ok_or_else(|| DeviceError::Communication(format!("no parameter {}", index)))
    }

    fn get_setpoint(&mut self) -> DeviceResult<f32> {
        self.call()?;
        Ok(self.setpoint)
    }

    fn get_status(&mut self) -> DeviceResult<StatusReport> {
        self.call()?;
        Ok(self.status_report())
    }

    fn get_static_data(&mut self) -> DeviceResult<StaticData> {
        self.call()?;
        Ok(self.static_data.clone())
    }

    fn get_date_time(&mut self) -> DeviceResult<StoveDateTime> {
        self.call()?;
        Ok(self.date_time())
    }

    fn get_temperatures(&mut self) -> DeviceResult<Temperatures> {
        self.call()?;
        Ok(Temperatures {
            probes: self.temperatures,
        })
    }

    fn get_power(&mut self) -> DeviceResult<PowerReport> {
        self.call()?;
        Ok(PowerReport {
            power: self.power,
            feeder: f32::from(self.power) * 0.45,
        })
    }

    fn get_serial_number(&mut self) -> DeviceResult<String> {
        self.call()?;
        Ok(self.static_data.serial_number.clone())
    }

    fn get_all_parameters(&mut self) -> DeviceResult<Vec<u8>> {
        self.call()?;
        Ok(self.parameters.clone())
    }

    fn get_all_hidden_parameters(&mut self) -> DeviceResult<Vec<u16>> {
        self.call()?;
        Ok(self.hidden_parameters.clone())
    }

    fn set_chrono_day(&mut self, day: u8, memory: u8, program: u8) -> DeviceResult<()> {
        self.call()?;
        let slot = usize::from(day)
            .checked_sub(1)
            .zip(usize::from(memory).checked_sub(1))
            .and_then(|(d, m)| self.days.get_mut(d).and_then(|row| row.get_mut(m)))
            .ok_or_else(|| DeviceError::Communication(format!("no chrono slot D{}M{}", day, memory)))?;
        *slot = program;
        Ok(())
    }

    fn set_chrono_program(
        &mut self,
        program: u8,
        setpoint: u8,
        start_hour: u8,
        start_minute: u8,
        stop_hour: u8,
        stop_minute: u8,
    ) -> DeviceResult<()> {
        self.call()?;
        *self.program_mut(program)? = ChronoProgram {
            setpoint: f32::from(setpoint),
            start: (start_hour, start_minute),
            stop: (stop_hour, stop_minute),
        };
        Ok(())
    }

    fn set_chrono_setpoint(&mut self, program: u8, setpoint: u8) -> DeviceResult<()> {
        self.call()?;
        self.program_mut(program)?.setpoint = f32::from(setpoint);
        Ok(())
    }

    fn set_chrono_start_hour(&mut self, program: u8, hour: u8) -> DeviceResult<()> {
        self.call()?;
        self.program_mut(program)?.start.0 = hour;
        Ok(())
    }

    fn set_chrono_start_minute(&mut self, program: u8, minute: u8) -> DeviceResult<()> {
        self.call()?;
        self.program_mut(program)?.start.1 = minute;
        Ok(())
    }

    fn set_chrono_stop_hour(&mut self, program: u8, hour: u8) -> DeviceResult<()> {
        self.call()?;
        self.program_mut(program)?.stop.0 = hour;
        Ok(())
    }

    fn set_chrono_stop_minute(&mut self, program: u8, minute: u8) -> DeviceResult<()> {
        self.call()?;
        self.program_mut(program)?.stop.1 = minute;
        Ok(())
    }

    fn set_chrono_status(&mut self, enabled: u8) -> DeviceResult<u8> {
        self.call()?;
        self.chrono_status = u8::from(enabled != 0);
        Ok(self.chrono_status)
    }

    fn room_fan_down(&mut self) -> DeviceResult<RoomFanReport> {
        self.call()?;
        self.room_fan = match self.room_fan {
            ROOM_FAN_AUTO => 5,
            0 => 0,
            level => level - 1,
        };
        Ok(self.room_fan_report())
    }

    fn room_fan_up(&mut self) -> DeviceResult<RoomFanReport> {
        self.call()?;
        self.room_fan = match self.room_fan {
            ROOM_FAN_AUTO => ROOM_FAN_AUTO,
            level => (level + 1).min(6),
        };
        Ok(self.room_fan_report())
    }

    fn set_room_fan(&mut self, level: u8) -> DeviceResult<RoomFanReport> {
        self.call()?;
        self.room_fan = u16::from(level).min(ROOM_FAN_AUTO);
        Ok(self.room_fan_report())
    }

    fn set_room_fan3(&mut self, level: u8) -> DeviceResult<u16> {
        self.call()?;
        self.fan3 = u16::from(level).clamp(self.fan_limits[2], self.fan_limits[3]);
        Ok(self.fan3)
    }

    fn set_room_fan4(&mut self, level: u8) -> DeviceResult<u16> {
        self.call()?;
        self.fan4 = u16::from(level).clamp(self.fan_limits[4], self.fan_limits[5]);
        Ok(self.fan4)
    }

    fn set_silent_mode(&mut self, mode: u8) -> DeviceResult<SilentReport> {
        self.call()?;
        self.silent = u8::from(mode != 0);
        if self.silent == 1 {
            self.room_fan = 0;
            self.fan3 = 0;
            self.fan4 = 0;
        }
        Ok(SilentReport {
            silent: self.silent,
            power: self.power,
            f2l: self.room_fan,
            f2lf: self.room_fan.min(5),
            f3l_f4l: Some((self.fan3, self.fan4)),
        })
    }

    fn set_hidden_parameter(&mut self, index: u16, value: u16) -> DeviceResult<()> {
        self.call()?;
        let slot = self
            .hidden_parameters
            .get_mut(usize::from(index))
            .ok_or_else(|| DeviceError::Communication(format!("no hidden parameter {}", index)))?;
        *slot = value;
        Ok(())
    }

    fn set_parameter(&mut self, index: u16, value: u8) -> DeviceResult<()> {
        self.call()?;
        let slot = self
            .parameters
            .get_mut(usize::from(index))
            .ok_or_else(|| DeviceError::Communication(format!("no parameter {}", index)))?;
        *slot = value;
        Ok(())
    }

    fn set_power(&mut self, power: u8) -> DeviceResult<PowerChange> {
        self.call()?;
        Ok(self.set_power_level(power))
    }

    fn power_down(&mut self) -> DeviceResult<PowerChange> {
        self.call()?;
        Ok(self.set_power_level(self.power.saturating_sub(1)))
    }

    fn power_up(&mut self) -> DeviceResult<PowerChange> {
        self.call()?;
        Ok(self.set_power_level(self.power.saturating_add(1)))
    }

    fn set_setpoint(&mut self, setpoint: f32) -> DeviceResult<f32> {
        self.call()?;
        Ok(self.set_setpoint_value(setpoint))
    }

    fn setpoint_down(&mut self) -> DeviceResult<f32> {
        self.call()?;
        Ok(self.set_setpoint_value(self.setpoint - 1.0))
    }

    fn setpoint_up(&mut self) -> DeviceResult<f32> {
        self.call()?;
        Ok(self.set_setpoint_value(self.setpoint + 1.0))
    }

    fn set_date_time(
        &mut self,
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> DeviceResult<StoveDateTime> {
        self.call()?;
        self.clock = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
            .and_then(|d| d.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second)))
            .ok_or_else(|| DeviceError::Communication("stove rejected date".to_string()))?;
        Ok(self.date_time())
    }

    fn read_data(&mut self, address: u16, _length: u16) -> DeviceResult<u16> {
        self.call()?;
        Ok(self.memory.get(&address).copied().unwrap_or(0))
    }

    fn write_data(&mut self, address: u16, _length: u16, value: u16) -> DeviceResult<()> {
        self.call()?;
        self.memory.insert(address, value);
        Ok(())
    }
}
