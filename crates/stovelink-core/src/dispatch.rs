//! Ordered dispatch table and command handlers.
//!
//! Rules are tried top to bottom and the first match wins. Several prefix
//! rules overlap with exact ones (`EXT ADRD` matches `EXT ADRDX`), so the
//! order of [`RULES`] is part of the protocol and must not be sorted.

use std::time::Instant;

use chrono::NaiveDate;

use crate::cache::StatusCache;
use crate::category::Category;
use crate::config::HostInfo;
use crate::data::{format_clock, format_hours_minutes, DataMap, DataValue};
use crate::device::{FanData, PowerChange, RoomFanReport, StatusReport, StoveDevice, Temperatures};
use crate::envelope::CommandOutcome;
use crate::error::CommandError;
use crate::params::ParsedCommand;

/// How a rule recognizes its command.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// Whole input equals the code.
    Exact(&'static str),
    /// Input starts with the prefix.
    Prefix(&'static str),
    /// Whole input equals one of the codes.
    AnyOf(&'static [&'static str]),
}

impl Matcher {
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            Matcher::Exact(code) => cmd == *code,
            Matcher::Prefix(prefix) => cmd.starts_with(prefix),
            Matcher::AnyOf(codes) => codes.contains(&cmd),
        }
    }
}

/// Everything a handler may touch.
pub struct HandlerContext<'a> {
    pub params: &'a ParsedCommand,
    pub device: &'a mut dyn StoveDevice,
    pub host: &'a HostInfo,
    pub cache: &'a mut StatusCache,
    pub now: Instant,
}

impl HandlerContext<'_> {
    fn expect_count(&self, allowed: &[usize]) -> Result<(), CommandError> {
        let count = self.params.count();
        if allowed.contains(&count) {
            Ok(())
        } else {
            Err(CommandError::parameter_count(count))
        }
    }
}

pub type Handler = fn(&mut HandlerContext<'_>) -> Result<DataMap, CommandError>;

/// One dispatch table row.
#[derive(Clone, Copy)]
pub struct Rule {
    pub matcher: Matcher,
    /// Routing tag of the result; `None` results are never published.
    pub category: Option<Category>,
    pub handler: Handler,
    /// Only reachable with `developer_mode` enabled.
    pub developer_only: bool,
}

impl Rule {
    const fn exact(code: &'static str, category: Option<Category>, handler: Handler) -> Self {
        Self {
            matcher: Matcher::Exact(code),
            category,
            handler,
            developer_only: false,
        }
    }

    const fn prefix(prefix: &'static str, category: Option<Category>, handler: Handler) -> Self {
        Self {
            matcher: Matcher::Prefix(prefix),
            category,
            handler,
            developer_only: false,
        }
    }

    /// Run the handler and classify its result.
    pub fn run(&self, ctx: &mut HandlerContext<'_>) -> CommandOutcome {
        match (self.handler)(ctx) {
            Ok(data) => CommandOutcome::Completed {
                category: self.category,
                data,
            },
            Err(CommandError::Rejected(message)) => CommandOutcome::Rejected { message },
            Err(CommandError::Device(e)) => {
                tracing::debug!(category = "dispatch", error = %e, "Device call failed");
                CommandOutcome::DeviceFailed
            }
        }
    }
}

use Category as C;

/// The dispatch table, in protocol order.
pub static RULES: &[Rule] = &[
    Rule::exact("CMD OFF", Some(C::Stat), cmd_off),
    Rule::exact("CMD ON", Some(C::Stat), cmd_on),
    Rule::exact("GET ALLS", Some(C::Alls), get_all_status),
    Rule::exact("GET CHRD", Some(C::Chrd), get_chrono_data),
    Rule {
        matcher: Matcher::AnyOf(&["GET CNTR", "GET CUNT"]),
        category: Some(C::Cntr),
        handler: get_counters,
        developer_only: false,
    },
    Rule::exact("GET DPRS", Some(C::Dprs), get_dpressure),
    Rule::exact("GET FAND", Some(C::Fand), get_fan_data),
    Rule::prefix("GET HPAR ", Some(C::Hpar), get_hidden_parameter),
    Rule::exact("GET IOPT", Some(C::Iopt), get_io),
    Rule::exact("GET LABL", Some(C::Labl), get_label),
    Rule::exact("GET MDVE", Some(C::Mdve), get_model_version),
    Rule::prefix("GET PARM ", Some(C::Parm), get_parameter),
    Rule::exact("GET SETP", Some(C::Setp), get_setpoint),
    Rule::exact("GET STAT", Some(C::Stat), get_status),
    Rule::exact("GET STDT", Some(C::Stdt), get_static_data),
    Rule::exact("GET TIME", Some(C::Time), get_date_time),
    Rule::exact("GET TMPS", Some(C::Tmps), get_temperatures),
    Rule::exact("GET POWR", Some(C::Powr), get_power),
    Rule::exact("GET SERN", Some(C::Sern), get_serial_number),
    Rule::prefix("SET CDAY ", Some(C::Chrd), set_chrono_day),
    Rule::prefix("SET CPRD ", Some(C::Chrd), set_chrono_program),
    Rule::prefix("SET CSET ", None, set_chrono_setpoint),
    Rule::prefix("SET CSPH ", None, set_chrono_stop_hour),
    Rule::prefix("SET CSPM ", None, set_chrono_stop_minute),
    Rule::prefix("SET CSST ", Some(C::Chrd), set_chrono_status),
    Rule::prefix("SET CSTH ", None, set_chrono_start_hour),
    Rule::prefix("SET CSTM ", None, set_chrono_start_minute),
    Rule::exact("SET FN2D", Some(C::Fand), room_fan_down),
    Rule::exact("SET FN2U", Some(C::Fand), room_fan_up),
    Rule::prefix("SET FN3L ", Some(C::Fand), set_room_fan3),
    Rule::prefix("SET FN4L ", Some(C::Fand), set_room_fan4),
    Rule::prefix("SET HPAR ", Some(C::Hpar), set_hidden_parameter),
    Rule::prefix("SET PARM ", Some(C::Parm), set_parameter),
    Rule::prefix("SET POWR ", Some(C::Powr), set_power),
    Rule::exact("SET PWRD", Some(C::Powr), power_down),
    Rule::exact("SET PWRU", Some(C::Powr), power_up),
    Rule::prefix("SET RFAN ", Some(C::Fand), set_room_fan),
    Rule::prefix("SET SETP ", Some(C::Setp), set_setpoint),
    Rule::prefix("SET SLNT ", Some(C::Fand), set_silent_mode),
    Rule::exact("SET STPD", Some(C::Setp), setpoint_down),
    Rule::prefix("SET STPF ", Some(C::Setp), set_setpoint_fraction),
    Rule::exact("SET STPU", Some(C::Setp), setpoint_up),
    Rule::prefix("SET TIME ", Some(C::Time), set_date_time),
    Rule::prefix("EXT ADRD", Some(C::Adrd), read_data),
    Rule {
        matcher: Matcher::Prefix("EXT ADWR"),
        category: Some(C::Adwr),
        handler: write_data,
        developer_only: true,
    },
];

/// First rule matching `cmd`.
pub fn find_rule(cmd: &str, developer_mode: bool) -> Option<&'static Rule> {
    RULES
        .iter()
        .filter(|rule| developer_mode || !rule.developer_only)
        .find(|rule| rule.matcher.matches(cmd))
}

/// Validate, match and run one command.
///
/// Tokenizer errors reject the command before any rule is considered.
pub fn dispatch(cmd: &str, developer_mode: bool, ctx: &mut HandlerContext<'_>) -> CommandOutcome {
    if let Some(err) = ctx.params.error() {
        return CommandOutcome::Rejected {
            message: err.to_string(),
        };
    }

    match find_rule(cmd, developer_mode) {
        Some(rule) => rule.run(ctx),
        None => CommandOutcome::Unmatched,
    }
}

// ---------------------------------------------------------------------------
// Shared DATA builders
// ---------------------------------------------------------------------------

fn status_data(report: StatusReport) -> DataMap {
    DataMap::new()
        .with("STATUS", report.status)
        .with("LSTATUS", report.lstatus)
        .with("FSTATUS", report.fstatus)
}

fn insert_temperatures(data: &mut DataMap, temps: &Temperatures) {
    for (i, t) in temps.probes.iter().enumerate() {
        data.insert(format!("T{}", i + 1), DataValue::fixed2(*t));
    }
}

fn insert_f3l_f4l(data: &mut DataMap, levels: Option<(u16, u16)>) {
    if let Some((f3l, f4l)) = levels {
        data.insert("F3L", f3l);
        data.insert("F4L", f4l);
    }
}

fn room_fan_data(report: RoomFanReport) -> DataMap {
    let mut data = DataMap::new();
    if let Some(power) = report.power {
        data.insert("PWR", power);
    }
    data.insert("F2L", report.f2l);
    data.insert("F2LF", report.f2lf);
    data
}

fn power_data(change: PowerChange) -> DataMap {
    let mut data = DataMap::new().with("PWR", change.power);
    if let Some(f2l) = change.f2l {
        data.insert("F2L", f2l);
    }
    data.insert("FANLMINMAX", change.fan_limits);
    data
}

fn setpoint_data(setpoint: f32) -> DataMap {
    DataMap::new().with("SETP", DataValue::fixed2(setpoint))
}

fn program_slot(program: u8) -> String {
    if program == 0 {
        "OFF".to_string()
    } else {
        format!("P{}", program)
    }
}

fn program_data(setpoint: f32, start: (u8, u8), stop: (u8, u8)) -> DataMap {
    DataMap::new()
        .with("CHRSETP", DataValue::fixed2(setpoint))
        .with("START", format_clock(start.0, start.1))
        .with("STOP", format_clock(stop.0, stop.1))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn cmd_off(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(status_data(ctx.device.switch_off()?))
}

fn cmd_on(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(status_data(ctx.device.switch_on()?))
}

fn get_all_status(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let s = ctx.cache.get_or_refresh(ctx.now, &mut *ctx.device)?;

    let mut data = DataMap::new()
        .with("MBTYPE", s.mbtype)
        .with("MAC", ctx.host.mac.as_str())
        .with("MOD", s.model)
        .with("VER", s.version)
        .with("CORE", s.core)
        .with("FWDATE", s.fw_date)
        .with("APLTS", s.appliance_timestamp)
        .with("APLWDAY", s.appliance_weekday)
        .with("CHRSTATUS", s.chrono_status)
        .with("STATUS", s.status)
        .with("LSTATUS", s.lstatus);
    if let Some(mf_status) = s.mf_status {
        data.insert("MFSTATUS", mf_status);
    }
    data.insert("SETP", DataValue::fixed2(s.setpoint));
    data.insert("PUMP", s.pump);
    data.insert("PQT", s.pellet_qty);
    data.insert("F1V", s.f1v);
    data.insert("F1RPM", s.f1rpm);
    data.insert("F2L", s.f2l);
    data.insert("F2LF", s.f2lf);
    data.insert("FANLMINMAX", s.fan_limits);
    data.insert("F2V", s.f2v);
    insert_f3l_f4l(&mut data, s.f3l_f4l);
    data.insert("PWR", s.power);
    data.insert("FDR", DataValue::fixed2(s.feeder));
    data.insert("DPT", s.dp_target);
    data.insert("DP", s.dp_press);
    data.insert("IN", s.inputs);
    data.insert("OUT", s.outputs);
    insert_temperatures(&mut data, &s.temperatures);
    // Error flags are not reported by the board.
    data.insert("EFLAGS", 0u8);
    if let Some(sn) = s.serial_number {
        data.insert("SN", sn);
    }
    Ok(data)
}

fn get_chrono_data(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let chrono = ctx.device.get_chrono_data()?;

    let mut data = DataMap::new().with("CHRSTATUS", chrono.chrono_status);
    for (i, p) in chrono.programs.iter().enumerate() {
        data.insert(format!("P{}", i + 1), program_data(p.setpoint, p.start, p.stop));
    }
    for (d, memories) in chrono.days.iter().enumerate() {
        let mut day = DataMap::new();
        for (m, program) in memories.iter().enumerate() {
            day.insert(format!("M{}", m + 1), program_slot(*program));
        }
        data.insert(format!("D{}", d + 1), day);
    }
    Ok(data)
}

fn get_counters(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let c = ctx.device.get_counters()?;
    let hm = |(h, m): (u16, u16)| format_hours_minutes(h, m);
    Ok(DataMap::new()
        .with("IGN", c.ignitions)
        .with("POWERTIME", hm(c.power_time))
        .with("HEATTIME", hm(c.heat_time))
        .with("SERVICETIME", hm(c.service_time))
        .with("ONTIME", hm(c.on_time))
        .with("OVERTMPERRORS", c.overtemp_errors)
        .with("IGNERRORS", c.ignition_errors)
        .with("PQT", c.pellet_qty))
}

fn get_dpressure(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let dp = ctx.device.get_dpressure()?;
    Ok(DataMap::new()
        .with("DP_TARGET", dp.target)
        .with("DP_PRESS", dp.press))
}

fn get_fan_data(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let FanData {
        f1v,
        f2v,
        f1rpm,
        f2l,
        f2lf,
        f3s_f4s,
        f3l_f4l,
    } = ctx.device.get_fan_data()?;

    let mut data = DataMap::new()
        .with("F1V", f1v)
        .with("F2V", f2v)
        .with("F1RPM", f1rpm)
        .with("F2L", f2l)
        .with("F2LF", f2lf);
    if let Some((f3s, f4s)) = f3s_f4s {
        data.insert("F3S", DataValue::fixed2(f3s));
        data.insert("F4S", DataValue::fixed2(f4s));
    }
    insert_f3l_f4l(&mut data, f3l_f4l);
    Ok(data)
}

fn get_hidden_parameter(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[1])?;
    let index = ctx.params.value(0);
    let value = ctx.device.get_hidden_parameter(index)?;
    Ok(DataMap::new().with(format!("HPAR{}", index), value))
}

fn get_io(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let io = ctx.device.get_io()?;
    let mut data = DataMap::new();
    for (i, v) in io.inputs.iter().enumerate() {
        data.insert(format!("IN_I{:02}", i + 1), *v);
    }
    for (i, v) in io.outputs.iter().enumerate() {
        data.insert(format!("OUT_O{:02}", i + 1), *v);
    }
    Ok(data)
}

fn get_label(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(DataMap::new().with("LABEL", ctx.host.label.as_str()))
}

fn get_model_version(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let mv = ctx.device.get_model_version()?;
    Ok(DataMap::new()
        .with("MOD", mv.model)
        .with("VER", mv.version)
        .with("CORE", mv.core)
        .with("FWDATE", mv.fw_date))
}

fn get_parameter(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[1])?;
    let index = ctx.params.value(0);
    let value = ctx.device.get_parameter(index)?;
    Ok(DataMap::new().with(format!("PAR{}", index), value))
}

fn get_setpoint(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(setpoint_data(ctx.device.get_setpoint()?))
}

fn get_status(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(status_data(ctx.device.get_status()?))
}

/// Version strings reported for compatibility with the vendor app.
const CBOX_TYPE: &str = "miniembplug";
const SENDMSG_VERSION: &str = "2.1.2 2018-03-28 10:19:09";
const PLZBRIDGE_VERSION: &str = "2.2.1 2022-10-24 11:13:21";
const SYSTEM_VERSION: &str = "2.5.3 2021-10-08 10:30:20 (657c8cf)";

fn get_static_data(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let sd = ctx.device.get_static_data()?;
    let host = ctx.host;

    let wmode = if host.station_mode { "sta" } else { "ap" };

    let data = DataMap::new()
        .with("LABEL", host.label.as_str())
        .with("GWDEVICE", "wlan0")
        .with("MAC", host.mac.as_str())
        .with("GATEWAY", host.gateway.as_str())
        .with("DNS", vec![host.dns.clone()])
        .with("WMAC", host.mac.as_str())
        .with("WMODE", wmode)
        .with("WADR", host.ip.as_str())
        .with("WGW", host.gateway.as_str())
        .with("WENC", "psk2")
        .with("WPWR", format!("{} dBm", host.rssi))
        .with("WSSID", host.ssid.as_str())
        .with("WPR", "dhcp")
        .with("WMSK", host.netmask.as_str())
        .with("WBCST", host.broadcast.as_str())
        .with("WCH", host.channel.to_string())
        .with("EPR", "dhcp")
        .with("EGW", "0.0.0.0")
        .with("EMSK", "0.0.0.0")
        .with("EADR", "0.0.0.0")
        .with("EMAC", host.mac.as_str())
        .with("ECBL", "down")
        .with("EBCST", "")
        .with("APLCONN", 1u8)
        .with("ICONN", 0u8)
        .with("CBTYPE", CBOX_TYPE)
        .with("sendmsg", SENDMSG_VERSION)
        .with("plzbridge", PLZBRIDGE_VERSION)
        .with("SYSTEM", SYSTEM_VERSION)
        .with("CLOUD_ENABLED", true)
        .with("SN", sd.serial_number)
        .with("SNCHK", sd.sn_check)
        .with("MBTYPE", sd.mbtype)
        .with("MOD", sd.model)
        .with("VER", sd.version)
        .with("CORE", sd.core)
        .with("FWDATE", sd.fw_date)
        .with("FLUID", sd.fluid)
        .with("SPLMIN", sd.setpoint_min)
        .with("SPLMAX", sd.setpoint_max)
        .with("UICONFIG", sd.ui_config)
        .with("HWTYPE", sd.hw_type)
        .with("DSPTYPE", sd.display_type)
        .with("DSPFWVER", sd.display_fw_version)
        .with("CONFIG", sd.config)
        .with("PELLETTYPE", sd.pellet_type)
        .with("PSENSTYPE", sd.psens_type)
        .with("PSENSLMAX", sd.psens_lmax)
        .with("PSENSLTSH", sd.psens_ltsh)
        .with("PSENSLMIN", sd.psens_lmin)
        .with("MAINTPROBE", sd.main_probe)
        .with("STOVETYPE", sd.stove_type)
        .with("FAN2TYPE", sd.fan2_type)
        .with("FAN2MODE", sd.fan2_mode)
        .with("BLEMBMODE", sd.ble_mb_mode)
        .with("BLEDSPMODE", sd.ble_dsp_mode)
        // Chrono planning is not offered to the vendor app.
        .with("CHRONOTYPE", 0u8)
        .with("AUTONOMYTYPE", sd.autonomy_type)
        .with("NOMINALPWR", sd.nominal_power);
    Ok(data)
}

fn get_date_time(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let dt = ctx.device.get_date_time()?;
    Ok(DataMap::new()
        .with("STOVE_DATETIME", dt.datetime)
        .with("STOVE_WDAY", dt.weekday))
}

fn get_temperatures(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let temps = ctx.device.get_temperatures()?;
    let mut data = DataMap::new();
    insert_temperatures(&mut data, &temps);
    Ok(data)
}

fn get_power(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    let p = ctx.device.get_power()?;
    Ok(DataMap::new()
        .with("PWR", p.power)
        .with("FDR", DataValue::fixed2(p.feeder)))
}

fn get_serial_number(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(DataMap::new().with("SN", ctx.device.get_serial_number()?))
}

fn set_chrono_day(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[3])?;
    let (day, memory, program) = (ctx.params.byte(0), ctx.params.byte(1), ctx.params.byte(2));
    ctx.device.set_chrono_day(day, memory, program)?;

    let slot = DataMap::new().with(format!("M{}", memory), program_slot(program));
    Ok(DataMap::new().with(format!("D{}", day), slot))
}

fn set_chrono_program(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[6])?;
    let p = ctx.params;
    let (program, setpoint) = (p.byte(0), p.byte(1));
    let start = (p.byte(2), p.byte(3));
    let stop = (p.byte(4), p.byte(5));
    ctx.device
        .set_chrono_program(program, setpoint, start.0, start.1, stop.0, stop.1)?;

    Ok(DataMap::new().with(
        format!("P{}", program),
        program_data(f32::from(setpoint), start, stop),
    ))
}

fn set_chrono_setpoint(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[2])?;
    ctx.device
        .set_chrono_setpoint(ctx.params.byte(0), ctx.params.byte(1))?;
    Ok(DataMap::new())
}

fn set_chrono_stop_hour(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[2])?;
    ctx.device
        .set_chrono_stop_hour(ctx.params.byte(0), ctx.params.byte(1))?;
    Ok(DataMap::new())
}

fn set_chrono_stop_minute(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[2])?;
    ctx.device
        .set_chrono_stop_minute(ctx.params.byte(0), ctx.params.byte(1))?;
    Ok(DataMap::new())
}

fn set_chrono_status(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[1])?;
    let status = ctx.device.set_chrono_status(ctx.params.byte(0))?;
    Ok(DataMap::new().with("CHRSTATUS", status))
}

fn set_chrono_start_hour(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[2])?;
    ctx.device
        .set_chrono_start_hour(ctx.params.byte(0), ctx.params.byte(1))?;
    Ok(DataMap::new())
}

fn set_chrono_start_minute(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[2])?;
    ctx.device
        .set_chrono_start_minute(ctx.params.byte(0), ctx.params.byte(1))?;
    Ok(DataMap::new())
}

fn room_fan_down(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(room_fan_data(ctx.device.room_fan_down()?))
}

fn room_fan_up(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(room_fan_data(ctx.device.room_fan_up()?))
}

fn set_room_fan3(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[1])?;
    let level = ctx.device.set_room_fan3(ctx.params.byte(0))?;
    Ok(DataMap::new().with("F3L", level))
}

fn set_room_fan4(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[1])?;
    let level = ctx.device.set_room_fan4(ctx.params.byte(0))?;
    Ok(DataMap::new().with("F4L", level))
}

fn set_hidden_parameter(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[2])?;
    let (index, value) = (ctx.params.value(0), ctx.params.value(1));
    ctx.device.set_hidden_parameter(index, value)?;
    Ok(DataMap::new().with(format!("HPAR{}", index), value))
}

fn set_parameter(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[2])?;
    let index = ctx.params.value(0);
    ctx.device.set_parameter(index, ctx.params.byte(1))?;
    Ok(DataMap::new().with(format!("PAR{}", index), ctx.params.value(1)))
}

fn set_power(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[1])?;
    Ok(power_data(ctx.device.set_power(ctx.params.byte(0))?))
}

fn power_down(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(power_data(ctx.device.power_down()?))
}

fn power_up(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(power_data(ctx.device.power_up()?))
}

fn set_room_fan(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[1])?;
    Ok(room_fan_data(ctx.device.set_room_fan(ctx.params.byte(0))?))
}

fn set_setpoint(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[1])?;
    let setpoint = f32::from(ctx.params.byte(0));
    Ok(setpoint_data(ctx.device.set_setpoint(setpoint)?))
}

fn set_silent_mode(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[1])?;
    let r = ctx.device.set_silent_mode(ctx.params.byte(0))?;
    let mut data = DataMap::new()
        .with("SLNT", r.silent)
        .with("PWR", r.power)
        .with("F2L", r.f2l)
        .with("F2LF", r.f2lf);
    insert_f3l_f4l(&mut data, r.f3l_f4l);
    Ok(data)
}

fn setpoint_down(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(setpoint_data(ctx.device.setpoint_down()?))
}

/// Accepted hundredths of `SET STPF`.
const SETPOINT_FRACTIONS: [u16; 5] = [0, 20, 40, 60, 80];

fn set_setpoint_fraction(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[2])?;
    let (whole, fraction) = (ctx.params.value(0), ctx.params.value(1));
    if !SETPOINT_FRACTIONS.contains(&fraction) {
        return Err(CommandError::Rejected(format!(
            "Incorrect Parameter Value : {}.{}",
            ctx.params.raw(0),
            ctx.params.raw(1)
        )));
    }

    let setpoint = f32::from(whole) + f32::from(fraction) / 100.0;
    Ok(setpoint_data(ctx.device.set_setpoint(setpoint)?))
}

fn setpoint_up(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    Ok(setpoint_data(ctx.device.setpoint_up()?))
}

fn check_date_time(v: [u16; 6]) -> Result<(), CommandError> {
    let [year, month, day, hour, minute, second] = v;
    let reject = |what: &str| -> Result<(), CommandError> {
        Err(CommandError::Rejected(format!("Incorrect {}", what)))
    };

    if !(2000..=2099).contains(&year) {
        return reject("Year");
    }
    if !(1..=12).contains(&month) {
        return reject("Month");
    }
    if NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day)).is_none() {
        return reject("Day");
    }
    if hour > 23 {
        return reject("Hour");
    }
    if minute > 59 {
        return reject("Minute");
    }
    if second > 59 {
        return reject("Second");
    }
    Ok(())
}

fn set_date_time(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[6])?;
    let p = ctx.params;
    check_date_time([p.value(0), p.value(1), p.value(2), p.value(3), p.value(4), p.value(5)])?;

    let dt = ctx
        .device
        .set_date_time(p.value(0), p.byte(1), p.byte(2), p.byte(3), p.byte(4), p.byte(5))?;
    Ok(DataMap::new()
        .with("STOVE_DATETIME", dt.datetime)
        .with("STOVE_WDAY", dt.weekday))
}

fn read_data(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    // A third parameter is accepted for older boards and ignored.
    ctx.expect_count(&[2, 3])?;
    let address = ctx.params.value(0);
    let value = ctx.device.read_data(address, ctx.params.value(1))?;
    Ok(DataMap::new().with(format!("ADDR_{:x}", address), value))
}

fn write_data(ctx: &mut HandlerContext<'_>) -> Result<DataMap, CommandError> {
    ctx.expect_count(&[3, 4])?;
    let p = ctx.params;
    ctx.device.write_data(p.value(0), p.value(1), p.value(2))?;
    Ok(DataMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::parse_command;
    use crate::simulator::SimulatedStove;

    fn run_with(stove: &mut SimulatedStove, cmd: &str, developer_mode: bool) -> CommandOutcome {
        let params = parse_command(cmd);
        let host = HostInfo {
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            ..HostInfo::default()
        };
        let mut cache = StatusCache::new();
        let mut ctx = HandlerContext {
            params: &params,
            device: stove,
            host: &host,
            cache: &mut cache,
            now: Instant::now(),
        };
        dispatch(cmd, developer_mode, &mut ctx)
    }

    fn run(stove: &mut SimulatedStove, cmd: &str) -> CommandOutcome {
        run_with(stove, cmd, false)
    }

    fn data_of(outcome: CommandOutcome) -> DataMap {
        match outcome {
            CommandOutcome::Completed { data, .. } => data,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    fn rejection(outcome: CommandOutcome) -> String {
        match outcome {
            CommandOutcome::Rejected { message } => message,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_matcher_kinds() {
        assert!(Matcher::Exact("GET STAT").matches("GET STAT"));
        assert!(!Matcher::Exact("GET STAT").matches("GET STAT "));
        assert!(Matcher::Prefix("SET POWR ").matches("SET POWR 3"));
        assert!(!Matcher::Prefix("SET POWR ").matches("SET POWR"));
        assert!(Matcher::AnyOf(&["GET CNTR", "GET CUNT"]).matches("GET CUNT"));
    }

    #[test]
    fn test_counters_alias() {
        let rule = find_rule("GET CUNT", false).unwrap();
        assert_eq!(rule.category, Some(Category::Cntr));
    }

    #[test]
    fn test_first_match_wins_for_overlapping_prefix() {
        let rule = find_rule("EXT ADRDX 1 2", false).unwrap();
        assert_eq!(rule.category, Some(Category::Adrd));
    }

    #[test]
    fn test_unknown_command() {
        let mut stove = SimulatedStove::new();
        assert_eq!(run(&mut stove, "GET NOPE"), CommandOutcome::Unmatched);
        assert_eq!(run(&mut stove, ""), CommandOutcome::Unmatched);
        // Parameterized rules need their trailing space.
        assert_eq!(run(&mut stove, "SET POWR"), CommandOutcome::Unmatched);
        assert_eq!(stove.calls(), 0);
    }

    #[test]
    fn test_developer_only_rule() {
        let mut stove = SimulatedStove::new();
        assert_eq!(run(&mut stove, "EXT ADWR 2003 1 10"), CommandOutcome::Unmatched);
        assert!(matches!(
            run_with(&mut stove, "EXT ADWR 2003 1 10", true),
            CommandOutcome::Completed { .. }
        ));
        let data = data_of(run(&mut stove, "EXT ADRD 2003 1"));
        assert_eq!(data.get("ADDR_2003"), Some(&DataValue::Int(10)));
    }

    #[test]
    fn test_tokenizer_error_rejects_before_dispatch() {
        let mut stove = SimulatedStove::new();
        let msg = rejection(run(&mut stove, "SET POWR x"));
        assert_eq!(msg, "Incorrect Parameter Value : x");
        let msg = rejection(run(&mut stove, "SET CPRD 1 2 3 4 5 6 7"));
        assert_eq!(msg, "Incorrect Parameter Number");
        assert_eq!(stove.calls(), 0);
    }

    #[test]
    fn test_count_mismatch_skips_device() {
        let mut stove = SimulatedStove::new();
        for (cmd, count) in [
            ("SET POWR 1 2", 2),
            ("GET PARM 1 2", 2),
            ("SET CDAY 1 2", 2),
            ("SET CPRD 1 20 6 30", 4),
            ("SET CSET 1", 1),
            ("SET TIME 2024-01-01", 3),
            ("EXT ADRD 10", 1),
        ] {
            let msg = rejection(run(&mut stove, cmd));
            assert_eq!(msg, format!("Incorrect Parameter Number : {}", count), "{}", cmd);
        }
        assert_eq!(
            rejection(run(&mut stove, "EXT ADRD")),
            "Incorrect Parameter Number : 0"
        );
        assert_eq!(stove.calls(), 0);
    }

    #[test]
    fn test_status_fields() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "CMD ON"));
        assert_eq!(data.to_json(), r#"{"STATUS":6,"LSTATUS":6,"FSTATUS":0}"#);
    }

    #[test]
    fn test_setpoint_fraction() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "SET STPF 21.40"));
        assert_eq!(data.to_json(), r#"{"SETP":21.40}"#);

        let msg = rejection(run(&mut stove, "SET STPF 21.45"));
        assert_eq!(msg, "Incorrect Parameter Value : 21.45");
        let msg = rejection(run(&mut stove, "SET STPF 21 100"));
        assert_eq!(msg, "Incorrect Parameter Value : 21.100");
    }

    #[test]
    fn test_set_setpoint_integer() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "SET SETP 23"));
        assert_eq!(data.to_json(), r#"{"SETP":23.00}"#);
    }

    #[test]
    fn test_set_time_checks() {
        let mut stove = SimulatedStove::new();
        for (cmd, msg) in [
            ("SET TIME 1999-01-01 00:00:00", "Incorrect Year"),
            ("SET TIME 2024-13-01 00:00:00", "Incorrect Month"),
            ("SET TIME 2023-02-29 00:00:00", "Incorrect Day"),
            ("SET TIME 2024-04-31 00:00:00", "Incorrect Day"),
            ("SET TIME 2024-01-00 00:00:00", "Incorrect Day"),
            ("SET TIME 2024-01-01 24:00:00", "Incorrect Hour"),
            ("SET TIME 2024-01-01 23:60:00", "Incorrect Minute"),
            ("SET TIME 2024-01-01 23:59:60", "Incorrect Second"),
        ] {
            assert_eq!(rejection(run(&mut stove, cmd)), msg, "{}", cmd);
        }
        assert_eq!(stove.calls(), 0);

        let data = data_of(run(&mut stove, "SET TIME 2024-02-29 13:05:09"));
        assert_eq!(
            data.to_json(),
            r#"{"STOVE_DATETIME":"2024-02-29 13:05:09","STOVE_WDAY":4}"#
        );
    }

    #[test]
    fn test_counters_format() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "GET CNTR"));
        assert_eq!(data.get("POWERTIME"), Some(&DataValue::from("812:05")));
        assert_eq!(data.get("ONTIME"), Some(&DataValue::from("1020:00")));
        assert_eq!(data.get("PQT"), Some(&DataValue::Int(1530)));
    }

    #[test]
    fn test_all_status_fields() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "GET ALLS"));
        let keys: Vec<_> = data.keys().collect();
        assert_eq!(&keys[..3], &["MBTYPE", "MAC", "MOD"]);
        assert_eq!(data.get("MAC"), Some(&DataValue::from("AA:BB:CC:DD:EE:FF")));
        assert_eq!(data.get("EFLAGS"), Some(&DataValue::Int(0)));
        assert!(data.contains_key("F3L"));
        assert!(data.contains_key("SN"));
        assert!(!data.contains_key("MFSTATUS"));
        assert_eq!(data.get("FANLMINMAX"), Some(&DataValue::from([0u16, 5, 0, 1, 0, 1])));
    }

    #[test]
    fn test_static_data_merges_host() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "GET STDT"));
        assert_eq!(data.keys().next(), Some("LABEL"));
        assert_eq!(data.get("CHRONOTYPE"), Some(&DataValue::Int(0)));
        assert_eq!(data.get("WMODE"), Some(&DataValue::from("sta")));
        assert_eq!(data.get("DNS"), Some(&DataValue::TextArray(vec!["0.0.0.0".to_string()])));
        assert_eq!(data.get("CLOUD_ENABLED"), Some(&DataValue::Bool(true)));
        assert_eq!(data.get("STOVETYPE"), Some(&DataValue::Int(1)));
    }

    #[test]
    fn test_label_needs_no_device() {
        let mut stove = SimulatedStove::new();
        stove.set_offline(true);
        let data = data_of(run(&mut stove, "GET LABL"));
        assert_eq!(data.to_json(), r#"{"LABEL":"stovelink"}"#);
    }

    #[test]
    fn test_chrono_day_and_program() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "SET CDAY 1 2 3"));
        assert_eq!(data.to_json(), r#"{"D1":{"M2":"P3"}}"#);
        let data = data_of(run(&mut stove, "SET CDAY 1 2 0"));
        assert_eq!(data.to_json(), r#"{"D1":{"M2":"OFF"}}"#);

        let data = data_of(run(&mut stove, "SET CPRD 2 20 6 30 9 5"));
        assert_eq!(
            data.to_json(),
            r#"{"P2":{"CHRSETP":20.00,"START":"06:30","STOP":"09:05"}}"#
        );

        let data = data_of(run(&mut stove, "GET CHRD"));
        assert_eq!(data.get("CHRSTATUS"), Some(&DataValue::Int(0)));
        let d1 = DataMap::new()
            .with("M1", "OFF")
            .with("M2", "OFF")
            .with("M3", "OFF");
        assert_eq!(data.get("D1"), Some(&DataValue::Object(d1)));
        assert_eq!(data.len(), 1 + 6 + 7);
    }

    #[test]
    fn test_chrono_setters_have_no_category() {
        let rule = find_rule("SET CSET 1 20", false).unwrap();
        assert_eq!(rule.category, None);
        let mut stove = SimulatedStove::new();
        let outcome = run(&mut stove, "SET CSET 1 20");
        assert_eq!(
            outcome,
            CommandOutcome::Completed {
                category: None,
                data: DataMap::new()
            }
        );
    }

    #[test]
    fn test_parameters() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "SET PARM 12 3"));
        assert_eq!(data.to_json(), r#"{"PAR12":3}"#);
        let data = data_of(run(&mut stove, "GET PARM 12"));
        assert_eq!(data.to_json(), r#"{"PAR12":3}"#);

        let data = data_of(run(&mut stove, "SET HPAR 4 300"));
        assert_eq!(data.to_json(), r#"{"HPAR4":300}"#);
        let data = data_of(run(&mut stove, "GET HPAR 4"));
        assert_eq!(data.to_json(), r#"{"HPAR4":300}"#);
    }

    #[test]
    fn test_power_change_fields() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "SET POWR 4"));
        assert_eq!(
            data.to_json(),
            r#"{"PWR":4,"F2L":3,"FANLMINMAX":[0,5,0,1,0,1]}"#
        );
    }

    #[test]
    fn test_io_names() {
        let mut stove = SimulatedStove::new();
        let data = data_of(run(&mut stove, "GET IOPT"));
        let keys: Vec<_> = data.keys().collect();
        assert_eq!(keys[0], "IN_I01");
        assert_eq!(keys[4], "OUT_O01");
        assert_eq!(keys.len(), 11);
    }

    #[test]
    fn test_device_failure() {
        let mut stove = SimulatedStove::new();
        stove.set_offline(true);
        assert_eq!(run(&mut stove, "GET STAT"), CommandOutcome::DeviceFailed);
        assert_eq!(run(&mut stove, "SET POWR 3"), CommandOutcome::DeviceFailed);
    }

    #[test]
    fn test_no_rule_is_shadowed() {
        for rule in RULES {
            let probe = match rule.matcher {
                Matcher::Exact(code) | Matcher::Prefix(code) => code,
                Matcher::AnyOf(codes) => codes[0],
            };
            let found = find_rule(probe, true).unwrap();
            assert!(std::ptr::eq(found, rule), "{} is shadowed", probe);
        }
    }
}
