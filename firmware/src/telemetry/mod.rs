//! Log formatting for the service loop.
//!
//! Lines are composed into fixed-capacity strings and then handed to defmt on
//! the target or stdout on the host, so the wording is testable off-device.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write as _;
use core::time::Duration;

use alarm_core::bootstrap::{BootstrapEvent, Lease};
use alarm_core::config::NetConfig;
use alarm_core::http::SlotEvent;
use alarm_core::scheduler::{SchedulerState, SlotId, TickReport};
use alarm_core::tracker::{PinLevel, Sensor};
use heapless::String;

use crate::status::{self, FirmwareStatus};

/// Capacity of a single formatted log line.
pub const LOG_LINE_CAPACITY: usize = 112;

/// Interval between heartbeat lines while the loop runs.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

/// Severity of a log line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    #[cfg_attr(target_os = "none", allow(dead_code))]
    const fn label(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// A formatted line tagged with the subsystem that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogLine {
    pub level: Level,
    pub topic: &'static str,
    pub text: String<LOG_LINE_CAPACITY>,
}

impl LogLine {
    fn new(topic: &'static str) -> Self {
        Self {
            level: Level::Info,
            topic,
            text: String::new(),
        }
    }

    fn at(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

// Overlong lines are cut at capacity; formatting errors carry no other cause.
macro_rules! log_line {
    ($topic:expr, $($arg:tt)*) => {{
        let mut line = LogLine::new($topic);
        let _ = write!(line.text, $($arg)*);
        line
    }};
}

fn write_config(line: &mut LogLine, config: &NetConfig) {
    let _ = write!(
        line.text,
        "{}/{} gw {} dns {}",
        config.ip,
        config.prefix_len(),
        config.gateway,
        config.dns
    );
}

fn lease_line(verb: &str, lease: &Lease) -> LogLine {
    let mut line = log_line!("dhcp", "{verb} ");
    write_config(&mut line, &lease.config);
    if !lease.lease_time.is_zero() {
        let _ = write!(line.text, " for {}s", lease.lease_time.as_secs());
    }
    line
}

/// Describes a bootstrap transition.
pub fn bootstrap_line(event: &BootstrapEvent) -> LogLine {
    match event {
        BootstrapEvent::Started => log_line!("dhcp", "client running"),
        BootstrapEvent::Leased(lease) => lease_line("leased", lease),
        BootstrapEvent::Renewed(lease) => lease_line("renewed", lease),
        BootstrapEvent::Timeout { attempt, limit } => {
            log_line!("dhcp", "timeout, retry {attempt}/{limit}").at(Level::Warn)
        }
        BootstrapEvent::LeaseLost => {
            log_line!("dhcp", "lease lost, reacquiring").at(Level::Warn)
        }
        BootstrapEvent::Failed(reason) => log_line!("dhcp", "{reason}").at(Level::Error),
    }
}

/// Announces a compiled-in static configuration.
pub fn static_config_line(config: &NetConfig) -> LogLine {
    let mut line = log_line!("net", "static ");
    write_config(&mut line, config);
    line
}

/// Describes a slot event worth logging; byte-level progress is skipped.
pub fn slot_line(slot: SlotId, event: SlotEvent) -> Option<LogLine> {
    let index = slot.index();
    match event {
        SlotEvent::Accepted => Some(log_line!("http", "slot {index} accepted")),
        SlotEvent::Responding(status) => Some(log_line!(
            "http",
            "slot {index} {} {}",
            status.code(),
            status.reason()
        )),
        SlotEvent::Aborted => Some(log_line!("http", "slot {index} aborted").at(Level::Warn)),
        SlotEvent::Sent { .. } | SlotEvent::Closed => None,
    }
}

/// Describes a sensor edge.
pub fn edge_line(sensor: Sensor, level: PinLevel, at: Duration) -> LogLine {
    let level = if level.is_high() { "high" } else { "low" };
    log_line!("sensor", "{} {level} at {}ms", sensor.label(), at.as_millis())
}

/// Summarises the published status.
pub fn heartbeat_line(status: &FirmwareStatus) -> LogLine {
    let mut line = log_line!(
        "status",
        "tick {} {} served {}",
        status.ticks,
        status.bootstrap.label(),
        status.responses
    );
    if let Some(address) = status.address {
        let _ = write!(line.text, " at {address}");
    }
    line
}

/// Tracks what has already been reported across ticks.
pub struct TelemetryRecorder {
    next_heartbeat: Duration,
    halt_reported: bool,
}

impl TelemetryRecorder {
    pub const fn new() -> Self {
        Self {
            next_heartbeat: Duration::ZERO,
            halt_reported: false,
        }
    }

    /// Publishes a tick to the status store and logs its transitions.
    pub fn record_tick(&mut self, report: &TickReport) {
        status::record_tick(report);

        if let Some(event) = report.bootstrap.and_then(|step| step.event) {
            match event {
                BootstrapEvent::Leased(lease) | BootstrapEvent::Renewed(lease) => {
                    status::record_address(Some(lease.config.ip));
                }
                BootstrapEvent::LeaseLost | BootstrapEvent::Failed(_) => {
                    status::record_address(None);
                }
                BootstrapEvent::Started | BootstrapEvent::Timeout { .. } => {}
            }
            emit(&bootstrap_line(&event));
        }

        if let SchedulerState::Halted(reason) = report.state
            && !self.halt_reported
        {
            self.halt_reported = true;
            emit(&log_line!("service", "halted: {reason}").at(Level::Error));
        }

        if let Some(now) = report.rendered_at
            && now >= self.next_heartbeat
        {
            self.next_heartbeat = now + HEARTBEAT_PERIOD;
            emit(&heartbeat_line(&status::snapshot()));
        }
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "none")]
pub fn emit(line: &LogLine) {
    let (topic, text) = (line.topic, line.text.as_str());
    match line.level {
        Level::Info => defmt::info!("{=str}: {=str}", topic, text),
        Level::Warn => defmt::warn!("{=str}: {=str}", topic, text),
        Level::Error => defmt::error!("{=str}: {=str}", topic, text),
    }
}

#[cfg(not(target_os = "none"))]
pub fn emit(line: &LogLine) {
    println!("[{}] {}: {}", line.level.label(), line.topic, line.text);
}
