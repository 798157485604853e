use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use alarm_core::bootstrap::{BootstrapController, BootstrapEvent, LeaseResult};
use alarm_core::config::{AddressingMode, DHCP_RETRY_LIMIT, HTTP_SLOT_COUNT};
use alarm_core::document::{DocumentTemplate, FieldId};
use alarm_core::http::HttpSlots;
use alarm_core::scheduler::{SchedulerState, ServiceScheduler, SlotId, TickReport};
use alarm_core::tracker::{EventTracker, PinLevel, Sensor};
use embassy_futures::block_on;

use crate::host::{MemorySocket, ScriptedLease, VirtualClock, simulated_lease, summarize_response};

/// Upper bound for a single `tick <n>` command.
const MAX_TICKS_PER_COMMAND: u32 = 1_000;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "door",
        "door <open|close>              - raise a door contact edge",
    ),
    (
        "motion",
        "motion                         - raise a motion detector edge",
    ),
    (
        "advance",
        "advance <ms>                   - move the virtual clock forward",
    ),
    (
        "tick",
        "tick [count]                   - run service loop ticks (default 1)",
    ),
    (
        "lease",
        "lease <ok|renew|timeout|conflict> - queue a DHCP outcome",
    ),
    (
        "get",
        "get <path> | head <path>       - queue an HTTP request on a free slot",
    ),
    (
        "page",
        "page                           - show the rendered status fields",
    ),
    (
        "status",
        "status                         - display loop, bootstrap and slot state",
    ),
    (
        "help",
        "help [topic]                   - show help for a command",
    ),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Interactive,
    Motion,
    Door,
    DhcpFailure,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "transcripts/emulator-interactive.log",
            TranscriptProfile::Motion => "transcripts/emulator-motion.log",
            TranscriptProfile::Door => "transcripts/emulator-door.log",
            TranscriptProfile::DhcpFailure => "transcripts/emulator-dhcp-failure.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "Home alarm emulator session transcript",
            TranscriptProfile::Motion => "Home alarm emulator motion transcript",
            TranscriptProfile::Door => "Home alarm emulator door transcript",
            TranscriptProfile::DhcpFailure => "Home alarm emulator DHCP failure transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        [
            ("interactive", Self::Interactive),
            ("motion", Self::Motion),
            ("door", Self::Door),
            ("dhcp-failure", Self::DhcpFailure),
        ]
        .into_iter()
        .find(|(name, _)| tag.eq_ignore_ascii_case(name))
        .map(|(_, profile)| profile)
        .ok_or_else(|| format!("Unknown transcript profile `{tag}`"))
    }
}

type EmulatedScheduler<'a> = ServiceScheduler<
    'a,
    VirtualClock,
    ScriptedLease,
    HttpSlots<MemorySocket, HTTP_SLOT_COUNT>,
    HTTP_SLOT_COUNT,
>;

pub struct Session<'a> {
    scheduler: EmulatedScheduler<'a>,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
}

impl<'a> Session<'a> {
    /// Builds a session; `profile` selects the transcript file, if any.
    pub fn new(
        tracker: &'a EventTracker,
        addressing: AddressingMode,
        profile: Option<TranscriptProfile>,
    ) -> io::Result<Self> {
        let transcript = profile.map(TranscriptLogger::new).transpose()?;
        let document =
            DocumentTemplate::status_page().map_err(|error| io::Error::other(error.to_string()))?;
        let bootstrap =
            BootstrapController::new(addressing, ScriptedLease::default(), DHCP_RETRY_LIMIT);
        let slots = HttpSlots::new(std::array::from_fn(|_| MemorySocket::default()));

        Ok(Self {
            scheduler: ServiceScheduler::new(
                VirtualClock::default(),
                bootstrap,
                tracker,
                document,
                slots,
            ),
            transcript,
            started_at: HostInstant::now(),
        })
    }

    pub fn scheduler(&self) -> &EmulatedScheduler<'a> {
        &self.scheduler
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        if let Some(transcript) = &mut self.transcript {
            transcript.append_line(elapsed, TranscriptRole::Host, trimmed)?;
        }

        let words: Vec<&str> = trimmed.split_whitespace().collect();
        let lines = match words.as_slice() {
            ["help"] => help(None),
            ["help", topic] => help(Some(topic)),
            ["door", "open"] => self.edge(Sensor::Door, PinLevel::High),
            ["door", "close" | "closed"] => self.edge(Sensor::Door, PinLevel::Low),
            ["motion"] => self.edge(Sensor::Motion, PinLevel::High),
            ["advance", ms] => match ms.parse::<u64>() {
                Ok(ms) => self.advance(Duration::from_millis(ms)),
                Err(_) => vec![format!("ERR syntax expected milliseconds, got `{ms}`")],
            },
            ["tick"] => self.tick(1),
            ["tick", count] => match count.parse::<u32>() {
                Ok(count) if (1..=MAX_TICKS_PER_COMMAND).contains(&count) => self.tick(count),
                _ => vec![format!(
                    "ERR syntax tick count must be 1..={MAX_TICKS_PER_COMMAND}"
                )],
            },
            ["lease", outcome] => self.lease(outcome),
            ["get", path] => self.request("GET", path),
            ["head", path] => self.request("HEAD", path),
            ["page"] => self.page(),
            ["status"] => self.status(),
            [command, ..] => vec![format!(
                "ERR unknown command `{command}`; try `help`"
            )],
            [] => Vec::new(),
        };

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    fn edge(&mut self, sensor: Sensor, level: PinLevel) -> Vec<String> {
        let now = self.now();
        self.scheduler.tracker().on_pin_change(sensor, level, now);
        let level = if level.is_high() { "high" } else { "low" };
        vec![format!(
            "{} {level} at {}ms",
            sensor.label(),
            now.as_millis()
        )]
    }

    fn advance(&mut self, by: Duration) -> Vec<String> {
        self.scheduler.clock_mut().advance(by);
        vec![format!("clock now {}ms", self.now().as_millis())]
    }

    fn tick(&mut self, count: u32) -> Vec<String> {
        let mut lines = Vec::new();
        for _ in 0..count {
            let report = block_on(self.scheduler.tick());
            lines.extend(describe_tick(&report));
            lines.extend(self.drain_responses());
            if let SchedulerState::Halted(_) = report.state {
                break;
            }
        }

        let state = match self.scheduler.state() {
            SchedulerState::Running => format!("{:?}", self.scheduler.bootstrap().state()),
            SchedulerState::Halted(reason) => format!("halted ({reason})"),
        };
        lines.push(format!(
            "tick {} at {}ms: {state}",
            self.scheduler.ticks(),
            self.now().as_millis()
        ));
        lines
    }

    fn lease(&mut self, outcome: &str) -> Vec<String> {
        let result = match outcome {
            "ok" => LeaseResult::Leased(simulated_lease(50)),
            "renew" => LeaseResult::Renewed(simulated_lease(51)),
            "timeout" => LeaseResult::Timeout,
            "conflict" => LeaseResult::Conflict,
            other => {
                return vec![format!(
                    "ERR syntax lease outcome `{other}`; expected ok, renew, timeout or conflict"
                )];
            }
        };
        let client = self.scheduler.bootstrap_mut().client_mut();
        client.queue(result);
        vec![format!("queued {outcome} ({} pending)", client.queued())]
    }

    fn request(&mut self, method: &str, path: &str) -> Vec<String> {
        let slots = self.scheduler.slots_mut();
        for index in 0..HTTP_SLOT_COUNT {
            let slot = SlotId(index);
            let Some(socket) = slots.get_mut(slot).map(|slot| slot.socket_mut()) else {
                continue;
            };
            if socket.is_free() {
                let request = format!("{method} {path} HTTP/1.1\r\nHost: emulator\r\n\r\n");
                socket.connect(request.into_bytes());
                return vec![format!("slot {index} connecting: {method} {path}")];
            }
        }
        vec!["ERR busy every slot holds a connection".to_string()]
    }

    fn page(&self) -> Vec<String> {
        let document = self.scheduler.document();
        [
            ("lastMotionMs", FieldId::MotionElapsed),
            ("doorState", FieldId::DoorLabel),
            ("lastDoorChangeMs", FieldId::DoorElapsed),
        ]
        .into_iter()
        .map(|(name, id)| {
            format!(
                "{name:<16} [{}]",
                String::from_utf8_lossy(document.field(id))
            )
        })
        .collect()
    }

    fn status(&self) -> Vec<String> {
        let scheduler = &self.scheduler;
        let mut lines = vec![
            format!(
                "loop: {:?} after {} ticks, clock {}ms",
                scheduler.state(),
                scheduler.ticks(),
                self.now().as_millis()
            ),
            format!(
                "bootstrap: {:?} (retry limit {})",
                scheduler.bootstrap().state(),
                scheduler.bootstrap().retry_limit()
            ),
        ];
        let client = scheduler.bootstrap().client();
        lines.push(format!(
            "dhcp client: {} outcomes queued, last call {:?}",
            client.queued(),
            client.calls().last()
        ));
        let snapshot = scheduler.tracker().snapshot();
        lines.push(format!(
            "door: {} since {}ms, motion at {}ms",
            if snapshot.door.is_open { "open" } else { "closed" },
            snapshot.door.change.last_timestamp.as_millis(),
            snapshot.motion.last_timestamp.as_millis()
        ));
        for (index, slot) in scheduler.slots().iter().enumerate() {
            lines.push(format!(
                "slot {index}: {:?}, {} responses",
                slot.phase(),
                slot.responses()
            ));
        }
        lines
    }

    fn drain_responses(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for index in 0..HTTP_SLOT_COUNT {
            let Some(slot) = self.scheduler.slots_mut().get_mut(SlotId(index)) else {
                continue;
            };
            for response in slot.socket_mut().take_completed() {
                let (status, body) = summarize_response(&response);
                lines.push(format!("slot {index} answered `{status}` with {body} body bytes"));
            }
        }
        lines
    }

    fn now(&self) -> Duration {
        use alarm_core::scheduler::Clock as _;
        self.scheduler.clock().now()
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        if let Some(transcript) = &mut self.transcript {
            for line in lines {
                transcript.append_line(elapsed, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(())
    }
}

fn describe_tick(report: &TickReport) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(event) = report.bootstrap.and_then(|step| step.event) {
        lines.push(match event {
            BootstrapEvent::Started => "dhcp: client running".to_string(),
            BootstrapEvent::Leased(lease) => format!(
                "dhcp: leased {}/{} for {}s",
                lease.config.ip,
                lease.config.prefix_len(),
                lease.lease_time.as_secs()
            ),
            BootstrapEvent::Renewed(lease) => format!("dhcp: renewed {}", lease.config.ip),
            BootstrapEvent::Timeout { attempt, limit } => {
                format!("dhcp: timeout, retry {attempt}/{limit}")
            }
            BootstrapEvent::LeaseLost => "dhcp: lease lost, reacquiring".to_string(),
            BootstrapEvent::Failed(reason) => format!("dhcp: {reason}"),
        });
    }
    if report.throttled {
        lines.push(format!(
            "throttled, rendered at {}ms",
            report.rendered_at.unwrap_or_default().as_millis()
        ));
    }
    if let SchedulerState::Halted(reason) = report.state {
        lines.push(format!("service halted: {reason}"));
    }
    lines
}

fn help(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# {}", profile.header())?;
        writeln!(
            logger.writer,
            "# Timestamps are wall-clock milliseconds since session start"
        )?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_core::config::STATIC_NET_CONFIG;

    fn run(session: &mut Session<'_>, commands: &[&str]) -> Vec<String> {
        commands
            .iter()
            .flat_map(|command| session.handle_command(command).expect("command runs"))
            .collect()
    }

    #[test]
    fn motion_scenario_renders_elapsed_time() {
        let tracker = EventTracker::new(Duration::ZERO, PinLevel::High);
        let mut session =
            Session::new(&tracker, AddressingMode::Static(STATIC_NET_CONFIG), None)
                .expect("session");

        run(&mut session, &["advance 5000", "motion", "tick"]);
        let page = run(&mut session, &["page"]);
        assert_eq!(page[0], "lastMotionMs     [           0]");

        run(&mut session, &["advance 12000", "tick"]);
        let page = run(&mut session, &["page"]);
        assert_eq!(page[0], "lastMotionMs     [       12000]");
        assert_eq!(page[1], "doorState        [  \"OPEN\"]");
    }

    #[test]
    fn dhcp_failure_halts_after_six_timeouts() {
        let tracker = EventTracker::new(Duration::ZERO, PinLevel::Low);
        let mut session = Session::new(&tracker, AddressingMode::Dhcp, None).expect("session");

        let mut commands = vec!["tick"];
        commands.extend(["lease timeout"; 6]);
        run(&mut session, &commands);
        let output = run(&mut session, &["tick 10"]);

        assert!(output.contains(&"dhcp: DHCP failed after 6 timeouts".to_string()));
        assert_eq!(
            session.scheduler().state(),
            SchedulerState::Halted(alarm_core::bootstrap::FailReason::RetryLimitExceeded {
                attempts: 6
            })
        );
        assert_eq!(session.scheduler().ticks(), 7);
    }

    #[test]
    fn queued_request_is_answered_within_a_few_ticks() {
        let tracker = EventTracker::new(Duration::ZERO, PinLevel::Low);
        let mut session =
            Session::new(&tracker, AddressingMode::Static(STATIC_NET_CONFIG), None)
                .expect("session");

        run(&mut session, &["get /", "get /missing"]);
        let output = run(&mut session, &["tick 10"]);

        assert!(output.iter().any(|line| line.starts_with("slot 0 answered `HTTP/1.1 200 OK` with 3808")));
        assert!(output.iter().any(|line| line.starts_with("slot 1 answered `HTTP/1.1 404 Not Found`")));
    }

    #[test]
    fn unknown_commands_and_help() {
        let tracker = EventTracker::new(Duration::ZERO, PinLevel::Low);
        let mut session = Session::new(&tracker, AddressingMode::Dhcp, None).expect("session");

        assert_eq!(
            run(&mut session, &["jump"]),
            vec!["ERR unknown command `jump`; try `help`".to_string()]
        );
        assert_eq!(run(&mut session, &["help tick"]).len(), 1);
        assert!(TranscriptProfile::from_tag("DOOR").is_ok());
        assert!(TranscriptProfile::from_tag("reboot").is_err());
    }
}
