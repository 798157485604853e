use std::io;
use std::time::Duration;

use alarm_core::config::{AddressingMode, STATIC_NET_CONFIG};
use alarm_core::tracker::{EventTracker, PinLevel};

#[allow(dead_code)]
#[path = "../host.rs"]
mod host;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Motion)?;
    record_profile(TranscriptProfile::Door)?;
    record_profile(TranscriptProfile::DhcpFailure)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let tracker = EventTracker::new(Duration::ZERO, PinLevel::Low);
    let addressing = match profile {
        TranscriptProfile::DhcpFailure => AddressingMode::Dhcp,
        _ => AddressingMode::Static(STATIC_NET_CONFIG),
    };
    let mut session = Session::new(&tracker, addressing, Some(profile))?;
    let script: &[&str] = match profile {
        TranscriptProfile::Motion => &[
            "advance 5000",
            "motion",
            "tick",
            "page",
            "advance 12000",
            "tick",
            "page",
            "get /",
            "tick 8",
        ],
        TranscriptProfile::Door => &[
            "door open",
            "advance 2000",
            "door close",
            "tick",
            "page",
            "advance 3000",
            "tick",
            "page",
            "head /",
            "get /favicon.ico",
            "tick 8",
        ],
        TranscriptProfile::DhcpFailure => &[
            "tick",
            "lease timeout",
            "lease timeout",
            "lease timeout",
            "lease timeout",
            "lease timeout",
            "lease timeout",
            "tick 10",
            "status",
        ],
        TranscriptProfile::Interactive => &["help"],
    };

    for command in script {
        let _ = session.handle_command(command)?;
    }
    Ok(())
}
