mod host;
mod serve;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::process;

use alarm_core::config::{AddressingMode, STATIC_NET_CONFIG};
use alarm_core::tracker::{EventTracker, PinLevel};
use session::{Session, TranscriptProfile};

const USAGE: &str = "Usage: alarm-emulator [--profile <interactive|motion|door|dhcp-failure>] [--static]\n       alarm-emulator --serve <addr:port>";

enum Mode {
    Repl {
        profile: Option<TranscriptProfile>,
        addressing: AddressingMode,
    },
    Serve(SocketAddr),
}

fn main() -> io::Result<()> {
    let mode = parse_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    match mode {
        Mode::Serve(addr) => serve::run(addr),
        Mode::Repl {
            profile,
            addressing,
        } => repl(profile, addressing),
    }
}

fn repl(profile: Option<TranscriptProfile>, addressing: AddressingMode) -> io::Result<()> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let tracker = EventTracker::new(std::time::Duration::ZERO, PinLevel::Low);
    let mut session = Session::new(&tracker, addressing, profile)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Home alarm emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Mode, String> {
    let mut profile = None;
    let mut addressing = AddressingMode::Dhcp;

    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--profile=") {
            profile = Some(TranscriptProfile::from_tag(value)?);
        } else if arg == "--profile" {
            let value = args.next().ok_or("Expected value after --profile")?;
            profile = Some(TranscriptProfile::from_tag(&value)?);
        } else if arg == "--static" {
            addressing = AddressingMode::Static(STATIC_NET_CONFIG);
        } else if arg == "--serve" {
            let value = args.next().ok_or("Expected address after --serve")?;
            let addr = value
                .parse()
                .map_err(|_| format!("Invalid listen address `{value}`"))?;
            return Ok(Mode::Serve(addr));
        } else {
            return Err(format!("Unexpected argument `{arg}`"));
        }
    }

    Ok(Mode::Repl {
        profile,
        addressing,
    })
}
