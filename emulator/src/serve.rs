//! Serves the status page on a real host port.
//!
//! The scheduler runs on the main thread exactly as on the board; a stdin
//! reader thread plays the part of the edge interrupts.

use std::io::{self, BufRead, ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::rc::Rc;
use std::task::Poll;
use std::thread;
use std::time::{Duration, Instant};

use alarm_core::bootstrap::BootstrapController;
use alarm_core::config::{AddressingMode, DHCP_RETRY_LIMIT, HTTP_SLOT_COUNT, NetConfig};
use alarm_core::document::DocumentTemplate;
use alarm_core::http::{HttpSlots, SlotSocket};
use alarm_core::scheduler::{Clock, ServiceScheduler};
use alarm_core::tracker::{EventTracker, PinLevel, Sensor};
use embassy_futures::block_on;

use crate::host::ScriptedLease;

/// Pause between ticks so an idle server does not spin a core.
const IDLE_PAUSE: Duration = Duration::from_millis(2);

/// Wall clock measured from server start.
pub struct SystemClock {
    boot: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.boot.elapsed()
    }

    async fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Non-blocking std socket sharing one listener with the other slots.
pub struct HostSocket {
    listener: Rc<TcpListener>,
    stream: Option<TcpStream>,
}

impl HostSocket {
    pub fn new(listener: Rc<TcpListener>) -> Self {
        Self {
            listener,
            stream: None,
        }
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::from(ErrorKind::NotConnected))
    }
}

fn would_block<T>(result: io::Result<T>) -> Poll<io::Result<T>> {
    match result {
        Err(error) if error.kind() == ErrorKind::WouldBlock => Poll::Pending,
        other => Poll::Ready(other),
    }
}

impl SlotSocket for HostSocket {
    type Error = io::Error;

    fn poll_accept(&mut self) -> Poll<io::Result<()>> {
        match would_block(self.listener.accept()) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok((stream, _peer))) => {
                let accepted = stream.set_nonblocking(true);
                self.stream = Some(stream);
                Poll::Ready(accepted)
            }
            Poll::Ready(Err(error)) => Poll::Ready(Err(error)),
        }
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        match self.stream() {
            Ok(stream) => would_block(stream.read(buf)),
            Err(error) => Poll::Ready(Err(error)),
        }
    }

    fn poll_write(&mut self, data: &[u8]) -> Poll<io::Result<usize>> {
        match self.stream() {
            Ok(stream) => would_block(stream.write(data)),
            Err(error) => Poll::Ready(Err(error)),
        }
    }

    fn poll_close(&mut self) -> Poll<()> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Write);
        }
        Poll::Ready(())
    }

    fn abort(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Maps a console line to a sensor edge.
pub fn parse_edge(line: &str) -> Option<(Sensor, PinLevel)> {
    let mut words = line.split_whitespace();
    match (words.next()?, words.next()) {
        ("door", Some("open")) => Some((Sensor::Door, PinLevel::High)),
        ("door", Some("close" | "closed")) => Some((Sensor::Door, PinLevel::Low)),
        ("motion", None) => Some((Sensor::Motion, PinLevel::High)),
        _ => None,
    }
}

/// Binds `addr` and serves until stdin closes the process or the loop halts.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the page fails to load.
pub fn run(addr: SocketAddr) -> io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    let local = listener.local_addr()?;
    let listener = Rc::new(listener);

    let clock = SystemClock::new();
    let tracker: &'static EventTracker =
        Box::leak(Box::new(EventTracker::new(clock.now(), PinLevel::Low)));
    spawn_console(tracker, clock.boot);

    let document =
        DocumentTemplate::status_page().map_err(|error| io::Error::other(error.to_string()))?;
    let sockets: [HostSocket; HTTP_SLOT_COUNT] =
        std::array::from_fn(|_| HostSocket::new(Rc::clone(&listener)));
    let host_config = match local {
        SocketAddr::V4(v4) => NetConfig::new(
            *v4.ip(),
            Ipv4Addr::new(255, 255, 255, 0),
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
        ),
        SocketAddr::V6(_) => return Err(io::Error::other("IPv4 address required")),
    };
    let bootstrap = BootstrapController::new(
        AddressingMode::Static(host_config),
        ScriptedLease::default(),
        DHCP_RETRY_LIMIT,
    );
    let mut scheduler: ServiceScheduler<'_, _, _, _, HTTP_SLOT_COUNT> = ServiceScheduler::new(
        clock,
        bootstrap,
        tracker,
        document,
        HttpSlots::new(sockets),
    );

    println!("Serving the status page on http://{local}/");
    println!("Type `door open`, `door close` or `motion` to simulate sensor edges.");
    let reason = block_on(scheduler.run(|_| thread::sleep(IDLE_PAUSE)));
    Err(io::Error::other(reason.to_string()))
}

fn spawn_console(tracker: &'static EventTracker, boot: Instant) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_edge(line.trim()) {
                Some((sensor, level)) => {
                    let at = boot.elapsed();
                    tracker.on_pin_change(sensor, level, at);
                    println!("{} edge at {}ms", sensor.label(), at.as_millis());
                }
                None => println!("expected `door open`, `door close` or `motion`"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_core::scheduler::SlotId;

    #[test]
    fn parses_console_edges() {
        assert_eq!(parse_edge("door open"), Some((Sensor::Door, PinLevel::High)));
        assert_eq!(parse_edge("door closed"), Some((Sensor::Door, PinLevel::Low)));
        assert_eq!(parse_edge("motion"), Some((Sensor::Motion, PinLevel::High)));
        assert_eq!(parse_edge("door ajar"), None);
        assert_eq!(parse_edge(""), None);
    }

    #[test]
    fn serves_the_page_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");
        let mut slots: HttpSlots<HostSocket, 2> = HttpSlots::new([
            HostSocket::new(Rc::new(listener.try_clone().expect("clone listener"))),
            HostSocket::new(Rc::new(listener)),
        ]);
        let document = DocumentTemplate::status_page().expect("status page");
        let page = document.page();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).expect("connect");
            stream
                .write_all(b"GET / HTTP/1.1\r\nHost: test\r\n\r\n")
                .expect("send request");
            let mut response = Vec::new();
            stream.read_to_end(&mut response).expect("read response");
            response
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while !client.is_finished() && Instant::now() < deadline {
            for index in 0..2 {
                let _ = slots.service_slot(SlotId(index), &page);
            }
            thread::sleep(Duration::from_millis(1));
        }

        let response = client.join().expect("client thread");
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(document.as_bytes()));
    }
}
