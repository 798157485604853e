//! Host stand-ins for the board: a virtual clock, a scripted DHCP client and
//! in-memory sockets.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::task::Poll;
use std::time::Duration;

use alarm_core::bootstrap::{Lease, LeaseClient, LeaseResult};
use alarm_core::config::NetConfig;
use alarm_core::http::SlotSocket;
use alarm_core::scheduler::Clock;

/// Largest chunk a [`MemorySocket`] accepts per write, so long responses
/// span several ticks the way they do on the W5500.
pub const WRITE_CHUNK: usize = 1_024;

/// Clock that only moves when told to, or when the loop delays.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Duration,
}

impl VirtualClock {
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.now
    }

    async fn delay(&mut self, duration: Duration) {
        self.now += duration;
    }
}

/// Lease granted by the simulated DHCP server.
pub fn simulated_lease(last_octet: u8) -> Lease {
    Lease {
        config: NetConfig::new(
            Ipv4Addr::new(192, 168, 1, last_octet),
            Ipv4Addr::new(255, 255, 255, 0),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 1, 1),
        ),
        lease_time: Duration::from_secs(86_400),
    }
}

/// Client-side calls observed by [`ScriptedLease`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LeaseCall {
    Start,
    Apply(Lease),
    Stop,
}

/// DHCP client replaying queued outcomes, one per step.
#[derive(Debug, Default)]
pub struct ScriptedLease {
    queued: VecDeque<LeaseResult>,
    calls: Vec<LeaseCall>,
}

impl ScriptedLease {
    pub fn queue(&mut self, result: LeaseResult) {
        self.queued.push_back(result);
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    pub fn calls(&self) -> &[LeaseCall] {
        &self.calls
    }
}

impl LeaseClient for ScriptedLease {
    fn start(&mut self) {
        self.calls.push(LeaseCall::Start);
    }

    fn step(&mut self, _now: Duration) -> LeaseResult {
        self.queued.pop_front().unwrap_or(LeaseResult::Pending)
    }

    fn apply(&mut self, lease: &Lease) {
        self.calls.push(LeaseCall::Apply(*lease));
    }

    fn stop(&mut self) {
        self.calls.push(LeaseCall::Stop);
        self.queued.clear();
    }
}

/// Socket fed by the REPL: one queued request becomes one connection.
#[derive(Debug, Default)]
pub struct MemorySocket {
    waiting: Option<Vec<u8>>,
    request: Vec<u8>,
    read: usize,
    response: Vec<u8>,
    completed: VecDeque<Vec<u8>>,
    connected: bool,
}

impl MemorySocket {
    /// Whether a new request can be queued.
    pub fn is_free(&self) -> bool {
        self.waiting.is_none() && !self.connected
    }

    pub fn connect(&mut self, request: Vec<u8>) {
        self.waiting = Some(request);
    }

    /// Responses whose connection has closed, oldest first.
    pub fn take_completed(&mut self) -> Vec<Vec<u8>> {
        self.completed.drain(..).collect()
    }
}

impl SlotSocket for MemorySocket {
    type Error = Infallible;

    fn poll_accept(&mut self) -> Poll<Result<(), Infallible>> {
        match self.waiting.take() {
            Some(request) => {
                self.request = request;
                self.read = 0;
                self.response.clear();
                self.connected = true;
                Poll::Ready(Ok(()))
            }
            None => Poll::Pending,
        }
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> Poll<Result<usize, Infallible>> {
        let remaining = &self.request[self.read..];
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.read += count;
        Poll::Ready(Ok(count))
    }

    fn poll_write(&mut self, data: &[u8]) -> Poll<Result<usize, Infallible>> {
        let count = data.len().min(WRITE_CHUNK);
        self.response.extend_from_slice(&data[..count]);
        Poll::Ready(Ok(count))
    }

    fn poll_close(&mut self) -> Poll<()> {
        if self.connected {
            self.connected = false;
            self.completed.push_back(std::mem::take(&mut self.response));
        }
        Poll::Ready(())
    }

    fn abort(&mut self) {
        self.connected = false;
        self.response.clear();
    }
}

/// Status line and body size of a raw response.
pub fn summarize_response(raw: &[u8]) -> (String, usize) {
    let status_end = raw
        .windows(2)
        .position(|window| window == b"\r\n")
        .unwrap_or(raw.len());
    let status = String::from_utf8_lossy(&raw[..status_end]).into_owned();
    let body = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map_or(0, |head_end| raw.len() - head_end - 4);
    (status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_socket_round_trip() {
        let mut socket = MemorySocket::default();
        assert!(socket.is_free());
        socket.connect(b"GET / HTTP/1.1\r\n\r\n".to_vec());
        assert!(!socket.is_free());
        assert_eq!(socket.poll_accept(), Poll::Ready(Ok(())));

        let mut buf = [0u8; 8];
        assert_eq!(socket.poll_read(&mut buf), Poll::Ready(Ok(8)));
        assert_eq!(&buf, b"GET / HT");

        let big = vec![b'x'; WRITE_CHUNK + 10];
        assert_eq!(socket.poll_write(&big), Poll::Ready(Ok(WRITE_CHUNK)));
        assert_eq!(socket.poll_close(), Poll::Ready(()));
        assert!(socket.is_free());
        assert_eq!(socket.take_completed()[0].len(), WRITE_CHUNK);
    }

    #[test]
    fn summarizes_status_and_body() {
        let (status, body) = summarize_response(b"HTTP/1.1 404 Not Found\r\nA: b\r\n\r\nNot Found");
        assert_eq!(status, "HTTP/1.1 404 Not Found");
        assert_eq!(body, 9);
    }

    #[test]
    fn scripted_lease_drains_in_order() {
        let mut client = ScriptedLease::default();
        client.queue(LeaseResult::Timeout);
        client.queue(LeaseResult::Leased(simulated_lease(50)));
        assert_eq!(client.step(Duration::ZERO), LeaseResult::Timeout);
        assert_eq!(
            client.step(Duration::ZERO),
            LeaseResult::Leased(simulated_lease(50))
        );
        assert_eq!(client.step(Duration::ZERO), LeaseResult::Pending);
    }
}
