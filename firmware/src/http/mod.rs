//! TCP sockets behind the HTTP slots.

use core::task::Poll;

use alarm_core::config::{HTTP_PORT, HTTP_SLOT_COUNT, SOCKET_BUFFER_SIZE};
use alarm_core::document::Page;
use alarm_core::http::{HttpSlots, SlotSocket};
use alarm_core::scheduler::{ConnectionService, SlotId};
use embassy_futures::poll_once;
use embassy_net::Stack;
use embassy_net::tcp::{Error, State, TcpSocket};

use crate::{status, telemetry};

/// Idle connections are dropped after this long.
const SOCKET_TIMEOUT: embassy_time::Duration = embassy_time::Duration::from_secs(10);

/// Receive and transmit storage for one slot.
pub struct SocketBuffers {
    rx: [u8; SOCKET_BUFFER_SIZE],
    tx: [u8; SOCKET_BUFFER_SIZE],
}

impl SocketBuffers {
    pub const fn new() -> Self {
        Self {
            rx: [0; SOCKET_BUFFER_SIZE],
            tx: [0; SOCKET_BUFFER_SIZE],
        }
    }
}

/// One listening socket, polled without ever awaiting.
///
/// Futures from [`TcpSocket`] are polled exactly once per call; wakeups are
/// unnecessary because the service loop revisits every slot each tick.
pub struct TcpSlotSocket {
    socket: TcpSocket<'static>,
    port: u16,
    listening: bool,
    closing: bool,
}

impl TcpSlotSocket {
    pub fn new(stack: Stack<'static>, buffers: &'static mut SocketBuffers, port: u16) -> Self {
        let mut socket = TcpSocket::new(stack, &mut buffers.rx, &mut buffers.tx);
        socket.set_timeout(Some(SOCKET_TIMEOUT));
        Self {
            socket,
            port,
            listening: false,
            closing: false,
        }
    }
}

impl SlotSocket for TcpSlotSocket {
    type Error = Error;

    fn poll_accept(&mut self) -> Poll<Result<(), Error>> {
        if self.listening {
            return match self.socket.state() {
                State::Listen | State::SynReceived => Poll::Pending,
                State::Closed => {
                    self.listening = false;
                    Poll::Pending
                }
                _ => {
                    self.listening = false;
                    Poll::Ready(Ok(()))
                }
            };
        }

        // A reset socket lingers briefly before it can listen again.
        if self.socket.state() != State::Closed {
            return Poll::Pending;
        }

        match poll_once(self.socket.accept(self.port)) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(_)) => Poll::Pending,
            Poll::Pending => {
                self.listening = true;
                Poll::Pending
            }
        }
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> Poll<Result<usize, Error>> {
        poll_once(self.socket.read(buf))
    }

    fn poll_write(&mut self, data: &[u8]) -> Poll<Result<usize, Error>> {
        poll_once(self.socket.write(data))
    }

    fn poll_close(&mut self) -> Poll<()> {
        if !self.closing {
            self.socket.close();
            self.closing = true;
        }
        match self.socket.state() {
            State::Closed => {
                self.closing = false;
                Poll::Ready(())
            }
            // The peer has acknowledged everything; skip the wait so the
            // slot can listen again right away.
            State::TimeWait => {
                self.socket.abort();
                self.closing = false;
                Poll::Ready(())
            }
            _ => Poll::Pending,
        }
    }

    fn abort(&mut self) {
        self.socket.abort();
        self.listening = false;
        self.closing = false;
    }
}

/// Every slot's socket, created once at boot.
pub fn sockets(
    stack: Stack<'static>,
    buffers: &'static mut [SocketBuffers; HTTP_SLOT_COUNT],
) -> [TcpSlotSocket; HTTP_SLOT_COUNT] {
    buffers
        .each_mut()
        .map(|buffers| TcpSlotSocket::new(stack, buffers, HTTP_PORT))
}

/// Slot pool that logs connection milestones and counts responses.
pub struct LoggedSlots {
    slots: HttpSlots<TcpSlotSocket, HTTP_SLOT_COUNT>,
}

impl LoggedSlots {
    pub fn new(sockets: [TcpSlotSocket; HTTP_SLOT_COUNT]) -> Self {
        Self {
            slots: HttpSlots::new(sockets),
        }
    }

    fn responses(&self, slot: SlotId) -> u32 {
        self.slots.get(slot).map_or(0, |slot| slot.responses())
    }
}

impl ConnectionService for LoggedSlots {
    fn service(&mut self, slot: SlotId, page: &Page<'_>) {
        let before = self.responses(slot);
        let event = self.slots.service_slot(slot, page);
        if self.responses(slot) != before {
            status::record_response();
        }
        if let Some(line) = event.and_then(|event| telemetry::slot_line(slot, event)) {
            telemetry::emit(&line);
        }
    }
}
