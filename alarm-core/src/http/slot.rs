//! Per-connection state machine driven one step per tick.

use core::fmt;
use core::task::Poll;

use heapless::{String, Vec};

use super::{Body, HEAD_CAPACITY, Response, Status, head_complete, respond, write_head};
use crate::config::REQUEST_BUFFER_SIZE;
use crate::document::{LIVE_SPAN_CAPACITY, Page};
use crate::scheduler::{ConnectionService, SlotId};

/// Non-blocking TCP socket bound to one slot.
///
/// Every method must return immediately; `Poll::Pending` means "try again
/// next tick".
pub trait SlotSocket {
    type Error: fmt::Debug;

    /// Listens for, or completes, an incoming connection.
    fn poll_accept(&mut self) -> Poll<Result<(), Self::Error>>;

    /// Reads available bytes. `Ready(Ok(0))` means the peer closed.
    fn poll_read(&mut self, buf: &mut [u8]) -> Poll<Result<usize, Self::Error>>;

    /// Queues as much of `data` as fits.
    fn poll_write(&mut self, data: &[u8]) -> Poll<Result<usize, Self::Error>>;

    /// Closes gracefully; ready once the socket can accept again.
    fn poll_close(&mut self) -> Poll<()>;

    /// Drops the connection immediately.
    fn abort(&mut self);
}

/// Coarse phase of a slot, for status reporting.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotPhase {
    Idle,
    Reading,
    Writing,
    Closing,
}

/// Something that happened on a slot during a service step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotEvent {
    Accepted,
    Responding(Status),
    Sent { bytes: usize },
    Closed,
    Aborted,
}

struct Outgoing {
    head: String<HEAD_CAPACITY>,
    body: Option<Body>,
    /// Live span of the document as rendered when the response started.
    frozen: Vec<u8, LIVE_SPAN_CAPACITY>,
    frozen_at: usize,
    sent: usize,
}

impl Outgoing {
    fn new(response: Response, page: &Page<'_>) -> Option<Self> {
        let body_len = match response.body {
            Body::Document => page.bytes().len(),
            Body::Text(text) => text.len(),
        };
        let head = write_head(&response, body_len).ok()?;
        let body = (!response.head_only).then_some(response.body);

        let mut frozen = Vec::new();
        if body == Some(Body::Document) {
            frozen.extend_from_slice(page.live_bytes()).ok()?;
        }
        Some(Self {
            head,
            body,
            frozen,
            frozen_at: page.live().start,
            sent: 0,
        })
    }

    /// Bytes still to send, starting at the current position. Never crosses
    /// into or out of the frozen span within one slice.
    fn pending<'d>(&'d self, document: &'d [u8]) -> &'d [u8] {
        let head = self.head.as_bytes();
        if self.sent < head.len() {
            return &head[self.sent..];
        }
        let offset = self.sent - head.len();
        match self.body {
            Some(Body::Document) => self.document_from(document, offset),
            Some(Body::Text(text)) => text.get(offset..).unwrap_or_default(),
            None => &[],
        }
    }

    fn document_from<'d>(&'d self, document: &'d [u8], offset: usize) -> &'d [u8] {
        let live = self.frozen_at..self.frozen_at + self.frozen.len();
        if live.contains(&offset) {
            &self.frozen[offset - live.start..]
        } else if offset < live.start {
            document.get(offset..live.start).unwrap_or_default()
        } else {
            document.get(offset..).unwrap_or_default()
        }
    }
}

enum Phase {
    Idle,
    Reading { filled: usize },
    Writing(Outgoing),
    Closing,
}

/// One HTTP connection context over a [`SlotSocket`].
pub struct HttpSlot<S> {
    socket: S,
    phase: Phase,
    request: [u8; REQUEST_BUFFER_SIZE],
    responses: u32,
}

impl<S: SlotSocket> HttpSlot<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            phase: Phase::Idle,
            request: [0; REQUEST_BUFFER_SIZE],
            responses: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> SlotPhase {
        match self.phase {
            Phase::Idle => SlotPhase::Idle,
            Phase::Reading { .. } => SlotPhase::Reading,
            Phase::Writing(_) => SlotPhase::Writing,
            Phase::Closing => SlotPhase::Closing,
        }
    }

    /// Responses fully written since creation.
    #[must_use]
    pub fn responses(&self) -> u32 {
        self.responses
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    /// Performs at most one socket operation.
    pub fn service(&mut self, page: &Page<'_>) -> Option<SlotEvent> {
        let document = page.bytes();
        match &mut self.phase {
            Phase::Idle => match self.socket.poll_accept() {
                Poll::Pending => None,
                Poll::Ready(Ok(())) => {
                    self.phase = Phase::Reading { filled: 0 };
                    Some(SlotEvent::Accepted)
                }
                Poll::Ready(Err(_)) => Some(self.abort()),
            },
            Phase::Reading { filled } => {
                let filled = *filled;
                self.read(filled, page)
            }
            Phase::Writing(outgoing) => {
                let pending = outgoing.pending(document);
                if pending.is_empty() {
                    self.responses = self.responses.wrapping_add(1);
                    self.phase = Phase::Closing;
                    return None;
                }
                match self.socket.poll_write(pending) {
                    Poll::Pending | Poll::Ready(Ok(0)) => None,
                    Poll::Ready(Ok(written)) => {
                        outgoing.sent += written;
                        Some(SlotEvent::Sent { bytes: written })
                    }
                    Poll::Ready(Err(_)) => Some(self.abort()),
                }
            }
            Phase::Closing => match self.socket.poll_close() {
                Poll::Pending => None,
                Poll::Ready(()) => {
                    self.phase = Phase::Idle;
                    Some(SlotEvent::Closed)
                }
            },
        }
    }

    fn read(&mut self, filled: usize, page: &Page<'_>) -> Option<SlotEvent> {
        if filled == self.request.len() {
            let response = Response::error(Status::HeaderFieldsTooLarge);
            return Some(self.begin_response(response, page));
        }

        match self.socket.poll_read(&mut self.request[filled..]) {
            Poll::Pending => None,
            Poll::Ready(Ok(0)) => {
                if filled == 0 {
                    self.phase = Phase::Closing;
                    return None;
                }
                let response = respond(&self.request[..filled]);
                Some(self.begin_response(response, page))
            }
            Poll::Ready(Ok(count)) => {
                let filled = filled + count;
                if head_complete(&self.request[..filled]) {
                    let response = respond(&self.request[..filled]);
                    Some(self.begin_response(response, page))
                } else {
                    self.phase = Phase::Reading { filled };
                    None
                }
            }
            Poll::Ready(Err(_)) => Some(self.abort()),
        }
    }

    fn begin_response(&mut self, response: Response, page: &Page<'_>) -> SlotEvent {
        match Outgoing::new(response, page) {
            Some(outgoing) => {
                self.phase = Phase::Writing(outgoing);
                SlotEvent::Responding(response.status)
            }
            None => self.abort(),
        }
    }

    fn abort(&mut self) -> SlotEvent {
        self.socket.abort();
        self.phase = Phase::Idle;
        SlotEvent::Aborted
    }
}

/// Fixed pool of slots, addressed by [`SlotId`].
pub struct HttpSlots<S, const N: usize> {
    slots: [HttpSlot<S>; N],
}

impl<S: SlotSocket, const N: usize> HttpSlots<S, N> {
    pub fn new(sockets: [S; N]) -> Self {
        Self {
            slots: sockets.map(HttpSlot::new),
        }
    }

    /// Services one slot and reports what happened on it.
    pub fn service_slot(&mut self, slot: SlotId, page: &Page<'_>) -> Option<SlotEvent> {
        self.slots
            .get_mut(slot.index())
            .and_then(|slot| slot.service(page))
    }

    #[must_use]
    pub fn get(&self, slot: SlotId) -> Option<&HttpSlot<S>> {
        self.slots.get(slot.index())
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut HttpSlot<S>> {
        self.slots.get_mut(slot.index())
    }

    pub fn iter(&self) -> core::slice::Iter<'_, HttpSlot<S>> {
        self.slots.iter()
    }
}

impl<S: SlotSocket, const N: usize> ConnectionService for HttpSlots<S, N> {
    fn service(&mut self, slot: SlotId, page: &Page<'_>) {
        let _ = self.service_slot(slot, page);
    }
}
