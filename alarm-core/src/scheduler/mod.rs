//! Cooperative service loop.
//!
//! One tick steps bootstrap, refreshes the status page from the tracker, and
//! gives every connection slot exactly one service call in ascending order.
//! The only wait inside a tick is the bootstrap throttle, applied while no
//! lease is held.

use core::time::Duration;

use crate::bootstrap::{BootstrapController, BootstrapState, FailReason, LeaseClient, StepReport};
use crate::config::{BOOTSTRAP_THROTTLE, HTTP_SLOT_COUNT};
use crate::document::{DocumentTemplate, Page, STATUS_PAGE_LEN};
use crate::tracker::EventTracker;

/// Why the scheduler stopped serving.
pub type HaltReason = FailReason;

/// Monotonic time source plus the loop's only blocking wait.
#[allow(async_fn_in_trait)]
pub trait Clock {
    /// Time since boot.
    fn now(&self) -> Duration;

    /// Suspends the loop for `duration`.
    async fn delay(&mut self, duration: Duration);
}

/// Identifier of a connection slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId(pub usize);

impl SlotId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Serves connections one non-blocking step at a time.
pub trait ConnectionService {
    /// Performs one step on `slot`, using `page` as the response body.
    fn service(&mut self, slot: SlotId, page: &Page<'_>);
}

/// Loop lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerState {
    Running,
    Halted(HaltReason),
}

/// What a single tick did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TickReport {
    /// Sequence number of the tick, starting at 1.
    pub tick: u32,
    /// Bootstrap step taken this tick; `None` once halted.
    pub bootstrap: Option<StepReport>,
    /// Whether the bootstrap throttle was applied.
    pub throttled: bool,
    /// Time the document was rendered at, if it was.
    pub rendered_at: Option<Duration>,
    /// Number of slots given a service call.
    pub slots_serviced: usize,
    pub state: SchedulerState,
}

/// Owner of the status page and driver of every main-loop collaborator.
pub struct ServiceScheduler<'a, C, L, S, const N: usize = HTTP_SLOT_COUNT> {
    clock: C,
    bootstrap: BootstrapController<L>,
    tracker: &'a EventTracker,
    document: DocumentTemplate<STATUS_PAGE_LEN>,
    slots: S,
    slot_ids: [SlotId; N],
    throttle: Duration,
    state: SchedulerState,
    ticks: u32,
}

impl<'a, C, L, S, const N: usize> ServiceScheduler<'a, C, L, S, N>
where
    C: Clock,
    L: LeaseClient,
    S: ConnectionService,
{
    pub fn new(
        clock: C,
        bootstrap: BootstrapController<L>,
        tracker: &'a EventTracker,
        document: DocumentTemplate<STATUS_PAGE_LEN>,
        slots: S,
    ) -> Self {
        Self {
            clock,
            bootstrap,
            tracker,
            document,
            slots,
            slot_ids: core::array::from_fn(SlotId),
            throttle: BOOTSTRAP_THROTTLE,
            state: SchedulerState::Running,
            ticks: 0,
        }
    }

    /// Overrides the bootstrap throttle.
    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn document(&self) -> &DocumentTemplate<STATUS_PAGE_LEN> {
        &self.document
    }

    pub fn bootstrap(&self) -> &BootstrapController<L> {
        &self.bootstrap
    }

    pub fn bootstrap_mut(&mut self) -> &mut BootstrapController<L> {
        &mut self.bootstrap
    }

    pub fn tracker(&self) -> &'a EventTracker {
        self.tracker
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn slots(&self) -> &S {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut S {
        &mut self.slots
    }

    /// Runs one tick. A halted scheduler returns immediately without
    /// touching the document or the slots.
    pub async fn tick(&mut self) -> TickReport {
        self.ticks = self.ticks.wrapping_add(1);
        let mut report = TickReport {
            tick: self.ticks,
            bootstrap: None,
            throttled: false,
            rendered_at: None,
            slots_serviced: 0,
            state: self.state,
        };

        if let SchedulerState::Halted(_) = self.state {
            return report;
        }

        let step = self.bootstrap.step(self.clock.now());
        report.bootstrap = Some(step);
        if let BootstrapState::Failed(reason) = step.state {
            self.state = SchedulerState::Halted(reason);
            report.state = self.state;
            return report;
        }

        if !step.state.is_leased() {
            self.clock.delay(self.throttle).await;
            report.throttled = true;
        }

        let now = self.clock.now();
        let snapshot = self.tracker.snapshot();
        self.document.render_snapshot(now, &snapshot);
        report.rendered_at = Some(now);

        let page = self.document.page();
        for slot in self.slot_ids {
            self.slots.service(slot, &page);
            report.slots_serviced += 1;
        }

        embassy_futures::yield_now().await;
        report
    }

    /// Ticks until bootstrap fails, handing each report to `observe`.
    pub async fn run<F>(&mut self, mut observe: F) -> HaltReason
    where
        F: FnMut(&TickReport),
    {
        loop {
            let report = self.tick().await;
            observe(&report);
            if let SchedulerState::Halted(reason) = self.state {
                return reason;
            }
        }
    }
}
