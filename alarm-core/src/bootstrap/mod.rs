//! Retry and fail-stop policy around address acquisition.
//!
//! The DHCP exchange itself belongs to a [`LeaseClient`]; the controller only
//! counts timeouts, applies leases, and decides when the device must stop
//! serving for good.

use core::fmt;
use core::time::Duration;

use crate::config::{AddressingMode, NetConfig};

/// Address assignment granted by the DHCP server.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Lease {
    pub config: NetConfig,
    pub lease_time: Duration,
}

/// Outcome of a single non-blocking DHCP client step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LeaseResult {
    /// Exchange still in flight, or nothing new since the last step.
    Pending,
    /// A fresh lease was granted.
    Leased(Lease),
    /// The current lease was extended, possibly with new parameters.
    Renewed(Lease),
    /// The current attempt ran out of time.
    Timeout,
    /// The granted address is already in use on the network.
    Conflict,
}

/// DHCP client driven by the controller.
pub trait LeaseClient {
    /// Begins acquiring an address.
    fn start(&mut self);

    /// Advances the exchange without blocking.
    fn step(&mut self, now: Duration) -> LeaseResult;

    /// Pushes a granted lease into the network layer.
    fn apply(&mut self, lease: &Lease);

    /// Abandons the exchange and releases the client.
    fn stop(&mut self);
}

/// Why bootstrap gave up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailReason {
    /// More consecutive timeouts than the retry limit allows.
    RetryLimitExceeded { attempts: u8 },
    /// The leased address collides with another host.
    AddressConflict,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::RetryLimitExceeded { attempts } => {
                write!(f, "DHCP failed after {attempts} timeouts")
            }
            FailReason::AddressConflict => write!(f, "leased address conflicts"),
        }
    }
}

/// Bootstrap lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootstrapState {
    Idle,
    Acquiring,
    Leased,
    /// Number of consecutive timeouts seen so far.
    Retrying(u8),
    Failed(FailReason),
}

impl BootstrapState {
    #[must_use]
    pub const fn is_leased(self) -> bool {
        matches!(self, BootstrapState::Leased)
    }

    /// `Failed` never transitions again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, BootstrapState::Failed(_))
    }

    /// Consecutive timeouts recorded in this state.
    #[must_use]
    pub const fn attempts(self) -> u8 {
        match self {
            BootstrapState::Retrying(attempts) => attempts,
            BootstrapState::Failed(FailReason::RetryLimitExceeded { attempts }) => attempts,
            _ => 0,
        }
    }
}

/// Transition worth logging, reported by [`BootstrapController::step`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootstrapEvent {
    Started,
    Leased(Lease),
    Renewed(Lease),
    /// Attempt `attempt` of `limit` timed out and will be retried.
    Timeout { attempt: u8, limit: u8 },
    /// A held lease stopped being valid.
    LeaseLost,
    Failed(FailReason),
}

/// State after a step plus the transition it took, if any.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StepReport {
    pub state: BootstrapState,
    pub event: Option<BootstrapEvent>,
}

impl StepReport {
    const fn quiet(state: BootstrapState) -> Self {
        Self { state, event: None }
    }

    const fn with(state: BootstrapState, event: BootstrapEvent) -> Self {
        Self {
            state,
            event: Some(event),
        }
    }
}

/// Policy layer over a [`LeaseClient`].
pub struct BootstrapController<L> {
    client: L,
    mode: AddressingMode,
    state: BootstrapState,
    retry_limit: u8,
}

impl<L: LeaseClient> BootstrapController<L> {
    /// Creates a controller. Static addressing starts, and stays, `Leased`.
    pub fn new(mode: AddressingMode, client: L, retry_limit: u8) -> Self {
        let state = match mode {
            AddressingMode::Dhcp => BootstrapState::Idle,
            AddressingMode::Static(_) => BootstrapState::Leased,
        };
        Self {
            client,
            mode,
            state,
            retry_limit,
        }
    }

    #[must_use]
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    #[must_use]
    pub fn retry_limit(&self) -> u8 {
        self.retry_limit
    }

    /// Configuration in effect when static addressing is compiled in.
    #[must_use]
    pub fn static_config(&self) -> Option<NetConfig> {
        match self.mode {
            AddressingMode::Static(config) => Some(config),
            AddressingMode::Dhcp => None,
        }
    }

    pub fn client(&self) -> &L {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut L {
        &mut self.client
    }

    /// Advances at most one transition. Never blocks.
    pub fn step(&mut self, now: Duration) -> StepReport {
        if self.static_config().is_some() {
            return StepReport::quiet(self.state);
        }

        let report = match self.state {
            BootstrapState::Failed(_) => StepReport::quiet(self.state),
            BootstrapState::Idle => {
                self.client.start();
                StepReport::with(BootstrapState::Acquiring, BootstrapEvent::Started)
            }
            BootstrapState::Acquiring | BootstrapState::Retrying(_) => self.step_acquiring(now),
            BootstrapState::Leased => self.step_leased(now),
        };

        self.state = report.state;
        report
    }

    fn step_acquiring(&mut self, now: Duration) -> StepReport {
        match self.client.step(now) {
            LeaseResult::Pending => StepReport::quiet(self.state),
            LeaseResult::Leased(lease) | LeaseResult::Renewed(lease) => {
                self.client.apply(&lease);
                StepReport::with(BootstrapState::Leased, BootstrapEvent::Leased(lease))
            }
            LeaseResult::Timeout => self.timeout(self.state.attempts(), None),
            LeaseResult::Conflict => self.fail(FailReason::AddressConflict),
        }
    }

    fn step_leased(&mut self, now: Duration) -> StepReport {
        match self.client.step(now) {
            LeaseResult::Pending => StepReport::quiet(self.state),
            LeaseResult::Leased(lease) | LeaseResult::Renewed(lease) => {
                self.client.apply(&lease);
                StepReport::with(BootstrapState::Leased, BootstrapEvent::Renewed(lease))
            }
            LeaseResult::Timeout => self.timeout(0, Some(BootstrapEvent::LeaseLost)),
            LeaseResult::Conflict => self.fail(FailReason::AddressConflict),
        }
    }

    fn timeout(&mut self, previous: u8, event: Option<BootstrapEvent>) -> StepReport {
        let attempt = previous.saturating_add(1);
        if attempt > self.retry_limit {
            return self.fail(FailReason::RetryLimitExceeded { attempts: attempt });
        }

        let event = event.unwrap_or(BootstrapEvent::Timeout {
            attempt,
            limit: self.retry_limit,
        });
        StepReport::with(BootstrapState::Retrying(attempt), event)
    }

    fn fail(&mut self, reason: FailReason) -> StepReport {
        self.client.stop();
        StepReport::with(BootstrapState::Failed(reason), BootstrapEvent::Failed(reason))
    }
}
