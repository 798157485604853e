#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The service loop publishes bootstrap progress, tick counts, and the
//! leased address into atomics so the heartbeat log and the panic handler can
//! read a [`FirmwareStatus`] without borrowing the scheduler.

use core::net::Ipv4Addr;

use alarm_core::bootstrap::{BootstrapState, FailReason};
use alarm_core::scheduler::{SchedulerState, TickReport};
use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

const NO_HALT: u8 = 0;
const HALT_RETRIES: u8 = 1;
const HALT_CONFLICT: u8 = 2;

/// Encoded [`BootstrapPhase`] of the last tick.
static BOOTSTRAP: AtomicU8 = AtomicU8::new(BootstrapPhase::Idle as u8);
/// Consecutive DHCP timeouts at the last tick.
static ATTEMPTS: AtomicU8 = AtomicU8::new(0);
/// Encoded halt reason (0 == still running).
static HALT: AtomicU8 = AtomicU8::new(NO_HALT);
static TICKS: AtomicU32 = AtomicU32::new(0);
/// Responses fully written across every slot.
static RESPONSES: AtomicU32 = AtomicU32::new(0);
/// Interface address as big-endian bits (0 == none).
static ADDRESS: AtomicU32 = AtomicU32::new(0);
static PANICKED: AtomicBool = AtomicBool::new(false);

/// Bootstrap state without its payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum BootstrapPhase {
    Idle = 0,
    Acquiring = 1,
    Leased = 2,
    Retrying = 3,
    Failed = 4,
}

impl BootstrapPhase {
    pub const fn of(state: BootstrapState) -> Self {
        match state {
            BootstrapState::Idle => BootstrapPhase::Idle,
            BootstrapState::Acquiring => BootstrapPhase::Acquiring,
            BootstrapState::Leased => BootstrapPhase::Leased,
            BootstrapState::Retrying(_) => BootstrapPhase::Retrying,
            BootstrapState::Failed(_) => BootstrapPhase::Failed,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => BootstrapPhase::Acquiring,
            2 => BootstrapPhase::Leased,
            3 => BootstrapPhase::Retrying,
            4 => BootstrapPhase::Failed,
            _ => BootstrapPhase::Idle,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            BootstrapPhase::Idle => "idle",
            BootstrapPhase::Acquiring => "acquiring",
            BootstrapPhase::Leased => "leased",
            BootstrapPhase::Retrying => "retrying",
            BootstrapPhase::Failed => "failed",
        }
    }
}

/// Point-in-time copy of the published status.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FirmwareStatus {
    pub bootstrap: BootstrapPhase,
    pub attempts: u8,
    pub halt: Option<FailReason>,
    pub ticks: u32,
    pub responses: u32,
    pub address: Option<Ipv4Addr>,
    pub panicked: bool,
}

fn encode_halt(state: SchedulerState) -> u8 {
    match state {
        SchedulerState::Running => NO_HALT,
        SchedulerState::Halted(FailReason::RetryLimitExceeded { .. }) => HALT_RETRIES,
        SchedulerState::Halted(FailReason::AddressConflict) => HALT_CONFLICT,
    }
}

fn decode_halt(raw: u8, attempts: u8) -> Option<FailReason> {
    match raw {
        HALT_RETRIES => Some(FailReason::RetryLimitExceeded { attempts }),
        HALT_CONFLICT => Some(FailReason::AddressConflict),
        _ => None,
    }
}

/// Publishes the outcome of one scheduler tick.
pub fn record_tick(report: &TickReport) {
    TICKS.store(report.tick, Ordering::Relaxed);
    if let Some(step) = report.bootstrap {
        BOOTSTRAP.store(BootstrapPhase::of(step.state) as u8, Ordering::Relaxed);
        ATTEMPTS.store(step.state.attempts(), Ordering::Relaxed);
    }
    HALT.store(encode_halt(report.state), Ordering::Relaxed);
}

/// Stores the interface address, or clears it when the lease is gone.
pub fn record_address(address: Option<Ipv4Addr>) {
    let bits = address.map_or(0, u32::from);
    ADDRESS.store(bits, Ordering::Relaxed);
}

pub fn record_response() {
    RESPONSES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_panic() {
    PANICKED.store(true, Ordering::Relaxed);
}

/// Builds a [`FirmwareStatus`] from the stored values.
pub fn snapshot() -> FirmwareStatus {
    let attempts = ATTEMPTS.load(Ordering::Relaxed);
    let address = match ADDRESS.load(Ordering::Relaxed) {
        0 => None,
        bits => Some(Ipv4Addr::from(bits)),
    };
    FirmwareStatus {
        bootstrap: BootstrapPhase::from_raw(BOOTSTRAP.load(Ordering::Relaxed)),
        attempts,
        halt: decode_halt(HALT.load(Ordering::Relaxed), attempts),
        ticks: TICKS.load(Ordering::Relaxed),
        responses: RESPONSES.load(Ordering::Relaxed),
        address,
        panicked: PANICKED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_core::bootstrap::StepReport;

    #[test]
    fn phases_survive_the_atomic_encoding() {
        for state in [
            BootstrapState::Idle,
            BootstrapState::Acquiring,
            BootstrapState::Leased,
            BootstrapState::Retrying(3),
            BootstrapState::Failed(FailReason::AddressConflict),
        ] {
            let phase = BootstrapPhase::of(state);
            assert_eq!(BootstrapPhase::from_raw(phase as u8), phase);
        }
    }

    #[test]
    fn halt_reason_keeps_the_attempt_count() {
        let reason = FailReason::RetryLimitExceeded { attempts: 6 };
        let raw = encode_halt(SchedulerState::Halted(reason));
        assert_eq!(decode_halt(raw, 6), Some(reason));
        assert_eq!(decode_halt(encode_halt(SchedulerState::Running), 2), None);
    }

    #[test]
    fn snapshot_reflects_recorded_tick() {
        let reason = FailReason::RetryLimitExceeded { attempts: 6 };
        record_tick(&TickReport {
            tick: 7,
            bootstrap: Some(StepReport {
                state: BootstrapState::Failed(reason),
                event: None,
            }),
            throttled: false,
            rendered_at: None,
            slots_serviced: 0,
            state: SchedulerState::Halted(reason),
        });
        record_address(Some(Ipv4Addr::new(192, 168, 11, 2)));

        let status = snapshot();
        assert_eq!(status.ticks, 7);
        assert_eq!(status.bootstrap, BootstrapPhase::Failed);
        assert_eq!(status.halt, Some(reason));
        assert_eq!(status.address, Some(Ipv4Addr::new(192, 168, 11, 2)));
    }
}
