#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Turns the network stack's observed IPv4 configuration into lease results.
//!
//! embassy-net runs the DHCP exchange itself and only exposes the resulting
//! configuration. It does not expose the lease time and does not probe the
//! address for conflicts, so leases carry a zero duration and
//! [`LeaseResult::Conflict`] is never produced here.

use core::time::Duration;

use alarm_core::bootstrap::{Lease, LeaseResult};
use alarm_core::config::{DHCP_ATTEMPT_TIMEOUT, NetConfig};

/// Attempt deadline and last applied configuration.
#[derive(Debug, Default)]
pub struct LeaseWatch {
    deadline: Option<Duration>,
    current: Option<NetConfig>,
}

impl LeaseWatch {
    pub const fn new() -> Self {
        Self {
            deadline: None,
            current: None,
        }
    }

    /// Forgets the previous attempt and configuration.
    pub fn reset(&mut self) {
        self.deadline = None;
        self.current = None;
    }

    /// Classifies what the stack reports at `now`.
    pub fn observe(&mut self, now: Duration, observed: Option<NetConfig>) -> LeaseResult {
        let deadline = *self.deadline.get_or_insert(now + DHCP_ATTEMPT_TIMEOUT);

        match (observed, self.current) {
            (Some(config), None) => {
                self.current = Some(config);
                LeaseResult::Leased(lease(config))
            }
            (Some(config), Some(previous)) if config != previous => {
                self.current = Some(config);
                LeaseResult::Renewed(lease(config))
            }
            (Some(_), Some(_)) => LeaseResult::Pending,
            (None, Some(_)) => {
                self.current = None;
                self.deadline = Some(now + DHCP_ATTEMPT_TIMEOUT);
                LeaseResult::Timeout
            }
            (None, None) if now >= deadline => {
                self.deadline = Some(now + DHCP_ATTEMPT_TIMEOUT);
                LeaseResult::Timeout
            }
            (None, None) => LeaseResult::Pending,
        }
    }

    /// Records the configuration the bootstrap controller applied, so a
    /// later change reads as a renewal.
    pub fn applied(&mut self, config: NetConfig) {
        self.current = Some(config);
        self.deadline = None;
    }
}

fn lease(config: NetConfig) -> Lease {
    Lease {
        config,
        lease_time: Duration::ZERO,
    }
}
