//! embassy-net backed collaborators for the service loop.

use core::net::Ipv4Addr;
use core::time::Duration;

use alarm_core::bootstrap::{Lease, LeaseClient, LeaseResult};
use alarm_core::config::NetConfig;
use alarm_core::scheduler::Clock;
use embassy_net::{ConfigV4, DhcpConfig, Ipv4Cidr, Stack, StaticConfigV4};
use embassy_time::{Instant, Timer};

use crate::lease::LeaseWatch;

/// Monotonic clock on the embassy time driver.
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Duration {
        uptime()
    }

    async fn delay(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Timer::after(embassy_time::Duration::from_micros(micros)).await;
    }
}

/// Time since boot as a core [`Duration`].
pub fn uptime() -> Duration {
    Duration::from_micros(Instant::now().as_micros())
}

/// Builds the stack configuration for a compiled-in static address.
pub fn static_config(config: &NetConfig) -> StaticConfigV4 {
    let mut stack_config = StaticConfigV4 {
        address: Ipv4Cidr::new(config.ip, config.prefix_len()),
        gateway: Some(config.gateway),
        dns_servers: Default::default(),
    };
    // Capacity is at least one.
    let _ = stack_config.dns_servers.push(config.dns);
    stack_config
}

fn net_config(stack_config: &StaticConfigV4) -> NetConfig {
    NetConfig::new(
        stack_config.address.address(),
        stack_config.address.netmask(),
        stack_config.gateway.unwrap_or(Ipv4Addr::UNSPECIFIED),
        stack_config
            .dns_servers
            .first()
            .copied()
            .unwrap_or(Ipv4Addr::UNSPECIFIED),
    )
}

/// Lease client over the DHCP client built into embassy-net.
///
/// The stack runs the DHCP exchange on its own; this adapter feeds the
/// resulting configuration to a [`LeaseWatch`].
pub struct StackLeaseClient {
    stack: Stack<'static>,
    watch: LeaseWatch,
}

impl StackLeaseClient {
    pub fn new(stack: Stack<'static>) -> Self {
        Self {
            stack,
            watch: LeaseWatch::new(),
        }
    }
}

impl LeaseClient for StackLeaseClient {
    fn start(&mut self) {
        self.stack
            .set_config_v4(ConfigV4::Dhcp(DhcpConfig::default()));
        self.watch.reset();
    }

    fn step(&mut self, now: Duration) -> LeaseResult {
        let observed = self.stack.config_v4().map(|config| net_config(&config));
        self.watch.observe(now, observed)
    }

    fn apply(&mut self, lease: &Lease) {
        // The stack already runs with the leased configuration.
        self.watch.applied(lease.config);
    }

    fn stop(&mut self) {
        self.stack.set_config_v4(ConfigV4::None);
        self.watch.reset();
    }
}
