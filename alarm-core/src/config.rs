//! Compiled-in configuration.
//!
//! The device has no runtime configuration surface; every knob lives here so
//! the firmware and the emulator agree on the same policy values.

use core::net::Ipv4Addr;
use core::time::Duration;

/// Hardware address programmed into the Ethernet controller.
pub const MAC_ADDRESS: [u8; 6] = [0x00, 0x08, 0xDC, 0x12, 0x34, 0x56];

/// IPv4 parameters applied to the network layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetConfig {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
}

impl NetConfig {
    pub const fn new(ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr, dns: Ipv4Addr) -> Self {
        Self {
            ip,
            netmask,
            gateway,
            dns,
        }
    }

    /// CIDR prefix length derived from the netmask.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        // leading_ones() of a u32 is at most 32.
        u8::try_from(u32::from(self.netmask).leading_ones()).unwrap_or(32)
    }
}

/// How the device obtains its address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressingMode {
    Dhcp,
    Static(NetConfig),
}

/// Address used when [`ADDRESSING`] selects static configuration.
pub const STATIC_NET_CONFIG: NetConfig = NetConfig::new(
    Ipv4Addr::new(192, 168, 11, 2),
    Ipv4Addr::new(255, 255, 255, 0),
    Ipv4Addr::new(192, 168, 11, 1),
    Ipv4Addr::new(8, 8, 8, 8),
);

/// Addressing mode baked into the image.
pub const ADDRESSING: AddressingMode = AddressingMode::Dhcp;

/// Consecutive DHCP timeouts tolerated before the device fail-stops.
pub const DHCP_RETRY_LIMIT: u8 = 5;

/// Time a single DHCP attempt may take before it counts as a timeout.
pub const DHCP_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause inserted into every tick while no lease is held.
pub const BOOTSTRAP_THROTTLE: Duration = Duration::from_millis(1_000);

/// Number of concurrently served HTTP connections.
pub const HTTP_SLOT_COUNT: usize = 4;

/// TCP port the status page listens on.
pub const HTTP_PORT: u16 = 80;

/// Per-socket transmit/receive buffer size.
pub const SOCKET_BUFFER_SIZE: usize = 2 * 1024;

/// Largest request head a slot will buffer.
pub const REQUEST_BUFFER_SIZE: usize = 512;

/// GPIO wired to the PIR motion detector output.
pub const MOTION_GPIO: u8 = 2;

/// GPIO wired to the door contact (pulled up, high = open).
pub const DOOR_GPIO: u8 = 3;
