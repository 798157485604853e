use alarm_core::config::{ADDRESSING, AddressingMode, HTTP_SLOT_COUNT, MAC_ADDRESS};
use alarm_core::tracker::EventTracker;
use embassy_executor::Spawner;
use embassy_net::{Config, StackResources};
use embassy_net_wiznet::chip::W5500;
use embassy_net_wiznet::{Device, Runner, State};
use embassy_rp::gpio::{Input, Output};
use embassy_rp::peripherals::SPI0;
use embassy_rp::spi::{Async, Spi};
use embassy_time::{Delay, Instant};
use embedded_hal_bus::spi::ExclusiveDevice;
use static_cell::StaticCell;

use super::service_task;
use crate::net;

/// HTTP slots plus the DHCP socket.
const STACK_SOCKETS: usize = HTTP_SLOT_COUNT + 1;

type EthernetSpi = ExclusiveDevice<Spi<'static, SPI0, Async>, Output<'static>, Delay>;
type EthernetRunner = Runner<'static, W5500, EthernetSpi, Input<'static>, Output<'static>>;

/// Pins and bus wired to the W5500.
pub struct EthernetParts {
    pub spi: Spi<'static, SPI0, Async>,
    pub cs: Output<'static>,
    pub int: Input<'static>,
    pub reset: Output<'static>,
}

#[embassy_executor::task]
async fn ethernet(runner: EthernetRunner) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn stack(mut runner: embassy_net::Runner<'static, Device<'static>>) -> ! {
    runner.run().await
}

/// Brings up the W5500 and the IP stack, then hands over to the service loop.
#[embassy_executor::task]
pub async fn boot(spawner: Spawner, parts: EthernetParts, tracker: &'static EventTracker) {
    static WIZNET: StaticCell<State<8, 8>> = StaticCell::new();
    static RESOURCES: StaticCell<StackResources<STACK_SOCKETS>> = StaticCell::new();

    let Ok(spi) = ExclusiveDevice::new(parts.spi, parts.cs, Delay);
    let (device, runner) = match embassy_net_wiznet::new(
        MAC_ADDRESS,
        WIZNET.init(State::new()),
        spi,
        parts.int,
        parts.reset,
    )
    .await
    {
        Ok(pair) => pair,
        Err(error) => {
            defmt::error!("W5500 init failed: {}", defmt::Debug2Format(&error));
            return;
        }
    };
    spawner.spawn(ethernet(runner).expect("ethernet task slot"));

    let config = match ADDRESSING {
        // DHCP starts on the first service tick.
        AddressingMode::Dhcp => Config::default(),
        AddressingMode::Static(config) => Config::ipv4_static(net::static_config(&config)),
    };
    let (stack_handle, stack_runner) = embassy_net::new(
        device,
        config,
        RESOURCES.init(StackResources::new()),
        stack_seed(),
    );
    spawner.spawn(stack(stack_runner).expect("stack task slot"));

    spawner.spawn(service_task::run(stack_handle, tracker).expect("service task slot"));
}

// Only seeds TCP sequence numbers and DHCP transaction ids.
fn stack_seed() -> u64 {
    let mut mac = [0u8; 8];
    mac[..6].copy_from_slice(&MAC_ADDRESS);
    u64::from_le_bytes(mac) ^ Instant::now().as_ticks().rotate_left(17)
}
