use alarm_core::tracker::{EventTracker, PinLevel, Sensor};
use cortex_m_rt::entry;
use defmt_rtt as _;
use embassy_executor::{Executor, InterruptExecutor};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::spi::{self, Spi};
use static_cell::StaticCell;

use crate::net;

mod net_task;
mod sensor_task;
mod service_task;

/// W5500 SPI clock; the chip tolerates up to 80 MHz.
const ETHERNET_SPI_HZ: u32 = 50_000_000;

/// Runs the sensor watchers above the service loop so edges are stamped
/// while a tick is in progress.
static EXECUTOR_EDGES: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_MAIN: StaticCell<Executor> = StaticCell::new();
static TRACKER: StaticCell<EventTracker> = StaticCell::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    unsafe { EXECUTOR_EDGES.on_interrupt() }
}

#[entry]
fn main() -> ! {
    let p = embassy_rp::init(Default::default());

    // GPIO2: PIR output. GPIO3: door contact, pulled up, high while open.
    let motion = Input::new(p.PIN_2, Pull::None);
    let door = Input::new(p.PIN_3, Pull::Up);
    let tracker: &'static EventTracker = TRACKER.init(EventTracker::new(
        net::uptime(),
        PinLevel::from_high(door.is_high()),
    ));

    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let edges = EXECUTOR_EDGES.start(interrupt::SWI_IRQ_1);
    edges.spawn(sensor_task::watch(Sensor::Door, door, tracker).expect("door watcher slot"));
    edges.spawn(sensor_task::watch(Sensor::Motion, motion, tracker).expect("motion watcher slot"));

    // W5500-EVB-Pico wiring.
    let mut spi_config = spi::Config::default();
    spi_config.frequency = ETHERNET_SPI_HZ;
    let ethernet = net_task::EthernetParts {
        spi: Spi::new(
            p.SPI0, p.PIN_18, p.PIN_19, p.PIN_16, p.DMA_CH0, p.DMA_CH1, spi_config,
        ),
        cs: Output::new(p.PIN_17, Level::High),
        int: Input::new(p.PIN_21, Pull::Up),
        reset: Output::new(p.PIN_20, Level::High),
    };

    let executor = EXECUTOR_MAIN.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(net_task::boot(spawner, ethernet, tracker).expect("boot task slot"));
    })
}
