use alarm_core::tracker::{EventTracker, PinLevel, Sensor};
use embassy_rp::gpio::Input;

use crate::{net, telemetry};

/// Stamps every edge on `pin` into the tracker.
#[embassy_executor::task(pool_size = 2)]
pub async fn watch(sensor: Sensor, mut pin: Input<'static>, tracker: &'static EventTracker) -> ! {
    loop {
        pin.wait_for_any_edge().await;
        let level = PinLevel::from_high(pin.is_high());
        let now = net::uptime();
        tracker.on_pin_change(sensor, level, now);
        telemetry::emit(&telemetry::edge_line(sensor, level, now));
    }
}
