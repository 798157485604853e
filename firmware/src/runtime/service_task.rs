use alarm_core::bootstrap::BootstrapController;
use alarm_core::config::{ADDRESSING, AddressingMode, DHCP_RETRY_LIMIT, HTTP_SLOT_COUNT};
use alarm_core::document::DocumentTemplate;
use alarm_core::scheduler::ServiceScheduler;
use alarm_core::tracker::EventTracker;
use embassy_net::Stack;
use static_cell::StaticCell;

use crate::http::{self, LoggedSlots, SocketBuffers};
use crate::net::{EmbassyClock, StackLeaseClient};
use crate::status;
use crate::telemetry::{self, TelemetryRecorder};

/// Runs the service loop until bootstrap fails, then parks.
#[embassy_executor::task]
pub async fn run(stack: Stack<'static>, tracker: &'static EventTracker) {
    static BUFFERS: StaticCell<[SocketBuffers; HTTP_SLOT_COUNT]> = StaticCell::new();

    let document = match DocumentTemplate::status_page() {
        Ok(document) => document,
        Err(error) => {
            defmt::error!("status page rejected: {}", defmt::Display2Format(&error));
            return;
        }
    };

    if let AddressingMode::Static(config) = ADDRESSING {
        telemetry::emit(&telemetry::static_config_line(&config));
        status::record_address(Some(config.ip));
    }

    let buffers = BUFFERS.init([const { SocketBuffers::new() }; HTTP_SLOT_COUNT]);
    let slots = LoggedSlots::new(http::sockets(stack, buffers));
    let bootstrap =
        BootstrapController::new(ADDRESSING, StackLeaseClient::new(stack), DHCP_RETRY_LIMIT);

    let mut scheduler: ServiceScheduler<'_, _, _, _, HTTP_SLOT_COUNT> =
        ServiceScheduler::new(EmbassyClock, bootstrap, tracker, document, slots);
    let mut recorder = TelemetryRecorder::new();

    let reason = scheduler.run(|report| recorder.record_tick(report)).await;
    defmt::error!("serving stopped for good: {}", reason);
    core::future::pending::<()>().await;
}
