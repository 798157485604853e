use core::panic::PanicInfo;
use defmt::error;

use crate::status;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    status::record_panic();
    let status = status::snapshot();
    error!(
        "PANIC at tick {} ({}): {}",
        status.ticks,
        status.bootstrap.label(),
        defmt::Display2Format(info)
    );
    cortex_m::asm::udf();
}
