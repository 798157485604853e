#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod panic;

mod lease;
mod status;
mod telemetry;

#[cfg(target_os = "none")]
mod http;
#[cfg(target_os = "none")]
mod net;
#[cfg(target_os = "none")]
mod runtime;

#[cfg(not(target_os = "none"))]
fn main() {}
