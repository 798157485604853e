#![no_std]

// Shared logic for the home alarm status page.
//
// Everything here is portable between the RP2040 firmware and the host
// emulator: no standard library, no allocation, and collaborators (clock,
// DHCP client, sockets) enter through traits.

pub mod bootstrap;
pub mod config;
pub mod document;
pub mod http;
pub mod scheduler;
pub mod tracker;
