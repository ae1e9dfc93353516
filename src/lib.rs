//! # askbus
//!
//! A portable, no_std Rust implementation of a half-duplex bus protocol for cheap
//! Amplitude Shift Keying (ASK/OOK) 433 MHz radio modules such as the FS1000A and
//! XY-MK-5V.
//!
//! Up to 254 nodes share one channel. Everything is bit-banged:
//! - `embedded-hal` traits for digital I/O and blocking delays
//! - a microsecond counter ([`timer::MicrosClock`]) for every sampling deadline
//! - no UART, no interrupts and no hardware timer in the protocol path
//!
//! ## Layers
//!
//! | Layer            | Module       | Role |
//! |------------------|--------------|------|
//! | Bit / Byte       | [`modem`]    | timed levels, noise-filtered sampling, sync pulse per byte |
//! | Channel sensor   | [`modem`]    | listen for one byte period before talking |
//! | Frame            | [`frame`]    | `[address][length][payload][IV][CRC]` with XOR checksum |
//! | Packet           | [`link`]     | send with ACK/NAK handshake, receive and answer |
//! | Cipher           | [`cipher`]   | pre-shared key stream cipher with a per-frame IV |
//! | Send queue       | [`queue`]    | fixed slots, retries with quadratic backoff |
//! | Node             | [`driver`]   | [`driver::AskBus`] ties everything to a handler |
//!
//! ## Crate features
//! | Feature                | Description |
//! |------------------------|-------------|
//! | `std`                  | Disables `#![no_std]` and stores queued payloads in `std::vec::Vec`s |
//! | `poll-loop`            | Provides `timer::run_bus_loop`, a never-returning host loop |
//! | `global-bus` (default) | Provides a `critical_section` protected bus singleton and macros |
//! | `defmt-0-3`            | Uses `defmt` logging |
//! | `log`                  | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use askbus::config::BusConfig;
//! use askbus::driver::AskBus;
//!
//! let mut bus = AskBus::with_handler(tx_pin, rx_pin, micros, delay, BusConfig::new(44), handler);
//! bus.enqueue(12, b"HI", 0)?;          // once
//! bus.enqueue(12, b"PING", 1_000_000)?; // every second
//! loop {
//!     bus.update();            // sends due packets
//!     bus.receive_for(10_000); // hands received payloads to the handler
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - Default timing is 350 µs per bit and 750 µs per sync pulse, about 256 bytes/s.
//! - All nodes must use the same timing, cipher setting and key.
//! - Interrupts that fire during a transfer stretch bit windows; keep them short.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "global-bus")]
pub use critical_section;

pub use heapless;

#[macro_use]
mod fmt;

pub mod cipher;
pub mod command;
pub mod config;
pub mod consts;
pub(crate) mod crc;
pub mod driver;
pub mod error;
pub mod frame;
pub mod link;
pub mod modem;
pub mod queue;
pub mod timer;

#[cfg(test)]
mod testing;
