//! Bus node driver.
//!
//! This module provides the [`AskBus`] struct, which ties the physical layer, the
//! packet layer, the send queue and the application callbacks of one node together.
//!
//! The driver has no background activity. The host calls
//! [`update()`](AskBus::update) to work through the send queue and
//! [`receive_for()`](AskBus::receive_for) to listen, as often as it can. Every call
//! blocks for as long as the bits it sends or samples take.
//!
//! ## Example
//!
//! ```rust
//! # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
//! # use embedded_hal_mock::eh1::delay::NoopDelay;
//! use askbus::config::BusConfig;
//! use askbus::driver::AskBus;
//! use askbus::timer::MicrosClock;
//!
//! struct Counter(u32);
//!
//! impl MicrosClock for Counter {
//!     fn now_us(&mut self) -> u32 {
//!         self.0 = self.0.wrapping_add(1);
//!         self.0
//!     }
//! }
//!
//! # let tx_pin = Pin::new(&[PinTransaction::set(PinState::Low)]);
//! # let rx_pin = Pin::new(&[]);
//! let mut bus = AskBus::new(tx_pin, rx_pin, Counter(0), NoopDelay::new(), BusConfig::new(44));
//! bus.set_address(45);
//! assert_eq!(bus.address(), 45);
//! # bus.link.modem.tx.done();
//! # bus.link.modem.rx.done();
//! ```

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::command::Command;
use crate::config::BusConfig;
use crate::error::BusError;
use crate::link::{Link, LinkStats, Response};
use crate::modem::Modem;
use crate::queue::PacketQueue;
use crate::timer::MicrosClock;

/// Application callbacks.
pub trait BusHandler {
    /// Called with the payload of every frame accepted by this node.
    fn on_receive(&mut self, payload: &[u8]);

    /// Called when the queue cannot take a packet or a destination stops answering.
    fn on_error(&mut self, error: BusError) {
        warn!("bus error: {}", error);
    }
}

/// Handler that drops received payloads and only logs errors.
impl BusHandler for () {
    fn on_receive(&mut self, _payload: &[u8]) {}
}

/// One node on the bus.
///
/// ## Type Parameters
///
/// - `TX`: [`OutputPin`] driving the transmitter
/// - `RX`: [`InputPin`] reading the receiver
/// - `CLK`: [`MicrosClock`] free-running microsecond counter
/// - `D`: [`DelayNs`] used to hold bit levels
/// - `H`: [`BusHandler`] receiving payloads and errors, `()` by default
///
/// ## Notes
///
/// - Only one node should drive a given TX pin.
/// - Both ends must agree on [`Timing`](crate::config::Timing), the cipher setting
///   and the key.
#[derive(Debug)]
pub struct AskBus<TX, RX, CLK, D, H = ()>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
    H: BusHandler,
{
    /// Packet layer, with the modem and its pins
    pub link: Link<TX, RX, CLK, D>,
    queue: PacketQueue,
    handler: H,
}

impl<TX, RX, CLK, D> AskBus<TX, RX, CLK, D>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    /// Creates a node without callbacks.
    ///
    /// TX is driven `LOW` (carrier off).
    pub fn new(tx: TX, rx: RX, clock: CLK, delay: D, config: BusConfig) -> Self {
        Self::with_handler(tx, rx, clock, delay, config, ())
    }
}

impl<TX, RX, CLK, D, H> AskBus<TX, RX, CLK, D, H>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
    H: BusHandler,
{
    /// Creates a node that reports to `handler`.
    ///
    /// TX is driven `LOW` (carrier off).
    pub fn with_handler(tx: TX, rx: RX, clock: CLK, delay: D, config: BusConfig, handler: H) -> Self {
        let modem = Modem::new(tx, rx, clock, delay, config.timing);
        Self {
            link: Link::new(modem, config),
            queue: PacketQueue::new(),
            handler,
        }
    }

    /// Sets the address for this node.
    pub fn set_address(&mut self, address: u8) {
        self.link.set_address(address);
    }

    /// This node's address.
    pub fn address(&self) -> u8 {
        self.link.config().address
    }

    /// Active settings.
    pub fn config(&self) -> &BusConfig {
        self.link.config()
    }

    /// Replaces the settings. Queued packets are kept.
    pub fn set_config(&mut self, config: BusConfig) {
        self.link.set_config(config);
    }

    /// The application callbacks.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The application callbacks, mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Link counters.
    pub fn stats(&self) -> LinkStats {
        self.link.stats()
    }

    /// The send queue.
    pub fn queue(&self) -> &PacketQueue {
        &self.queue
    }

    /// Checks whether the channel is idle.
    pub fn can_start(&mut self) -> bool {
        self.link.can_start()
    }

    /// Sends one frame right away, bypassing the queue.
    pub fn send_frame(&mut self, destination: u8, payload: &[u8]) -> Response {
        self.link.send_frame(destination, payload)
    }

    /// Sends one frame right away, up to `count` times until it is acknowledged.
    pub fn send_with_retries(&mut self, destination: u8, payload: &[u8], count: u8) -> Response {
        self.link.send_with_retries(destination, payload, count)
    }

    /// Tries to receive one frame, handing its payload to the handler.
    pub fn receive_frame(&mut self) -> Response {
        let handler = &mut self.handler;
        self.link.receive_frame(|payload| handler.on_receive(payload))
    }

    /// Listens for up to `duration_us` or until a frame is accepted.
    pub fn receive_for(&mut self, duration_us: u32) -> Response {
        let handler = &mut self.handler;
        self.link
            .receive_for(duration_us, |payload| handler.on_receive(payload))
    }

    /// Queues `payload` for `destination`.
    ///
    /// With `repeat_interval == 0` the packet is sent until delivered, then dropped.
    /// Otherwise it is sent again every `repeat_interval` µs until
    /// [`remove()`](AskBus::remove)d.
    ///
    /// # Returns
    /// The slot index of the packet.
    ///
    /// # Errors
    /// See [`PacketQueue::enqueue`]. `BufferExhausted` and `AllocationFailed` are also
    /// passed to [`BusHandler::on_error`].
    pub fn enqueue(
        &mut self,
        destination: u8,
        payload: &[u8],
        repeat_interval: u32,
    ) -> Result<usize, BusError> {
        let now = self.link.modem.now_us();
        let max_len = self.link.config().max_payload_len();
        self.queue
            .enqueue(destination, payload, repeat_interval, now, max_len)
            .inspect_err(|error| {
                if !matches!(error, BusError::PayloadTooLong { .. }) {
                    self.handler.on_error(*error);
                }
            })
    }

    /// Queues a [`Command`] for `destination`.
    pub fn enqueue_command(
        &mut self,
        destination: u8,
        command: Command,
        repeat_interval: u32,
    ) -> Result<usize, BusError> {
        self.enqueue(destination, &command.encode(), repeat_interval)
    }

    /// Drops the packet in slot `index`.
    pub fn remove(&mut self, index: usize) -> bool {
        self.queue.remove(index)
    }

    /// Sends every due packet once. See [`PacketQueue::update`].
    pub fn update(&mut self) {
        let max_attempts = self.link.config().max_attempts;
        let handler = &mut self.handler;
        self.queue
            .update(&mut self.link, max_attempts, |error| handler.on_error(error));
    }

    /// Runs one [`update()`](AskBus::update) and reports whether one-shot packets remain.
    ///
    /// # Returns
    /// - `Ok(())`: no one-shot packet is waiting; repeating packets may still be queued
    /// - `Err(nb::Error::WouldBlock)`: call again
    ///
    /// # Example
    /// ```rust,ignore
    /// bus.enqueue(12, b"HI", 0)?;
    /// nb::block!(bus.poll_flush())?;
    /// ```
    pub fn poll_flush(&mut self) -> nb::Result<(), Infallible> {
        self.update();
        if self.queue.has_one_shot_pending() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }
}
