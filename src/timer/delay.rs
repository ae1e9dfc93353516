use crate::driver::{AskBus, BusHandler};
use crate::timer::MicrosClock;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Runs a blocking loop that alternates between the send queue and listening.
///
/// Each pass calls [`AskBus::update`] and then listens for up to `listen_us`
/// microseconds with [`AskBus::receive_for`]. Received payloads and errors go to the
/// bus handler.
///
/// # Arguments
/// - `bus`: A mutable reference to an `AskBus` instance.
/// - `listen_us`: How long to listen between two queue passes, e.g. `100_000`.
///
/// # Example
/// ```rust,ignore
/// use askbus::timer::run_bus_loop;
/// let mut bus = AskBus::with_handler(tx, rx, micros, delay, BusConfig::new(12), handler);
/// run_bus_loop(&mut bus, 100_000);
/// ```
///
/// # Notes
/// - This loop will never return; it is intended for single-purpose polling firmware.
/// - Packets are only sent between listening windows, so a long `listen_us` delays
///   queued traffic.
pub fn run_bus_loop<TX, RX, CLK, D, H>(bus: &mut AskBus<TX, RX, CLK, D, H>, listen_us: u32) -> !
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
    H: BusHandler,
{
    loop {
        bus.update();
        let _ = bus.receive_for(listen_us);
    }
}
