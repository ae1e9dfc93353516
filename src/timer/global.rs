use crate::driver::{AskBus, BusHandler};
use crate::error::BusError;
use crate::timer::MicrosClock;
use core::cell::RefCell;
use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// An [`AskBus`] shared between `main` and interrupt handlers.
pub type GlobalBus<TX, RX, CLK, D, H = ()> = Mutex<RefCell<Option<AskBus<TX, RX, CLK, D, H>>>>;

/// Used to initialize the global static `AskBus` for use with
/// `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```rust,ignore
/// use askbus::timer::{GlobalBus, global_bus_init};
/// use some_hal::{Delay, Micros, PD1, PD2};
///
/// static ASK_BUS: GlobalBus<PD1, PD2, Micros, Delay> = global_bus_init();
/// ```
pub const fn global_bus_init<TX, RX, CLK, D, H>() -> GlobalBus<TX, RX, CLK, D, H>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
    H: BusHandler,
{
    Mutex::new(RefCell::new(None))
}

/// Moves a configured bus into the global slot, dropping any previous one.
///
/// # Example
/// ```rust,ignore
/// let bus = AskBus::new(tx, rx, micros, delay, BusConfig::new(12));
/// global_bus_setup(&ASK_BUS, bus);
/// ```
pub fn global_bus_setup<TX, RX, CLK, D, H>(
    global_bus: &'static GlobalBus<TX, RX, CLK, D, H>,
    bus: AskBus<TX, RX, CLK, D, H>,
) where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
    H: BusHandler,
{
    critical_section::with(|cs| {
        let _ = global_bus.borrow(cs).replace(Some(bus));
    });
}

/// Runs `f` on the global bus inside a critical section.
///
/// # Returns
/// `None` if the bus has not been set up.
pub fn global_bus_with<TX, RX, CLK, D, H, R>(
    global_bus: &'static GlobalBus<TX, RX, CLK, D, H>,
    f: impl FnOnce(&mut AskBus<TX, RX, CLK, D, H>) -> R,
) -> Option<R>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
    H: BusHandler,
{
    critical_section::with(|cs| global_bus.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Works through the send queue of the global bus once.
///
/// Every due packet is transmitted with interrupts masked, so keep the queue short
/// when calling this from an ISR.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     global_bus_update(&ASK_BUS);
/// }
/// ```
pub fn global_bus_update<TX, RX, CLK, D, H>(global_bus: &'static GlobalBus<TX, RX, CLK, D, H>)
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
    H: BusHandler,
{
    let _ = global_bus_with(global_bus, |bus| bus.update());
}

/// Queues a packet on the global bus, see [`AskBus::enqueue`].
///
/// # Returns
/// `None` if the bus has not been set up.
pub fn global_bus_enqueue<TX, RX, CLK, D, H>(
    global_bus: &'static GlobalBus<TX, RX, CLK, D, H>,
    destination: u8,
    payload: &[u8],
    repeat_interval: u32,
) -> Option<Result<usize, BusError>>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
    H: BusHandler,
{
    global_bus_with(global_bus, |bus| {
        bus.enqueue(destination, payload, repeat_interval)
    })
}
