/// Declares a static global `ASK_BUS` instance protected by a `critical_section` mutex.
///
/// This macro creates a `static` singleton `ASK_BUS` suitable for use in
/// interrupt-based environments, where both the main thread and an ISR need
/// to safely access the shared bus.
///
/// # Arguments
/// - `$tx`: The concrete type of the TX pin (must implement `OutputPin`)
/// - `$rx`: The concrete type of the RX pin (must implement `InputPin`)
/// - `$clk`: The concrete microsecond counter type (must implement `MicrosClock`)
/// - `$delay`: The concrete delay type (must implement `DelayNs`)
/// - `$handler`: Optional [`BusHandler`](crate::driver::BusHandler) type, `()` if omitted
///
/// # Example
/// ```rust,ignore
/// init_ask_bus!(MyTxPin, MyRxPin, MyMicros, MyDelay);
/// ```
#[macro_export]
macro_rules! init_ask_bus {
    ( $tx:ty, $rx:ty, $clk:ty, $delay:ty ) => {
        $crate::init_ask_bus!($tx, $rx, $clk, $delay, ());
    };
    ( $tx:ty, $rx:ty, $clk:ty, $delay:ty, $handler:ty ) => {
        pub static ASK_BUS: $crate::timer::GlobalBus<$tx, $rx, $clk, $delay, $handler> =
            $crate::timer::global_bus_init();
    };
}

/// Moves a bus into the global `ASK_BUS` declared by [`init_ask_bus!`].
///
/// # Example
/// ```rust,ignore
/// setup_ask_bus!(AskBus::new(tx, rx, micros, delay, BusConfig::new(12)));
/// ```
#[macro_export]
macro_rules! setup_ask_bus {
    ( $bus:expr ) => {
        $crate::timer::global_bus_setup(&ASK_BUS, $bus)
    };
}

/// Queues a packet on the global `ASK_BUS`.
///
/// Evaluates to `None` if the bus has not been set up yet, otherwise to the result of
/// [`AskBus::enqueue`](crate::driver::AskBus::enqueue).
///
/// # Example
/// ```rust,ignore
/// let slot = enqueue_ask_bus!(12, b"HI", 0);
/// ```
#[macro_export]
macro_rules! enqueue_ask_bus {
    ( $destination:expr, $payload:expr, $repeat_interval:expr ) => {
        $crate::timer::global_bus_enqueue(&ASK_BUS, $destination, $payload, $repeat_interval)
    };
}

/// Calls `update()` on the global `ASK_BUS` if it has been set up.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     update_ask_bus!();
/// }
/// ```
///
/// # Notes
/// - Safe to call repeatedly; does nothing if the bus hasn't been set up yet.
#[macro_export]
macro_rules! update_ask_bus {
    () => {
        $crate::timer::global_bus_update(&ASK_BUS)
    };
}
