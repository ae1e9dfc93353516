//! Clock, timing and scheduling utilities for the bus.
//!
//! The protocol keeps no hardware timer. Every wait is a busy loop that compares a
//! wrapping microsecond counter against a start time, and every bit is emitted with a
//! blocking `embedded_hal::delay::DelayNs`.
//!
//! Contains:
//! - [`MicrosClock`]: the microsecond counter the bus reads
//! - [`elapsed_us`]: wrap-safe interval arithmetic
//! - [`byte_duration_us`] / [`frame_duration_us`]: on-air time calculators
//! - `run_bus_loop`: blocking host loop (feature `poll-loop`)
//! - `global_bus_update` and `update_ask_bus!()`: critical-section wrappers for a shared
//!   bus singleton (feature `global-bus`)
//!
//! Default timing (`BIT_WIDTH = 350`, `BIT_SPACER = 750`):
//!
//! | Quantity          | Value        |
//! |-------------------|--------------|
//! | Byte on air       | 3900 µs      |
//! | Raw byte rate     | ~256 bytes/s |
//! | Response window   | 1100 µs      |

use crate::config::Timing;
use crate::consts::FRAME_OVERHEAD;

#[cfg(feature = "poll-loop")]
mod delay;
#[cfg_attr(feature = "poll-loop", allow(unused_imports))]
#[cfg(feature = "poll-loop")]
pub use delay::*;

#[cfg(feature = "global-bus")]
mod global;
#[cfg_attr(feature = "global-bus", allow(unused_imports))]
#[cfg(feature = "global-bus")]
pub use global::*;

#[cfg(feature = "global-bus")]
mod macros;

/// A free-running microsecond counter.
///
/// The counter is expected to wrap at `u32::MAX`; the bus only ever subtracts two
/// readings with [`elapsed_us`], so wrap-around is harmless.
///
/// # Example
/// ```rust
/// use askbus::timer::MicrosClock;
///
/// struct Counter(u32);
///
/// impl MicrosClock for Counter {
///     fn now_us(&mut self) -> u32 {
///         self.0 = self.0.wrapping_add(1);
///         self.0
///     }
/// }
/// ```
pub trait MicrosClock {
    /// Returns the current counter value in microseconds.
    fn now_us(&mut self) -> u32;
}

impl<T: MicrosClock + ?Sized> MicrosClock for &mut T {
    fn now_us(&mut self) -> u32 {
        (**self).now_us()
    }
}

/// Microseconds between `since` and `now`, correct across a counter wrap.
#[inline]
pub const fn elapsed_us(since: u32, now: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Time one byte occupies the line: sync pulse, sync gap and eight data bits.
pub const fn byte_duration_us(timing: &Timing) -> u32 {
    timing.bit_spacer_us + 9 * timing.bit_width_us
}

/// Time a frame carrying `payload_len` bytes (plus `iv_len` IV bytes) occupies the line.
pub const fn frame_duration_us(timing: &Timing, payload_len: usize, iv_len: usize) -> u32 {
    ((payload_len + iv_len + FRAME_OVERHEAD) as u32) * byte_duration_us(timing)
}
