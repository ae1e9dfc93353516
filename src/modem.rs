//! Bit-banged OOK modem: bit layer, byte layer and channel sensor.
//!
//! Bits are emitted by holding the TX line for a fixed time and recovered by
//! sampling the RX line for the same time through a slow exponential low-pass
//! filter. No interrupt or edge detection is involved; every wait is a busy loop
//! bounded by the configured [`Timing`].
//!
//! ## Byte format
//!
//! ```text
//!  ________ ____________________________
//! |  Sync  |           Byte             |
//! |________|___       ___     _____     |
//! |        |   |     |   |   |     |    |
//! | 1   |0 | 1 | 0 0 | 1 | 0 | 1 1 | 0  |
//! |_____|__|___|_____|___|___|_____|____|
//!   spacer  width per bit, LSB first
//! ```
//!
//! A receiver accepts a byte only after seeing a HIGH (the sync pulse) that is
//! followed by a full LOW bit window. This rejects idle noise and interference at
//! the byte level.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::config::Timing;
use crate::consts::CHANNEL_FLUSH_US;
use crate::timer::{MicrosClock, elapsed_us};

/// Exponentially weighted moving average of line samples.
///
/// Each sample moves the level by a thousandth, so a handful of glitches inside a
/// bit window cannot flip the decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    level: f32,
}

impl Integrator {
    const RETAIN: f32 = 0.999;
    const WEIGHT: f32 = 0.001;

    /// Starts undecided, at 0.5.
    pub const fn new() -> Self {
        Self { level: 0.5 }
    }

    /// Folds in one sample.
    pub fn feed(&mut self, sample: bool) {
        let sample = if sample { 1.0 } else { 0.0 };
        self.level = self.level * Self::RETAIN + sample * Self::WEIGHT;
    }

    /// Current filtered level.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// `true` when the filtered level is above one half.
    pub fn is_high(&self) -> bool {
        self.level > 0.5
    }

    /// `true` when the filtered level is below one half.
    pub fn is_low(&self) -> bool {
        self.level < 0.5
    }
}

impl Default for Integrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Physical layer of a bus node.
///
/// ## Type Parameters
///
/// - `TX`: [`OutputPin`] driving the transmitter (HIGH = carrier on)
/// - `RX`: [`InputPin`] reading the receiver output
/// - `CLK`: [`MicrosClock`] used for every sampling deadline
/// - `D`: [`DelayNs`] used to hold transmitted levels
#[derive(Debug)]
pub struct Modem<TX, RX, CLK, D>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    /// TX pin
    pub tx: TX,
    /// RX pin
    pub rx: RX,
    /// Microsecond counter
    pub clock: CLK,
    /// Blocking delay provider
    pub delay: D,
    timing: Timing,
}

impl<TX, RX, CLK, D> Modem<TX, RX, CLK, D>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    /// Creates a modem and drives TX `LOW` (carrier off).
    pub fn new(tx: TX, rx: RX, clock: CLK, delay: D, timing: Timing) -> Self {
        let mut modem = Self {
            tx,
            rx,
            clock,
            delay,
            timing,
        };
        modem.release();
        modem
    }

    /// Bit timing in use.
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Replaces the bit timing. Both ends of a link must use the same values.
    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    /// Reads the microsecond counter.
    pub fn now_us(&mut self) -> u32 {
        self.clock.now_us()
    }

    fn write_tx(&mut self, level: bool) {
        let _ = self.tx.set_state(PinState::from(level));
    }

    fn sample(&mut self) -> bool {
        self.rx.is_high().unwrap_or(false)
    }

    /// Drives TX `LOW`, turning the carrier off.
    pub fn release(&mut self) {
        self.write_tx(false);
    }

    /// Drives `level` onto the line and holds it for `duration_us`.
    pub fn send_bit(&mut self, level: bool, duration_us: u32) {
        self.write_tx(level);
        self.delay.delay_us(duration_us);
    }

    /// Samples the line for `duration_us` and returns the filtered level.
    pub fn sample_bit(&mut self, duration_us: u32) -> bool {
        let mut integrator = Integrator::new();
        let start = self.clock.now_us();
        while elapsed_us(start, self.clock.now_us()) <= duration_us {
            let sample = self.sample();
            integrator.feed(sample);
        }
        integrator.is_high()
    }

    /// Sends the sync pulse, the sync gap and the eight bits of `byte`, LSB first.
    pub fn send_byte(&mut self, byte: u8) {
        let Timing {
            bit_width_us,
            bit_spacer_us,
        } = self.timing;
        self.send_bit(true, bit_spacer_us);
        self.send_bit(false, bit_width_us);
        for bit in 0..8 {
            self.send_bit(byte & (1 << bit) != 0, bit_width_us);
        }
    }

    /// Samples eight bit windows, LSB first.
    ///
    /// The caller must already be aligned to the first data bit, see
    /// [`receive_byte()`](Modem::receive_byte).
    pub fn read_byte(&mut self) -> u8 {
        let bit_width_us = self.timing.bit_width_us;
        let mut byte = 0u8;
        for bit in 0..8 {
            byte |= u8::from(self.sample_bit(bit_width_us)) << bit;
        }
        byte
    }

    /// Waits for a sync pulse and reads the byte that follows it.
    ///
    /// The line is sampled for as long as it stays HIGH, up to one spacer. If a
    /// HIGH was seen, the next bit window must filter LOW, which confirms the sync
    /// gap. Only then are the data bits read.
    ///
    /// # Returns
    /// - `Some(byte)`: a synchronized byte was read
    /// - `None`: no sync pulse, or the pulse was not followed by the sync gap
    pub fn receive_byte(&mut self) -> Option<u8> {
        let Timing {
            bit_width_us,
            bit_spacer_us,
        } = self.timing;

        let mut sync = Integrator::new();
        let start = self.clock.now_us();
        while elapsed_us(start, self.clock.now_us()) <= bit_spacer_us && self.sample() {
            sync.feed(true);
        }
        if !sync.is_high() {
            return None;
        }

        let mut gap = Integrator::new();
        let start = self.clock.now_us();
        while elapsed_us(start, self.clock.now_us()) <= bit_width_us {
            let sample = self.sample();
            gap.feed(sample);
        }
        if gap.is_low() {
            Some(self.read_byte())
        } else {
            None
        }
    }

    /// Checks whether the channel is idle.
    ///
    /// Emits a short LOW to settle the transmitter, then listens for one byte
    /// period. Any HIGH bit means another node is talking.
    pub fn can_start(&mut self) -> bool {
        self.send_bit(false, CHANNEL_FLUSH_US);
        self.read_byte() == 0
    }
}
