//! Simulated radio channel for timing-level tests.
//!
//! A [`Wave`] is a list of `(time, level)` edges. A [`SimAir`] gives a node a
//! shared microsecond counter, an incoming wave read by its RX pin and an outgoing
//! wave recorded from its TX pin. Everything runs on one thread: a sender runs to
//! completion, then a receiver replays what was recorded.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::config::Timing;
use crate::modem::Modem;
use crate::timer::MicrosClock;

/// Modem wired to a [`SimAir`].
pub(crate) type SimModem = Modem<WaveTx, WaveRx, TickClock, SimDelay>;

/// Ordered `(time, level)` edges shared between a writer and readers.
#[derive(Debug, Clone, Default)]
pub(crate) struct Wave(Rc<RefCell<Vec<(u32, bool)>>>);

impl Wave {
    pub(crate) fn push(&self, time: u32, level: bool) {
        self.0.borrow_mut().push((time, level));
    }

    pub(crate) fn level_at(&self, time: u32) -> bool {
        self.0
            .borrow()
            .iter()
            .rev()
            .find(|(t, _)| *t <= time)
            .map(|(_, level)| *level)
            .unwrap_or(false)
    }

    pub(crate) fn first_rise(&self) -> Option<u32> {
        self.0
            .borrow()
            .iter()
            .find(|(_, level)| *level)
            .map(|(t, _)| *t)
    }

    pub(crate) fn last_time(&self) -> Option<u32> {
        self.0.borrow().last().map(|(t, _)| *t)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.borrow().len()
    }
}

/// Counter that advances by `step` µs every time it is read.
#[derive(Debug, Clone)]
pub(crate) struct TickClock {
    now: Rc<Cell<u32>>,
    step: u32,
}

impl TickClock {
    pub(crate) fn new(step: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            step,
        }
    }

    fn shared(now: Rc<Cell<u32>>) -> Self {
        Self { now, step: 1 }
    }
}

impl MicrosClock for TickClock {
    fn now_us(&mut self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        now
    }
}

/// Delay that only moves the shared counter forward.
#[derive(Debug, Clone)]
pub(crate) struct SimDelay {
    now: Rc<Cell<u32>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.now.set(self.now.get().wrapping_add(ns.div_ceil(1_000)));
    }

    fn delay_us(&mut self, us: u32) {
        self.now.set(self.now.get().wrapping_add(us));
    }
}

/// TX pin that records every write with its timestamp.
#[derive(Debug)]
pub(crate) struct WaveTx {
    now: Rc<Cell<u32>>,
    wave: Wave,
}

impl ErrorType for WaveTx {
    type Error = Infallible;
}

impl OutputPin for WaveTx {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.wave.push(self.now.get(), false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.wave.push(self.now.get(), true);
        Ok(())
    }
}

/// Reply played back once the node has finished transmitting.
#[derive(Debug)]
struct Reply {
    outgoing: Wave,
    wave: Wave,
    min_records: usize,
    lag: u32,
}

/// RX pin reading the incoming wave, or a scripted reply.
#[derive(Debug)]
pub(crate) struct WaveRx {
    now: Rc<Cell<u32>>,
    wave: Wave,
    reply: Option<Reply>,
}

impl ErrorType for WaveRx {
    type Error = Infallible;
}

impl InputPin for WaveRx {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let now = self.now.get();
        if let Some(reply) = &self.reply {
            if reply.outgoing.len() >= reply.min_records {
                let end = reply.outgoing.last_time().unwrap_or(0) + reply.lag;
                return Ok(now >= end && reply.wave.level_at(now - end));
            }
        }
        Ok(self.wave.level_at(now))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// A node's view of the channel.
#[derive(Debug, Clone, Default)]
pub(crate) struct SimAir {
    now: Rc<Cell<u32>>,
    incoming: Wave,
    outgoing: Wave,
    reply: Option<(Wave, usize, u32)>,
}

impl SimAir {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds an edge to what this node hears.
    pub(crate) fn drive(&self, time: u32, level: bool) {
        self.incoming.push(time, level);
    }

    pub(crate) fn set_now(&self, time: u32) {
        self.now.set(time);
    }

    pub(crate) fn now(&self) -> u32 {
        self.now.get()
    }

    /// Everything this node's TX pin wrote.
    pub(crate) fn outgoing(&self) -> Wave {
        self.outgoing.clone()
    }

    /// A fresh node that hears this node's transmission, clock set to its first sync pulse.
    pub(crate) fn replay(&self) -> SimAir {
        SimAir::hearing(self.outgoing())
    }

    /// A fresh node that hears `wave`, clock set to its first sync pulse.
    pub(crate) fn hearing(wave: Wave) -> SimAir {
        let air = SimAir {
            incoming: wave,
            ..SimAir::default()
        };
        air.set_now(air.incoming.first_rise().unwrap_or(0));
        air
    }

    /// Once this node has written `min_records` TX edges, it hears `bytes` sent
    /// `lag` µs after its last TX edge.
    pub(crate) fn respond_with(mut self, bytes: &[u8], min_records: usize, lag: u32) -> Self {
        let scratch = SimAir::new();
        let mut modem = scratch.modem(Timing::default());
        for byte in bytes {
            modem.send_byte(*byte);
        }
        modem.release();
        self.reply = Some((scratch.outgoing(), min_records, lag));
        self
    }

    /// TX pin, RX pin, clock and delay wired to this node's view of the channel.
    pub(crate) fn pins(&self) -> (WaveTx, WaveRx, TickClock, SimDelay) {
        let tx = WaveTx {
            now: self.now.clone(),
            wave: self.outgoing.clone(),
        };
        let rx = WaveRx {
            now: self.now.clone(),
            wave: self.incoming.clone(),
            reply: self.reply.as_ref().map(|(wave, min_records, lag)| Reply {
                outgoing: self.outgoing.clone(),
                wave: wave.clone(),
                min_records: *min_records,
                lag: *lag,
            }),
        };
        let delay = SimDelay {
            now: self.now.clone(),
        };
        (tx, rx, TickClock::shared(self.now.clone()), delay)
    }

    pub(crate) fn modem(&self, timing: Timing) -> SimModem {
        let (tx, rx, clock, delay) = self.pins();
        Modem::new(tx, rx, clock, delay, timing)
    }
}

/// Decodes every byte found in `wave` with a default-timing receiver.
pub(crate) fn decode_wave(wave: Wave) -> Vec<u8> {
    let end = wave.last_time().unwrap_or(0);
    let air = SimAir::hearing(wave);
    let mut modem = air.modem(Timing::default());
    let mut bytes = Vec::new();
    while air.now() <= end {
        if let Some(byte) = modem.receive_byte() {
            bytes.push(byte);
        }
    }
    bytes
}
