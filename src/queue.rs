//! Outbound packet queue with timed retries.
//!
//! The queue is a fixed arena of [`MAX_PACKETS`] slots. Each live slot owns a copy of
//! its payload, and [`PacketQueue::update`] hands every due packet to a [`Transmit`]
//! implementation (normally the [`Link`](crate::link::Link)).
//!
//! ```text
//!  ___________ _________ _______ __________ _______________ ________________
//! |destination| payload | state | attempts | registered_at | repeat_interval|
//! |___________|_________|_______|__________|_______________|________________|
//! ```
//!
//! A packet is due once `now - registered_at > repeat_interval + attempts²`, so
//! consecutive failures space the retries out quadratically. One-shot packets
//! (`repeat_interval == 0`) are removed once delivered. Repeating packets are
//! re-armed after every delivery and after every lost connection.

use crate::consts::MAX_PACKETS;
use crate::error::BusError;
use crate::link::{Response, Transmit};
use crate::timer::elapsed_us;

/// Owned payload storage.
#[cfg(feature = "std")]
pub type Payload = Vec<u8>;

/// Owned payload storage.
#[cfg(not(feature = "std"))]
pub type Payload = heapless::Vec<u8, { crate::consts::MAX_PAYLOAD_LEN }>;

#[cfg(feature = "std")]
fn copy_payload(bytes: &[u8]) -> Result<Payload, BusError> {
    let mut payload = Payload::new();
    payload
        .try_reserve_exact(bytes.len())
        .map_err(|_| BusError::AllocationFailed {
            length: bytes.len(),
        })?;
    payload.extend_from_slice(bytes);
    Ok(payload)
}

#[cfg(not(feature = "std"))]
fn copy_payload(bytes: &[u8]) -> Result<Payload, BusError> {
    Payload::from_slice(bytes).map_err(|_| BusError::AllocationFailed {
        length: bytes.len(),
    })
}

/// Lifecycle of a queue slot.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SlotState {
    /// The slot holds nothing.
    #[default]
    Empty,
    /// Waiting for its next transmission.
    PendingSend,
    /// The last transmission was acknowledged.
    Delivered,
    /// The last transmission was answered with `NAK`.
    Rejected,
    /// The last transmission got no response.
    Failed,
    /// The last transmission found the channel busy.
    Busy,
}

impl From<Response> for SlotState {
    fn from(response: Response) -> Self {
        match response {
            Response::Ack => Self::Delivered,
            Response::Nak => Self::Rejected,
            Response::Fail => Self::Failed,
            Response::Busy => Self::Busy,
        }
    }
}

/// One queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    destination: u8,
    payload: Payload,
    state: SlotState,
    attempts: u8,
    registered_at: u32,
    repeat_interval: u32,
}

impl Packet {
    /// Address the packet is sent to.
    pub fn destination(&self) -> u8 {
        self.destination
    }

    /// Bytes handed to the link on every attempt.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Outcome of the last attempt, or `PendingSend`.
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Consecutive failed attempts.
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Time of the last (re)arming, in µs.
    pub fn registered_at(&self) -> u32 {
        self.registered_at
    }

    /// Interval between deliveries in µs, `0` for one-shot packets.
    pub fn repeat_interval(&self) -> u32 {
        self.repeat_interval
    }

    /// Whether the packet stays queued after delivery.
    pub fn is_repeating(&self) -> bool {
        self.repeat_interval > 0
    }

    /// Whether the packet should be sent at `now`.
    ///
    /// A one-shot packet that has not failed yet is due at once.
    pub fn is_due(&self, now: u32) -> bool {
        let wait = self
            .repeat_interval
            .saturating_add(u32::from(self.attempts).pow(2));
        wait == 0 || elapsed_us(self.registered_at, now) > wait
    }

    fn rearm(&mut self, now: u32) {
        self.attempts = 0;
        self.registered_at = now;
        self.state = SlotState::PendingSend;
    }
}

/// Fixed-capacity send queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketQueue {
    slots: [Option<Packet>; MAX_PACKETS],
}

impl PacketQueue {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_PACKETS],
        }
    }

    /// Copies `payload` into the first free slot.
    ///
    /// # Arguments
    /// - `destination`: target address, or the broadcast address
    /// - `payload`: bytes to send, at most `max_len` of them
    /// - `repeat_interval`: `0` to send once, otherwise the µs between deliveries
    /// - `now`: current counter value, used as the arming time
    /// - `max_len`: largest payload the link accepts
    ///
    /// # Returns
    /// The slot index, usable with [`remove()`](PacketQueue::remove).
    ///
    /// # Errors
    /// - [`BusError::PayloadTooLong`] if `payload` is longer than `max_len`
    /// - [`BusError::BufferExhausted`] if every slot is taken
    /// - [`BusError::AllocationFailed`] if the payload could not be copied
    pub fn enqueue(
        &mut self,
        destination: u8,
        payload: &[u8],
        repeat_interval: u32,
        now: u32,
        max_len: usize,
    ) -> Result<usize, BusError> {
        if payload.len() > max_len {
            return Err(BusError::PayloadTooLong {
                length: payload.len(),
                max: max_len,
            });
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(BusError::BufferExhausted {
                capacity: MAX_PACKETS,
            })?;
        let payload = copy_payload(payload)?;
        self.slots[index] = Some(Packet {
            destination,
            payload,
            state: SlotState::PendingSend,
            attempts: 0,
            registered_at: now,
            repeat_interval,
        });
        Ok(index)
    }

    /// Sends every due packet once and applies the outcome.
    ///
    /// - `Ack`: one-shot packets are removed, repeating ones re-armed
    /// - `Fail`: the attempt is counted and the packet re-armed after the backoff;
    ///   past `max_attempts`, `on_error` gets [`BusError::ConnectionLost`] and the
    ///   packet is removed or, if repeating, reset
    /// - `Busy` and `Nak`: recorded only, the packet is retried on the next call
    ///
    /// The backoff counts from the failed attempt and adds to `repeat_interval`, so a
    /// repeating packet is retried at most once per interval.
    pub fn update<T, E>(&mut self, link: &mut T, max_attempts: u8, mut on_error: E)
    where
        T: Transmit + ?Sized,
        E: FnMut(BusError),
    {
        for index in 0..MAX_PACKETS {
            let now = link.now_us();
            let Some(packet) = self.slots[index].as_mut() else {
                continue;
            };
            if !packet.is_due(now) {
                continue;
            }

            let response = link.transmit(packet.destination, &packet.payload);
            let now = link.now_us();
            packet.state = SlotState::from(response);

            let finished = match response {
                Response::Ack if packet.is_repeating() => {
                    packet.rearm(now);
                    false
                }
                Response::Ack => true,
                Response::Fail => {
                    packet.attempts = packet.attempts.saturating_add(1);
                    packet.registered_at = now;
                    if packet.attempts > max_attempts {
                        warn!(
                            "no response from {} after {} attempts",
                            packet.destination, packet.attempts
                        );
                        on_error(BusError::ConnectionLost {
                            destination: packet.destination,
                        });
                        if packet.is_repeating() {
                            packet.rearm(now);
                            false
                        } else {
                            true
                        }
                    } else {
                        false
                    }
                }
                Response::Busy | Response::Nak => false,
            };
            if finished {
                let _ = self.remove(index);
            }
        }
    }

    /// Drops the packet in slot `index`, whatever its state.
    ///
    /// # Returns
    /// `true` if the slot held a packet.
    pub fn remove(&mut self, index: usize) -> bool {
        self.slots.get_mut(index).and_then(Option::take).is_some()
    }

    /// Packet in slot `index`.
    pub fn get(&self, index: usize) -> Option<&Packet> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// State of slot `index`, [`SlotState::Empty`] if nothing is queued there.
    pub fn state(&self, index: usize) -> SlotState {
        self.get(index).map_or(SlotState::Empty, Packet::state)
    }

    /// Live packets with their slot indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Packet)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|packet| (index, packet)))
    }

    /// Number of live packets.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no packet is queued.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Whether any one-shot packet is still waiting for delivery.
    pub fn has_one_shot_pending(&self) -> bool {
        self.iter().any(|(_, packet)| !packet.is_repeating())
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}
