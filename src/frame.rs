//! Wire frame encoding and incremental decoding.
//!
//! ```text
//!  ____ ________ _________ ______ _____
//! | ID | LENGTH | PAYLOAD |  IV  | CRC |
//! |----|--------|---------|------|-----|
//! | 12 |   5    |  H   I  |      |  8  |
//! |____|________|_________|______|_____|
//! ```
//!
//! - `ID`: destination address, or [`BROADCAST_ADDRESS`]
//! - `LENGTH`: total number of bytes in the frame, itself and the CRC included
//! - `IV`: present only when the cipher is enabled; counted as payload here
//! - `CRC`: XOR of every preceding byte, so a valid frame XORs to zero
//!
//! [`build_frame`] produces the bytes a sender puts on the line.
//! [`FrameReader`] consumes bytes as a receiver demodulates them and decides
//! as early as possible whether to keep listening.

use heapless::Vec;

use crate::consts::{BROADCAST_ADDRESS, FRAME_OVERHEAD, MAX_FRAME_LEN};
use crate::crc::{crc_xor, crc_xor_update};
use crate::error::BusError;

/// Buffer holding one complete frame.
pub type FrameBuf = Vec<u8, MAX_FRAME_LEN>;

/// Encodes a frame for `destination` carrying `body`.
///
/// `body` is everything between the length byte and the CRC, i.e. the payload and,
/// when the cipher is enabled, its IV byte.
///
/// # Errors
/// [`BusError::PayloadTooLong`] when the frame would reach [`MAX_FRAME_LEN`] bytes,
/// which no receiver accepts.
pub fn build_frame(destination: u8, body: &[u8]) -> Result<FrameBuf, BusError> {
    let max = MAX_FRAME_LEN - 1 - FRAME_OVERHEAD;
    if body.len() > max {
        return Err(BusError::PayloadTooLong {
            length: body.len(),
            max,
        });
    }
    let length = (body.len() + FRAME_OVERHEAD) as u8;
    let mut frame = FrameBuf::new();
    let _ = frame.push(destination);
    let _ = frame.push(length);
    let _ = frame.extend_from_slice(body);
    let _ = frame.push(crc_xor(&frame));
    Ok(frame)
}

/// What a [`FrameReader`] concluded after its last byte.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ReadProgress {
    /// More bytes are needed.
    Pending,
    /// The frame is addressed to another node. Stop listening.
    Foreign,
    /// The declared length is impossible.
    Malformed,
    /// All bytes arrived and the checksum holds.
    Complete,
    /// All bytes arrived but the checksum does not hold.
    Corrupted,
}

/// Byte-at-a-time frame decoder.
///
/// The first byte must be this node's address or the broadcast address. The second
/// byte must declare a length between `overhead` and [`MAX_FRAME_LEN`] (exclusive).
/// The frame ends when that many bytes have been read.
#[derive(Debug, Clone)]
pub struct FrameReader {
    address: u8,
    overhead: usize,
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
    expected: usize,
    crc: u8,
}

impl FrameReader {
    /// Reader for frames addressed to `address` (or broadcast).
    ///
    /// `overhead` is the number of non-payload bytes a valid frame carries:
    /// [`FRAME_OVERHEAD`], plus one when an IV is expected.
    pub fn new(address: u8, overhead: usize) -> Self {
        Self {
            address,
            overhead,
            buf: [0; MAX_FRAME_LEN],
            len: 0,
            expected: MAX_FRAME_LEN,
            crc: 0,
        }
    }

    /// Feeds the next received byte.
    pub fn push(&mut self, byte: u8) -> ReadProgress {
        if self.len >= self.expected {
            return ReadProgress::Malformed;
        }
        self.buf[self.len] = byte;
        self.len += 1;
        self.crc = crc_xor_update(self.crc, &byte);

        match self.len {
            1 if byte != self.address && byte != BROADCAST_ADDRESS => {
                return ReadProgress::Foreign;
            }
            2 => {
                let declared = usize::from(byte);
                if declared < self.overhead || declared >= MAX_FRAME_LEN {
                    return ReadProgress::Malformed;
                }
                self.expected = declared;
            }
            _ => {}
        }

        if self.len < self.expected {
            ReadProgress::Pending
        } else if self.crc == 0 {
            ReadProgress::Complete
        } else {
            ReadProgress::Corrupted
        }
    }

    /// Destination byte of the frame, once read.
    pub fn destination(&self) -> Option<u8> {
        (self.len > 0).then_some(self.buf[0])
    }

    /// Whether the frame was sent to every node.
    pub fn is_broadcast(&self) -> bool {
        self.destination() == Some(BROADCAST_ADDRESS)
    }

    /// Bytes read so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Everything between the length byte and the CRC of a finished frame.
    pub fn body(&self) -> &[u8] {
        if self.len < FRAME_OVERHEAD || self.len < self.expected {
            return &[];
        }
        &self.buf[2..self.len - 1]
    }
}
