//! Constants used across the bus protocol implementation.
//!
//! This module defines the protocol-wide values used for bit timing,
//! reserved addresses, response bytes, buffer sizing and retry limits.
//!
//! ## Key Concepts
//!
//! - **Timing**: Every bit is a level held for [`BIT_WIDTH`] µs. Every byte is
//!   preceded by a long HIGH of [`BIT_SPACER`] µs and a LOW of [`BIT_WIDTH`] µs.
//! - **Addresses**: `0` means "no address", [`BROADCAST_ADDRESS`] reaches every node
//!   and is never acknowledged.
//! - **Frame Limits**: A frame carries its own total length in its second byte,
//!   so [`MAX_FRAME_LEN`] bounds both the receive buffer and the largest payload.
//! - **Queue Sizing**: [`MAX_PACKETS`] slots are available to the send queue.
//!
//! Both ends of a link must agree on the timing constants and the cipher settings.

/// Duration (in µs) a single data bit is held on the line.
pub const BIT_WIDTH: u32 = 350;

/// Duration (in µs) of the HIGH synchronization pulse that precedes every byte.
///
/// Deliberately longer than [`BIT_WIDTH`] so a receiver can tell it apart from data.
pub const BIT_SPACER: u32 = 750;

/// Duration (in µs) of the LOW pulse emitted by the channel sensor before it listens.
pub const CHANNEL_FLUSH_US: u32 = 2;

/// Response byte sent by a receiver that accepted a frame.
pub const ACK: u8 = 6;

/// Response byte sent by a receiver that saw a checksum mismatch.
pub const NAK: u8 = 21;

/// Address reached by every node. Frames sent here are never acknowledged.
pub const BROADCAST_ADDRESS: u8 = 124;

/// Address value meaning "no node".
pub const NO_ADDRESS: u8 = 0;

/// Maximum on-wire frame length (address, length, payload, IV and CRC).
///
/// A receiver rejects any frame that declares a length of this value or more.
pub const MAX_FRAME_LEN: usize = 64;

/// Frame bytes that are not payload: address, length and CRC.
pub const FRAME_OVERHEAD: usize = 3;

/// Extra frame byte carried when the cipher appends its initialization vector.
pub const IV_LEN: usize = 1;

/// Largest payload that fits a frame without the cipher's IV byte.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - 1 - FRAME_OVERHEAD;

/// Number of slots in the outbound packet queue.
pub const MAX_PACKETS: usize = 10;

/// Consecutive failed deliveries tolerated before a connection is reported lost.
pub const MAX_ATTEMPTS: u8 = 10;

/// Size of the cipher's permutation table.
pub const ENCRYPTION_STRENGTH: usize = 2;

/// Pre-shared key used when no other key is configured.
pub const DEFAULT_KEY: &[u8] = b"19id\xc2\xb0?=(!$=<zkl";

/// First byte of a command payload.
pub const CMD: u8 = 88;
