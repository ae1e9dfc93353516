//! Runtime configuration for an [`AskBus`](crate::driver::AskBus) node.
//!
//! Compile-time limits (queue depth, frame length, cipher table size) live in
//! [`crate::consts`]. Everything two nodes must agree on at runtime lives here.

use crate::consts::{
    BIT_SPACER, BIT_WIDTH, DEFAULT_KEY, FRAME_OVERHEAD, IV_LEN, MAX_ATTEMPTS, MAX_FRAME_LEN,
};

/// Bit timing of the physical layer, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Timing {
    /// Duration of a data bit and of the LOW sync gap.
    pub bit_width_us: u32,
    /// Duration of the HIGH sync pulse that precedes every byte.
    pub bit_spacer_us: u32,
}

impl Timing {
    /// Creates a timing profile. `bit_spacer_us` should be clearly longer than `bit_width_us`.
    pub const fn new(bit_width_us: u32, bit_spacer_us: u32) -> Self {
        Self {
            bit_width_us,
            bit_spacer_us,
        }
    }

    /// Window a sender waits for an `ACK`/`NAK` after its last byte.
    pub const fn response_window_us(&self) -> u32 {
        self.bit_spacer_us + self.bit_width_us
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(BIT_WIDTH, BIT_SPACER)
    }
}

/// Direction of the link.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum LinkMode {
    /// Transmit and receive on one channel, taking turns. Unicast frames are acknowledged.
    #[default]
    HalfDuplex,
    /// One direction only. Nothing is acknowledged and every send counts as delivered.
    Simplex,
}

/// Settings for a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// This node's address. Avoid [`BROADCAST_ADDRESS`](crate::consts::BROADCAST_ADDRESS).
    pub address: u8,
    /// Physical layer timing.
    pub timing: Timing,
    /// Whether unicast frames expect a response.
    pub link: LinkMode,
    /// Listen for traffic before transmitting and back off when the channel is busy.
    pub collision_avoidance: bool,
    /// Obscure payloads with the stream cipher and a per-frame IV.
    pub encryption: bool,
    /// Pre-shared cipher key.
    pub key: &'static [u8],
    /// Consecutive failed deliveries tolerated before a connection is reported lost.
    pub max_attempts: u8,
}

impl BusConfig {
    /// Half-duplex node with collision avoidance, no encryption.
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            timing: Timing::new(BIT_WIDTH, BIT_SPACER),
            link: LinkMode::HalfDuplex,
            collision_avoidance: true,
            encryption: false,
            key: DEFAULT_KEY,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Transmit-or-receive-only node: no acknowledgements, no channel sensing.
    pub const fn simplex(address: u8) -> Self {
        let mut config = Self::new(address);
        config.link = LinkMode::Simplex;
        config.collision_avoidance = false;
        config
    }

    /// Whether unicast frames are acknowledged on this link.
    pub const fn is_acknowledged(&self) -> bool {
        matches!(self.link, LinkMode::HalfDuplex)
    }

    /// Frame bytes that are not payload with the current cipher setting.
    pub const fn frame_overhead(&self) -> usize {
        if self.encryption {
            FRAME_OVERHEAD + IV_LEN
        } else {
            FRAME_OVERHEAD
        }
    }

    /// Largest payload a frame can carry with the current cipher setting.
    pub const fn max_payload_len(&self) -> usize {
        MAX_FRAME_LEN - 1 - self.frame_overhead()
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new(crate::consts::NO_ADDRESS)
    }
}
