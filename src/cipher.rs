//! Pre-shared key stream cipher with a one byte initialization vector.
//!
//! The keystream comes from a key-scheduled permutation table (RC4 style) of
//! `strength` entries. The table is rebuilt from the key on every call and
//! consumed while the keystream is generated, so no cipher state survives
//! between frames.
//!
//! With the IV enabled, the sender draws a byte in `1..=254` that does not occur
//! anywhere in the ciphertext, XORs every ciphertext byte with it and appends it.
//! Identical payloads therefore look different on the wire from one frame to the
//! next. The receiver pops the IV, XORs it back out and runs the keystream again.
//!
//! This obscures traffic from casual listeners. It is not authenticated encryption.

use heapless::Vec;

use crate::consts::ENCRYPTION_STRENGTH;
use crate::error::BusError;
use crate::timer::MicrosClock;

/// Largest supported permutation table.
pub const MAX_STRENGTH: usize = 256;

/// Number of distinct IV values, `1..=254`.
const IV_SPACE: u32 = 254;

/// Stream cipher bound to a pre-shared key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cipher<'k> {
    key: &'k [u8],
    strength: usize,
    iv: bool,
}

impl<'k> Cipher<'k> {
    /// Cipher with the default table size and the IV enabled.
    pub const fn new(key: &'k [u8]) -> Self {
        Self::with_strength(key, ENCRYPTION_STRENGTH)
    }

    /// Cipher with a custom table size, clamped to `1..=MAX_STRENGTH`.
    pub const fn with_strength(key: &'k [u8], strength: usize) -> Self {
        let strength = if strength == 0 {
            1
        } else if strength > MAX_STRENGTH {
            MAX_STRENGTH
        } else {
            strength
        };
        Self {
            key,
            strength,
            iv: true,
        }
    }

    /// Disables the initialization vector. Both ends must agree.
    pub const fn without_iv(mut self) -> Self {
        self.iv = false;
        self
    }

    /// Whether an IV byte is appended to every ciphertext.
    pub const fn uses_iv(&self) -> bool {
        self.iv
    }

    /// Size of the permutation table.
    pub const fn strength(&self) -> usize {
        self.strength
    }

    fn key_byte(&self, index: usize) -> usize {
        match self.key.len() {
            0 => 0,
            len => usize::from(self.key[index % len]),
        }
    }

    fn schedule(&self) -> [u8; MAX_STRENGTH] {
        let n = self.strength;
        let mut table = [0u8; MAX_STRENGTH];
        for (i, slot) in table.iter_mut().take(n).enumerate() {
            *slot = i as u8;
        }
        let mut j = 0usize;
        for i in 0..n {
            j = (j + usize::from(table[i]) + self.key_byte(i)) % n;
            table.swap(i, j);
        }
        table
    }

    /// XORs `buf` with the keystream. Applying it twice restores the input.
    pub fn apply_keystream(&self, buf: &mut [u8]) {
        let n = self.strength;
        let mut table = self.schedule();
        let (mut i, mut j) = (0usize, 0usize);
        for byte in buf.iter_mut() {
            i = (i + 1) % n;
            j = (j + usize::from(table[i])) % n;
            table.swap(i, j);
            let k = (usize::from(table[i]) + usize::from(table[j])) % n;
            *byte ^= table[k];
        }
    }

    /// Encrypts `buf` in place and, with the IV enabled, appends the IV byte.
    ///
    /// # Errors
    /// [`BusError::PayloadTooLong`] if there is no room left for the IV byte.
    pub fn encode<const N: usize, C: MicrosClock>(
        &self,
        buf: &mut Vec<u8, N>,
        clock: &mut C,
    ) -> Result<(), BusError> {
        if self.iv && buf.is_full() {
            return Err(BusError::PayloadTooLong {
                length: buf.len(),
                max: N.saturating_sub(1),
            });
        }
        self.apply_keystream(buf);
        if self.iv {
            let iv = Self::generate_iv(buf, clock);
            for byte in buf.iter_mut() {
                *byte ^= iv;
            }
            buf.push(iv).map_err(|_| BusError::PayloadTooLong {
                length: N,
                max: N.saturating_sub(1),
            })?;
        }
        Ok(())
    }

    /// Reverses [`encode()`](Cipher::encode) in place.
    ///
    /// # Returns
    /// The plaintext length, or `None` if the IV byte is missing.
    pub fn decode<const N: usize>(&self, buf: &mut Vec<u8, N>) -> Option<usize> {
        if self.iv {
            let iv = buf.pop()?;
            for byte in buf.iter_mut() {
                *byte ^= iv;
            }
        }
        self.apply_keystream(buf);
        Some(buf.len())
    }

    /// Draws an IV in `1..=254` that does not occur in `ciphertext`.
    ///
    /// Candidates come from the microsecond counter. After 254 colliding draws the
    /// lowest free value is used instead, and if every value is taken the last
    /// candidate is returned as is.
    pub fn generate_iv<C: MicrosClock>(ciphertext: &[u8], clock: &mut C) -> u8 {
        let mut candidate = 1;
        for _ in 0..IV_SPACE {
            candidate = (clock.now_us() % IV_SPACE) as u8 + 1;
            if !ciphertext.contains(&candidate) {
                return candidate;
            }
        }
        (1..=IV_SPACE as u8)
            .find(|value| !ciphertext.contains(value))
            .unwrap_or(candidate)
    }
}

impl Default for Cipher<'static> {
    fn default() -> Self {
        Self::new(crate::consts::DEFAULT_KEY)
    }
}
