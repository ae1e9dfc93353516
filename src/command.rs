//! Command payloads.
//!
//! A command is an ordinary payload whose first byte is [`CMD`]:
//!
//! ```text
//!  _____ ______ ___________
//! | CMD | kind |   value   |
//! |-----|------|-----------|
//! |  88 | 0-255| 1-2 bytes |
//! |_____|______|___________|
//! ```
//!
//! `kind` identifies the reaction the receiver should run. A two byte value is sent
//! big endian.

use heapless::Vec;

use crate::consts::CMD;

/// Argument carried by a [`Command`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum CommandValue {
    /// One byte.
    Byte(u8),
    /// Two bytes, big endian on the wire.
    Word(u16),
}

/// A typed instruction sent as a payload.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Command {
    /// Reaction identifier.
    pub kind: u8,
    /// Argument.
    pub value: CommandValue,
}

impl Command {
    /// Command with a one byte argument.
    pub const fn byte(kind: u8, value: u8) -> Self {
        Self {
            kind,
            value: CommandValue::Byte(value),
        }
    }

    /// Command with a two byte argument.
    pub const fn word(kind: u8, value: u16) -> Self {
        Self {
            kind,
            value: CommandValue::Word(value),
        }
    }

    /// Wire form of the command.
    pub fn encode(&self) -> Vec<u8, 4> {
        let mut bytes = Vec::new();
        let _ = bytes.push(CMD);
        let _ = bytes.push(self.kind);
        match self.value {
            CommandValue::Byte(value) => {
                let _ = bytes.push(value);
            }
            CommandValue::Word(value) => {
                let _ = bytes.extend_from_slice(&value.to_be_bytes());
            }
        }
        bytes
    }

    /// Recognizes a received payload as a command.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match *payload {
            [CMD, kind, value] => Some(Self::byte(kind, value)),
            [CMD, kind, high, low] => Some(Self::word(kind, u16::from_be_bytes([high, low]))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_command_wire_form() {
        assert_eq!(&Command::byte(3, 200).encode()[..], &[CMD, 3, 200]);
    }

    #[test]
    fn test_word_command_is_big_endian() {
        let command = Command::word(7, 0x1234);
        assert_eq!(&command.encode()[..], &[CMD, 7, 0x12, 0x34]);
        assert_eq!(Command::parse(&command.encode()), Some(command));
    }

    #[test]
    fn test_parse_rejects_plain_payloads() {
        assert_eq!(Command::parse(b"HI!"), None);
        assert_eq!(Command::parse(&[CMD]), None);
        assert_eq!(Command::parse(&[CMD, 1, 2, 3, 4]), None);
        assert_eq!(Command::parse(&[CMD, 1, 2]), Some(Command::byte(1, 2)));
    }
}
