/// Folds one byte into a running XOR checksum.
pub(crate) fn crc_xor_update(crc: u8, data: &u8) -> u8 {
    crc ^ *data
}

/// XOR checksum over a whole slice. A valid frame, CRC byte included, folds to zero.
pub(crate) fn crc_xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, crc_xor_update)
}
