//! XOR-fold frame checksum

use crate::constants::HEADER_SIZE;

/// Offset of the checksum byte inside the frame header
pub const CHECKSUM_OFFSET: usize = 3;

/// XOR of every byte in `frame` except the checksum field.
///
/// # Panics
///
/// Panics if `frame` is shorter than the header. Callers always hold at
/// least a full header, so a short buffer is a bug upstream.
pub fn checksum(frame: &[u8]) -> u8 {
    assert!(
        frame.len() >= HEADER_SIZE,
        "checksum over {} bytes, header needs {}",
        frame.len(),
        HEADER_SIZE
    );

    frame
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != CHECKSUM_OFFSET)
        .fold(0u8, |acc, (_, &b)| acc ^ b)
}
