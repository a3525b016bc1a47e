//! CAN-FD data length handling.
//!
//! CAN-FD frames can carry up to 64 data bytes, but above 8 bytes only a fixed set of lengths can
//! be expressed by the 4-bit DLC field. Frames shorter than a valid length have to be padded up to
//! the next one.

/// Data length for each DLC value (index = DLC)
pub const DATA_LENGTHS: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Data bytes in the largest CAN-FD frame
pub const MAX_DATA_LENGTH: usize = 64;

/// Converts a data length into its DLC, if the length is representable
pub fn data_length_to_dlc(len: usize) -> Option<u8> {
    DATA_LENGTHS
        .iter()
        .position(|&valid| valid == len)
        .map(|dlc| dlc as u8)
}

/// Checks whether a CAN-FD frame can carry exactly `len` data bytes
pub fn is_valid_data_length(len: usize) -> bool {
    data_length_to_dlc(len).is_some()
}

/// Smallest valid CAN-FD data length that holds `len` bytes
pub fn min_data_length(len: usize) -> Option<usize> {
    DATA_LENGTHS.iter().copied().find(|&valid| valid >= len)
}
