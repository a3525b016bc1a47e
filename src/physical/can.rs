use crate::error::{Result, TransportError};
use crate::types::CanId;

/// Highest 11-bit identifier
pub const MAX_STANDARD_ID: CanId = 0x7FF;
/// Highest 29-bit identifier
pub const MAX_EXTENDED_ID: CanId = 0x1FFF_FFFF;
/// Data bytes in a classic CAN frame
pub const MAX_DATA_LENGTH: usize = 8;

/// Checks whether the identifier fits the 11-bit format
pub fn is_standard_id(id: CanId) -> bool {
    id <= MAX_STANDARD_ID
}

/// Checks whether the identifier fits the 29-bit format
pub fn is_extended_id(id: CanId) -> bool {
    id <= MAX_EXTENDED_ID
}

/// Validates an identifier against the requested format
pub fn validate_can_id(id: CanId, extended: bool) -> Result<()> {
    let valid = if extended {
        is_extended_id(id)
    } else {
        is_standard_id(id)
    };
    if !valid {
        return Err(TransportError::Configuration(format!(
            "CAN ID {:#X} does not fit the {} format",
            id,
            if extended { "29-bit" } else { "11-bit" }
        )));
    }
    Ok(())
}
