//! Addressing information: how diagnostic endpoints map onto CAN frame fields.
//!
//! A node owns four address entries (transmit/receive for physical and functional addressing).
//! Depending on the [`AddressingFormat`], an entry consists of the CAN identifier plus, for
//! extended and mixed addressing, one addressing byte that precedes the PCI in the frame data.

use crate::error::{Result, TransportError};
use crate::physical::can;
use crate::types::{AddressingType, CanId, Frame};

// Target address type byte (bits 16..=23) of fixed 29-bit identifiers
const NORMAL_FIXED_PHYSICAL: u32 = 0xDA;
const NORMAL_FIXED_FUNCTIONAL: u32 = 0xDB;
const MIXED_29BIT_PHYSICAL: u32 = 0xCE;
const MIXED_29BIT_FUNCTIONAL: u32 = 0xCD;

/// Priority used when a fixed 29-bit identifier is built from target/source addresses
pub const DEFAULT_PRIORITY: u8 = 6;

/// ISO 15765-2 addressing formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingFormat {
    Normal11Bit,
    NormalFixed29Bit,
    Extended11Bit,
    Extended29Bit,
    Mixed11Bit,
    Mixed29Bit,
}

impl AddressingFormat {
    /// Number of addressing bytes placed in front of the PCI
    pub fn ai_data_bytes(self) -> usize {
        match self {
            AddressingFormat::Normal11Bit | AddressingFormat::NormalFixed29Bit => 0,
            AddressingFormat::Extended11Bit
            | AddressingFormat::Extended29Bit
            | AddressingFormat::Mixed11Bit
            | AddressingFormat::Mixed29Bit => 1,
        }
    }

    /// Whether frames of this format carry 29-bit identifiers
    pub fn uses_extended_id(self) -> bool {
        matches!(
            self,
            AddressingFormat::NormalFixed29Bit
                | AddressingFormat::Extended29Bit
                | AddressingFormat::Mixed29Bit
        )
    }

    fn fixed_id_types(self) -> Option<(u32, u32)> {
        match self {
            AddressingFormat::NormalFixed29Bit => {
                Some((NORMAL_FIXED_PHYSICAL, NORMAL_FIXED_FUNCTIONAL))
            }
            AddressingFormat::Mixed29Bit => Some((MIXED_29BIT_PHYSICAL, MIXED_29BIT_FUNCTIONAL)),
            _ => None,
        }
    }
}

/// Fields decoded from a fixed 29-bit identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCanId {
    pub priority: u8,
    pub addressing_type: AddressingType,
    pub target_address: u8,
    pub source_address: u8,
}

/// Builds a Normal Fixed or Mixed 29-bit identifier
pub fn encode_fixed_can_id(
    format: AddressingFormat,
    addressing_type: AddressingType,
    target_address: u8,
    source_address: u8,
    priority: u8,
) -> Result<CanId> {
    let (physical, functional) = format.fixed_id_types().ok_or_else(|| {
        TransportError::Configuration(format!("{:?} does not use fixed CAN IDs", format))
    })?;
    if priority > 7 {
        return Err(TransportError::Configuration(format!(
            "priority {} does not fit in 3 bits",
            priority
        )));
    }
    let ta_type = match addressing_type {
        AddressingType::Physical => physical,
        AddressingType::Functional => functional,
    };
    Ok(((priority as u32) << 26)
        | (ta_type << 16)
        | ((target_address as u32) << 8)
        | source_address as u32)
}

/// Decodes a Normal Fixed or Mixed 29-bit identifier, `None` if the layout does not match
pub fn decode_fixed_can_id(format: AddressingFormat, can_id: CanId) -> Option<FixedCanId> {
    let (physical, functional) = format.fixed_id_types()?;
    if !can::is_extended_id(can_id) {
        return None;
    }
    // Reserved and data page bits (24, 25) must be clear
    let ta_type = (can_id >> 16) & 0x3FF;
    let addressing_type = if ta_type == physical {
        AddressingType::Physical
    } else if ta_type == functional {
        AddressingType::Functional
    } else {
        return None;
    };
    Some(FixedCanId {
        priority: ((can_id >> 26) & 0x07) as u8,
        addressing_type,
        target_address: (can_id >> 8) as u8,
        source_address: can_id as u8,
    })
}

/// User supplied parameters of one address entry.
///
/// Which fields are required depends on the addressing format; see
/// [`AddressingInformation::validate_packet_address`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressParams {
    pub can_id: Option<CanId>,
    pub target_address: Option<u8>,
    pub source_address: Option<u8>,
    pub address_extension: Option<u8>,
}

impl AddressParams {
    pub fn from_can_id(can_id: CanId) -> Self {
        Self {
            can_id: Some(can_id),
            ..Default::default()
        }
    }

    /// Target and source address only; fixed 29-bit formats derive the identifier from them
    pub fn from_addresses(target_address: u8, source_address: u8) -> Self {
        Self {
            target_address: Some(target_address),
            source_address: Some(source_address),
            ..Default::default()
        }
    }

    pub fn with_target_address(mut self, target_address: u8) -> Self {
        self.target_address = Some(target_address);
        self
    }

    pub fn with_source_address(mut self, source_address: u8) -> Self {
        self.source_address = Some(source_address);
        self
    }

    pub fn with_address_extension(mut self, address_extension: u8) -> Self {
        self.address_extension = Some(address_extension);
        self
    }
}

/// Validated address entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketAddress {
    pub addressing_type: AddressingType,
    pub can_id: CanId,
    pub target_address: Option<u8>,
    pub source_address: Option<u8>,
    pub address_extension: Option<u8>,
}

impl PacketAddress {
    /// Byte placed in front of the PCI under the given format
    pub fn addressing_byte(&self, format: AddressingFormat) -> Option<u8> {
        match format {
            AddressingFormat::Extended11Bit | AddressingFormat::Extended29Bit => {
                self.target_address
            }
            AddressingFormat::Mixed11Bit | AddressingFormat::Mixed29Bit => self.address_extension,
            AddressingFormat::Normal11Bit | AddressingFormat::NormalFixed29Bit => None,
        }
    }

    fn params(&self) -> AddressParams {
        AddressParams {
            can_id: Some(self.can_id),
            target_address: self.target_address,
            source_address: self.source_address,
            address_extension: self.address_extension,
        }
    }
}

/// Role of an address entry within a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingRole {
    TxPhysical,
    RxPhysical,
    TxFunctional,
    RxFunctional,
}

impl AddressingRole {
    pub fn transmitting(addressing_type: AddressingType) -> Self {
        match addressing_type {
            AddressingType::Physical => AddressingRole::TxPhysical,
            AddressingType::Functional => AddressingRole::TxFunctional,
        }
    }

    pub fn receiving(addressing_type: AddressingType) -> Self {
        match addressing_type {
            AddressingType::Physical => AddressingRole::RxPhysical,
            AddressingType::Functional => AddressingRole::RxFunctional,
        }
    }

    pub fn addressing_type(self) -> AddressingType {
        match self {
            AddressingRole::TxPhysical | AddressingRole::RxPhysical => AddressingType::Physical,
            AddressingRole::TxFunctional | AddressingRole::RxFunctional => {
                AddressingType::Functional
            }
        }
    }
}

/// Identifier and addressing byte stamped on an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub can_id: CanId,
    pub is_extended: bool,
    pub addressing_byte: Option<u8>,
}

/// Addressing information of a CAN node.
///
/// Immutable once constructed; [`AddressingInformation::new`] rejects inconsistent entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressingInformation {
    format: AddressingFormat,
    tx_physical: PacketAddress,
    rx_physical: PacketAddress,
    tx_functional: PacketAddress,
    rx_functional: PacketAddress,
}

fn forbid(format: AddressingFormat, name: &str, value: Option<u8>) -> Result<()> {
    if value.is_some() {
        return Err(TransportError::Configuration(format!(
            "{} is not used by {:?} addressing",
            name, format
        )));
    }
    Ok(())
}

fn require(format: AddressingFormat, name: &str, value: Option<u8>) -> Result<u8> {
    value.ok_or_else(|| {
        TransportError::Configuration(format!("{} is required by {:?} addressing", name, format))
    })
}

fn require_can_id(format: AddressingFormat, params: &AddressParams) -> Result<CanId> {
    let can_id = params.can_id.ok_or_else(|| {
        TransportError::Configuration(format!("CAN ID is required by {:?} addressing", format))
    })?;
    can::validate_can_id(can_id, format.uses_extended_id())?;
    Ok(can_id)
}

fn resolve_fixed_can_id(
    format: AddressingFormat,
    addressing_type: AddressingType,
    params: &AddressParams,
) -> Result<(CanId, u8, u8)> {
    let Some(can_id) = params.can_id else {
        let target_address = require(format, "target address", params.target_address)?;
        let source_address = require(format, "source address", params.source_address)?;
        let can_id = encode_fixed_can_id(
            format,
            addressing_type,
            target_address,
            source_address,
            DEFAULT_PRIORITY,
        )?;
        return Ok((can_id, target_address, source_address));
    };

    let decoded = decode_fixed_can_id(format, can_id).ok_or_else(|| {
        TransportError::Configuration(format!(
            "CAN ID {:#X} is not a {:?} identifier",
            can_id, format
        ))
    })?;
    if decoded.addressing_type != addressing_type {
        return Err(TransportError::Configuration(format!(
            "CAN ID {:#X} encodes {:?} addressing, expected {:?}",
            can_id, decoded.addressing_type, addressing_type
        )));
    }
    if params
        .target_address
        .is_some_and(|ta| ta != decoded.target_address)
        || params
            .source_address
            .is_some_and(|sa| sa != decoded.source_address)
    {
        return Err(TransportError::Configuration(format!(
            "target/source address disagree with CAN ID {:#X}",
            can_id
        )));
    }
    Ok((can_id, decoded.target_address, decoded.source_address))
}

impl AddressingInformation {
    /// Validates the four entries and the node as a whole
    pub fn new(
        format: AddressingFormat,
        tx_physical: AddressParams,
        rx_physical: AddressParams,
        tx_functional: AddressParams,
        rx_functional: AddressParams,
    ) -> Result<Self> {
        let info = Self {
            format,
            tx_physical: Self::validate_packet_address(
                format,
                AddressingType::Physical,
                &tx_physical,
            )?,
            rx_physical: Self::validate_packet_address(
                format,
                AddressingType::Physical,
                &rx_physical,
            )?,
            tx_functional: Self::validate_packet_address(
                format,
                AddressingType::Functional,
                &tx_functional,
            )?,
            rx_functional: Self::validate_packet_address(
                format,
                AddressingType::Functional,
                &rx_functional,
            )?,
        };
        info.validate()?;
        Ok(info)
    }

    /// Checks one entry against the format and fills in the fields derivable from the CAN ID
    pub fn validate_packet_address(
        format: AddressingFormat,
        addressing_type: AddressingType,
        params: &AddressParams,
    ) -> Result<PacketAddress> {
        match format {
            AddressingFormat::Normal11Bit => {
                forbid(format, "target address", params.target_address)?;
                forbid(format, "source address", params.source_address)?;
                forbid(format, "address extension", params.address_extension)?;
                Ok(PacketAddress {
                    addressing_type,
                    can_id: require_can_id(format, params)?,
                    target_address: None,
                    source_address: None,
                    address_extension: None,
                })
            }
            AddressingFormat::Extended11Bit | AddressingFormat::Extended29Bit => {
                forbid(format, "source address", params.source_address)?;
                forbid(format, "address extension", params.address_extension)?;
                let target_address = require(format, "target address", params.target_address)?;
                Ok(PacketAddress {
                    addressing_type,
                    can_id: require_can_id(format, params)?,
                    target_address: Some(target_address),
                    source_address: None,
                    address_extension: None,
                })
            }
            AddressingFormat::Mixed11Bit => {
                forbid(format, "target address", params.target_address)?;
                forbid(format, "source address", params.source_address)?;
                let address_extension =
                    require(format, "address extension", params.address_extension)?;
                Ok(PacketAddress {
                    addressing_type,
                    can_id: require_can_id(format, params)?,
                    target_address: None,
                    source_address: None,
                    address_extension: Some(address_extension),
                })
            }
            AddressingFormat::NormalFixed29Bit | AddressingFormat::Mixed29Bit => {
                let address_extension = if format == AddressingFormat::Mixed29Bit {
                    Some(require(
                        format,
                        "address extension",
                        params.address_extension,
                    )?)
                } else {
                    forbid(format, "address extension", params.address_extension)?;
                    None
                };
                let (can_id, target_address, source_address) =
                    resolve_fixed_can_id(format, addressing_type, params)?;
                Ok(PacketAddress {
                    addressing_type,
                    can_id,
                    target_address: Some(target_address),
                    source_address: Some(source_address),
                    address_extension,
                })
            }
        }
    }

    /// Node level consistency checks.
    ///
    /// Receive entries must be distinguishable from each other and from both transmit entries.
    /// Mixed formats share the address extension between the rx and tx entry of an addressing
    /// type; fixed 29-bit formats swap target and source address between them.
    pub fn validate(&self) -> Result<()> {
        for role in [
            AddressingRole::TxPhysical,
            AddressingRole::RxPhysical,
            AddressingRole::TxFunctional,
            AddressingRole::RxFunctional,
        ] {
            let entry = self.entry(role);
            let revalidated = Self::validate_packet_address(
                self.format,
                role.addressing_type(),
                &entry.params(),
            )?;
            if revalidated != *entry {
                return Err(TransportError::Configuration(format!(
                    "{:?} entry is inconsistent with {:?} addressing",
                    role, self.format
                )));
            }
        }

        if self.identity(&self.rx_physical) == self.identity(&self.rx_functional) {
            return Err(TransportError::Configuration(
                "rx_physical and rx_functional cannot be told apart".into(),
            ));
        }
        for (rx_role, rx) in [
            (AddressingRole::RxPhysical, &self.rx_physical),
            (AddressingRole::RxFunctional, &self.rx_functional),
        ] {
            for (tx_role, tx) in [
                (AddressingRole::TxPhysical, &self.tx_physical),
                (AddressingRole::TxFunctional, &self.tx_functional),
            ] {
                if self.identity(rx) == self.identity(tx) {
                    return Err(TransportError::Configuration(format!(
                        "{:?} and {:?} cannot be told apart",
                        rx_role, tx_role
                    )));
                }
            }
        }

        for (rx, tx) in [
            (&self.rx_physical, &self.tx_physical),
            (&self.rx_functional, &self.tx_functional),
        ] {
            if matches!(
                self.format,
                AddressingFormat::Mixed11Bit | AddressingFormat::Mixed29Bit
            ) && rx.address_extension != tx.address_extension
            {
                return Err(TransportError::Configuration(format!(
                    "{:?} rx and tx entries use different address extensions",
                    rx.addressing_type
                )));
            }
            if matches!(
                self.format,
                AddressingFormat::NormalFixed29Bit | AddressingFormat::Mixed29Bit
            ) && (rx.target_address != tx.source_address
                || rx.source_address != tx.target_address)
            {
                return Err(TransportError::Configuration(format!(
                    "{:?} rx and tx entries must swap target and source address",
                    rx.addressing_type
                )));
            }
        }
        Ok(())
    }

    pub fn addressing_format(&self) -> AddressingFormat {
        self.format
    }

    pub fn entry(&self, role: AddressingRole) -> &PacketAddress {
        match role {
            AddressingRole::TxPhysical => &self.tx_physical,
            AddressingRole::RxPhysical => &self.rx_physical,
            AddressingRole::TxFunctional => &self.tx_functional,
            AddressingRole::RxFunctional => &self.rx_functional,
        }
    }

    /// Receive role an inbound frame belongs to, if any
    pub fn matches(&self, frame: &Frame) -> Option<AddressingRole> {
        [AddressingRole::RxPhysical, AddressingRole::RxFunctional]
            .into_iter()
            .find(|&role| self.frame_matches(frame, self.entry(role)))
    }

    /// Transmit role of a frame this node sent itself (seen when the bus echoes own frames)
    pub fn matches_transmitted(&self, frame: &Frame) -> Option<AddressingRole> {
        [AddressingRole::TxPhysical, AddressingRole::TxFunctional]
            .into_iter()
            .find(|&role| self.frame_matches(frame, self.entry(role)))
    }

    /// Identifier and addressing byte for frames sent in the given role
    pub fn frame_header_for(&self, role: AddressingRole) -> FrameHeader {
        let entry = self.entry(role);
        FrameHeader {
            can_id: entry.can_id,
            is_extended: self.format.uses_extended_id(),
            addressing_byte: entry.addressing_byte(self.format),
        }
    }

    fn identity(&self, entry: &PacketAddress) -> (CanId, Option<u8>) {
        (entry.can_id, entry.addressing_byte(self.format))
    }

    fn frame_matches(&self, frame: &Frame, entry: &PacketAddress) -> bool {
        if frame.id != entry.can_id || frame.is_extended != self.format.uses_extended_id() {
            return false;
        }
        match entry.addressing_byte(self.format) {
            Some(byte) => frame.data.first() == Some(&byte),
            None => true,
        }
    }
}
