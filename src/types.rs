/// CAN ID type
pub type CanId = u32;

/// Generic frame data type
pub type FrameData = Vec<u8>;

/// Timestamp in milliseconds, as reported by the bus
pub type Timestamp = u64;

/// Generic frame structure used across layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: CanId,
    pub data: FrameData,
    pub timestamp: Timestamp,
    pub is_extended: bool,
    pub is_fd: bool,
}

impl Frame {
    /// Creates a classic CAN frame with an 11-bit identifier
    pub fn new(id: CanId, data: &[u8]) -> Self {
        Self {
            id,
            data: data.to_vec(),
            ..Default::default()
        }
    }

    /// Creates a classic CAN frame with a 29-bit identifier
    pub fn new_extended(id: CanId, data: &[u8]) -> Self {
        Self {
            id,
            data: data.to_vec(),
            is_extended: true,
            ..Default::default()
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            id: 0,
            data: Vec::new(),
            timestamp: 0,
            is_extended: false,
            is_fd: false,
        }
    }
}

/// Diagnostic addressing type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingType {
    /// 1-to-1 communication
    Physical,
    /// 1-to-n communication
    Functional,
}

impl AddressingType {
    /// Both addressing types, physical first
    pub const ALL: [AddressingType; 2] = [AddressingType::Physical, AddressingType::Functional];

    /// Slot in per-addressing-type tables
    pub fn index(self) -> usize {
        match self {
            AddressingType::Physical => 0,
            AddressingType::Functional => 1,
        }
    }
}

/// Whether a frame or message was received or transmitted by this node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionDirection {
    Received,
    Transmitted,
}

/// Configuration trait that must be implemented by all protocol configurations
pub trait Config: Send + Sync {
    fn validate(&self) -> crate::error::Result<()>;
}
