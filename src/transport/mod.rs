//! Transport layer implementation (ISO 15765-2).
//!
//! This module turns diagnostic payloads into CAN frames and back:
//! - Addressing information for all six ISO-TP addressing formats
//! - Frame codec (Single, First, Consecutive and Flow Control frames)
//! - Segmentation with flow control handling on the sending side
//! - Reassembly with sequence and N_Cr checks on the receiving side
//! - A threaded session tying both directions to a [`crate::physical::PhysicalLayer`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use libcantp::physical::mock::MockPhysical;
//! use libcantp::transport::addressing::AddressParams;
//! use libcantp::transport::isotp::{IsoTp, IsoTpConfig};
//! use libcantp::transport::TransportLayer;
//! use libcantp::types::AddressingType;
//! use std::time::Duration;
//!
//! let config = IsoTpConfig {
//!     tx_physical: AddressParams::from_can_id(0x611),
//!     rx_physical: AddressParams::from_can_id(0x612),
//!     tx_functional: AddressParams::from_can_id(0x6FF),
//!     rx_functional: AddressParams::from_can_id(0x6FE),
//!     ..Default::default()
//! };
//! let mut isotp = IsoTp::with_physical(config, MockPhysical::new(None)).unwrap();
//! isotp.open().unwrap();
//! isotp
//!     .send_message(&[0x22, 0xF1, 0x90], AddressingType::Physical, None)
//!     .unwrap();
//! let response = isotp.receive_message(Some(Duration::from_millis(500)));
//! ```

pub mod addressing;
pub mod frame;
pub mod isotp;
pub mod message;
pub mod reassembler;
pub mod segmenter;


use crate::error::Result;
use crate::transport::message::MessageRecord;
use crate::types::{AddressingType, Config};
use std::time::Duration;

/// Transport layer trait that must be implemented by ISO-TP
pub trait TransportLayer: Send + Sync {
    type Config: Config;

    /// Starts processing inbound frames
    fn open(&mut self) -> Result<()>;
    /// Stops processing inbound frames and shuts the bus down
    fn close(&mut self) -> Result<()>;
    /// Sends one message, blocking until its last frame is on the bus
    fn send_message(
        &self,
        payload: &[u8],
        addressing_type: AddressingType,
        timeout: Option<Duration>,
    ) -> Result<MessageRecord>;
    /// Waits for the next complete message, physically addressed ones first
    fn receive_message(&self, timeout: Option<Duration>) -> Result<MessageRecord>;
    fn config(&self) -> &Self::Config;
}
