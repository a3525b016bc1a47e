//! Physical layer interface for the CAN transport.
//!
//! The transport does not drive CAN hardware itself. It consumes a bus collaborator through the
//! [`PhysicalLayer`] trait, which provides:
//! - Frame transmission (one frame at a time)
//! - Non-blocking frame reception
//! - Bus shutdown
//!
//! This module also holds the CAN and CAN-FD data-length and identifier rules that the transport
//! needs when it builds frames:
//! - Classic CAN (Controller Area Network)
//! - CAN-FD (CAN with Flexible Data-Rate)
//!
//! # Examples
//!
//! ```rust,no_run
//! use libcantp::physical::{can, canfd};
//!
//! assert!(can::is_standard_id(0x7FF));
//! assert_eq!(canfd::min_data_length(9), Some(12));
//! ```

pub mod can;
pub mod canfd;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use crate::error::Result;
use crate::types::Frame;

/// Physical layer trait that must be implemented by CAN bus drivers
pub trait PhysicalLayer: Send {
    /// Transmits a single frame. Returns once the driver accepted it.
    fn send_frame(&mut self, frame: &Frame) -> Result<()>;
    /// Returns the next received frame, or `None` if nothing is pending.
    fn receive_frame(&mut self) -> Result<Option<Frame>>;
    /// Releases the bus. No frames are exchanged afterwards.
    fn shutdown(&mut self) -> Result<()>;
}
