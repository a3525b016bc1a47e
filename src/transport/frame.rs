//! ISO-TP frame codec.
//!
//! Encodes and decodes the protocol control information (PCI) of single CAN frames, computes how
//! many payload bytes each frame type can carry and pads frames to a valid data length.

use crate::error::{Result, TransportError};
use crate::physical::{can, canfd};
use crate::transport::addressing::{AddressingFormat, FrameHeader};
use crate::types::Frame;
use std::time::Duration;

const SF_PCI: u8 = 0x00; // Single Frame
const FF_PCI: u8 = 0x10; // First Frame
const CF_PCI: u8 = 0x20; // Consecutive Frame
const FC_PCI: u8 = 0x30; // Flow Control

/// Largest message length expressible in the 12-bit First Frame length field
pub const MAX_SHORT_FF_LENGTH: usize = 0xFFF;
/// Default value of padding bytes
pub const DEFAULT_FILLER_BYTE: u8 = 0xCC;

/// ISO-TP frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    SingleFrame,
    FirstFrame,
    ConsecutiveFrame,
    FlowControl,
}

/// Flow status of a flow control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    ContinueToSend = 0,
    Wait = 1,
    Overflow = 2,
}

impl FlowStatus {
    fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0 => Ok(FlowStatus::ContinueToSend),
            1 => Ok(FlowStatus::Wait),
            2 => Ok(FlowStatus::Overflow),
            other => Err(TransportError::FrameFormat(format!(
                "unknown flow status {:#X}",
                other
            ))),
        }
    }
}

/// Contents of a flow control frame.
///
/// `st_min` is kept as the raw STmin byte so it is transmitted exactly as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControlParameters {
    pub flow_status: FlowStatus,
    pub block_size: u8,
    pub st_min: u8,
}

impl FlowControlParameters {
    pub fn continue_to_send(block_size: u8, st_min: u8) -> Self {
        Self {
            flow_status: FlowStatus::ContinueToSend,
            block_size,
            st_min,
        }
    }

    pub fn wait() -> Self {
        Self {
            flow_status: FlowStatus::Wait,
            block_size: 0,
            st_min: 0,
        }
    }

    pub fn overflow() -> Self {
        Self {
            flow_status: FlowStatus::Overflow,
            block_size: 0,
            st_min: 0,
        }
    }

    /// Minimum gap between consecutive frames requested by the receiver
    pub fn separation_time_min(&self) -> Duration {
        decode_st_min(self.st_min)
    }
}

/// Interprets a raw STmin byte.
///
/// 0x00..=0x7F are milliseconds, 0xF1..=0xF9 are 100..=900 microseconds. Reserved values are
/// treated as the longest valid gap (127 ms).
pub fn decode_st_min(raw: u8) -> Duration {
    match raw {
        0x00..=0x7F => Duration::from_millis(raw as u64),
        0xF1..=0xF9 => Duration::from_micros((raw - 0xF0) as u64 * 100),
        _ => Duration::from_millis(0x7F),
    }
}

/// Decoded ISO-TP frame contents, borrowing the payload from the frame data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pdu<'a> {
    Single(&'a [u8]),
    First { total_length: usize, data: &'a [u8] },
    Consecutive { sequence_number: u8, data: &'a [u8] },
    FlowControl(FlowControlParameters),
}

impl Pdu<'_> {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Pdu::Single(_) => FrameType::SingleFrame,
            Pdu::First { .. } => FrameType::FirstFrame,
            Pdu::Consecutive { .. } => FrameType::ConsecutiveFrame,
            Pdu::FlowControl(_) => FrameType::FlowControl,
        }
    }
}

/// Frame size and padding rules of a transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub addressing_format: AddressingFormat,
    /// Data length of full frames (8 for classic CAN, up to 64 for CAN-FD)
    pub frame_length: usize,
    pub filler_byte: u8,
    /// Pad only as far as needed for a valid data length
    pub data_optimization: bool,
    pub fd: bool,
}

impl FrameLayout {
    /// Classic CAN layout padded with [`DEFAULT_FILLER_BYTE`]
    pub fn new(addressing_format: AddressingFormat) -> Self {
        Self {
            addressing_format,
            frame_length: can::MAX_DATA_LENGTH,
            filler_byte: DEFAULT_FILLER_BYTE,
            data_optimization: false,
            fd: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid = if self.fd {
            self.frame_length >= can::MAX_DATA_LENGTH
                && canfd::is_valid_data_length(self.frame_length)
        } else {
            self.frame_length == can::MAX_DATA_LENGTH
        };
        if !valid {
            return Err(TransportError::Configuration(format!(
                "frame length {} is not valid for {}",
                self.frame_length,
                if self.fd { "CAN-FD" } else { "classic CAN" }
            )));
        }
        Ok(())
    }

    fn overhead(&self) -> usize {
        self.addressing_format.ai_data_bytes()
    }

    /// Largest payload sent as a Single Frame
    pub fn single_frame_capacity(&self) -> usize {
        if self.frame_length <= can::MAX_DATA_LENGTH {
            7 - self.overhead()
        } else {
            self.frame_length - 2 - self.overhead()
        }
    }

    /// Payload bytes carried by the First Frame of a message of `total_length` bytes
    pub fn first_frame_capacity(&self, total_length: usize) -> usize {
        let pci = if total_length > MAX_SHORT_FF_LENGTH {
            6
        } else {
            2
        };
        self.frame_length - self.overhead() - pci
    }

    /// Payload bytes carried by a full Consecutive Frame
    pub fn consecutive_frame_capacity(&self) -> usize {
        self.frame_length - self.overhead() - 1
    }

    /// Data length of a frame with `used` meaningful bytes after padding
    pub fn padded_length(&self, used: usize) -> usize {
        if !self.data_optimization {
            self.frame_length.max(used)
        } else if used <= can::MAX_DATA_LENGTH {
            used
        } else {
            canfd::min_data_length(used).unwrap_or(self.frame_length)
        }
    }
}

/// Builds the CAN frame for one PDU
pub fn encode(pdu: &Pdu<'_>, header: &FrameHeader, layout: &FrameLayout) -> Result<Frame> {
    let mut data = Vec::with_capacity(layout.frame_length);
    if let Some(byte) = header.addressing_byte {
        data.push(byte);
    }
    let overhead = data.len();

    match *pdu {
        Pdu::Single(payload) => {
            if payload.is_empty() || payload.len() > layout.single_frame_capacity() {
                return Err(TransportError::InvalidMessage(format!(
                    "{} bytes do not fit a single frame",
                    payload.len()
                )));
            }
            let short_form = payload.len() <= 7 - overhead
                && layout.padded_length(overhead + 1 + payload.len()) <= can::MAX_DATA_LENGTH;
            if short_form {
                data.push(SF_PCI | payload.len() as u8);
            } else {
                data.push(SF_PCI);
                data.push(payload.len() as u8);
            }
            data.extend_from_slice(payload);
        }
        Pdu::First {
            total_length,
            data: chunk,
        } => {
            if total_length <= layout.single_frame_capacity() {
                return Err(TransportError::InvalidMessage(format!(
                    "{} bytes fit a single frame",
                    total_length
                )));
            }
            if chunk.len() != layout.first_frame_capacity(total_length) {
                return Err(TransportError::InvalidMessage(
                    "first frame must be completely filled".into(),
                ));
            }
            if total_length > MAX_SHORT_FF_LENGTH {
                let total = u32::try_from(total_length).map_err(|_| {
                    TransportError::InvalidMessage(format!(
                        "{} bytes exceed the ISO-TP maximum",
                        total_length
                    ))
                })?;
                data.extend_from_slice(&[FF_PCI, 0x00]);
                data.extend_from_slice(&total.to_be_bytes());
            } else {
                data.push(FF_PCI | ((total_length >> 8) as u8 & 0x0F));
                data.push(total_length as u8);
            }
            data.extend_from_slice(chunk);
        }
        Pdu::Consecutive {
            sequence_number,
            data: chunk,
        } => {
            if chunk.is_empty() || chunk.len() > layout.consecutive_frame_capacity() {
                return Err(TransportError::InvalidMessage(format!(
                    "{} bytes do not fit a consecutive frame",
                    chunk.len()
                )));
            }
            data.push(CF_PCI | (sequence_number & 0x0F));
            data.extend_from_slice(chunk);
        }
        Pdu::FlowControl(params) => {
            data.push(FC_PCI | params.flow_status as u8);
            data.push(params.block_size);
            data.push(params.st_min);
        }
    }

    let padded = layout.padded_length(data.len());
    data.resize(padded, layout.filler_byte);
    Ok(Frame {
        id: header.can_id,
        data,
        timestamp: 0,
        is_extended: header.is_extended,
        is_fd: layout.fd,
    })
}

fn truncated(what: &str) -> TransportError {
    TransportError::FrameFormat(format!("truncated {}", what))
}

/// Parses the PCI of a frame's data (including the addressing byte, if the format has one)
pub fn decode(data: &[u8], format: AddressingFormat) -> Result<Pdu<'_>> {
    let overhead = format.ai_data_bytes();
    let can_dl = data.len();
    if can_dl > can::MAX_DATA_LENGTH && !canfd::is_valid_data_length(can_dl) {
        return Err(TransportError::FrameFormat(format!(
            "invalid CAN-FD data length {}",
            can_dl
        )));
    }
    let body = match data.get(overhead..) {
        Some(body) if !body.is_empty() => body,
        _ => return Err(truncated("frame")),
    };

    match body[0] & 0xF0 {
        SF_PCI => {
            let nibble = (body[0] & 0x0F) as usize;
            let (length, start) = if can_dl <= can::MAX_DATA_LENGTH {
                if nibble == 0 || nibble > 7 - overhead {
                    return Err(TransportError::FrameFormat(format!(
                        "invalid single frame length {}",
                        nibble
                    )));
                }
                (nibble, 1)
            } else {
                // CAN_DL > 8 requires the escape sequence
                if nibble != 0 {
                    return Err(TransportError::FrameFormat(
                        "single frame without length escape in a CAN-FD frame".into(),
                    ));
                }
                let length = *body.get(1).ok_or_else(|| truncated("single frame"))? as usize;
                if length == 0 {
                    return Err(TransportError::FrameFormat(
                        "empty single frame".into(),
                    ));
                }
                (length, 2)
            };
            body.get(start..start + length)
                .map(Pdu::Single)
                .ok_or_else(|| truncated("single frame"))
        }
        FF_PCI => {
            if can_dl < can::MAX_DATA_LENGTH || body.len() < 2 {
                return Err(truncated("first frame"));
            }
            let short_length = (((body[0] & 0x0F) as usize) << 8) | body[1] as usize;
            let (total_length, start) = if short_length == 0 {
                let bytes: [u8; 4] = body
                    .get(2..6)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| truncated("first frame"))?;
                let total_length = u32::from_be_bytes(bytes) as usize;
                if total_length <= MAX_SHORT_FF_LENGTH {
                    return Err(TransportError::FrameFormat(format!(
                        "length escape used for {} bytes",
                        total_length
                    )));
                }
                (total_length, 6)
            } else {
                (short_length, 2)
            };
            let single_frame_capacity = if can_dl <= can::MAX_DATA_LENGTH {
                7 - overhead
            } else {
                can_dl - 2 - overhead
            };
            if total_length <= single_frame_capacity {
                return Err(TransportError::FrameFormat(format!(
                    "first frame announces {} bytes, which fit a single frame",
                    total_length
                )));
            }
            Ok(Pdu::First {
                total_length,
                data: &body[start..],
            })
        }
        CF_PCI => {
            if body.len() < 2 {
                return Err(truncated("consecutive frame"));
            }
            Ok(Pdu::Consecutive {
                sequence_number: body[0] & 0x0F,
                data: &body[1..],
            })
        }
        FC_PCI => {
            if body.len() < 3 {
                return Err(truncated("flow control frame"));
            }
            Ok(Pdu::FlowControl(FlowControlParameters {
                flow_status: FlowStatus::from_nibble(body[0] & 0x0F)?,
                block_size: body[1],
                st_min: body[2],
            }))
        }
        other => Err(TransportError::FrameFormat(format!(
            "unknown PCI type {:#04X}",
            other
        ))),
    }
}

/// Frame type and number of addressing bytes preceding the PCI
pub fn classify(data: &[u8], format: AddressingFormat) -> Result<(FrameType, usize)> {
    let pdu = decode(data, format)?;
    Ok((pdu.frame_type(), format.ai_data_bytes()))
}
