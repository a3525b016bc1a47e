//! Inbound reassembly.
//!
//! One [`Reassembler`] exists per addressing type. It consumes decoded frames in arrival order and
//! tells the session when to answer with flow control and when a message is complete.

use crate::error::{Result, TimeoutKind, TransportError};
use crate::transport::frame::{FlowControlParameters, FrameType, Pdu};
use crate::transport::message::{FrameRecord, MessageRecord, TransportMessage};
use crate::types::{AddressingType, Frame, TransmissionDirection};
use log::{debug, warn};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblerState {
    Idle,
    Receiving,
}

/// Outcome of feeding one frame to a [`Reassembler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyEvent {
    InProgress,
    /// The sender is waiting for this flow control frame
    FlowControl(FlowControlParameters),
    Completed(MessageRecord),
}

pub struct Reassembler {
    addressing_type: AddressingType,
    block_size: u8,
    st_min: u8,
    n_cr: Duration,
    max_payload_length: usize,
    message: Option<TransportMessage>,
    expected_sequence_number: u8,
    block_received: u8,
    last_frame_at: Option<Instant>,
}

impl Reassembler {
    pub fn new(
        addressing_type: AddressingType,
        block_size: u8,
        st_min: u8,
        n_cr: Duration,
        max_payload_length: usize,
    ) -> Self {
        Self {
            addressing_type,
            block_size,
            st_min,
            n_cr,
            max_payload_length,
            message: None,
            expected_sequence_number: 1,
            block_received: 0,
            last_frame_at: None,
        }
    }

    pub fn state(&self) -> ReassemblerState {
        if self.message.is_some() {
            ReassemblerState::Receiving
        } else {
            ReassemblerState::Idle
        }
    }

    pub fn addressing_type(&self) -> AddressingType {
        self.addressing_type
    }

    /// Discards any message in progress
    pub fn reset(&mut self) {
        self.message = None;
        self.expected_sequence_number = 1;
        self.block_received = 0;
        self.last_frame_at = None;
    }

    /// Discards the message in progress if it started no later than `instant`.
    /// Returns whether a message was discarded.
    pub fn abort_started_before(&mut self, instant: Instant) -> bool {
        match &self.message {
            Some(message) if message.start_timestamp() <= instant => {
                debug!(
                    "Discarding partial {:?} reception of {} bytes",
                    self.addressing_type,
                    message.total_length()
                );
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn record(&self, frame: &Frame, frame_type: FrameType, now: Instant) -> FrameRecord {
        FrameRecord::new(
            frame.clone(),
            frame_type,
            self.addressing_type,
            TransmissionDirection::Received,
            now,
        )
    }

    fn abort_stale(&mut self, cause: &str) {
        if let Some(stale) = &self.message {
            warn!(
                "{:?} reception of {} bytes aborted by a new {} ({} bytes missing)",
                self.addressing_type,
                stale.total_length(),
                cause,
                stale.remaining()
            );
        }
        self.reset();
    }

    /// Processes one inbound frame matched to this addressing type
    pub fn on_frame(&mut self, frame: &Frame, pdu: Pdu<'_>, now: Instant) -> Result<ReassemblyEvent> {
        match pdu {
            Pdu::Single(payload) => {
                self.abort_stale("single frame");
                let mut message = TransportMessage::new(
                    self.addressing_type,
                    TransmissionDirection::Received,
                    payload.len(),
                    now,
                );
                message.push_frame(self.record(frame, FrameType::SingleFrame, now));
                message.extend_payload(payload);
                Ok(ReassemblyEvent::Completed(message.complete(now)))
            }
            Pdu::First { total_length, data } => {
                if self.addressing_type == AddressingType::Functional {
                    return Err(TransportError::FrameFormat(
                        "first frame received with functional addressing".into(),
                    ));
                }
                self.abort_stale("first frame");
                if total_length > self.max_payload_length {
                    warn!(
                        "Rejecting {} byte message, limit is {} bytes",
                        total_length, self.max_payload_length
                    );
                    return Ok(ReassemblyEvent::FlowControl(FlowControlParameters::overflow()));
                }

                debug!(
                    "{:?} reception of {} bytes started",
                    self.addressing_type, total_length
                );
                let mut message = TransportMessage::new(
                    self.addressing_type,
                    TransmissionDirection::Received,
                    total_length,
                    now,
                );
                message.push_frame(self.record(frame, FrameType::FirstFrame, now));
                message.extend_payload(data);
                self.message = Some(message);
                self.last_frame_at = Some(now);
                Ok(ReassemblyEvent::FlowControl(
                    FlowControlParameters::continue_to_send(self.block_size, self.st_min),
                ))
            }
            Pdu::Consecutive {
                sequence_number,
                data,
            } => {
                if self.message.is_none() {
                    return Err(TransportError::FrameFormat(
                        "consecutive frame without a preceding first frame".into(),
                    ));
                }
                if sequence_number != self.expected_sequence_number {
                    let expected = self.expected_sequence_number;
                    self.reset();
                    return Err(TransportError::Sequencing {
                        expected,
                        received: sequence_number,
                    });
                }

                let record = self.record(frame, FrameType::ConsecutiveFrame, now);
                let complete = match self.message.as_mut() {
                    Some(message) => {
                        message.push_frame(record);
                        message.extend_payload(data);
                        message.is_complete()
                    }
                    None => false,
                };
                self.expected_sequence_number = (self.expected_sequence_number + 1) & 0x0F;
                self.last_frame_at = Some(now);

                if complete {
                    let message = self.message.take();
                    self.reset();
                    return Ok(match message {
                        Some(message) => ReassemblyEvent::Completed(message.complete(now)),
                        None => ReassemblyEvent::InProgress,
                    });
                }
                if self.block_size != 0 {
                    self.block_received += 1;
                    if self.block_received == self.block_size {
                        self.block_received = 0;
                        return Ok(ReassemblyEvent::FlowControl(
                            FlowControlParameters::continue_to_send(self.block_size, self.st_min),
                        ));
                    }
                }
                Ok(ReassemblyEvent::InProgress)
            }
            Pdu::FlowControl(_) => Err(TransportError::FrameFormat(
                "flow control frame cannot be reassembled".into(),
            )),
        }
    }

    /// Attaches a frame sent on behalf of the message in progress (flow control)
    pub fn record_transmitted(&mut self, record: FrameRecord) {
        if let Some(message) = self.message.as_mut() {
            message.push_frame(record);
        }
    }

    /// Fails with N_Cr and discards the message when the sender went quiet for too long
    pub fn check_timeout(&mut self, now: Instant) -> Result<()> {
        match self.last_frame_at {
            Some(last) if self.message.is_some() && now.duration_since(last) >= self.n_cr => {
                warn!("{:?} reception timed out (N_Cr)", self.addressing_type);
                self.reset();
                Err(TransportError::Timeout(TimeoutKind::NCr))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::addressing::AddressingFormat;
    use crate::transport::frame::{self, FlowStatus};

    fn reassembler(block_size: u8) -> Reassembler {
        Reassembler::new(
            AddressingType::Physical,
            block_size,
            0,
            Duration::from_millis(1000),
            4095,
        )
    }

    fn feed(reassembler: &mut Reassembler, data: &[u8]) -> Result<ReassemblyEvent> {
        let frame = Frame::new(0x612, data);
        let pdu = frame::decode(&frame.data, AddressingFormat::Normal11Bit)?;
        reassembler.on_frame(&frame, pdu, Instant::now())
    }

    #[test]
    fn test_diagnostic_response_reassembly() {
        let mut reassembler = reassembler(0);
        let event = feed(
            &mut reassembler,
            &[0x10, 0x0B, 0x62, 0x10, 0x00, 0x00, 0x01, 0x02],
        )
        .unwrap();
        assert_eq!(
            event,
            ReassemblyEvent::FlowControl(FlowControlParameters::continue_to_send(0, 0))
        );
        assert_eq!(reassembler.state(), ReassemblerState::Receiving);

        let event = feed(
            &mut reassembler,
            &[0x21, 0x03, 0x04, 0x05, 0x06, 0x07, 0xCC, 0xCC],
        )
        .unwrap();
        let ReassemblyEvent::Completed(record) = event else {
            panic!("expected a completed message");
        };
        assert_eq!(
            record.payload(),
            &[0x62, 0x10, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]
        );
        assert_eq!(record.frames().len(), 2);
        assert_eq!(reassembler.state(), ReassemblerState::Idle);
    }

    #[test]
    fn test_sequencing_error_then_fresh_message() {
        let mut reassembler = reassembler(0);
        feed(&mut reassembler, &[0x10, 0x14, 1, 2, 3, 4, 5, 6]).unwrap();
        feed(&mut reassembler, &[0x21, 7, 8, 9, 10, 11, 12, 13]).unwrap();
        let result = feed(&mut reassembler, &[0x23, 14, 15, 16, 17, 18, 19, 20]);
        assert!(matches!(
            result,
            Err(TransportError::Sequencing {
                expected: 2,
                received: 3
            })
        ));
        assert_eq!(reassembler.state(), ReassemblerState::Idle);

        feed(&mut reassembler, &[0x10, 0x08, 1, 2, 3, 4, 5, 6]).unwrap();
        let event = feed(&mut reassembler, &[0x21, 7, 8, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]).unwrap();
        let ReassemblyEvent::Completed(record) = event else {
            panic!("expected a completed message");
        };
        assert_eq!(record.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_block_size_flow_control() {
        let mut reassembler = reassembler(2);
        // 6 + 4 * 7 = 34 bytes
        feed(&mut reassembler, &[0x10, 0x22, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(
            feed(&mut reassembler, &[0x21, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            ReassemblyEvent::InProgress
        );
        assert_eq!(
            feed(&mut reassembler, &[0x22, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            ReassemblyEvent::FlowControl(FlowControlParameters::continue_to_send(2, 0))
        );
        assert_eq!(
            feed(&mut reassembler, &[0x23, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            ReassemblyEvent::InProgress
        );
        // Last frame completes instead of requesting another block
        assert!(matches!(
            feed(&mut reassembler, &[0x24, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            ReassemblyEvent::Completed(_)
        ));
    }

    #[test]
    fn test_oversized_message_is_refused() {
        let mut reassembler = Reassembler::new(
            AddressingType::Physical,
            0,
            0,
            Duration::from_millis(1000),
            16,
        );
        let event = feed(&mut reassembler, &[0x10, 0x20, 1, 2, 3, 4, 5, 6]).unwrap();
        let ReassemblyEvent::FlowControl(params) = event else {
            panic!("expected flow control");
        };
        assert_eq!(params.flow_status, FlowStatus::Overflow);
        assert_eq!(reassembler.state(), ReassemblerState::Idle);
    }

    #[test]
    fn test_escaped_length_beyond_limit_is_refused() {
        // 32-bit First Frame announcing 4 GiB
        let first_frame = [0x10, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xAA, 0xBB];

        let mut limited = Reassembler::new(
            AddressingType::Physical,
            0,
            0,
            Duration::from_millis(1000),
            0xFFFF,
        );
        let ReassemblyEvent::FlowControl(params) = feed(&mut limited, &first_frame).unwrap() else {
            panic!("expected flow control");
        };
        assert_eq!(params.flow_status, FlowStatus::Overflow);
        assert_eq!(limited.state(), ReassemblerState::Idle);

        // Accepted without reserving the announced length up front
        let mut unlimited = Reassembler::new(
            AddressingType::Physical,
            0,
            0,
            Duration::from_millis(1000),
            u32::MAX as usize,
        );
        let ReassemblyEvent::FlowControl(params) = feed(&mut unlimited, &first_frame).unwrap()
        else {
            panic!("expected flow control");
        };
        assert_eq!(params.flow_status, FlowStatus::ContinueToSend);
        assert_eq!(unlimited.state(), ReassemblerState::Receiving);
    }

    #[test]
    fn test_abort_keeps_receptions_started_later() {
        let mut reassembler = reassembler(0);
        let started = Instant::now();
        let frame = Frame::new(0x612, &[0x10, 0x08, 1, 2, 3, 4, 5, 6]);
        let pdu = frame::decode(&frame.data, AddressingFormat::Normal11Bit).unwrap();
        reassembler.on_frame(&frame, pdu, started).unwrap();

        // A timeout that expired before this First Frame arrived
        assert!(!reassembler.abort_started_before(started - Duration::from_millis(5)));
        assert_eq!(reassembler.state(), ReassemblerState::Receiving);

        assert!(reassembler.abort_started_before(started + Duration::from_millis(5)));
        assert_eq!(reassembler.state(), ReassemblerState::Idle);
        assert!(!reassembler.abort_started_before(started + Duration::from_millis(5)));
    }

    #[test]
    fn test_unexpected_frames() {
        let mut reassembler = reassembler(0);
        assert!(matches!(
            feed(&mut reassembler, &[0x21, 1, 2, 3, 4, 5, 6, 7]),
            Err(TransportError::FrameFormat(_))
        ));
        assert!(matches!(
            feed(&mut reassembler, &[0x30, 0x00, 0x00]),
            Err(TransportError::FrameFormat(_))
        ));

        let mut functional = Reassembler::new(
            AddressingType::Functional,
            0,
            0,
            Duration::from_millis(1000),
            4095,
        );
        assert!(matches!(
            feed(&mut functional, &[0x10, 0x10, 1, 2, 3, 4, 5, 6]),
            Err(TransportError::FrameFormat(_))
        ));
        assert!(matches!(
            feed(&mut functional, &[0x02, 0x3E, 0x80]).unwrap(),
            ReassemblyEvent::Completed(_)
        ));
    }

    #[test]
    fn test_new_message_restarts_reception() {
        let mut reassembler = reassembler(0);
        feed(&mut reassembler, &[0x10, 0x20, 1, 2, 3, 4, 5, 6]).unwrap();

        let event = feed(&mut reassembler, &[0x02, 0x50, 0x01]).unwrap();
        let ReassemblyEvent::Completed(record) = event else {
            panic!("expected a completed message");
        };
        assert_eq!(record.payload(), &[0x50, 0x01]);
        assert_eq!(reassembler.state(), ReassemblerState::Idle);

        feed(&mut reassembler, &[0x10, 0x20, 1, 2, 3, 4, 5, 6]).unwrap();
        feed(&mut reassembler, &[0x21, 7, 8, 9, 10, 11, 12, 13]).unwrap();
        feed(&mut reassembler, &[0x10, 0x09, 9, 9, 9, 9, 9, 9]).unwrap();
        // Sequence restarts at 1 for the new message
        let event = feed(&mut reassembler, &[0x21, 9, 9, 9, 0xCC, 0xCC, 0xCC, 0xCC]).unwrap();
        assert!(matches!(event, ReassemblyEvent::Completed(_)));
    }

    #[test]
    fn test_consecutive_frame_timeout() {
        let mut reassembler = Reassembler::new(
            AddressingType::Physical,
            0,
            0,
            Duration::from_millis(50),
            4095,
        );
        let start = Instant::now();
        let frame = Frame::new(0x612, &[0x10, 0x20, 1, 2, 3, 4, 5, 6]);
        let pdu = frame::decode(&frame.data, AddressingFormat::Normal11Bit).unwrap();
        reassembler.on_frame(&frame, pdu, start).unwrap();

        assert!(reassembler
            .check_timeout(start + Duration::from_millis(10))
            .is_ok());
        assert!(matches!(
            reassembler.check_timeout(start + Duration::from_millis(50)),
            Err(TransportError::Timeout(TimeoutKind::NCr))
        ));
        assert_eq!(reassembler.state(), ReassemblerState::Idle);
        assert!(reassembler
            .check_timeout(start + Duration::from_millis(100))
            .is_ok());
    }

    #[test]
    fn test_transmitted_flow_control_is_recorded() {
        let mut reassembler = reassembler(0);
        feed(&mut reassembler, &[0x10, 0x08, 1, 2, 3, 4, 5, 6]).unwrap();
        reassembler.record_transmitted(FrameRecord::new(
            Frame::new(0x611, &[0x30, 0x00, 0x00]),
            FrameType::FlowControl,
            AddressingType::Physical,
            TransmissionDirection::Transmitted,
            Instant::now(),
        ));
        let ReassemblyEvent::Completed(record) =
            feed(&mut reassembler, &[0x21, 7, 8, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]).unwrap()
        else {
            panic!("expected a completed message");
        };
        let types: Vec<_> = record.frames().iter().map(|f| f.frame_type).collect();
        assert_eq!(
            types,
            vec![
                FrameType::FirstFrame,
                FrameType::FlowControl,
                FrameType::ConsecutiveFrame
            ]
        );
    }
}
