use crate::transport::frame::FrameType;
use crate::types::{AddressingType, Frame, TransmissionDirection};
use std::time::Instant;

/// Upper bound of the buffer reserved up front; larger messages grow as fragments arrive
const INITIAL_CAPACITY_LIMIT: usize = 4096;

/// One CAN frame exchanged while transferring a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub frame: Frame,
    pub frame_type: FrameType,
    pub addressing_type: AddressingType,
    pub direction: TransmissionDirection,
    pub timestamp: Instant,
}

impl FrameRecord {
    pub fn new(
        frame: Frame,
        frame_type: FrameType,
        addressing_type: AddressingType,
        direction: TransmissionDirection,
        timestamp: Instant,
    ) -> Self {
        Self {
            frame,
            frame_type,
            addressing_type,
            direction,
            timestamp,
        }
    }
}

/// Message whose transfer is still in progress
#[derive(Debug, Clone)]
pub struct TransportMessage {
    addressing_type: AddressingType,
    direction: TransmissionDirection,
    payload: Vec<u8>,
    total_length: usize,
    frames: Vec<FrameRecord>,
    start_timestamp: Instant,
}

impl TransportMessage {
    pub fn new(
        addressing_type: AddressingType,
        direction: TransmissionDirection,
        total_length: usize,
        start_timestamp: Instant,
    ) -> Self {
        Self {
            addressing_type,
            direction,
            payload: Vec::with_capacity(total_length.min(INITIAL_CAPACITY_LIMIT)),
            total_length,
            frames: Vec::new(),
            start_timestamp,
        }
    }

    pub fn push_frame(&mut self, record: FrameRecord) {
        self.frames.push(record);
    }

    /// Appends a fragment, dropping padding beyond the announced length
    pub fn extend_payload(&mut self, fragment: &[u8]) {
        let take = self.remaining().min(fragment.len());
        self.payload.extend_from_slice(&fragment[..take]);
    }

    /// Payload bytes still missing
    pub fn remaining(&self) -> usize {
        self.total_length - self.payload.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn start_timestamp(&self) -> Instant {
        self.start_timestamp
    }

    /// Freezes the message into a record
    pub fn complete(self, end_timestamp: Instant) -> MessageRecord {
        MessageRecord {
            payload: self.payload,
            addressing_type: self.addressing_type,
            direction: self.direction,
            frames: self.frames,
            transmission_start: self.start_timestamp,
            transmission_end: end_timestamp,
        }
    }
}

/// A completely received or transmitted diagnostic message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    payload: Vec<u8>,
    addressing_type: AddressingType,
    direction: TransmissionDirection,
    frames: Vec<FrameRecord>,
    transmission_start: Instant,
    transmission_end: Instant,
}

impl MessageRecord {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn addressing_type(&self) -> AddressingType {
        self.addressing_type
    }

    pub fn direction(&self) -> TransmissionDirection {
        self.direction
    }

    /// Frames of the transfer in the order they were exchanged, flow control included
    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn transmission_start(&self) -> Instant {
        self.transmission_start
    }

    pub fn transmission_end(&self) -> Instant {
        self.transmission_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_is_dropped() {
        let start = Instant::now();
        let mut message = TransportMessage::new(
            AddressingType::Physical,
            TransmissionDirection::Received,
            11,
            start,
        );
        message.extend_payload(&[0x62, 0x10, 0x00, 0x00, 0x01, 0x02]);
        assert_eq!(message.remaining(), 5);
        message.extend_payload(&[0x03, 0x04, 0x05, 0x06, 0x07, 0xCC, 0xCC]);
        assert!(message.is_complete());

        let record = message.complete(Instant::now());
        assert_eq!(
            record.payload(),
            &[0x62, 0x10, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]
        );
        assert_eq!(record.direction(), TransmissionDirection::Received);
        assert!(record.transmission_end() >= record.transmission_start());
        assert!(record.frames().is_empty());
    }

    #[test]
    fn test_announced_length_does_not_reserve_memory() {
        let message = TransportMessage::new(
            AddressingType::Physical,
            TransmissionDirection::Received,
            u32::MAX as usize,
            Instant::now(),
        );
        assert!(message.payload.capacity() <= INITIAL_CAPACITY_LIMIT);
        assert_eq!(message.remaining(), u32::MAX as usize);
    }
}
