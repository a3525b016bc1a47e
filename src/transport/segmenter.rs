//! Outbound segmentation.
//!
//! A [`Segmenter`] lazily turns a payload into the frames that carry it. Whenever the receiver has
//! to grant more frames it yields [`Segment::AwaitFlowControl`] and only continues after
//! [`Segmenter::on_flow_control`] accepted a ContinueToSend.

use crate::error::{Result, TimeoutKind, TransportError};
use crate::transport::addressing::FrameHeader;
use crate::transport::frame::{self, FlowControlParameters, FlowStatus, FrameLayout, FrameType, Pdu};
use crate::types::{AddressingType, Frame};
use std::time::Duration;

/// A frame ready for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub frame: Frame,
    pub frame_type: FrameType,
    /// The receiver answers this frame with flow control
    pub awaits_flow_control: bool,
    pub is_last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Frame(OutboundFrame),
    AwaitFlowControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    AwaitingFlowControl,
    Sending,
    Done,
}

pub struct Segmenter<'a> {
    payload: &'a [u8],
    header: FrameHeader,
    layout: FrameLayout,
    wft_max: u8,
    state: State,
    offset: usize,
    sequence_number: u8,
    block_size: u8,
    block_sent: u8,
    separation_time: Duration,
    wait_count: u8,
}

impl<'a> Segmenter<'a> {
    /// Rejects payloads that cannot be sent with the given addressing type
    pub fn new(
        payload: &'a [u8],
        addressing_type: AddressingType,
        header: FrameHeader,
        layout: FrameLayout,
        wft_max: u8,
    ) -> Result<Self> {
        if payload.is_empty() {
            return Err(TransportError::InvalidMessage("payload is empty".into()));
        }
        if addressing_type == AddressingType::Functional
            && payload.len() > layout.single_frame_capacity()
        {
            return Err(TransportError::InvalidMessage(format!(
                "functionally addressed messages are limited to a single frame ({} bytes), got {}",
                layout.single_frame_capacity(),
                payload.len()
            )));
        }
        Ok(Self {
            payload,
            header,
            layout,
            wft_max,
            state: State::Start,
            offset: 0,
            sequence_number: 1,
            block_size: 0,
            block_sent: 0,
            separation_time: Duration::ZERO,
            wait_count: 0,
        })
    }

    /// Applies a flow control frame received while awaiting one
    pub fn on_flow_control(&mut self, params: &FlowControlParameters) -> Result<()> {
        if self.state != State::AwaitingFlowControl {
            return Err(TransportError::FlowControl(
                "flow control received while not awaiting one".into(),
            ));
        }
        match params.flow_status {
            FlowStatus::ContinueToSend => {
                self.block_size = params.block_size;
                self.block_sent = 0;
                self.separation_time = params.separation_time_min();
                self.wait_count = 0;
                self.state = State::Sending;
                Ok(())
            }
            FlowStatus::Wait => {
                self.wait_count = self.wait_count.saturating_add(1);
                if self.wait_count > self.wft_max {
                    self.state = State::Done;
                    return Err(TransportError::Timeout(TimeoutKind::NBs));
                }
                Ok(())
            }
            FlowStatus::Overflow => {
                self.state = State::Done;
                Err(TransportError::FlowControl(
                    "receiver reported overflow".into(),
                ))
            }
        }
    }

    /// Minimum gap between consecutive frames granted by the last ContinueToSend
    pub fn separation_time(&self) -> Duration {
        self.separation_time
    }

    pub fn is_awaiting_flow_control(&self) -> bool {
        self.state == State::AwaitingFlowControl
    }

    fn first_segment(&mut self) -> Result<OutboundFrame> {
        let total_length = self.payload.len();
        if total_length <= self.layout.single_frame_capacity() {
            self.state = State::Done;
            let frame = frame::encode(&Pdu::Single(self.payload), &self.header, &self.layout)?;
            return Ok(OutboundFrame {
                frame,
                frame_type: FrameType::SingleFrame,
                awaits_flow_control: false,
                is_last: true,
            });
        }

        let capacity = self.layout.first_frame_capacity(total_length);
        let pdu = Pdu::First {
            total_length,
            data: &self.payload[..capacity],
        };
        let frame = frame::encode(&pdu, &self.header, &self.layout)?;
        self.offset = capacity;
        self.state = State::AwaitingFlowControl;
        Ok(OutboundFrame {
            frame,
            frame_type: FrameType::FirstFrame,
            awaits_flow_control: true,
            is_last: false,
        })
    }

    fn next_consecutive(&mut self) -> Result<OutboundFrame> {
        let end = (self.offset + self.layout.consecutive_frame_capacity()).min(self.payload.len());
        let pdu = Pdu::Consecutive {
            sequence_number: self.sequence_number,
            data: &self.payload[self.offset..end],
        };
        let frame = frame::encode(&pdu, &self.header, &self.layout)?;
        self.offset = end;
        self.sequence_number = (self.sequence_number + 1) & 0x0F;

        let is_last = self.offset >= self.payload.len();
        let mut awaits_flow_control = false;
        if is_last {
            self.state = State::Done;
        } else if self.block_size != 0 {
            self.block_sent += 1;
            if self.block_sent == self.block_size {
                self.state = State::AwaitingFlowControl;
                awaits_flow_control = true;
            }
        }
        Ok(OutboundFrame {
            frame,
            frame_type: FrameType::ConsecutiveFrame,
            awaits_flow_control,
            is_last,
        })
    }
}

impl Iterator for Segmenter<'_> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.state {
            State::Done => return None,
            State::AwaitingFlowControl => return Some(Ok(Segment::AwaitFlowControl)),
            State::Start => self.first_segment(),
            State::Sending => self.next_consecutive(),
        };
        if result.is_err() {
            self.state = State::Done;
        }
        Some(result.map(Segment::Frame))
    }
}
