use super::PhysicalLayer;
use crate::error::{Result, TransportError};
use crate::types::Frame;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock frame handler function type.
///
/// Called for every transmitted frame; the returned frames are queued for reception.
pub type MockFrameHandler = Box<dyn Fn(&Frame) -> Vec<Frame> + Send + Sync>;

#[derive(Debug, Default)]
struct MockState {
    inbound: VecDeque<Frame>,
    sent: Vec<Frame>,
    is_shut_down: bool,
}

type SharedState = Arc<Mutex<MockState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock physical layer for testing.
///
/// Frames can be injected through a [`MockHandle`], transmitted frames are captured, and two
/// mocks created by [`MockPhysical::pair`] deliver each other's frames like a shared bus.
pub struct MockPhysical {
    state: SharedState,
    peer: Option<SharedState>,
    frame_handler: Option<MockFrameHandler>,
    receive_own_messages: bool,
    fail_sends: bool,
}

/// Test-side access to a [`MockPhysical`] after it was moved into a transport.
#[derive(Clone)]
pub struct MockHandle {
    state: SharedState,
}

impl MockHandle {
    /// Queues a frame for reception
    pub fn inject(&self, frame: Frame) {
        lock(&self.state).inbound.push_back(frame);
    }

    /// Frames transmitted so far, oldest first
    pub fn sent_frames(&self) -> Vec<Frame> {
        lock(&self.state).sent.clone()
    }

    /// Forgets the captured transmitted frames
    pub fn clear_sent(&self) {
        lock(&self.state).sent.clear();
    }

    /// Number of frames waiting to be received
    pub fn pending(&self) -> usize {
        lock(&self.state).inbound.len()
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.state).is_shut_down
    }
}

impl MockPhysical {
    /// Creates a new mock physical layer with an optional frame handler
    pub fn new(frame_handler: Option<MockFrameHandler>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            peer: None,
            frame_handler,
            receive_own_messages: false,
            fail_sends: false,
        }
    }

    /// Creates a new mock physical layer that receives its own transmitted frames
    pub fn new_echo() -> Self {
        let mut mock = Self::new(None);
        mock.receive_own_messages = true;
        mock
    }

    /// Creates a new mock physical layer whose transmissions always fail
    pub fn new_error() -> Self {
        let mut mock = Self::new(None);
        mock.fail_sends = true;
        mock
    }

    /// Creates two mocks connected to the same virtual bus
    pub fn pair() -> (Self, Self) {
        let mut a = Self::new(None);
        let mut b = Self::new(None);
        a.peer = Some(b.state.clone());
        b.peer = Some(a.state.clone());
        (a, b)
    }

    /// Returns a handle for injecting and inspecting frames
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }

    /// Sets a new frame handler
    pub fn set_frame_handler(&mut self, handler: Option<MockFrameHandler>) {
        self.frame_handler = handler;
    }

    /// Enables or disables reception of own transmitted frames
    pub fn set_receive_own_messages(&mut self, enabled: bool) {
        self.receive_own_messages = enabled;
    }
}

impl PhysicalLayer for MockPhysical {
    fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.fail_sends {
            return Err(TransportError::Bus("mock bus rejected the frame".into()));
        }

        {
            let mut state = lock(&self.state);
            if state.is_shut_down {
                return Err(TransportError::Bus("bus is shut down".into()));
            }
            state.sent.push(frame.clone());
            if self.receive_own_messages {
                state.inbound.push_back(frame.clone());
            }
        }

        if let Some(peer) = &self.peer {
            let mut peer = lock(peer);
            if !peer.is_shut_down {
                peer.inbound.push_back(frame.clone());
            }
        }

        if let Some(handler) = &self.frame_handler {
            let responses = handler(frame);
            lock(&self.state).inbound.extend(responses);
        }

        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<Frame>> {
        let mut state = lock(&self.state);
        if state.is_shut_down {
            return Err(TransportError::Bus("bus is shut down".into()));
        }
        Ok(state.inbound.pop_front())
    }

    fn shutdown(&mut self) -> Result<()> {
        lock(&self.state).is_shut_down = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_captures_and_injects() {
        let mut mock = MockPhysical::new(None);
        let handle = mock.handle();

        mock.send_frame(&Frame::new(0x611, &[0x01, 0x3E])).unwrap();
        assert_eq!(handle.sent_frames().len(), 1);
        assert!(mock.receive_frame().unwrap().is_none());

        handle.inject(Frame::new(0x612, &[0x02, 0x7E, 0x00]));
        let frame = mock.receive_frame().unwrap().unwrap();
        assert_eq!(frame.id, 0x612);
    }

    #[test]
    fn test_mock_pair_delivers_to_peer() {
        let (mut a, mut b) = MockPhysical::pair();
        a.send_frame(&Frame::new(0x100, &[0xAA])).unwrap();
        assert!(a.receive_frame().unwrap().is_none());
        assert_eq!(b.receive_frame().unwrap().unwrap().data, vec![0xAA]);
    }

    #[test]
    fn test_mock_echo_and_handler() {
        let mut mock = MockPhysical::new_echo();
        mock.set_frame_handler(Some(Box::new(|frame: &Frame| {
            vec![Frame::new(frame.id + 1, &[0x50])]
        })));
        mock.send_frame(&Frame::new(0x200, &[0x10])).unwrap();
        assert_eq!(mock.receive_frame().unwrap().unwrap().id, 0x200);
        assert_eq!(mock.receive_frame().unwrap().unwrap().id, 0x201);
    }

    #[test]
    fn test_mock_error_and_shutdown() {
        let mut failing = MockPhysical::new_error();
        assert!(failing.send_frame(&Frame::default()).is_err());

        let mut mock = MockPhysical::new(None);
        let handle = mock.handle();
        mock.shutdown().unwrap();
        assert!(handle.is_shut_down());
        assert!(mock.receive_frame().is_err());
    }
}
