use super::TransportLayer;
use crate::error::{Result, TimeoutKind, TransportError};
use crate::physical::PhysicalLayer;
use crate::transport::addressing::{
    AddressParams, AddressingFormat, AddressingInformation, AddressingRole,
};
use crate::transport::frame::{self, FlowControlParameters, FlowStatus, FrameLayout, FrameType, Pdu};
use crate::transport::message::{FrameRecord, MessageRecord, TransportMessage};
use crate::transport::reassembler::{Reassembler, ReassemblyEvent};
use crate::transport::segmenter::{Segment, Segmenter};
use crate::types::{AddressingType, Config, Frame, TransmissionDirection};
use bitflags::bitflags;
use log::{debug, info, trace, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Idle period of the intake thread when the bus has nothing to deliver
const INTAKE_TICK: Duration = Duration::from_millis(1);

/// Default limit of incoming messages
pub const DEFAULT_MAX_PAYLOAD_LENGTH: usize = 0xFFFF;

/// ISO-TP Timing Parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoTpTiming {
    pub n_as: Duration, // Sender: transmission confirmation of own frames
    pub n_bs: Duration, // Sender: waiting for flow control
    pub n_cr: Duration, // Receiver: waiting for the next consecutive frame
    /// Sender gap between consecutive frames. Never shorter than the receiver's STmin.
    pub n_cs: Option<Duration>,
}

impl Default for IsoTpTiming {
    fn default() -> Self {
        Self {
            n_as: Duration::from_millis(1000),
            n_bs: Duration::from_millis(1000),
            n_cr: Duration::from_millis(1000),
            n_cs: None,
        }
    }
}

bitflags! {
    /// ISO-TP session options
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IsoTpOptions: u8 {
        const NONE = 0;
        const FD = 1 << 0;                 // Transmit CAN-FD frames
        const DATA_OPTIMIZATION = 1 << 1;  // Pad only up to the next valid data length
        const CONFIRM_OWN_FRAMES = 1 << 2; // Wait for the bus echo of the last frame (N_As)
    }
}

/// ISO-TP configuration
#[derive(Debug, Clone)]
pub struct IsoTpConfig {
    pub addressing_format: AddressingFormat,
    pub tx_physical: AddressParams,
    pub rx_physical: AddressParams,
    pub tx_functional: AddressParams,
    pub rx_functional: AddressParams,
    /// Block size announced in our flow control frames (0 = no further flow control)
    pub block_size: u8,
    /// Raw STmin byte announced in our flow control frames
    pub separation_time_min: u8,
    pub timing: IsoTpTiming,
    /// Maximum number of consecutive Wait flow control frames accepted while sending
    pub wft_max: u8,
    /// Data length of full frames: 8, or a CAN-FD length with [`IsoTpOptions::FD`]
    pub frame_length: usize,
    pub filler_byte: u8,
    /// Larger incoming messages are refused with an Overflow flow control
    pub max_payload_length: usize,
    pub options: IsoTpOptions,
}

impl IsoTpConfig {
    /// Validated addressing information of this node
    pub fn addressing_information(&self) -> Result<AddressingInformation> {
        AddressingInformation::new(
            self.addressing_format,
            self.tx_physical,
            self.rx_physical,
            self.tx_functional,
            self.rx_functional,
        )
    }

    pub fn frame_layout(&self) -> FrameLayout {
        FrameLayout {
            addressing_format: self.addressing_format,
            frame_length: self.frame_length,
            filler_byte: self.filler_byte,
            data_optimization: self.options.contains(IsoTpOptions::DATA_OPTIMIZATION),
            fd: self.options.contains(IsoTpOptions::FD),
        }
    }
}

impl Config for IsoTpConfig {
    fn validate(&self) -> Result<()> {
        self.addressing_information()?;
        self.frame_layout().validate()?;
        if self.max_payload_length == 0 {
            return Err(TransportError::Configuration(
                "max_payload_length must not be zero".into(),
            ));
        }
        let timing = &self.timing;
        if [timing.n_as, timing.n_bs, timing.n_cr].contains(&Duration::ZERO) {
            return Err(TransportError::Configuration(
                "N_As, N_Bs and N_Cr must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for IsoTpConfig {
    fn default() -> Self {
        Self {
            addressing_format: AddressingFormat::Normal11Bit,
            tx_physical: AddressParams::default(),
            rx_physical: AddressParams::default(),
            tx_functional: AddressParams::default(),
            rx_functional: AddressParams::default(),
            block_size: 0,
            separation_time_min: 0,
            timing: IsoTpTiming::default(),
            wft_max: 10,
            frame_length: 8,
            filler_byte: frame::DEFAULT_FILLER_BYTE,
            max_payload_length: DEFAULT_MAX_PAYLOAD_LENGTH,
            options: IsoTpOptions::NONE,
        }
    }
}

#[derive(Default)]
struct FlowControlSlot {
    expecting: bool,
    frames: VecDeque<(Frame, FlowControlParameters)>,
}

/// State shared between callers and the intake thread, guarded by one mutex
#[derive(Default)]
struct Mailbox {
    received: [VecDeque<Result<MessageRecord>>; 2],
    flow_control: [FlowControlSlot; 2],
    expecting_echo: [bool; 2],
    echoes: [VecDeque<Frame>; 2],
    /// Receptions started up to this instant are discarded by the intake thread
    abort_reception: Option<Instant>,
}

struct Shared<P> {
    config: IsoTpConfig,
    addressing: AddressingInformation,
    layout: FrameLayout,
    bus: Mutex<P>,
    mailbox: Mutex<Mailbox>,
    signal: Condvar,
    running: AtomicBool,
    tx_guards: [Mutex<()>; 2],
}

/// ISO-TP implementation.
///
/// Sending and receiving take `&self`, so one session can serve a sending and a receiving thread
/// at the same time. Inbound frames are processed by a background thread started by
/// [`TransportLayer::open`].
pub struct IsoTp<P: PhysicalLayer + 'static> {
    shared: Arc<Shared<P>>,
    intake: Option<JoinHandle<()>>,
}

impl<P: PhysicalLayer + 'static> IsoTp<P> {
    /// Creates a new ISO-TP instance with the given physical layer
    pub fn with_physical(config: IsoTpConfig, physical: P) -> Result<Self> {
        config.validate()?;
        let addressing = config.addressing_information()?;
        let layout = config.frame_layout();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                addressing,
                layout,
                bus: Mutex::new(physical),
                mailbox: Mutex::new(Mailbox::default()),
                signal: Condvar::new(),
                running: AtomicBool::new(false),
                tx_guards: [Mutex::new(()), Mutex::new(())],
            }),
            intake: None,
        })
    }

    pub fn addressing_information(&self) -> &AddressingInformation {
        &self.shared.addressing
    }

    pub fn is_open(&self) -> bool {
        self.intake.is_some()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.intake.is_none() {
            return Err(TransportError::NotInitialized);
        }
        Ok(())
    }
}

impl<P: PhysicalLayer + 'static> TransportLayer for IsoTp<P> {
    type Config = IsoTpConfig;

    fn open(&mut self) -> Result<()> {
        if self.intake.is_some() {
            return Ok(());
        }
        *self.shared.lock_mailbox() = Mailbox::default();
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let reassemblers = self.shared.new_reassemblers();
        let handle = thread::Builder::new()
            .name("isotp-intake".into())
            .spawn(move || intake_loop(shared, reassemblers))
            .inspect_err(|_| self.shared.running.store(false, Ordering::Release))?;
        self.intake = Some(handle);
        info!(
            "ISO-TP session opened ({:?} addressing, frame length {})",
            self.shared.config.addressing_format, self.shared.config.frame_length
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(handle) = self.intake.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::Release);
        self.shared.signal.notify_all();
        if handle.join().is_err() {
            warn!("ISO-TP intake thread panicked");
        }
        self.shared.lock_bus().shutdown()?;
        info!("ISO-TP session closed");
        Ok(())
    }

    fn send_message(
        &self,
        payload: &[u8],
        addressing_type: AddressingType,
        timeout: Option<Duration>,
    ) -> Result<MessageRecord> {
        self.ensure_open()?;
        let shared = &self.shared;
        let index = addressing_type.index();
        let _guard = shared.tx_guards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let header = shared
            .addressing
            .frame_header_for(AddressingRole::transmitting(addressing_type));
        let mut segmenter = Segmenter::new(
            payload,
            addressing_type,
            header,
            shared.layout,
            shared.config.wft_max,
        )?;
        let start = Instant::now();
        let deadline = timeout.map(|timeout| start + timeout);
        let mut message = TransportMessage::new(
            addressing_type,
            TransmissionDirection::Transmitted,
            payload.len(),
            start,
        );

        let result = shared.transmit_segments(&mut segmenter, &mut message, addressing_type, deadline);
        {
            let mut mailbox = shared.lock_mailbox();
            mailbox.flow_control[index] = FlowControlSlot::default();
            mailbox.expecting_echo[index] = false;
            mailbox.echoes[index].clear();
        }
        if let Err(e) = result {
            warn!(
                "{:?} transmission of {} bytes failed: {}",
                addressing_type,
                payload.len(),
                e
            );
            return Err(e);
        }

        message.extend_payload(payload);
        let record = message.complete(Instant::now());
        debug!(
            "{:?} message of {} bytes sent in {} frames",
            addressing_type,
            payload.len(),
            record.frames().len()
        );
        Ok(record)
    }

    fn receive_message(&self, timeout: Option<Duration>) -> Result<MessageRecord> {
        self.ensure_open()?;
        let shared = &self.shared;
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut mailbox = shared.lock_mailbox();
        loop {
            for addressing_type in AddressingType::ALL {
                if let Some(result) = mailbox.received[addressing_type.index()].pop_front() {
                    return result;
                }
            }
            mailbox = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        mailbox.abort_reception = mailbox.abort_reception.max(Some(now));
                        return Err(TransportError::Timeout(TimeoutKind::Receive));
                    }
                    shared.wait_until(mailbox, deadline)
                }
                None => shared
                    .signal
                    .wait(mailbox)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn config(&self) -> &IsoTpConfig {
        &self.shared.config
    }
}

impl<P: PhysicalLayer + 'static> Drop for IsoTp<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close ISO-TP session: {}", e);
        }
    }
}

impl<P: PhysicalLayer> Shared<P> {
    fn lock_bus(&self) -> MutexGuard<'_, P> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mailbox(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_until<'a>(
        &self,
        mailbox: MutexGuard<'a, Mailbox>,
        deadline: Instant,
    ) -> MutexGuard<'a, Mailbox> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.signal.wait_timeout(mailbox, timeout) {
            Ok((mailbox, _)) => mailbox,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    fn new_reassemblers(&self) -> [Reassembler; 2] {
        AddressingType::ALL.map(|addressing_type| {
            Reassembler::new(
                addressing_type,
                self.config.block_size,
                self.config.separation_time_min,
                self.config.timing.n_cr,
                self.config.max_payload_length,
            )
        })
    }

    fn write_frame(&self, frame: &Frame) -> Result<()> {
        trace!("TX {:#X} {:02X?}", frame.id, frame.data);
        self.lock_bus().send_frame(frame)
    }

    fn deliver(&self, addressing_type: AddressingType, result: Result<MessageRecord>) {
        self.lock_mailbox().received[addressing_type.index()].push_back(result);
        self.signal.notify_all();
    }

    /// Gap enforced before each consecutive frame
    fn consecutive_frame_gap(&self, separation_time: Duration) -> Duration {
        match self.config.timing.n_cs {
            Some(n_cs) => n_cs.max(separation_time),
            None => separation_time,
        }
    }

    fn transmit_segments(
        &self,
        segmenter: &mut Segmenter<'_>,
        message: &mut TransportMessage,
        addressing_type: AddressingType,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let index = addressing_type.index();
        let confirm = self
            .config
            .options
            .contains(IsoTpOptions::CONFIRM_OWN_FRAMES);
        let mut last_consecutive: Option<Instant> = None;

        while let Some(segment) = segmenter.next() {
            match segment? {
                Segment::Frame(outbound) => {
                    if let Some(last) = last_consecutive {
                        let ready = last + self.consecutive_frame_gap(segmenter.separation_time());
                        pause_until(ready, deadline)?;
                    }
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        return Err(TransportError::Timeout(TimeoutKind::Send));
                    }

                    // Armed before transmission so an immediate answer is not missed
                    if outbound.awaits_flow_control || (outbound.is_last && confirm) {
                        let mut mailbox = self.lock_mailbox();
                        if outbound.awaits_flow_control {
                            mailbox.flow_control[index] = FlowControlSlot {
                                expecting: true,
                                frames: VecDeque::new(),
                            };
                        }
                        if outbound.is_last && confirm {
                            mailbox.expecting_echo[index] = true;
                            mailbox.echoes[index].clear();
                        }
                    }

                    self.write_frame(&outbound.frame)?;
                    let sent_at = Instant::now();
                    if outbound.frame_type == FrameType::ConsecutiveFrame {
                        last_consecutive = Some(sent_at);
                    }
                    message.push_frame(FrameRecord::new(
                        outbound.frame.clone(),
                        outbound.frame_type,
                        addressing_type,
                        TransmissionDirection::Transmitted,
                        sent_at,
                    ));
                    if outbound.is_last && confirm {
                        self.wait_for_echo(addressing_type, &outbound.frame, deadline)?;
                    }
                }
                Segment::AwaitFlowControl => {
                    let (frame, params) = self.wait_for_flow_control(addressing_type, deadline)?;
                    message.push_frame(FrameRecord::new(
                        frame,
                        FrameType::FlowControl,
                        addressing_type,
                        TransmissionDirection::Received,
                        Instant::now(),
                    ));
                    segmenter.on_flow_control(&params)?;
                    if params.flow_status == FlowStatus::ContinueToSend {
                        // STmin applies between consecutive frames of a block only
                        last_consecutive = None;
                    }
                }
            }
        }
        Ok(())
    }

    fn wait_for_flow_control(
        &self,
        addressing_type: AddressingType,
        deadline: Option<Instant>,
    ) -> Result<(Frame, FlowControlParameters)> {
        let index = addressing_type.index();
        let (limit, kind) = effective_limit(self.config.timing.n_bs, TimeoutKind::NBs, deadline);
        let mut mailbox = self.lock_mailbox();
        loop {
            let slot = &mut mailbox.flow_control[index];
            if let Some((frame, params)) = slot.frames.pop_front() {
                if params.flow_status != FlowStatus::Wait {
                    slot.expecting = false;
                    slot.frames.clear();
                }
                trace!("{:?} flow control {:?}", addressing_type, params);
                return Ok((frame, params));
            }
            if Instant::now() >= limit {
                slot.expecting = false;
                return Err(TransportError::Timeout(kind));
            }
            mailbox = self.wait_until(mailbox, limit);
        }
    }

    fn wait_for_echo(
        &self,
        addressing_type: AddressingType,
        sent: &Frame,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let index = addressing_type.index();
        let (limit, kind) = effective_limit(self.config.timing.n_as, TimeoutKind::NAs, deadline);
        let mut mailbox = self.lock_mailbox();
        loop {
            while let Some(echo) = mailbox.echoes[index].pop_front() {
                if echo.data == sent.data {
                    mailbox.expecting_echo[index] = false;
                    return Ok(());
                }
            }
            if Instant::now() >= limit {
                mailbox.expecting_echo[index] = false;
                return Err(TransportError::Timeout(kind));
            }
            mailbox = self.wait_until(mailbox, limit);
        }
    }

    fn send_flow_control(
        &self,
        addressing_type: AddressingType,
        params: FlowControlParameters,
    ) -> Result<FrameRecord> {
        let header = self
            .addressing
            .frame_header_for(AddressingRole::transmitting(addressing_type));
        let frame = frame::encode(&Pdu::FlowControl(params), &header, &self.layout)?;
        self.write_frame(&frame)?;
        Ok(FrameRecord::new(
            frame,
            FrameType::FlowControl,
            addressing_type,
            TransmissionDirection::Transmitted,
            Instant::now(),
        ))
    }

    /// Routes one inbound frame
    fn dispatch(&self, reassemblers: &mut [Reassembler; 2], frame: Frame) {
        let Some(role) = self.addressing.matches(&frame) else {
            if let Some(role) = self.addressing.matches_transmitted(&frame) {
                let index = role.addressing_type().index();
                let mut mailbox = self.lock_mailbox();
                if mailbox.expecting_echo[index] {
                    mailbox.echoes[index].push_back(frame);
                    self.signal.notify_all();
                }
            }
            return;
        };

        trace!("RX {:#X} {:02X?}", frame.id, frame.data);
        let addressing_type = role.addressing_type();
        let pdu = match frame::decode(&frame.data, self.addressing.addressing_format()) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("Dropping frame {:#X}: {}", frame.id, e);
                return;
            }
        };

        if let Pdu::FlowControl(params) = pdu {
            let mut mailbox = self.lock_mailbox();
            let slot = &mut mailbox.flow_control[addressing_type.index()];
            if slot.expecting {
                slot.frames.push_back((frame.clone(), params));
                self.signal.notify_all();
            } else {
                debug!("Ignoring unexpected flow control on {:#X}", frame.id);
            }
            return;
        }

        let reassembler = &mut reassemblers[addressing_type.index()];
        match reassembler.on_frame(&frame, pdu, Instant::now()) {
            Ok(ReassemblyEvent::InProgress) => {}
            Ok(ReassemblyEvent::FlowControl(params)) => {
                match self.send_flow_control(addressing_type, params) {
                    Ok(record) => reassembler.record_transmitted(record),
                    Err(e) => {
                        warn!("Failed to send flow control: {}", e);
                        reassembler.reset();
                        self.deliver(addressing_type, Err(e));
                    }
                }
            }
            Ok(ReassemblyEvent::Completed(record)) => {
                debug!(
                    "{:?} message of {} bytes received",
                    addressing_type,
                    record.payload().len()
                );
                self.deliver(addressing_type, Ok(record));
            }
            Err(e @ TransportError::Sequencing { .. }) => {
                warn!("{:?} reception aborted: {}", addressing_type, e);
                self.deliver(addressing_type, Err(e));
            }
            Err(e) => warn!("Dropping frame {:#X}: {}", frame.id, e),
        }
    }
}

/// Earlier of a protocol timer and the caller's deadline, with the matching timeout kind
fn effective_limit(
    timer: Duration,
    timer_kind: TimeoutKind,
    deadline: Option<Instant>,
) -> (Instant, TimeoutKind) {
    let timer_limit = Instant::now() + timer;
    match deadline {
        Some(deadline) if deadline < timer_limit => (deadline, TimeoutKind::Send),
        _ => (timer_limit, timer_kind),
    }
}

/// Sleeps until `ready`, or fails with a send timeout once a deadline before it has passed
fn pause_until(ready: Instant, deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(deadline) if deadline < ready => {
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
            Err(TransportError::Timeout(TimeoutKind::Send))
        }
        _ => {
            thread::sleep(ready.saturating_duration_since(Instant::now()));
            Ok(())
        }
    }
}

fn intake_loop<P: PhysicalLayer>(shared: Arc<Shared<P>>, mut reassemblers: [Reassembler; 2]) {
    debug!("ISO-TP intake thread started");
    while shared.running.load(Ordering::Acquire) {
        let received = shared.lock_bus().receive_frame();

        // Applied between reading and dispatching, so a frame read after the caller gave up
        // never continues the abandoned reception
        let abort = shared.lock_mailbox().abort_reception.take();
        if let Some(instant) = abort {
            for reassembler in reassemblers.iter_mut() {
                reassembler.abort_started_before(instant);
            }
        }

        match received {
            Ok(Some(frame)) => shared.dispatch(&mut reassemblers, frame),
            Ok(None) => thread::sleep(INTAKE_TICK),
            Err(e) => {
                warn!("Bus receive failed: {}", e);
                thread::sleep(INTAKE_TICK);
            }
        }

        let now = Instant::now();
        for reassembler in reassemblers.iter_mut() {
            if let Err(e) = reassembler.check_timeout(now) {
                shared.deliver(reassembler.addressing_type(), Err(e));
            }
        }
    }
    debug!("ISO-TP intake thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = IsoTpConfig::default();
        assert_eq!(config.frame_length, 8);
        assert_eq!(config.filler_byte, 0xCC);
        assert_eq!(config.wft_max, 10);
        assert_eq!(config.max_payload_length, DEFAULT_MAX_PAYLOAD_LENGTH);
        assert_eq!(config.timing.n_bs, Duration::from_millis(1000));
        // No CAN IDs configured yet
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation() {
        let config = IsoTpConfig {
            tx_physical: AddressParams::from_can_id(0x611),
            rx_physical: AddressParams::from_can_id(0x612),
            tx_functional: AddressParams::from_can_id(0x6FF),
            rx_functional: AddressParams::from_can_id(0x6FE),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let fd_without_option = IsoTpConfig {
            frame_length: 64,
            ..config.clone()
        };
        assert!(fd_without_option.validate().is_err());

        let fd = IsoTpConfig {
            frame_length: 64,
            options: IsoTpOptions::FD | IsoTpOptions::DATA_OPTIMIZATION,
            ..config.clone()
        };
        assert!(fd.validate().is_ok());
        assert!(fd.frame_layout().data_optimization);

        let invalid_fd_length = IsoTpConfig {
            frame_length: 10,
            ..fd
        };
        assert!(invalid_fd_length.validate().is_err());

        let zero_timer = IsoTpConfig {
            timing: IsoTpTiming {
                n_cr: Duration::ZERO,
                ..Default::default()
            },
            ..config
        };
        assert!(zero_timer.validate().is_err());
    }

    #[test]
    fn test_pause_until_waits_for_deadline() {
        let start = Instant::now();
        let result = pause_until(
            start + Duration::from_millis(50),
            Some(start + Duration::from_millis(20)),
        );
        assert!(matches!(result, Err(TransportError::Timeout(TimeoutKind::Send))));
        assert!(start.elapsed() >= Duration::from_millis(20));

        let start = Instant::now();
        assert!(pause_until(start + Duration::from_millis(10), None).is_ok());
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_effective_limit() {
        let (_, kind) = effective_limit(Duration::from_millis(1000), TimeoutKind::NBs, None);
        assert_eq!(kind, TimeoutKind::NBs);

        let soon = Instant::now() + Duration::from_millis(10);
        let (limit, kind) = effective_limit(Duration::from_millis(1000), TimeoutKind::NBs, Some(soon));
        assert_eq!(limit, soon);
        assert_eq!(kind, TimeoutKind::Send);
    }
}
