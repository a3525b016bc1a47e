use libcantp::error::{TimeoutKind, TransportError};
use libcantp::physical::mock::MockPhysical;
use libcantp::transport::addressing::{AddressParams, AddressingFormat};
use libcantp::transport::frame::FrameType;
use libcantp::transport::isotp::{IsoTp, IsoTpConfig, IsoTpOptions};
use libcantp::transport::TransportLayer;
use libcantp::types::AddressingType;
use std::thread;
use std::time::Duration;

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

fn tester_config() -> IsoTpConfig {
    IsoTpConfig {
        tx_physical: AddressParams::from_can_id(0x611),
        rx_physical: AddressParams::from_can_id(0x612),
        tx_functional: AddressParams::from_can_id(0x6FF),
        rx_functional: AddressParams::from_can_id(0x6FE),
        ..Default::default()
    }
}

fn ecu_config() -> IsoTpConfig {
    IsoTpConfig {
        tx_physical: AddressParams::from_can_id(0x612),
        rx_physical: AddressParams::from_can_id(0x611),
        tx_functional: AddressParams::from_can_id(0x6FE),
        rx_functional: AddressParams::from_can_id(0x6FF),
        ..Default::default()
    }
}

fn connect(
    tester: IsoTpConfig,
    ecu: IsoTpConfig,
) -> (IsoTp<MockPhysical>, IsoTp<MockPhysical>) {
    let (tester_bus, ecu_bus) = MockPhysical::pair();
    let mut tester = IsoTp::with_physical(tester, tester_bus).unwrap();
    let mut ecu = IsoTp::with_physical(ecu, ecu_bus).unwrap();
    tester.open().unwrap();
    ecu.open().unwrap();
    (tester, ecu)
}

#[test]
fn test_full_stack_request_response() {
    let (tester, ecu) = connect(tester_config(), ecu_config());
    let vin = b"WVWZZZ1JZXW000001".to_vec();

    thread::scope(|s| {
        s.spawn(|| {
            let request = ecu.receive_message(TIMEOUT).unwrap();
            assert_eq!(request.payload(), &[0x22, 0xF1, 0x90]);

            let mut response = vec![0x62, 0xF1, 0x90];
            response.extend_from_slice(&vin);
            ecu.send_message(&response, AddressingType::Physical, TIMEOUT)
                .unwrap();
        });

        tester
            .send_message(&[0x22, 0xF1, 0x90], AddressingType::Physical, TIMEOUT)
            .unwrap();
        let response = tester.receive_message(TIMEOUT).unwrap();
        assert_eq!(response.payload()[..3], [0x62, 0xF1, 0x90]);
        assert_eq!(response.payload()[3..], vin[..]);
    });
}

#[test]
fn test_large_payload_with_block_size() {
    let ecu = IsoTpConfig {
        block_size: 4,
        separation_time_min: 1,
        ..ecu_config()
    };
    let (tester, ecu) = connect(tester_config(), ecu);
    let payload: Vec<u8> = (0..300).map(|i| (i % 251) as u8).collect();

    let sent = tester
        .send_message(&payload, AddressingType::Physical, TIMEOUT)
        .unwrap();
    let received = ecu.receive_message(TIMEOUT).unwrap();
    assert_eq!(received.payload(), payload.as_slice());

    // 1 FF + 42 CF, flow control after the FF and after every 4 CFs
    let flow_controls = sent
        .frames()
        .iter()
        .filter(|f| f.frame_type == FrameType::FlowControl)
        .count();
    assert_eq!(flow_controls, 11);
    assert!(sent.transmission_end() >= sent.transmission_start());
}

#[test]
fn test_sequence_numbers_wrap() {
    let (tester, ecu) = connect(tester_config(), ecu_config());
    let payload: Vec<u8> = (0..146).map(|i| i as u8).collect();

    let sent = tester
        .send_message(&payload, AddressingType::Physical, TIMEOUT)
        .unwrap();
    let sequence_numbers: Vec<u8> = sent
        .frames()
        .iter()
        .filter(|f| f.frame_type == FrameType::ConsecutiveFrame)
        .map(|f| f.frame.data[0] & 0x0F)
        .collect();
    assert_eq!(
        sequence_numbers,
        vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 0, 1, 2, 3, 4]
    );
    assert_eq!(
        ecu.receive_message(TIMEOUT).unwrap().into_payload(),
        payload
    );
}

#[test]
fn test_can_fd_long_message() {
    let fd = |config: IsoTpConfig| IsoTpConfig {
        frame_length: 64,
        options: IsoTpOptions::FD | IsoTpOptions::DATA_OPTIMIZATION,
        ..config
    };
    let (tester, ecu) = connect(fd(tester_config()), fd(ecu_config()));

    // Longer than 4095 bytes: First Frame uses the 32-bit length
    let payload: Vec<u8> = (0..5000).map(|i| (i % 256) as u8).collect();
    let sent = tester
        .send_message(&payload, AddressingType::Physical, TIMEOUT)
        .unwrap();
    assert_eq!(sent.frames()[0].frame.data[..6], [0x10, 0x00, 0x00, 0x00, 0x13, 0x88]);

    let received = ecu.receive_message(TIMEOUT).unwrap();
    assert_eq!(received.payload(), payload.as_slice());
}

#[test]
fn test_normal_fixed_addressing() {
    let tester = IsoTpConfig {
        addressing_format: AddressingFormat::NormalFixed29Bit,
        tx_physical: AddressParams::from_addresses(0x10, 0xF1),
        rx_physical: AddressParams::from_addresses(0xF1, 0x10),
        tx_functional: AddressParams::from_addresses(0x33, 0xF1),
        rx_functional: AddressParams::from_addresses(0xF1, 0x33),
        ..Default::default()
    };
    let ecu = IsoTpConfig {
        addressing_format: AddressingFormat::NormalFixed29Bit,
        tx_physical: AddressParams::from_addresses(0xF1, 0x10),
        rx_physical: AddressParams::from_addresses(0x10, 0xF1),
        tx_functional: AddressParams::from_addresses(0xF1, 0x33),
        rx_functional: AddressParams::from_addresses(0x33, 0xF1),
        ..Default::default()
    };
    let (tester, ecu) = connect(tester, ecu);

    let payload = [0x31, 0x01, 0xFF, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
    let sent = tester
        .send_message(&payload, AddressingType::Physical, TIMEOUT)
        .unwrap();
    assert_eq!(sent.frames()[0].frame.id, 0x18DA_10F1);
    assert!(sent.frames()[0].frame.is_extended);
    assert_eq!(ecu.receive_message(TIMEOUT).unwrap().payload(), &payload);

    // Functional request from the tester
    tester
        .send_message(&[0x3E, 0x80], AddressingType::Functional, TIMEOUT)
        .unwrap();
    let request = ecu.receive_message(TIMEOUT).unwrap();
    assert_eq!(request.addressing_type(), AddressingType::Functional);
}

#[test]
fn test_concurrent_send_and_receive() {
    let (tester, ecu) = connect(tester_config(), ecu_config());
    let upstream: Vec<u8> = (0..200).map(|i| i as u8).collect();
    let downstream: Vec<u8> = (0..120).map(|i| (255 - i) as u8).collect();

    thread::scope(|s| {
        s.spawn(|| {
            ecu.send_message(&downstream, AddressingType::Physical, TIMEOUT)
                .unwrap();
        });
        s.spawn(|| {
            let received = ecu.receive_message(TIMEOUT).unwrap();
            assert_eq!(received.payload(), upstream.as_slice());
        });

        tester
            .send_message(&upstream, AddressingType::Physical, TIMEOUT)
            .unwrap();
        let received = tester.receive_message(TIMEOUT).unwrap();
        assert_eq!(received.payload(), downstream.as_slice());
    });
}

#[test]
fn test_peer_gone_times_out() {
    let (tester, mut ecu) = connect(tester_config(), ecu_config());
    ecu.close().unwrap();

    // Nobody answers the First Frame
    let result = tester.send_message(&[0x01; 64], AddressingType::Physical, None);
    assert!(matches!(
        result,
        Err(TransportError::Timeout(TimeoutKind::NBs))
    ));
}
