//! Integration tests for the fieldpoll polling engine

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fieldpoll::function::VendorAddress;
use fieldpoll::model::*;
use fieldpoll::transport::TransportSettings;
use fieldpoll::*;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const UNIT: u8 = 0x05;
const WAIT: Duration = Duration::from_secs(2);

/// Register image of the simulated device
#[derive(Default)]
struct Device {
    holding: [u16; 10],
    vendor: HashMap<u16, u16>,
}

impl Device {
    fn exception(adu: &[u8], code: u8) -> Vec<u8> {
        vec![adu[0], adu[1] | 0x80, code]
    }

    fn handle(&mut self, adu: &[u8]) -> Vec<u8> {
        if adu[0] != UNIT {
            return Self::exception(adu, 0x0B);
        }
        match adu[1] {
            0x03 => self.read_holding(adu),
            0x10 => self.write_holding(adu),
            0x42 => self.read_from_index(adu),
            0x44 => self.write_masked_to_index(adu),
            _ => Self::exception(adu, 0x01),
        }
    }

    fn read_holding(&self, adu: &[u8]) -> Vec<u8> {
        let start = u16::from_be_bytes([adu[2], adu[3]]) as usize;
        let count = u16::from_be_bytes([adu[4], adu[5]]) as usize;
        let registers = match self.holding.get(start..start + count) {
            Some(x) => x,
            None => return Self::exception(adu, 0x02),
        };
        let mut response = vec![adu[0], adu[1], (2 * count) as u8];
        for value in registers {
            response.extend_from_slice(&value.to_be_bytes());
        }
        response
    }

    fn write_holding(&mut self, adu: &[u8]) -> Vec<u8> {
        let start = u16::from_be_bytes([adu[2], adu[3]]) as usize;
        let count = u16::from_be_bytes([adu[4], adu[5]]) as usize;
        let values = &adu[7..];
        match self.holding.get_mut(start..start + count) {
            Some(registers) => {
                for (register, bytes) in registers.iter_mut().zip(values.chunks(2)) {
                    *register = u16::from_be_bytes([bytes[0], bytes[1]]);
                }
                adu[..6].to_vec()
            }
            None => Self::exception(adu, 0x02),
        }
    }

    fn vendor_address(adu: &[u8]) -> u16 {
        let (category, index, page) = (adu[2] as u16, adu[3] as u16, adu[4] as u16);
        (page << 13) | (category << 7) | index
    }

    fn read_from_index(&self, adu: &[u8]) -> Vec<u8> {
        let start = Self::vendor_address(adu);
        let count = u16::from_be_bytes([adu[5], adu[6]]);
        let mut response = vec![adu[0], adu[1], (2 * count) as u8];
        for i in 0..count {
            let value = self.vendor.get(&(start + i)).copied().unwrap_or(0);
            // vendor registers travel low byte first
            response.extend_from_slice(&value.to_le_bytes());
        }
        response
    }

    fn write_masked_to_index(&mut self, adu: &[u8]) -> Vec<u8> {
        let start = Self::vendor_address(adu);
        for (i, pair) in adu[8..].chunks(4).enumerate() {
            let data = u16::from_be_bytes([pair[0], pair[1]]);
            let mask = u16::from_be_bytes([pair[2], pair[3]]);
            let register = self.vendor.entry(start + i as u16).or_insert(0);
            *register = (*register & mask) | (data & !mask);
        }
        adu[..7].to_vec()
    }
}

async fn serve(mut socket: TcpStream, device: Arc<Mutex<Device>>) {
    loop {
        let mut header = [0u8; 6];
        if socket.read_exact(&mut header).await.is_err() {
            return;
        }
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut adu = vec![0u8; length];
        if socket.read_exact(&mut adu).await.is_err() {
            return;
        }

        let response = device.lock().unwrap().handle(&adu);
        let mut frame = header[..4].to_vec();
        frame.extend_from_slice(&(response.len() as u16).to_be_bytes());
        frame.extend_from_slice(&response);
        if socket.write_all(&frame).await.is_err() {
            return;
        }
    }
}

/// bind a simulated bridge on a free port and return its port
async fn spawn_device(device: Arc<Mutex<Device>>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve(socket, device.clone()));
        }
    });
    port
}

async fn start(device: Arc<Mutex<Device>>) -> (Controller, mpsc::Receiver<Event>) {
    let port = spawn_device(device).await;
    let mut settings = TransportSettings::bridge("127.0.0.1", port);
    settings.response_timeout = Duration::from_millis(500);
    let transceiver = Arc::new(Transceiver::new(settings, DecodeLevel::nothing()));
    transceiver.connect().await.unwrap();
    Controller::start(
        transceiver,
        Arc::new(Registry::new()),
        ControllerConfig::default(),
    )
}

async fn next_state(events: &mut mpsc::Receiver<Event>) -> (String, Value) {
    match tokio::time::timeout(WAIT, events.recv()).await {
        Ok(Some(Event::State(state))) => (state.channel.0, state.value),
        other => panic!("expected a state, got {other:?}"),
    }
}

async fn wait_for<F: Fn(&Device) -> bool>(device: &Arc<Mutex<Device>>, condition: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition(&device.lock().unwrap()) {
        assert!(tokio::time::Instant::now() < deadline, "device never reached the condition");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn polls_registers_and_reports_changes() {
    let device = Arc::new(Mutex::new(Device::default()));
    device.lock().unwrap().holding[2] = 0xFF38;
    device.lock().unwrap().holding[3] = 0x0064;

    let (controller, mut events) = start(device.clone()).await;
    controller.add_node(NodeId(1), UnitId::new(UNIT), Protocol::Standard);
    let id = controller.registry().add_dataset(
        "zone",
        Dataset::new(NodeId(1), MessageClass::HoldingRegister, 2, 2).with_repeat(RepeatPolicy::Fast),
    );
    assert!(controller.registry().add_channel(
        Channel::new(ChannelId::new("a-offset"), id, 0, ValueClass::Int16)
    ));
    assert!(controller.registry().add_channel(
        Channel::new(ChannelId::new("b-setpoint"), id, 1, ValueClass::UInt16)
            .with_encoding(Encoding {
                scale: Some(1),
                ..Encoding::default()
            })
    ));
    controller.poll_dataset(id).unwrap();
    assert_eq!(controller.exec_fast(), 1);

    let mut states = vec![next_state(&mut events).await, next_state(&mut events).await];
    states.sort_by(|x, y| x.0.cmp(&y.0));
    assert_eq!(
        states,
        vec![
            ("a-offset".to_string(), Value::Int(-200)),
            ("b-setpoint".to_string(), Value::Float(10.0)),
        ]
    );

    // only the channel whose bits changed is reported
    device.lock().unwrap().holding[3] = 0x00D7;
    assert_eq!(controller.exec_fast(), 1);
    assert_eq!(
        next_state(&mut events).await,
        ("b-setpoint".to_string(), Value::Float(21.5))
    );

    controller.stop().await;
    assert_eq!(controller.counters().messages, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn writes_registers_through_the_pipeline() {
    let device = Arc::new(Mutex::new(Device::default()));
    let (controller, _events) = start(device.clone()).await;
    controller.add_node(NodeId(1), UnitId::new(UNIT), Protocol::Standard);
    let id = controller.registry().add_dataset(
        "limits",
        Dataset::new(NodeId(1), MessageClass::HoldingRegister, 4, 4),
    );
    assert!(controller.registry().add_channel(Channel::new(
        ChannelId::new("limit"),
        id,
        1,
        ValueClass::Int32
    )));

    controller
        .write(State::new(ChannelId::new("limit"), Value::Int(-2)))
        .await
        .unwrap();

    wait_for(&device, |x| x.holding[6..8] == [0xFFFF, 0xFFFE]).await;
    controller.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn device_exceptions_are_reported_to_the_caller() {
    let device = Arc::new(Mutex::new(Device::default()));
    let (controller, _events) = start(device).await;
    let functions = controller.add_node(NodeId(1), UnitId::new(UNIT), Protocol::Standard);

    assert_eq!(
        functions
            .read_holding_registers(UnitId::new(UNIT), DataRange::new(8, 0, 4))
            .await,
        Err(RequestError::Exception(ExceptionCode::IllegalDataAddress))
    );
    assert_eq!(
        functions
            .read_holding_registers(UnitId::new(UNIT), DataRange::new(8, 0, 2))
            .await,
        Ok(vec![0, 0, 0, 0])
    );
    controller.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn vendor_bit_write_leaves_other_bits_untouched() {
    let address = VendorAddress::new(1, 3, 4).unwrap();
    let device = Arc::new(Mutex::new(Device::default()));
    device.lock().unwrap().vendor.insert(address.to_u16(), 0x00F0);

    let (controller, mut events) = start(device.clone()).await;
    controller.add_node(NodeId(7), UnitId::new(UNIT), Protocol::Vendor);
    let id = controller.registry().add_dataset(
        "relays",
        Dataset::new(NodeId(7), MessageClass::HoldingRegister, address.to_u16(), 1),
    );
    assert!(controller.registry().add_channel(Channel::new(
        ChannelId::new("relay"),
        id,
        3,
        ValueClass::Bit
    )));

    controller
        .write(State::new(ChannelId::new("relay"), Value::Bool(true)))
        .await
        .unwrap();
    wait_for(&device, |x| x.vendor.get(&address.to_u16()) == Some(&0x00F8)).await;

    controller.poll_dataset(id).unwrap();
    assert_eq!(
        next_state(&mut events).await,
        ("relay".to_string(), Value::Bool(true))
    );
    controller.stop().await;
}
