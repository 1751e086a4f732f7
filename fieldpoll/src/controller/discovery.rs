use tokio::sync::mpsc;

use crate::channel::FlowReceiver;
use crate::constants::vendor::STATUS_PAIRING_ACTIVE;
use crate::controller::Event;
use crate::error::Shutdown;
use crate::function::{Assignment, VendorAddress};
use crate::model::{NodeId, Payload};
use crate::types::UnitId;

/// Kind of device announced by discovery
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    /// room thermostat of a zone
    Thermostat,
    /// actuator driving one channel
    Actuator,
    /// controller that received a logical address during enumeration
    Controller,
}

/// A device the host may want to add
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveredDevice {
    /// kind of device
    pub kind: DeviceKind,
    /// node that reported it
    pub node: NodeId,
    /// unit id to reach it
    pub unit: UnitId,
    /// channel index
    pub channel: u8,
    /// element index
    pub element: u8,
    /// serial number, when learned by enumeration
    pub serial: Option<u32>,
}

pub(crate) enum DiscoveryInput {
    /// registers 0 and 1 of an internal dataset: assignment bitmap and status
    Bitmap {
        node: NodeId,
        unit: UnitId,
        address: u16,
        payload: Payload,
    },
    /// a unit assigned by enumeration
    Assigned {
        node: NodeId,
        assignment: Assignment,
    },
}

/// Consumer of the discovery flow
pub(crate) struct DiscoveryTask {
    rx: FlowReceiver<DiscoveryInput>,
    events: mpsc::Sender<Event>,
}

impl DiscoveryTask {
    pub(crate) fn new(rx: FlowReceiver<DiscoveryInput>, events: mpsc::Sender<Event>) -> Self {
        Self { rx, events }
    }

    pub(crate) async fn run(&mut self) {
        let _ = self.run_inner().await;
    }

    async fn run_inner(&mut self) -> Result<(), Shutdown> {
        loop {
            let devices = match self.rx.recv().await? {
                DiscoveryInput::Bitmap {
                    node,
                    unit,
                    address,
                    payload,
                } => from_bitmap(node, unit, address, &payload),
                DiscoveryInput::Assigned { node, assignment } => vec![DiscoveredDevice {
                    kind: DeviceKind::Controller,
                    node,
                    unit: assignment.unit,
                    channel: 0,
                    element: 0,
                    serial: Some(assignment.serial),
                }],
            };

            for device in devices {
                tracing::info!(
                    "discovered {:?} at unit {} channel {} element {}",
                    device.kind,
                    device.unit,
                    device.channel,
                    device.element
                );
                self.events
                    .send(Event::Discovered(device))
                    .await
                    .map_err(|_| Shutdown)?;
            }
        }
    }
}

fn from_bitmap(node: NodeId, unit: UnitId, address: u16, payload: &Payload) -> Vec<DiscoveredDevice> {
    let (bitmap, status) = match payload {
        Payload::Registers(x) if x.len() >= 4 => (
            u16::from_be_bytes([x[0], x[1]]),
            u16::from_be_bytes([x[2], x[3]]),
        ),
        _ => {
            tracing::warn!("discovery needs two registers, got {}", payload);
            return Vec::new();
        }
    };

    if status & STATUS_PAIRING_ACTIVE != 0 {
        tracing::debug!("pairing in progress on unit {}, skipping discovery", unit);
        return Vec::new();
    }

    let element = VendorAddress::from_u16(address).page;
    let device = |kind, channel| DiscoveredDevice {
        kind,
        node,
        unit,
        channel,
        element,
        serial: None,
    };

    let channels: Vec<u8> = (0..16u8).filter(|bit| bitmap & (1 << bit) != 0).collect();
    let mut devices = Vec::with_capacity(channels.len() + 1);
    if let Some(first) = channels.first() {
        devices.push(device(DeviceKind::Thermostat, *first));
    }
    devices.extend(channels.iter().map(|x| device(DeviceKind::Actuator, *x)));
    devices
}
