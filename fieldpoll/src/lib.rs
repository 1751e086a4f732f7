//! An async polling engine for field devices that speak Modbus over serial lines or
//! RTU-over-TCP bridges, built on [Tokio](https://docs.rs/tokio).
//!
//! # Features
//!
//! * RTU, ASCII and bridge (RTU-over-TCP) framing with panic-free parsing
//! * A single transceiver that serializes transactions and paces the bus
//! * Standard function codes 1-6, 7, 11, 12, 15, 16, 17 and 43/14
//! * A vendor extension addressing registers by page, category and index, with masked
//!   bit writes and unit enumeration
//! * Datasets and typed channels with change-only reporting
//! * Once, slow and fast action lists driven by the host's own timers
//! * Device discovery from assignment bitmaps and enumeration
//!
//! # Example
//!
//! Poll two holding registers every second and print the changes
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fieldpoll::model::*;
//! use fieldpoll::transport::TransportSettings;
//! use fieldpoll::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transceiver = Arc::new(Transceiver::new(
//!         TransportSettings::bridge("127.0.0.1", 502),
//!         DecodeLevel::nothing(),
//!     ));
//!     transceiver.connect().await?;
//!
//!     let registry = Arc::new(Registry::new());
//!     let (controller, mut events) =
//!         Controller::start(transceiver, registry.clone(), ControllerConfig::default());
//!
//!     controller.add_node(NodeId(1), UnitId::new(1), Protocol::Standard);
//!     let id = registry.add_dataset(
//!         "temperature",
//!         Dataset::new(NodeId(1), MessageClass::HoldingRegister, 0, 2)
//!             .with_repeat(RepeatPolicy::Slow),
//!     );
//!     registry.add_channel(Channel::new(
//!         ChannelId::new("temperature"),
//!         id,
//!         0,
//!         ValueClass::Int16,
//!     ));
//!     controller.poll_dataset(id)?;
//!
//!     let mut slow = tokio::time::interval(Duration::from_secs(1));
//!     loop {
//!         tokio::select! {
//!             _ = slow.tick() => {
//!                 controller.exec_slow();
//!             }
//!             event = events.recv() => match event {
//!                 Some(event) => println!("{event:?}"),
//!                 None => return Ok(()),
//!             }
//!         }
//!     }
//! }
//! ```

mod bits;
mod channel;
/// Checksums, hex framing helpers and register encodings
pub mod codec;
/// Public constant values related to the protocol
pub mod constants;
/// The pipeline that turns datasets into transactions and reports
pub mod controller;
mod counters;
mod decode;
mod error;
mod exception;
/// Once, slow and fast action scheduling
pub mod feed;
/// Standard and vendor function layers
pub mod function;
pub mod model;
mod phys;
/// Links, framings and the transceiver
pub mod transport;
mod types;

#[cfg(test)]
mod mock;

pub use crate::bits::{BitOrder, BitVector};
pub use crate::controller::{Controller, ControllerConfig, DeviceKind, DiscoveredDevice, Event};
pub use crate::counters::{CounterSnapshot, Counters};
pub use crate::decode::*;
pub use crate::error::*;
pub use crate::exception::ExceptionCode;
pub use crate::function::{FunctionLayer, Protocol};
pub use crate::transport::Transceiver;
pub use crate::types::{DataRange, UnitId};
