//! One operation per Modbus function, for the standard protocol and the vendor extension

pub(crate) mod code;
mod request;
mod standard;
mod vendor;

pub use code::FunctionCode;
pub use standard::StandardFunctions;
pub use vendor::{VendorAddress, VendorFunctions};

use crate::bits::BitVector;
use crate::error::RequestError;
use crate::types::{DataRange, UnitId};

/// Protocol spoken by a node, resolved once at node registration
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    /// standard Modbus function codes
    #[default]
    Standard,
    /// extended vendor addressing and function codes
    Vendor,
}

impl std::str::FromStr for Protocol {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" | "modbus" => Ok(Protocol::Standard),
            "vendor" | "extended" => Ok(Protocol::Vendor),
            _ => Err(crate::error::ConfigError::UnknownName),
        }
    }
}

/// Response to `get comm event counter`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommEventCounter {
    /// 0xFFFF while the device is busy
    pub status: u16,
    /// number of successful messages
    pub event_count: u16,
}

/// Response to `get comm event log`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommEventLog {
    /// 0xFFFF while the device is busy
    pub status: u16,
    /// number of successful messages
    pub event_count: u16,
    /// number of messages processed
    pub message_count: u16,
    /// event bytes, most recent first
    pub events: Vec<u8>,
}

/// One object of a `read device identification` response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceObject {
    /// object id
    pub id: u8,
    /// raw object value, usually ASCII
    pub value: Vec<u8>,
}

/// A unit that received a logical address during enumeration
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    /// serial number reported by the unit
    pub serial: u32,
    /// logical unit id assigned to it
    pub unit: UnitId,
}

/// Every read and write operation the pipeline dispatches
///
/// Register data always leaves this layer as big-endian bytes, two per register.
/// Errors are returned unmodified; retry and reconnect policy live in the controller.
#[async_trait::async_trait]
pub trait FunctionLayer: Send + Sync {
    /// protocol implemented by this layer
    fn protocol(&self) -> Protocol;

    /// read `range.count` coils
    async fn read_coils(&self, unit: UnitId, range: DataRange) -> Result<BitVector, RequestError>;

    /// read `range.count` discrete inputs
    async fn read_discrete_inputs(
        &self,
        unit: UnitId,
        range: DataRange,
    ) -> Result<BitVector, RequestError>;

    /// read `range.count` holding registers
    async fn read_holding_registers(
        &self,
        unit: UnitId,
        range: DataRange,
    ) -> Result<Vec<u8>, RequestError>;

    /// read `range.count` input registers
    async fn read_input_registers(
        &self,
        unit: UnitId,
        range: DataRange,
    ) -> Result<Vec<u8>, RequestError>;

    /// write one coil
    async fn write_single_coil(
        &self,
        unit: UnitId,
        range: DataRange,
        value: bool,
    ) -> Result<(), RequestError>;

    /// write `bits.len()` coils
    async fn write_multiple_coils(
        &self,
        unit: UnitId,
        range: DataRange,
        bits: &BitVector,
    ) -> Result<(), RequestError>;

    /// write one register
    async fn write_single_register(
        &self,
        unit: UnitId,
        range: DataRange,
        value: u16,
    ) -> Result<(), RequestError>;

    /// write big-endian register bytes
    async fn write_multiple_registers(
        &self,
        unit: UnitId,
        range: DataRange,
        data: &[u8],
    ) -> Result<(), RequestError>;

    /// read the 8 exception status outputs
    async fn read_exception_status(&self, unit: UnitId) -> Result<u8, RequestError>;

    /// read the status word and event counter
    async fn get_comm_event_counter(&self, unit: UnitId) -> Result<CommEventCounter, RequestError>;

    /// read the status word, counters and the event log
    async fn get_comm_event_log(&self, unit: UnitId) -> Result<CommEventLog, RequestError>;

    /// read the device specific server id data
    async fn report_server_id(&self, unit: UnitId) -> Result<Vec<u8>, RequestError>;

    /// read one device identification object
    async fn read_device_identification(
        &self,
        unit: UnitId,
        object_id: u8,
    ) -> Result<Vec<DeviceObject>, RequestError>;

    /// assign consecutive logical unit ids starting at `first` to every unaddressed unit
    async fn enumerate(&self, _first: UnitId) -> Result<Vec<Assignment>, RequestError> {
        Err(RequestError::MethodNotSupported)
    }
}
