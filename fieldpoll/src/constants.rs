/// Values used by `write single coil`
pub mod coil {
    /// u16 representation of ON
    pub const ON: u16 = 0xFF00;
    /// u16 representation of OFF
    pub const OFF: u16 = 0x0000;
}

/// Count limits of the standard function codes
pub mod limits {
    /// Maximum count allowed in a read coils/discrete inputs request
    pub const MAX_READ_COILS_COUNT: u16 = 0x07D0;
    /// Maximum count allowed in a read holding/input registers request
    pub const MAX_READ_REGISTERS_COUNT: u16 = 0x007D;
    /// Maximum count allowed in a `write multiple coils` request
    pub const MAX_WRITE_COILS_COUNT: u16 = 0x07B0;
    /// Maximum count allowed in a `write multiple registers` request
    pub const MAX_WRITE_REGISTERS_COUNT: u16 = 0x007B;
    /// Maximum count of registers in a vendor `write masked to index` request
    pub const MAX_MASKED_REGISTERS_COUNT: u16 = 0x003C;
}

pub(crate) mod exceptions {
    pub(crate) const ILLEGAL_FUNCTION: u8 = 0x01;
    pub(crate) const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    pub(crate) const ILLEGAL_DATA_VALUE: u8 = 0x03;
    pub(crate) const SERVER_DEVICE_FAILURE: u8 = 0x04;
    pub(crate) const ACKNOWLEDGE: u8 = 0x05;
    pub(crate) const SERVER_DEVICE_BUSY: u8 = 0x06;
    pub(crate) const MEMORY_PARITY_ERROR: u8 = 0x08;
    pub(crate) const GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;
    pub(crate) const GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND: u8 = 0x0B;
}

pub(crate) mod frame {
    pub(crate) const CRC_LENGTH: usize = 2;
    /// largest RTU frame on the wire, CRC included
    pub(crate) const MAX_RTU_FRAME_LENGTH: usize = 256;
    /// unit id + function code + 252 data bytes
    pub(crate) const MAX_ADU_LENGTH: usize = MAX_RTU_FRAME_LENGTH - CRC_LENGTH;
    pub(crate) const BRIDGE_HEADER_LENGTH: usize = 6;
    /// bytes dropped while hunting for a valid RTU frame before giving up
    pub(crate) const MAX_RESYNC_ITERATIONS: usize = 64;
    pub(crate) const EXCEPTION_MASK: u8 = 0x80;
}

/// Constants of the extended vendor protocol
pub mod vendor {
    /// Unit id that every unit without a logical address answers on
    pub const UNASSIGNED_UNIT: u8 = 0x01;
    /// Broadcast unit id
    pub const BROADCAST_UNIT: u8 = 0x00;
    /// Maximum number of units assigned in one enumeration
    pub const MAX_ENUMERATED_UNITS: usize = 247;
    /// Status register bit set while the device is pairing
    pub const STATUS_PAIRING_ACTIVE: u16 = 0x0001;
    pub(crate) const PAGE_SHIFT: u16 = 13;
    pub(crate) const CATEGORY_SHIFT: u16 = 7;
    pub(crate) const CATEGORY_MASK: u16 = 0x3F;
    pub(crate) const INDEX_MASK: u16 = 0x7F;
}
