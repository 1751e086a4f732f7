/// High byte that tags a vendor function code
pub(crate) const VENDOR_TAG: u16 = 0x0100;

/// Every function code the engine sends
///
/// Vendor codes carry [`VENDOR_TAG`] in the high byte and only the low byte is sent on
/// the wire. The low bytes do not collide with the standard codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum FunctionCode {
    /// 0x01
    ReadCoils = 0x01,
    /// 0x02
    ReadDiscreteInputs = 0x02,
    /// 0x03
    ReadHoldingRegisters = 0x03,
    /// 0x04
    ReadInputRegisters = 0x04,
    /// 0x05
    WriteSingleCoil = 0x05,
    /// 0x06
    WriteSingleRegister = 0x06,
    /// 0x07
    ReadExceptionStatus = 0x07,
    /// 0x0B
    GetCommEventCounter = 0x0B,
    /// 0x0C
    GetCommEventLog = 0x0C,
    /// 0x0F
    WriteMultipleCoils = 0x0F,
    /// 0x10
    WriteMultipleRegisters = 0x10,
    /// 0x11
    ReportServerId = 0x11,
    /// 0x2B, MEI type 0x0E
    ReadDeviceIdentification = 0x2B,
    /// vendor 0x42
    ReadFromIndex = VENDOR_TAG | 0x42,
    /// vendor 0x43
    WriteToIndex = VENDOR_TAG | 0x43,
    /// vendor 0x44
    WriteMaskedToIndex = VENDOR_TAG | 0x44,
    /// vendor 0x45
    EnumerationReset = VENDOR_TAG | 0x45,
    /// vendor 0x46
    EnumerationQuery = VENDOR_TAG | 0x46,
    /// vendor 0x6D
    AssignLogicalAddress = VENDOR_TAG | 0x6D,
}

const ALL: [FunctionCode; 19] = [
    FunctionCode::ReadCoils,
    FunctionCode::ReadDiscreteInputs,
    FunctionCode::ReadHoldingRegisters,
    FunctionCode::ReadInputRegisters,
    FunctionCode::WriteSingleCoil,
    FunctionCode::WriteSingleRegister,
    FunctionCode::ReadExceptionStatus,
    FunctionCode::GetCommEventCounter,
    FunctionCode::GetCommEventLog,
    FunctionCode::WriteMultipleCoils,
    FunctionCode::WriteMultipleRegisters,
    FunctionCode::ReportServerId,
    FunctionCode::ReadDeviceIdentification,
    FunctionCode::ReadFromIndex,
    FunctionCode::WriteToIndex,
    FunctionCode::WriteMaskedToIndex,
    FunctionCode::EnumerationReset,
    FunctionCode::EnumerationQuery,
    FunctionCode::AssignLogicalAddress,
];

impl FunctionCode {
    /// full 16-bit value including the vendor tag
    pub const fn get_value(self) -> u16 {
        self as u16
    }

    /// the byte sent on the wire
    pub const fn wire_value(self) -> u8 {
        (self as u16 & 0xFF) as u8
    }

    /// true for the vendor extension codes
    pub const fn is_vendor(self) -> bool {
        self as u16 & VENDOR_TAG != 0
    }

    /// resolve a wire byte, ignoring the exception bit
    pub fn from_wire(value: u8) -> Option<Self> {
        let value = value & !crate::constants::frame::EXCEPTION_MASK;
        ALL.iter().copied().find(|x| x.wire_value() == value)
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FunctionCode::ReadCoils => write!(f, "READ COILS ({:#04X})", self.wire_value()),
            FunctionCode::ReadDiscreteInputs => {
                write!(f, "READ DISCRETE INPUTS ({:#04X})", self.wire_value())
            }
            FunctionCode::ReadHoldingRegisters => {
                write!(f, "READ HOLDING REGISTERS ({:#04X})", self.wire_value())
            }
            FunctionCode::ReadInputRegisters => {
                write!(f, "READ INPUT REGISTERS ({:#04X})", self.wire_value())
            }
            FunctionCode::WriteSingleCoil => {
                write!(f, "WRITE SINGLE COIL ({:#04X})", self.wire_value())
            }
            FunctionCode::WriteSingleRegister => {
                write!(f, "WRITE SINGLE REGISTER ({:#04X})", self.wire_value())
            }
            FunctionCode::ReadExceptionStatus => {
                write!(f, "READ EXCEPTION STATUS ({:#04X})", self.wire_value())
            }
            FunctionCode::GetCommEventCounter => {
                write!(f, "GET COMM EVENT COUNTER ({:#04X})", self.wire_value())
            }
            FunctionCode::GetCommEventLog => {
                write!(f, "GET COMM EVENT LOG ({:#04X})", self.wire_value())
            }
            FunctionCode::WriteMultipleCoils => {
                write!(f, "WRITE MULTIPLE COILS ({:#04X})", self.wire_value())
            }
            FunctionCode::WriteMultipleRegisters => {
                write!(f, "WRITE MULTIPLE REGISTERS ({:#04X})", self.wire_value())
            }
            FunctionCode::ReportServerId => {
                write!(f, "REPORT SERVER ID ({:#04X})", self.wire_value())
            }
            FunctionCode::ReadDeviceIdentification => {
                write!(f, "READ DEVICE IDENTIFICATION ({:#04X})", self.wire_value())
            }
            FunctionCode::ReadFromIndex => {
                write!(f, "VENDOR READ FROM INDEX ({:#06X})", self.get_value())
            }
            FunctionCode::WriteToIndex => {
                write!(f, "VENDOR WRITE TO INDEX ({:#06X})", self.get_value())
            }
            FunctionCode::WriteMaskedToIndex => {
                write!(f, "VENDOR WRITE MASKED TO INDEX ({:#06X})", self.get_value())
            }
            FunctionCode::EnumerationReset => {
                write!(f, "VENDOR ENUMERATION RESET ({:#06X})", self.get_value())
            }
            FunctionCode::EnumerationQuery => {
                write!(f, "VENDOR ENUMERATION QUERY ({:#06X})", self.get_value())
            }
            FunctionCode::AssignLogicalAddress => {
                write!(f, "VENDOR ASSIGN LOGICAL ADDRESS ({:#06X})", self.get_value())
            }
        }
    }
}
