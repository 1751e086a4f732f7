use crate::bits::BitVector;
use crate::model::{MessageClass, NodeId, ReportPolicy, RepeatPolicy};

/// Channel and element index a dataset belongs to on a multi-zone device
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Scope {
    /// channel index, 0..=11
    pub channel: u8,
    /// element index, 0..=2
    pub element: u8,
}

/// A contiguous range of bits or registers on one node
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Dataset {
    /// node the dataset is read from
    pub node: NodeId,
    /// kind of data
    pub class: MessageClass,
    /// start address
    pub address: u16,
    /// number of bits or registers
    pub length: u16,
    /// addressing offset, a bit position for the vendor protocol
    pub offset: u16,
    /// optional channel/element scope
    pub scope: Option<Scope>,
    /// when updates fan out to channels
    pub report: ReportPolicy,
    /// how often the dataset is read
    pub repeat: RepeatPolicy,
    /// internal datasets feed device discovery instead of the application
    pub internal: bool,
}

impl Dataset {
    /// create a dataset reporting on change and read once
    pub fn new(node: NodeId, class: MessageClass, address: u16, length: u16) -> Self {
        Self {
            node,
            class,
            address,
            length,
            offset: 0,
            scope: None,
            report: ReportPolicy::default(),
            repeat: RepeatPolicy::default(),
            internal: false,
        }
    }

    /// builder-style setter for the offset
    pub fn with_offset(mut self, offset: u16) -> Self {
        self.offset = offset;
        self
    }

    /// builder-style setter for the scope
    pub fn with_scope(mut self, channel: u8, element: u8) -> Self {
        self.scope = Some(Scope { channel, element });
        self
    }

    /// builder-style setter for the report policy
    pub fn with_report(mut self, report: ReportPolicy) -> Self {
        self.report = report;
        self
    }

    /// builder-style setter for the repeat policy
    pub fn with_repeat(mut self, repeat: RepeatPolicy) -> Self {
        self.repeat = repeat;
        self
    }

    /// mark the dataset as internal
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// number of bits a payload of this dataset carries
    pub fn bit_len(&self) -> usize {
        if self.class.is_bits() {
            self.length as usize
        } else if self.class.is_registers() {
            16 * self.length as usize
        } else {
            0
        }
    }
}

/// Data read from or written to a dataset
///
/// Register bytes are big-endian, two per register. Equality is exact over the
/// declared bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// coils or discrete inputs
    Bits(BitVector),
    /// register bytes
    Registers(Vec<u8>),
}

impl Payload {
    /// number of bits carried
    pub fn bit_len(&self) -> usize {
        match self {
            Payload::Bits(x) => x.len(),
            Payload::Registers(x) => 8 * x.len(),
        }
    }

    /// view as bits, registers are unpacked so that bit `i` is bit `i % 16` of register `i / 16`
    pub fn to_bits(&self) -> BitVector {
        match self {
            Payload::Bits(x) => x.clone(),
            Payload::Registers(x) => BitVector::from_registers(x),
        }
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Payload::Bits(x) => write!(f, "bits [{x}]"),
            Payload::Registers(x) => write!(f, "registers {x:02X?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitOrder;

    #[test]
    fn bit_length_follows_class() {
        let node = NodeId(1);
        assert_eq!(Dataset::new(node, MessageClass::Coil, 0, 10).bit_len(), 10);
        assert_eq!(
            Dataset::new(node, MessageClass::HoldingRegister, 0, 3).bit_len(),
            48
        );
        assert_eq!(
            Dataset::new(node, MessageClass::CommEventLog, 0, 3).bit_len(),
            0
        );
    }

    #[test]
    fn payload_equality_is_value_based() {
        let a = BitVector::from_bytes(&[0xFF], 3, BitOrder::Lsb0).unwrap();
        let b = BitVector::from_bytes(&[0x07], 3, BitOrder::Lsb0).unwrap();
        assert_eq!(Payload::Bits(a), Payload::Bits(b));
        assert_ne!(
            Payload::Registers(vec![0x00, 0x01]),
            Payload::Registers(vec![0x00, 0x02])
        );
    }
}
