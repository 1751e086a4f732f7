use crate::error::ConfigError;
use crate::model::{ChannelId, Dataset, DatasetId, Encoding, Field, Payload, ReportPolicy, ValueClass};

/// A typed value at a fixed position within a dataset
///
/// `index` counts values of the channel's own width, except for single bits where it
/// counts bits. A 16-bit value at index 2 is the third register, a 32-bit value at
/// index 1 spans the third and fourth registers and an 8-bit value at index 1 is the
/// high byte of the first register.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Channel {
    /// host supplied id
    pub id: ChannelId,
    /// dataset the channel is bound to
    pub dataset: DatasetId,
    /// position within the dataset, in units of the value width
    pub index: u16,
    /// interpretation of the bits
    pub class: ValueClass,
    /// byte order and decimal scale
    pub encoding: Encoding,
    /// engineering unit, informational
    pub unit: Option<String>,
    /// report policy, inherited from the dataset when unset
    pub report: Option<ReportPolicy>,
}

impl Channel {
    /// create a channel with the default encoding
    pub fn new(id: ChannelId, dataset: DatasetId, index: u16, class: ValueClass) -> Self {
        Self {
            id,
            dataset,
            index,
            class,
            encoding: Encoding::default(),
            unit: None,
            report: None,
        }
    }

    /// builder-style setter for the encoding
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// builder-style setter for the unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// builder-style setter for the report policy
    pub fn with_report(mut self, report: ReportPolicy) -> Self {
        self.report = Some(report);
        self
    }

    /// first bit of the channel within the dataset payload
    pub(crate) fn bit_position(&self) -> usize {
        match self.class {
            ValueClass::Bit => usize::from(self.index),
            class => usize::from(self.index) * class.width(),
        }
    }

    fn end(&self) -> usize {
        self.bit_position() + self.class.width()
    }

    /// the channel must lie within the payload of `dataset`
    pub(crate) fn check_footprint(&self, dataset: &Dataset) -> Result<(), ConfigError> {
        if dataset.bit_len() == 0 {
            return Err(ConfigError::UnsupportedClass);
        }
        if dataset.class.is_bits() && !self.class.is_bit_field() {
            return Err(ConfigError::UnsupportedClass);
        }
        if self.end() > dataset.bit_len() {
            return Err(ConfigError::ValueOutOfRange);
        }
        Ok(())
    }

    /// the bits or bytes of this channel within `payload`
    pub(crate) fn extract(&self, payload: &Payload) -> Result<Field, ConfigError> {
        if self.end() > payload.bit_len() {
            return Err(ConfigError::ValueOutOfRange);
        }
        if self.class.is_bit_field() {
            return Ok(Field::Bits(payload.to_bits().range(self.bit_position(), self.end())));
        }

        let registers = match payload {
            Payload::Registers(x) => x,
            Payload::Bits(_) => return Err(ConfigError::ValueMismatch),
        };
        let start = self.bit_position();
        let bytes = match self.class.width() {
            8 => {
                let position = byte_position(start);
                &registers[position..position + 1]
            }
            width => &registers[start / 8..(start + width) / 8],
        };
        Ok(Field::Bytes(bytes.to_vec()))
    }
}

/// position of the byte holding bits `index..index + 8` within big-endian register bytes
pub(crate) fn byte_position(index: usize) -> usize {
    let register = index / 16;
    // the low byte of a register is transmitted second
    if index % 16 == 0 {
        2 * register + 1
    } else {
        2 * register
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageClass, NodeId, Value};

    fn holding(length: u16) -> Dataset {
        Dataset::new(NodeId(1), MessageClass::HoldingRegister, 0, length)
    }

    fn channel(index: u16, class: ValueClass) -> Channel {
        Channel::new(ChannelId::new("ch"), DatasetId(1), index, class)
    }

    #[test]
    fn index_counts_values_of_the_class_width() {
        assert_eq!(channel(3, ValueClass::Bit).bit_position(), 3);
        assert_eq!(channel(3, ValueClass::ModeSet).bit_position(), 12);
        assert_eq!(channel(3, ValueClass::UInt8).bit_position(), 24);
        assert_eq!(channel(1, ValueClass::UInt16).bit_position(), 16);
        assert_eq!(channel(1, ValueClass::Schedule).bit_position(), 16);
        assert_eq!(channel(1, ValueClass::UInt32).bit_position(), 32);
        assert_eq!(channel(1, ValueClass::Float32).bit_position(), 32);
        assert_eq!(channel(u16::MAX, ValueClass::Int32).bit_position(), 65535 * 32);
    }

    #[test]
    fn footprint_must_fit_the_dataset() {
        assert_eq!(channel(1, ValueClass::UInt16).check_footprint(&holding(2)), Ok(()));
        assert_eq!(
            channel(2, ValueClass::UInt16).check_footprint(&holding(2)),
            Err(ConfigError::ValueOutOfRange)
        );
        assert_eq!(channel(1, ValueClass::UInt32).check_footprint(&holding(4)), Ok(()));
        assert_eq!(
            channel(1, ValueClass::UInt32).check_footprint(&holding(2)),
            Err(ConfigError::ValueOutOfRange)
        );
        assert_eq!(channel(3, ValueClass::UInt8).check_footprint(&holding(2)), Ok(()));
        assert_eq!(
            channel(4, ValueClass::UInt8).check_footprint(&holding(2)),
            Err(ConfigError::ValueOutOfRange)
        );
        let coils = Dataset::new(NodeId(1), MessageClass::Coil, 0, 8);
        assert_eq!(channel(7, ValueClass::Bit).check_footprint(&coils), Ok(()));
        assert_eq!(channel(1, ValueClass::ModeSet).check_footprint(&coils), Ok(()));
        assert_eq!(
            channel(2, ValueClass::ModeSet).check_footprint(&coils),
            Err(ConfigError::ValueOutOfRange)
        );
        assert_eq!(
            channel(0, ValueClass::UInt8).check_footprint(&coils),
            Err(ConfigError::UnsupportedClass)
        );
    }

    #[test]
    fn extracts_bytes_and_bits_from_registers() {
        let payload = Payload::Registers(vec![0x12, 0x34, 0x00, 0x2A]);
        assert_eq!(
            channel(1, ValueClass::UInt16).extract(&payload),
            Ok(Field::Bytes(vec![0x00, 0x2A]))
        );
        assert_eq!(
            channel(0, ValueClass::UInt8).extract(&payload),
            Ok(Field::Bytes(vec![0x34]))
        );
        assert_eq!(
            channel(1, ValueClass::UInt8).extract(&payload),
            Ok(Field::Bytes(vec![0x12]))
        );
        assert_eq!(
            channel(2, ValueClass::UInt8).extract(&payload),
            Ok(Field::Bytes(vec![0x2A]))
        );

        let bit = channel(2, ValueClass::Bit);
        let field = bit.extract(&payload).unwrap();
        assert_eq!(
            Encoding::default().decode(ValueClass::Bit, &field),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn wide_values_at_index_one_skip_the_first_value() {
        let payload = Payload::Registers(vec![
            0x00, 0x01, 0x00, 0x02, 0x41, 0x2C, 0x00, 0x00,
        ]);
        let field = channel(1, ValueClass::UInt16).extract(&payload).unwrap();
        assert_eq!(
            Encoding::default().decode(ValueClass::UInt16, &field),
            Ok(Value::Int(2))
        );
        let field = channel(1, ValueClass::UInt32).extract(&payload).unwrap();
        assert_eq!(field, Field::Bytes(vec![0x41, 0x2C, 0x00, 0x00]));
        assert_eq!(
            Encoding::default().decode(ValueClass::UInt32, &field),
            Ok(Value::Int(0x412C_0000))
        );
        let field = channel(1, ValueClass::Float32).extract(&payload).unwrap();
        assert_eq!(
            Encoding::default().decode(ValueClass::Float32, &field),
            Ok(Value::Float(10.75))
        );
    }
}
