use crate::bits::{BitOrder, BitVector};
use crate::codec::*;
use crate::error::ConfigError;

/// How the bits of a channel are interpreted
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueClass {
    /// single bit
    Bit,
    /// signed byte
    Int8,
    /// unsigned byte
    UInt8,
    /// signed register
    Int16,
    /// unsigned register
    UInt16,
    /// signed register pair
    Int32,
    /// unsigned register pair
    UInt32,
    /// IEEE-754 register pair
    Float32,
    /// unsigned register in tenths of a watt
    Power,
    /// signed byte in dBm
    Rssi,
    /// unsigned byte in percent
    Battery,
    /// 16 bits rendered as a bit string
    Schedule,
    /// 16 bits naming the datasets that changed on the device
    ChangeBitmap,
    /// 4-bit mode selector
    ModeSet,
}

impl ValueClass {
    /// number of bits occupied in the payload
    pub fn width(self) -> usize {
        match self {
            ValueClass::Bit => 1,
            ValueClass::ModeSet => 4,
            ValueClass::Int8 | ValueClass::UInt8 | ValueClass::Rssi | ValueClass::Battery => 8,
            ValueClass::Int16
            | ValueClass::UInt16
            | ValueClass::Power
            | ValueClass::Schedule
            | ValueClass::ChangeBitmap => 16,
            ValueClass::Int32 | ValueClass::UInt32 | ValueClass::Float32 => 32,
        }
    }

    /// true for classes decoded from individual bits rather than bytes
    pub fn is_bit_field(self) -> bool {
        matches!(
            self,
            ValueClass::Bit | ValueClass::ModeSet | ValueClass::Schedule
        )
    }

    /// false for values only the device can change
    pub fn is_writable(self) -> bool {
        !matches!(
            self,
            ValueClass::Power | ValueClass::Rssi | ValueClass::Battery | ValueClass::ChangeBitmap
        )
    }

    fn is_integer(self) -> bool {
        matches!(
            self,
            ValueClass::Int8
                | ValueClass::UInt8
                | ValueClass::Int16
                | ValueClass::UInt16
                | ValueClass::Int32
                | ValueClass::UInt32
        )
    }

    fn integer_bounds(self) -> (i64, i64) {
        match self {
            ValueClass::Int8 => (i8::MIN as i64, i8::MAX as i64),
            ValueClass::UInt8 => (0, u8::MAX as i64),
            ValueClass::Int16 => (i16::MIN as i64, i16::MAX as i64),
            ValueClass::UInt16 => (0, u16::MAX as i64),
            ValueClass::Int32 => (i32::MIN as i64, i32::MAX as i64),
            ValueClass::UInt32 => (0, u32::MAX as i64),
            ValueClass::ModeSet => (0, 15),
            _ => (0, 0),
        }
    }
}

impl std::str::FromStr for ValueClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bit" | "bool" => Ok(ValueClass::Bit),
            "int8" => Ok(ValueClass::Int8),
            "uint8" => Ok(ValueClass::UInt8),
            "int16" => Ok(ValueClass::Int16),
            "uint16" => Ok(ValueClass::UInt16),
            "int32" => Ok(ValueClass::Int32),
            "uint32" => Ok(ValueClass::UInt32),
            "float32" => Ok(ValueClass::Float32),
            "power" => Ok(ValueClass::Power),
            "rssi" => Ok(ValueClass::Rssi),
            "battery" => Ok(ValueClass::Battery),
            "schedule" => Ok(ValueClass::Schedule),
            "change-bitmap" => Ok(ValueClass::ChangeBitmap),
            "mode-set" => Ok(ValueClass::ModeSet),
            _ => Err(ConfigError::UnknownName),
        }
    }
}

/// Typed value of a channel
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// on/off
    Bool(bool),
    /// integer
    Int(i64),
    /// scaled or floating point
    Float(f64),
    /// text, such as a schedule bit string
    Text(String),
}

impl Value {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(x) => Some(*x as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Value::Bool(x) => write!(f, "{x}"),
            Value::Int(x) => write!(f, "{x}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(x) => f.write_str(x),
        }
    }
}

/// Raw footprint of a channel within a payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Field {
    Bits(BitVector),
    /// big-endian bytes, one for 8-bit classes
    Bytes(Vec<u8>),
}

/// Decoding parameters of a channel
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Encoding {
    /// order of the bytes within each register
    pub order: ByteOrder,
    /// number of decimal places, integer values are divided by `10^scale`
    pub scale: Option<u8>,
}

impl Encoding {
    pub(crate) fn decode(&self, class: ValueClass, field: &Field) -> Result<Value, ConfigError> {
        let value = match (class, field) {
            (ValueClass::Bit, Field::Bits(bits)) => Value::Bool(bits.get(0)?),
            (ValueClass::ModeSet, Field::Bits(bits)) => {
                let mode = bits
                    .ones()
                    .fold(0i64, |acc, bit| acc | (1i64 << bit));
                Value::Int(mode)
            }
            (ValueClass::Schedule, Field::Bits(bits)) => Value::Text(bits.to_bit_string()),
            (_, Field::Bytes(bytes)) => self.decode_bytes(class, bytes)?,
            _ => return Err(ConfigError::ValueMismatch),
        };
        Ok(value)
    }

    fn decode_bytes(&self, class: ValueClass, bytes: &[u8]) -> Result<Value, ConfigError> {
        let raw: i64 = match class {
            ValueClass::Int8 | ValueClass::Rssi => decode_i8(byte(bytes)?) as i64,
            ValueClass::UInt8 => decode_u8(byte(bytes)?) as i64,
            ValueClass::Battery => decode_u8(byte(bytes)?).min(100) as i64,
            ValueClass::Int16 => decode_i16(array(bytes)?, self.order) as i64,
            ValueClass::UInt16 | ValueClass::ChangeBitmap => {
                decode_u16(array(bytes)?, self.order) as i64
            }
            ValueClass::Power => {
                let tenths = decode_u16(array(bytes)?, self.order);
                return Ok(Value::Float(tenths as f64 / 10.0));
            }
            ValueClass::Int32 => decode_i32(array(bytes)?, self.order) as i64,
            ValueClass::UInt32 => decode_u32(array(bytes)?, self.order) as i64,
            ValueClass::Float32 => {
                return Ok(Value::Float(
                    decode_f32(array(bytes)?, self.order) as f64
                ))
            }
            ValueClass::Bit | ValueClass::ModeSet | ValueClass::Schedule => {
                return Err(ConfigError::ValueMismatch)
            }
        };

        match self.scale {
            Some(scale) if class.is_integer() => {
                Ok(Value::Float(raw as f64 / 10f64.powi(scale as i32)))
            }
            _ => Ok(Value::Int(raw)),
        }
    }

    pub(crate) fn encode(&self, class: ValueClass, value: &Value) -> Result<Field, ConfigError> {
        if !class.is_writable() {
            return Err(ConfigError::ReadOnlyValue);
        }

        match class {
            ValueClass::Bit => {
                let state = match value {
                    Value::Bool(x) => *x,
                    Value::Int(0) => false,
                    Value::Int(1) => true,
                    Value::Int(_) => return Err(ConfigError::ValueOutOfRange),
                    _ => return Err(ConfigError::ValueMismatch),
                };
                let mut bits = BitVector::new(1, BitOrder::Lsb0);
                bits.set(0, state)?;
                Ok(Field::Bits(bits))
            }
            ValueClass::ModeSet => {
                let mode = self.integer(class, value)?;
                let mut bits = BitVector::new(4, BitOrder::Lsb0);
                for bit in 0..4 {
                    bits.set(bit, mode & (1 << bit) != 0)?;
                }
                Ok(Field::Bits(bits))
            }
            ValueClass::Schedule => {
                let text = match value {
                    Value::Text(x) => x,
                    _ => return Err(ConfigError::ValueMismatch),
                };
                let bits = BitVector::parse_bit_string(text, BitOrder::Lsb0)?;
                if bits.len() != class.width() {
                    return Err(ConfigError::ValueOutOfRange);
                }
                Ok(Field::Bits(bits))
            }
            ValueClass::Float32 => {
                let x = value.as_f64().ok_or(ConfigError::ValueMismatch)?;
                Ok(Field::Bytes(encode_f32(x as f32, self.order).to_vec()))
            }
            _ => {
                let raw = self.integer(class, value)?;
                let bytes = match class {
                    ValueClass::Int8 | ValueClass::UInt8 => vec![raw as u8],
                    ValueClass::Int16 => encode_i16(raw as i16, self.order).to_vec(),
                    ValueClass::UInt16 => encode_u16(raw as u16, self.order).to_vec(),
                    ValueClass::Int32 => encode_i32(raw as i32, self.order).to_vec(),
                    _ => encode_u32(raw as u32, self.order).to_vec(),
                };
                Ok(Field::Bytes(bytes))
            }
        }
    }

    /// raw integer of `value`, undoing the decimal scale and checking the class bounds
    fn integer(&self, class: ValueClass, value: &Value) -> Result<i64, ConfigError> {
        let raw = match (self.scale, value) {
            (Some(scale), _) if class.is_integer() => {
                let x = value.as_f64().ok_or(ConfigError::ValueMismatch)?;
                (x * 10f64.powi(scale as i32)).round() as i64
            }
            (_, Value::Int(x)) => *x,
            (_, Value::Float(x)) if x.fract() == 0.0 => *x as i64,
            (_, Value::Float(_)) => return Err(ConfigError::ValueOutOfRange),
            _ => return Err(ConfigError::ValueMismatch),
        };
        let (min, max) = class.integer_bounds();
        if raw < min || raw > max {
            return Err(ConfigError::ValueOutOfRange);
        }
        Ok(raw)
    }
}

fn byte(bytes: &[u8]) -> Result<u8, ConfigError> {
    bytes.first().copied().ok_or(ConfigError::ValueMismatch)
}

fn array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], ConfigError> {
    bytes.try_into().map_err(|_| ConfigError::ValueMismatch)
}
