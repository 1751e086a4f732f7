use crate::error::{ConfigError, RequestError};

/// Modbus unit identifier, just a type-safe wrapper around `u8`
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitId {
    /// underlying raw value
    pub value: u8,
}

impl UnitId {
    /// create a unit id
    pub const fn new(value: u8) -> Self {
        Self { value }
    }

    /// the broadcast address, 0
    pub const fn broadcast() -> Self {
        Self { value: 0x00 }
    }

    /// true if this is the broadcast address
    pub fn is_broadcast(self) -> bool {
        self.value == 0
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self { value: 0xFF }
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:#04X}", self.value)
    }
}

/// Start address, sub-address offset and count of a request
///
/// For the standard function codes the wire address is `address + offset`. For the
/// vendor extension `offset` is a bit position counted from the register at `address`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRange {
    /// start address
    pub address: u16,
    /// offset added to the start address
    pub offset: u16,
    /// number of bits or registers
    pub count: u16,
}

impl DataRange {
    /// create a range
    pub fn new(address: u16, offset: u16, count: u16) -> Self {
        Self {
            address,
            offset,
            count,
        }
    }

    /// wire start address of a standard request
    pub(crate) fn start(&self) -> Result<u16, RequestError> {
        self.address
            .checked_add(self.offset)
            .ok_or(RequestError::InvalidConfiguration(ConfigError::AddressOverflow))
    }

    /// validate the count against a protocol maximum and the address space
    pub(crate) fn validate(&self, max: u16) -> Result<u16, RequestError> {
        if self.count == 0 {
            return Err(ConfigError::CountOfZero.into());
        }
        if self.count > max {
            return Err(ConfigError::CountTooLarge {
                count: self.count,
                max,
            }
            .into());
        }
        let start = self.start()?;
        // the last address must be representable
        if start as u32 + self.count as u32 - 1 > u16::MAX as u32 {
            return Err(ConfigError::AddressOverflow.into());
        }
        Ok(start)
    }
}

impl std::fmt::Display for DataRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "address: {:#06X} offset: {} count: {}",
            self.address, self.offset, self.count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_adds_offset() {
        assert_eq!(DataRange::new(0x10, 3, 1).start(), Ok(0x13));
        assert!(DataRange::new(0xFFFF, 1, 1).start().is_err());
    }

    #[test]
    fn validates_count() {
        assert_eq!(
            DataRange::new(0, 0, 0).validate(10),
            Err(RequestError::InvalidConfiguration(ConfigError::CountOfZero))
        );
        assert_eq!(
            DataRange::new(0, 0, 11).validate(10),
            Err(RequestError::InvalidConfiguration(
                ConfigError::CountTooLarge { count: 11, max: 10 }
            ))
        );
        assert_eq!(DataRange::new(0xFFFF, 0, 1).validate(10), Ok(0xFFFF));
        assert!(DataRange::new(0xFFFF, 0, 2).validate(10).is_err());
    }
}
