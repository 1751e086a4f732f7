use std::sync::Arc;

use scursor::ReadCursor;

use crate::bits::BitVector;
use crate::codec::swap_words;
use crate::constants::limits;
use crate::constants::vendor::*;
use crate::error::{ConfigError, RequestError};
use crate::function::code::FunctionCode;
use crate::function::request::{build, byte_count_data, check_echo, data};
use crate::function::{
    Assignment, CommEventCounter, CommEventLog, DeviceObject, FunctionLayer, Protocol,
    StandardFunctions,
};
use crate::transport::Transceiver;
use crate::types::{DataRange, UnitId};

/// Bit-packed vendor register address `(page << 13) | (category << 7) | index`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VendorAddress {
    /// page, 3 bits
    pub page: u8,
    /// category, 6 bits
    pub category: u8,
    /// index, 7 bits
    pub index: u8,
}

impl VendorAddress {
    /// create an address, checking the width of each field
    pub fn new(page: u8, category: u8, index: u8) -> Result<Self, ConfigError> {
        if page > 0x07 || category as u16 > CATEGORY_MASK || index as u16 > INDEX_MASK {
            return Err(ConfigError::ValueOutOfRange);
        }
        Ok(Self {
            page,
            category,
            index,
        })
    }

    /// decompose a packed address
    pub fn from_u16(value: u16) -> Self {
        Self {
            page: (value >> PAGE_SHIFT) as u8,
            category: ((value >> CATEGORY_SHIFT) & CATEGORY_MASK) as u8,
            index: (value & INDEX_MASK) as u8,
        }
    }

    /// packed representation
    pub fn to_u16(self) -> u16 {
        ((self.page as u16) << PAGE_SHIFT)
            | ((self.category as u16) << CATEGORY_SHIFT)
            | self.index as u16
    }

    /// the three address bytes as transmitted
    pub fn wire(self) -> [u8; 3] {
        [self.category, self.index, self.page]
    }
}

impl std::fmt::Display for VendorAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "page: {} category: {} index: {}",
            self.page, self.category, self.index
        )
    }
}

/// registers covering `count` bits starting at bit `offset` of the register at `address`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct BitSpan {
    start: VendorAddress,
    first_bit: usize,
    registers: u16,
}

impl BitSpan {
    fn new(range: DataRange, count: usize) -> Result<Self, RequestError> {
        if count == 0 {
            return Err(ConfigError::CountOfZero.into());
        }
        let start = range
            .address
            .checked_add(range.offset / 16)
            .ok_or(ConfigError::AddressOverflow)?;
        let first_bit = (range.offset % 16) as usize;
        let registers = (first_bit + count).div_ceil(16);
        if registers > limits::MAX_READ_REGISTERS_COUNT as usize {
            return Err(ConfigError::CountTooLarge {
                count: registers as u16,
                max: limits::MAX_READ_REGISTERS_COUNT,
            }
            .into());
        }
        Ok(Self {
            start: VendorAddress::from_u16(start),
            first_bit,
            registers: registers as u16,
        })
    }
}

/// Extended vendor function codes with bit-packed addressing
///
/// Register data is exchanged with the device low byte first and normalized to
/// big-endian here. Coils are bits of registers and are written with masked writes so
/// that neighbouring bits are left untouched.
#[derive(Clone)]
pub struct VendorFunctions {
    transceiver: Arc<Transceiver>,
    standard: StandardFunctions,
}

impl VendorFunctions {
    /// create over a transceiver
    pub fn new(transceiver: Arc<Transceiver>) -> Self {
        Self {
            standard: StandardFunctions::new(transceiver.clone()),
            transceiver,
        }
    }

    /// read `count` registers starting at `address`, returned big-endian
    pub async fn read_from_index(
        &self,
        unit: UnitId,
        address: VendorAddress,
        count: u16,
    ) -> Result<Vec<u8>, RequestError> {
        check_count(count, limits::MAX_READ_REGISTERS_COUNT)?;
        let request = build(unit, FunctionCode::ReadFromIndex, |cursor| {
            cursor.write_bytes(&address.wire())?;
            cursor.write_u16_be(count)
        })?;
        let response = self.transceiver.transact(&request).await?;
        let mut registers = byte_count_data(&response, 2 * count as usize)?.to_vec();
        swap_words(&mut registers);
        Ok(registers)
    }

    /// replace whole registers starting at `address` with big-endian `registers`
    pub async fn write_to_index(
        &self,
        unit: UnitId,
        address: VendorAddress,
        registers: &[u8],
    ) -> Result<(), RequestError> {
        if registers.len() % 2 != 0 {
            return Err(ConfigError::ValueOutOfRange.into());
        }
        let count = (registers.len() / 2) as u16;
        check_count(count, limits::MAX_WRITE_REGISTERS_COUNT)?;

        let mut swapped = registers.to_vec();
        swap_words(&mut swapped);
        let request = build(unit, FunctionCode::WriteToIndex, |cursor| {
            cursor.write_bytes(&address.wire())?;
            cursor.write_u16_be(count)?;
            cursor.write_u8(swapped.len() as u8)?;
            cursor.write_bytes(&swapped)
        })?;
        let response = self.transceiver.transact(&request).await?;
        // unit, function, address, count
        check_echo(&request, &response, 7)
    }

    /// apply `(data, mask)` pairs to consecutive registers starting at `address`
    ///
    /// a mask bit of 0 applies the data bit, a mask bit of 1 leaves the device bit unchanged
    pub async fn write_masked_to_index(
        &self,
        unit: UnitId,
        address: VendorAddress,
        pairs: &[(u16, u16)],
    ) -> Result<(), RequestError> {
        let count = pairs.len() as u16;
        check_count(count, limits::MAX_MASKED_REGISTERS_COUNT)?;
        let request = build(unit, FunctionCode::WriteMaskedToIndex, |cursor| {
            cursor.write_bytes(&address.wire())?;
            cursor.write_u16_be(count)?;
            cursor.write_u8((4 * pairs.len()) as u8)?;
            for (data, mask) in pairs {
                cursor.write_u16_be(*data)?;
                cursor.write_u16_be(*mask)?;
            }
            Ok(())
        })?;
        let response = self.transceiver.transact(&request).await?;
        check_echo(&request, &response, 7)
    }

    async fn read_bits(&self, unit: UnitId, range: DataRange) -> Result<BitVector, RequestError> {
        check_count(range.count, limits::MAX_READ_COILS_COUNT)?;
        let count = range.count as usize;
        let span = BitSpan::new(range, count)?;
        let registers = self
            .read_from_index(unit, span.start, span.registers)
            .await?;
        Ok(BitVector::from_registers(&registers).range(span.first_bit, span.first_bit + count))
    }

    async fn write_bits(
        &self,
        unit: UnitId,
        range: DataRange,
        bits: &BitVector,
    ) -> Result<(), RequestError> {
        let span = BitSpan::new(range, bits.len())?;
        let pairs = masked_pairs(&span, bits);
        self.write_masked_to_index(unit, span.start, &pairs).await
    }

    async fn query(&self) -> Result<Option<u32>, RequestError> {
        let request = build(
            UnitId::new(UNASSIGNED_UNIT),
            FunctionCode::EnumerationQuery,
            |_| Ok(()),
        )?;
        let response = match self.transceiver.transact(&request).await {
            Ok(x) => x,
            Err(RequestError::ResponseTimeout) => return Ok(None),
            Err(err) => return Err(err),
        };
        let mut cursor = ReadCursor::new(data(&response));
        let hi = cursor.read_u16_be()?;
        let lo = cursor.read_u16_be()?;
        cursor.expect_empty()?;
        Ok(Some(((hi as u32) << 16) | lo as u32))
    }

    async fn assign(&self, serial: u32, unit: UnitId) -> Result<(), RequestError> {
        let request = build(
            UnitId::new(BROADCAST_UNIT),
            FunctionCode::AssignLogicalAddress,
            |cursor| {
                cursor.write_bytes(&serial.to_be_bytes())?;
                cursor.write_u8(unit.value)
            },
        )?;
        let response = self.transceiver.transact(&request).await?;
        check_echo(&request, &response, request.len())
    }
}

fn check_count(count: u16, max: u16) -> Result<(), RequestError> {
    if count == 0 {
        return Err(ConfigError::CountOfZero.into());
    }
    if count > max {
        return Err(ConfigError::CountTooLarge {
            count,
            max,
        }
        .into());
    }
    Ok(())
}

fn masked_pairs(span: &BitSpan, bits: &BitVector) -> Vec<(u16, u16)> {
    let mut pairs = vec![(0u16, 0xFFFFu16); span.registers as usize];
    for (i, value) in bits.iter().enumerate() {
        let position = span.first_bit + i;
        if let Some((data, mask)) = pairs.get_mut(position / 16) {
            let bit = 1u16 << (position % 16);
            *mask &= !bit;
            if value {
                *data |= bit;
            }
        }
    }
    pairs
}

#[async_trait::async_trait]
impl FunctionLayer for VendorFunctions {
    fn protocol(&self) -> Protocol {
        Protocol::Vendor
    }

    async fn read_coils(&self, unit: UnitId, range: DataRange) -> Result<BitVector, RequestError> {
        self.read_bits(unit, range).await
    }

    async fn read_discrete_inputs(
        &self,
        unit: UnitId,
        range: DataRange,
    ) -> Result<BitVector, RequestError> {
        self.read_bits(unit, range).await
    }

    async fn read_holding_registers(
        &self,
        unit: UnitId,
        range: DataRange,
    ) -> Result<Vec<u8>, RequestError> {
        let span = BitSpan::new(range, 1)?;
        self.read_from_index(unit, span.start, range.count).await
    }

    async fn read_input_registers(
        &self,
        unit: UnitId,
        range: DataRange,
    ) -> Result<Vec<u8>, RequestError> {
        self.read_holding_registers(unit, range).await
    }

    async fn write_single_coil(
        &self,
        unit: UnitId,
        range: DataRange,
        value: bool,
    ) -> Result<(), RequestError> {
        let mut bits = BitVector::new(1, Default::default());
        bits.set(0, value)?;
        self.write_bits(unit, range, &bits).await
    }

    async fn write_multiple_coils(
        &self,
        unit: UnitId,
        range: DataRange,
        bits: &BitVector,
    ) -> Result<(), RequestError> {
        self.write_bits(unit, range, bits).await
    }

    async fn write_single_register(
        &self,
        unit: UnitId,
        range: DataRange,
        value: u16,
    ) -> Result<(), RequestError> {
        self.write_multiple_registers(unit, range, &value.to_be_bytes())
            .await
    }

    async fn write_multiple_registers(
        &self,
        unit: UnitId,
        range: DataRange,
        data: &[u8],
    ) -> Result<(), RequestError> {
        let span = BitSpan::new(range, 1)?;
        self.write_to_index(unit, span.start, data).await
    }

    async fn read_exception_status(&self, unit: UnitId) -> Result<u8, RequestError> {
        self.standard.read_exception_status(unit).await
    }

    async fn get_comm_event_counter(&self, unit: UnitId) -> Result<CommEventCounter, RequestError> {
        self.standard.get_comm_event_counter(unit).await
    }

    async fn get_comm_event_log(&self, unit: UnitId) -> Result<CommEventLog, RequestError> {
        self.standard.get_comm_event_log(unit).await
    }

    async fn report_server_id(&self, unit: UnitId) -> Result<Vec<u8>, RequestError> {
        self.standard.report_server_id(unit).await
    }

    async fn read_device_identification(
        &self,
        unit: UnitId,
        object_id: u8,
    ) -> Result<Vec<DeviceObject>, RequestError> {
        self.standard
            .read_device_identification(unit, object_id)
            .await
    }

    async fn enumerate(&self, first: UnitId) -> Result<Vec<Assignment>, RequestError> {
        let reset = build(
            UnitId::new(BROADCAST_UNIT),
            FunctionCode::EnumerationReset,
            |_| Ok(()),
        )?;
        self.transceiver.send(&reset).await?;
        tracing::info!("enumeration reset, first logical address: {}", first);

        let mut assigned = Vec::new();
        let mut next = first.value;
        while assigned.len() < MAX_ENUMERATED_UNITS {
            let serial = match self.query().await? {
                Some(x) => x,
                None => break,
            };
            let unit = UnitId::new(next);
            self.assign(serial, unit).await?;
            tracing::info!("assigned {} to serial {:#010X}", unit, serial);
            assigned.push(Assignment { serial, unit });

            next = match next.checked_add(1) {
                Some(x) => x,
                None => break,
            };
        }

        tracing::info!("enumeration complete, {} unit(s) assigned", assigned.len());
        Ok(assigned)
    }
}
