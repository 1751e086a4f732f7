use std::sync::Arc;

use scursor::ReadCursor;

use crate::bits::{num_bytes_for_bits, BitOrder, BitVector};
use crate::constants::{coil, limits};
use crate::error::{AduParseError, ConfigError, RequestError};
use crate::function::code::FunctionCode;
use crate::function::request::{build, byte_count_data, check_echo, data};
use crate::function::{CommEventCounter, CommEventLog, DeviceObject, FunctionLayer, Protocol};
use crate::transport::Transceiver;
use crate::types::{DataRange, UnitId};

// MEI type of read device identification
const MEI_DEVICE_IDENTIFICATION: u8 = 0x0E;
// read code: one specific object
const READ_SPECIFIC_OBJECT: u8 = 0x04;

/// Standard Modbus function codes over a shared [`Transceiver`]
#[derive(Clone)]
pub struct StandardFunctions {
    transceiver: Arc<Transceiver>,
}

impl StandardFunctions {
    /// create over a transceiver
    pub fn new(transceiver: Arc<Transceiver>) -> Self {
        Self { transceiver }
    }

    async fn read_bits(
        &self,
        unit: UnitId,
        code: FunctionCode,
        range: DataRange,
    ) -> Result<BitVector, RequestError> {
        let start = range.validate(limits::MAX_READ_COILS_COUNT)?;
        let request = build(unit, code, |cursor| {
            cursor.write_u16_be(start)?;
            cursor.write_u16_be(range.count)
        })?;
        let response = self.transceiver.transact(&request).await?;
        let count = range.count as usize;
        let bytes = byte_count_data(&response, num_bytes_for_bits(count))?;
        Ok(BitVector::from_bytes(bytes, count, BitOrder::Lsb0)?)
    }

    async fn read_registers(
        &self,
        unit: UnitId,
        code: FunctionCode,
        range: DataRange,
    ) -> Result<Vec<u8>, RequestError> {
        let start = range.validate(limits::MAX_READ_REGISTERS_COUNT)?;
        let request = build(unit, code, |cursor| {
            cursor.write_u16_be(start)?;
            cursor.write_u16_be(range.count)
        })?;
        let response = self.transceiver.transact(&request).await?;
        let bytes = byte_count_data(&response, 2 * range.count as usize)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl FunctionLayer for StandardFunctions {
    fn protocol(&self) -> Protocol {
        Protocol::Standard
    }

    async fn read_coils(&self, unit: UnitId, range: DataRange) -> Result<BitVector, RequestError> {
        self.read_bits(unit, FunctionCode::ReadCoils, range).await
    }

    async fn read_discrete_inputs(
        &self,
        unit: UnitId,
        range: DataRange,
    ) -> Result<BitVector, RequestError> {
        self.read_bits(unit, FunctionCode::ReadDiscreteInputs, range)
            .await
    }

    async fn read_holding_registers(
        &self,
        unit: UnitId,
        range: DataRange,
    ) -> Result<Vec<u8>, RequestError> {
        self.read_registers(unit, FunctionCode::ReadHoldingRegisters, range)
            .await
    }

    async fn read_input_registers(
        &self,
        unit: UnitId,
        range: DataRange,
    ) -> Result<Vec<u8>, RequestError> {
        self.read_registers(unit, FunctionCode::ReadInputRegisters, range)
            .await
    }

    async fn write_single_coil(
        &self,
        unit: UnitId,
        range: DataRange,
        value: bool,
    ) -> Result<(), RequestError> {
        let start = range.start()?;
        let request = build(unit, FunctionCode::WriteSingleCoil, |cursor| {
            cursor.write_u16_be(start)?;
            cursor.write_u16_be(if value { coil::ON } else { coil::OFF })
        })?;
        let response = self.transceiver.transact(&request).await?;

        if let [_, _, _, _, hi, lo] = response.as_slice() {
            let state = u16::from_be_bytes([*hi, *lo]);
            if state != coil::ON && state != coil::OFF {
                return Err(AduParseError::UnknownCoilState(state).into());
            }
        }
        check_echo(&request, &response, request.len())
    }

    async fn write_multiple_coils(
        &self,
        unit: UnitId,
        range: DataRange,
        bits: &BitVector,
    ) -> Result<(), RequestError> {
        let range = DataRange::new(range.address, range.offset, bits.len() as u16);
        let start = range.validate(limits::MAX_WRITE_COILS_COUNT)?;
        let bytes = bits.to_bytes();
        let request = build(unit, FunctionCode::WriteMultipleCoils, |cursor| {
            cursor.write_u16_be(start)?;
            cursor.write_u16_be(range.count)?;
            cursor.write_u8(bytes.len() as u8)?;
            cursor.write_bytes(&bytes)
        })?;
        let response = self.transceiver.transact(&request).await?;
        // unit, function, start, count
        check_echo(&request, &response, 6)
    }

    async fn write_single_register(
        &self,
        unit: UnitId,
        range: DataRange,
        value: u16,
    ) -> Result<(), RequestError> {
        let start = range.start()?;
        let request = build(unit, FunctionCode::WriteSingleRegister, |cursor| {
            cursor.write_u16_be(start)?;
            cursor.write_u16_be(value)
        })?;
        let response = self.transceiver.transact(&request).await?;
        check_echo(&request, &response, request.len())
    }

    async fn write_multiple_registers(
        &self,
        unit: UnitId,
        range: DataRange,
        data: &[u8],
    ) -> Result<(), RequestError> {
        if data.len() % 2 != 0 {
            return Err(ConfigError::ValueOutOfRange.into());
        }
        let range = DataRange::new(range.address, range.offset, (data.len() / 2) as u16);
        let start = range.validate(limits::MAX_WRITE_REGISTERS_COUNT)?;
        let request = build(unit, FunctionCode::WriteMultipleRegisters, |cursor| {
            cursor.write_u16_be(start)?;
            cursor.write_u16_be(range.count)?;
            cursor.write_u8(data.len() as u8)?;
            cursor.write_bytes(data)
        })?;
        let response = self.transceiver.transact(&request).await?;
        check_echo(&request, &response, 6)
    }

    async fn read_exception_status(&self, unit: UnitId) -> Result<u8, RequestError> {
        let request = build(unit, FunctionCode::ReadExceptionStatus, |_| Ok(()))?;
        let response = self.transceiver.transact(&request).await?;
        let mut cursor = ReadCursor::new(data(&response));
        let status = cursor.read_u8()?;
        cursor.expect_empty()?;
        Ok(status)
    }

    async fn get_comm_event_counter(&self, unit: UnitId) -> Result<CommEventCounter, RequestError> {
        let request = build(unit, FunctionCode::GetCommEventCounter, |_| Ok(()))?;
        let response = self.transceiver.transact(&request).await?;
        let mut cursor = ReadCursor::new(data(&response));
        let status = cursor.read_u16_be()?;
        let event_count = cursor.read_u16_be()?;
        cursor.expect_empty()?;
        Ok(CommEventCounter {
            status,
            event_count,
        })
    }

    async fn get_comm_event_log(&self, unit: UnitId) -> Result<CommEventLog, RequestError> {
        // status, event count, message count
        const MIN_BYTE_COUNT: usize = 6;

        let request = build(unit, FunctionCode::GetCommEventLog, |_| Ok(()))?;
        let response = self.transceiver.transact(&request).await?;
        let mut cursor = ReadCursor::new(data(&response));
        let byte_count = cursor.read_u8()? as usize;
        if byte_count < MIN_BYTE_COUNT || byte_count != cursor.remaining() {
            return Err(RequestError::InvalidDataLength {
                expected: cursor.remaining().max(MIN_BYTE_COUNT),
                actual: byte_count,
            });
        }
        let status = cursor.read_u16_be()?;
        let event_count = cursor.read_u16_be()?;
        let message_count = cursor.read_u16_be()?;
        let events = cursor.read_bytes(byte_count - MIN_BYTE_COUNT)?.to_vec();
        cursor.expect_empty()?;
        Ok(CommEventLog {
            status,
            event_count,
            message_count,
            events,
        })
    }

    async fn report_server_id(&self, unit: UnitId) -> Result<Vec<u8>, RequestError> {
        let request = build(unit, FunctionCode::ReportServerId, |_| Ok(()))?;
        let response = self.transceiver.transact(&request).await?;
        let count = data(&response).first().copied().unwrap_or_default() as usize;
        Ok(byte_count_data(&response, count)?.to_vec())
    }

    async fn read_device_identification(
        &self,
        unit: UnitId,
        object_id: u8,
    ) -> Result<Vec<DeviceObject>, RequestError> {
        let request = build(unit, FunctionCode::ReadDeviceIdentification, |cursor| {
            cursor.write_u8(MEI_DEVICE_IDENTIFICATION)?;
            cursor.write_u8(READ_SPECIFIC_OBJECT)?;
            cursor.write_u8(object_id)
        })?;
        let response = self.transceiver.transact(&request).await?;

        let mut cursor = ReadCursor::new(data(&response));
        let mei = cursor.read_u8()?;
        if mei != MEI_DEVICE_IDENTIFICATION {
            return Err(AduParseError::UnexpectedField(mei).into());
        }
        let _read_code = cursor.read_u8()?;
        let _conformity = cursor.read_u8()?;
        let _more_follows = cursor.read_u8()?;
        let _next_object = cursor.read_u8()?;
        let count = cursor.read_u8()?;

        let mut objects = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = cursor.read_u8()?;
            let length = cursor.read_u8()?;
            let value = cursor.read_bytes(length as usize)?.to_vec();
            objects.push(DeviceObject { id, value });
        }
        cursor.expect_empty()?;
        Ok(objects)
    }
}
