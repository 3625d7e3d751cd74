//! MODBUS constants
//!
//! Some useful terminology:
//!
//! - `Coil`: read/write, 1 bit
//! - `Discrete Input`: read-only, 1 bit
//! - `Input Register`: read-only, 16 bits (1 word)
//! - `Holding Register`: read/write, 16 bits (1 word)

use crate::error::ErrorKind;

/// Maximum size of a PDU (function code plus payload), in bytes
pub const PDU_MAX_SIZE: usize = 253;

/// Maximum size of an RTU ADU: device address, PDU, CRC-16 trailer
pub const ADU_RTU_MAX_SIZE: usize = 1 + PDU_MAX_SIZE + 2;

/// Maximum size of an ASCII ADU: start byte, hex-expanded address, PDU
/// and LRC, CR LF trailer
pub const ADU_ASCII_MAX_SIZE: usize = 1 + (1 + PDU_MAX_SIZE + 1) * 2 + 2;

/// Maximum size of a TCP ADU: MBAP header plus PDU
pub const ADU_TCP_MAX_SIZE: usize = 7 + PDU_MAX_SIZE;

/// Default port for Modbus TCP/IP
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Protocol identifier carried in every MBAP header
pub const MBAP_PROTOCOL_ID: u16 = 0;

/// The broadcast device address. Requests sent to it are never answered
pub const BROADCAST_ADDRESS: u8 = 0;

/// Server-only sentinel listening address matching any inbound unit id
pub const ADDRESS_ANY: u16 = 256;

/// On-wire value meaning "on" for a single coil write
pub const COIL_VALUE_ON: u16 = 0xFF00;

/// On-wire value meaning "off" for a single coil write
pub const COIL_VALUE_OFF: u16 = 0x0000;

/// Largest quantity for a coil or discrete input read
pub const READ_BITS_MAX_QUANTITY: u16 = 2000;

/// Largest quantity for a holding or input register read
pub const READ_REGISTERS_MAX_QUANTITY: u16 = 125;

/// Largest quantity for a multiple coil write
pub const WRITE_COILS_MAX_QUANTITY: u16 = 1968;

/// Largest quantity for a multiple register write
pub const WRITE_REGISTERS_MAX_QUANTITY: u16 = 123;

/// MODBUS functions supported by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModbusFunction {
    /// Read Coils (code = `0x01`)
    ReadCoils = 0x01,
    /// Read Discrete Inputs (code = `0x02`)
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers (code = `0x03`)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (code = `0x04`)
    ReadInputRegisters = 0x04,
    /// Write Single Coil (code = `0x05`)
    WriteSingleCoil = 0x05,
    /// Write Single Register (code = `0x06`)
    WriteSingleRegister = 0x06,
    /// Write Multiple Coils (code = `0x0F`)
    WriteMultipleCoils = 0x0F,
    /// Write Multiple Registers (code = `0x10`)
    WriteMultipleRegisters = 0x10,
}

impl TryFrom<u8> for ModbusFunction {
    type Error = ErrorKind;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ModbusFunction::ReadCoils),
            0x02 => Ok(ModbusFunction::ReadDiscreteInputs),
            0x03 => Ok(ModbusFunction::ReadHoldingRegisters),
            0x04 => Ok(ModbusFunction::ReadInputRegisters),
            0x05 => Ok(ModbusFunction::WriteSingleCoil),
            0x06 => Ok(ModbusFunction::WriteSingleRegister),
            0x0F => Ok(ModbusFunction::WriteMultipleCoils),
            0x10 => Ok(ModbusFunction::WriteMultipleRegisters),
            _ => Err(ErrorKind::IllegalFunction),
        }
    }
}

impl ModbusFunction {
    /// Returns the function code as a byte.
    pub fn byte(&self) -> u8 {
        *self as u8
    }

    /// Returns whether this function is a read operation
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            ModbusFunction::ReadCoils
                | ModbusFunction::ReadDiscreteInputs
                | ModbusFunction::ReadHoldingRegisters
                | ModbusFunction::ReadInputRegisters
        )
    }

    /// Returns whether this function is a write operation
    pub fn is_write(&self) -> bool {
        !self.is_read()
    }
}
