//! Typed request and response PDUs
//!
//! A PDU is the function code plus its payload, identical across all three
//! encapsulations. Requests and responses are sum types keyed on the function
//! code; the validator, the serializer, the parser and the response-size
//! oracle all switch on the same tag.

use crate::adu::AduWriter;
use crate::consts::*;
use crate::error::ErrorKind;

/// A Modbus request PDU.
///
/// Multiple-write payloads are borrowed from the caller; the byte count put
/// on the wire is derived from the payload length, which the validator checks
/// against the requested quantity before anything is transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils {
        start_address: u16,
        quantity: u16,
    },
    ReadDiscreteInputs {
        start_address: u16,
        quantity: u16,
    },
    ReadHoldingRegisters {
        start_address: u16,
        quantity: u16,
    },
    ReadInputRegisters {
        start_address: u16,
        quantity: u16,
    },
    /// `value` is the raw wire value: 0xFF00 for on, 0x0000 for off
    WriteSingleCoil {
        address: u16,
        value: u16,
    },
    WriteSingleRegister {
        address: u16,
        value: u16,
    },
    /// `values` holds the coil states packed LSB-first, one bit per coil
    WriteMultipleCoils {
        start_address: u16,
        quantity: u16,
        values: &'a [u8],
    },
    WriteMultipleRegisters {
        start_address: u16,
        quantity: u16,
        values: &'a [u16],
    },
}

impl<'a> Request<'a> {
    /// Returns the function this request performs.
    pub fn function(&self) -> ModbusFunction {
        match self {
            Request::ReadCoils { .. } => ModbusFunction::ReadCoils,
            Request::ReadDiscreteInputs { .. } => ModbusFunction::ReadDiscreteInputs,
            Request::ReadHoldingRegisters { .. } => ModbusFunction::ReadHoldingRegisters,
            Request::ReadInputRegisters { .. } => ModbusFunction::ReadInputRegisters,
            Request::WriteSingleCoil { .. } => ModbusFunction::WriteSingleCoil,
            Request::WriteSingleRegister { .. } => ModbusFunction::WriteSingleRegister,
            Request::WriteMultipleCoils { .. } => ModbusFunction::WriteMultipleCoils,
            Request::WriteMultipleRegisters { .. } => ModbusFunction::WriteMultipleRegisters,
        }
    }

    /// Checks the request against the quantity and value ranges of the
    /// standard, before anything is sent to the wire.
    ///
    /// Violations yield [`ErrorKind::IllegalDataValue`].
    pub fn validate(&self) -> Result<(), ErrorKind> {
        match *self {
            Request::ReadCoils { quantity, .. } | Request::ReadDiscreteInputs { quantity, .. } => {
                check_quantity(quantity, READ_BITS_MAX_QUANTITY)
            }
            Request::ReadHoldingRegisters { quantity, .. }
            | Request::ReadInputRegisters { quantity, .. } => {
                check_quantity(quantity, READ_REGISTERS_MAX_QUANTITY)
            }
            Request::WriteSingleCoil { value, .. } => {
                if value == COIL_VALUE_ON || value == COIL_VALUE_OFF {
                    Ok(())
                } else {
                    Err(ErrorKind::IllegalDataValue)
                }
            }
            Request::WriteSingleRegister { .. } => Ok(()),
            Request::WriteMultipleCoils {
                quantity, values, ..
            } => {
                check_quantity(quantity, WRITE_COILS_MAX_QUANTITY)?;
                if values.len() == coil_byte_count(quantity) {
                    Ok(())
                } else {
                    Err(ErrorKind::IllegalDataValue)
                }
            }
            Request::WriteMultipleRegisters {
                quantity, values, ..
            } => {
                check_quantity(quantity, WRITE_REGISTERS_MAX_QUANTITY)?;
                if values.len() == quantity as usize {
                    Ok(())
                } else {
                    Err(ErrorKind::IllegalDataValue)
                }
            }
        }
    }

    /// Serializes the PDU into an ADU under construction. All multi-byte
    /// fields go out big-endian.
    pub(crate) fn serialize(&self, adu: &mut AduWriter<'_>) -> Result<(), ErrorKind> {
        adu.push_u8(self.function().byte())?;
        match *self {
            Request::ReadCoils {
                start_address,
                quantity,
            }
            | Request::ReadDiscreteInputs {
                start_address,
                quantity,
            }
            | Request::ReadHoldingRegisters {
                start_address,
                quantity,
            }
            | Request::ReadInputRegisters {
                start_address,
                quantity,
            } => {
                adu.push_u16(start_address)?;
                adu.push_u16(quantity)
            }
            Request::WriteSingleCoil { address, value }
            | Request::WriteSingleRegister { address, value } => {
                adu.push_u16(address)?;
                adu.push_u16(value)
            }
            Request::WriteMultipleCoils {
                start_address,
                quantity,
                values,
            } => {
                adu.push_u16(start_address)?;
                adu.push_u16(quantity)?;
                adu.push_u8(values.len() as u8)?;
                adu.push_bytes(values)
            }
            Request::WriteMultipleRegisters {
                start_address,
                quantity,
                values,
            } => {
                adu.push_u16(start_address)?;
                adu.push_u16(quantity)?;
                adu.push_u8((values.len() * 2) as u8)?;
                for value in values {
                    adu.push_u16(*value)?;
                }
                Ok(())
            }
        }
    }
}

fn check_quantity(quantity: u16, max: u16) -> Result<(), ErrorKind> {
    if quantity >= 1 && quantity <= max {
        Ok(())
    } else {
        Err(ErrorKind::IllegalDataValue)
    }
}

/// Number of payload bytes needed to pack `quantity` coil states.
pub(crate) fn coil_byte_count(quantity: u16) -> usize {
    (quantity as usize + 7) / 8
}

/// Big-endian register words borrowed from the scratch buffer.
///
/// The view stays valid until the next call on the same handle; copy the
/// words out (see [`ModbusClient::read_holding_registers`]) to keep them.
///
/// [`ModbusClient::read_holding_registers`]: crate::client::ModbusClient::read_holding_registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers<'a> {
    data: &'a [u8],
}

impl<'a> Registers<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of 16-bit registers in the payload
    pub fn len(&self) -> usize {
        self.data.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the register at `index`, decoded to host byte order.
    pub fn get(&self, index: usize) -> Option<u16> {
        let hi = *self.data.get(index * 2)?;
        let lo = *self.data.get(index * 2 + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    /// Iterates over the registers, decoding to host byte order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + 'a {
        self.data
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
    }

    /// The raw big-endian payload bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

/// A Modbus response PDU. Read payloads are borrowed views into the handle's
/// scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<'a> {
    /// Coil states packed LSB-first
    ReadCoils { coil_status: &'a [u8] },
    /// Input states packed LSB-first
    ReadDiscreteInputs { input_status: &'a [u8] },
    ReadHoldingRegisters { registers: Registers<'a> },
    ReadInputRegisters { registers: Registers<'a> },
    WriteSingleCoil { address: u16, value: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { start_address: u16, quantity: u16 },
    WriteMultipleRegisters { start_address: u16, quantity: u16 },
}

impl<'a> Response<'a> {
    /// Returns the function this response answers.
    pub fn function(&self) -> ModbusFunction {
        match self {
            Response::ReadCoils { .. } => ModbusFunction::ReadCoils,
            Response::ReadDiscreteInputs { .. } => ModbusFunction::ReadDiscreteInputs,
            Response::ReadHoldingRegisters { .. } => ModbusFunction::ReadHoldingRegisters,
            Response::ReadInputRegisters { .. } => ModbusFunction::ReadInputRegisters,
            Response::WriteSingleCoil { .. } => ModbusFunction::WriteSingleCoil,
            Response::WriteSingleRegister { .. } => ModbusFunction::WriteSingleRegister,
            Response::WriteMultipleCoils { .. } => ModbusFunction::WriteMultipleCoils,
            Response::WriteMultipleRegisters { .. } => ModbusFunction::WriteMultipleRegisters,
        }
    }
}

/// Computes the total expected response PDU length from its first two bytes.
///
/// This is what lets the client read a response with bounded lookahead: two
/// bytes of PDU are read, the remainder length is computed, then exactly the
/// remainder is read. Unknown function codes yield
/// [`ErrorKind::IllegalFunction`].
pub fn response_pdu_len(function_code: u8, second_byte: u8) -> Result<usize, ErrorKind> {
    if function_code & 0x80 != 0 {
        // exception PDU: exception function code plus exception code
        return Ok(2);
    }
    match ModbusFunction::try_from(function_code)? {
        ModbusFunction::ReadCoils
        | ModbusFunction::ReadDiscreteInputs
        | ModbusFunction::ReadHoldingRegisters
        | ModbusFunction::ReadInputRegisters => Ok(2 + second_byte as usize),
        ModbusFunction::WriteSingleCoil
        | ModbusFunction::WriteSingleRegister
        | ModbusFunction::WriteMultipleCoils
        | ModbusFunction::WriteMultipleRegisters => Ok(5),
    }
}

/// Parses a complete response PDU into its typed form.
///
/// An exception PDU parses to the error kind carried by its exception code.
/// A declared byte count inconsistent with the payload length is
/// [`ErrorKind::FrameBroken`].
pub fn parse_response(pdu: &[u8]) -> Result<Response<'_>, ErrorKind> {
    if pdu.len() < 2 {
        return Err(ErrorKind::FrameBroken);
    }
    let function_code = pdu[0];
    if function_code & 0x80 != 0 {
        let exception_code = pdu[1];
        return if exception_code == 0 {
            Err(ErrorKind::Failure)
        } else {
            Err(ErrorKind::from_exception_code(exception_code))
        };
    }
    let function = ModbusFunction::try_from(function_code)?;
    if function.is_read() {
        let byte_count = pdu[1] as usize;
        if pdu.len() != 2 + byte_count {
            return Err(ErrorKind::FrameBroken);
        }
        let payload = &pdu[2..];
        return Ok(match function {
            ModbusFunction::ReadCoils => Response::ReadCoils {
                coil_status: payload,
            },
            ModbusFunction::ReadDiscreteInputs => Response::ReadDiscreteInputs {
                input_status: payload,
            },
            ModbusFunction::ReadHoldingRegisters => {
                if byte_count % 2 != 0 {
                    return Err(ErrorKind::FrameBroken);
                }
                Response::ReadHoldingRegisters {
                    registers: Registers::new(payload),
                }
            }
            ModbusFunction::ReadInputRegisters => {
                if byte_count % 2 != 0 {
                    return Err(ErrorKind::FrameBroken);
                }
                Response::ReadInputRegisters {
                    registers: Registers::new(payload),
                }
            }
            _ => unreachable!(),
        });
    }
    if pdu.len() != 5 {
        return Err(ErrorKind::FrameBroken);
    }
    let first = u16::from_be_bytes([pdu[1], pdu[2]]);
    let second = u16::from_be_bytes([pdu[3], pdu[4]]);
    Ok(match function {
        ModbusFunction::WriteSingleCoil => Response::WriteSingleCoil {
            address: first,
            value: second,
        },
        ModbusFunction::WriteSingleRegister => Response::WriteSingleRegister {
            address: first,
            value: second,
        },
        ModbusFunction::WriteMultipleCoils => Response::WriteMultipleCoils {
            start_address: first,
            quantity: second,
        },
        ModbusFunction::WriteMultipleRegisters => Response::WriteMultipleRegisters {
            start_address: first,
            quantity: second,
        },
        _ => unreachable!(),
    })
}
