//! Modbus client engine
//!
//! [`ModbusClient`] drives one synchronous request/response exchange at a
//! time: validate, serialize into the scratch buffer, write through the
//! transport, then read the reply with bounded lookahead. The framing prefix
//! and the first two PDU bytes are read first; the response-size oracle
//! computes how many bytes remain, and exactly those are read. A reply with
//! the high bit set in its function code is an exception and surfaces as the
//! error kind carried by its exception code.

use crate::adu::{self, AduWriter, ModbusProto, ASCII_START_BYTE, MBAP_HEADER_SIZE};
use crate::checksum::calc_lrc;
use crate::consts::{
    COIL_VALUE_OFF, COIL_VALUE_ON, WRITE_COILS_MAX_QUANTITY, WRITE_REGISTERS_MAX_QUANTITY,
};
use crate::error::ErrorKind;
use crate::pdu::{self, coil_byte_count, Registers, Request, Response};
use crate::transport::{self, Transport};
use crate::vector::VectorTrait;

/// Modbus client handle
///
/// Owns the transport, the scratch buffer and the client-side protocol
/// state: the target unit id and the transaction identifier (stamped into
/// every TCP frame and incremented with 16-bit wrap-around). One request is
/// outstanding at a time; responses borrowed from the scratch buffer stay
/// valid until the next call on the same handle.
///
/// ```rust,no_run
/// use smolmodbus::{transport, ModbusClient, ModbusProto};
///
/// let stream = transport::connect("192.168.0.100", 502).unwrap();
/// let mut buf = [0u8; 260];
/// let mut client = ModbusClient::new(stream, ModbusProto::Tcp, &mut buf);
/// client.set_unit_id(3);
/// let mut registers: Vec<u16> = Vec::new();
/// client.read_holding_registers(0x1000, 8, &mut registers).unwrap();
/// ```
pub struct ModbusClient<'b, T: Transport> {
    transport: T,
    proto: ModbusProto,
    buffer: &'b mut [u8],
    unit_id: u8,
    transaction_id: u16,
}

impl<'b, T: Transport> ModbusClient<'b, T> {
    /// Creates a client over the given transport and encapsulation.
    ///
    /// The scratch buffer holds every outgoing and incoming frame; size it
    /// with [`ModbusProto::max_adu_size`] to accept any reply. The target
    /// unit id starts out as 1, see [`ModbusClient::set_unit_id`].
    pub fn new(transport: T, proto: ModbusProto, buffer: &'b mut [u8]) -> Self {
        Self {
            transport,
            proto,
            buffer,
            unit_id: 1,
            transaction_id: 1,
        }
    }

    /// Sets the unit (slave device) address for subsequent requests.
    pub fn set_unit_id(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn proto(&self) -> ModbusProto {
        self.proto
    }

    /// Performs one request/response exchange.
    ///
    /// The request is validated before any I/O takes place. The returned
    /// response borrows the scratch buffer and is invalidated by the next
    /// call on this handle.
    pub fn send_request(&mut self, request: &Request<'_>) -> Result<Response<'_>, ErrorKind> {
        request.validate()?;
        let transaction_id = self.transaction_id;
        self.transaction_id = transaction_id.wrapping_add(1);
        #[cfg(feature = "log")]
        log::trace!(
            "sending {:?} to unit {} (txn {})",
            request.function(),
            self.unit_id,
            transaction_id
        );
        {
            let mut adu = AduWriter::begin(self.buffer, self.proto, transaction_id, self.unit_id)?;
            request.serialize(&mut adu)?;
            let frame = adu.finalize()?;
            transport::write_all(&mut self.transport, frame)?;
        }
        match self.proto {
            ModbusProto::Rtu => self.receive_rtu(),
            ModbusProto::Ascii => self.receive_ascii(),
            ModbusProto::Tcp => self.receive_tcp(transaction_id),
        }
    }

    fn receive_rtu(&mut self) -> Result<Response<'_>, ErrorKind> {
        if self.buffer.len() < 5 {
            return Err(ErrorKind::Oob);
        }
        // address plus the two lookahead PDU bytes
        transport::read_exact(&mut self.transport, &mut self.buffer[0..3])?;
        if self.buffer[0] != self.unit_id {
            return Err(ErrorKind::FrameBroken);
        }
        let function_code = self.buffer[1];
        let second_byte = self.buffer[2];
        if function_code & 0x80 != 0 {
            // exception PDU is complete, only the trailer is left on the wire
            transport::read_exact(&mut self.transport, &mut self.buffer[3..5])?;
            adu::check_rtu_trailer(&self.buffer[..5])?;
            return Err(exception_error(second_byte));
        }
        let pdu_len = pdu::response_pdu_len(function_code, second_byte)?;
        let total = 1 + pdu_len + 2;
        if total > self.buffer.len() {
            return Err(ErrorKind::Oob);
        }
        transport::read_exact(&mut self.transport, &mut self.buffer[3..total])?;
        adu::check_rtu_trailer(&self.buffer[..total])?;
        pdu::parse_response(&self.buffer[1..1 + pdu_len])
    }

    fn receive_ascii(&mut self) -> Result<Response<'_>, ErrorKind> {
        if self.buffer.len() < 7 {
            return Err(ErrorKind::Oob);
        }
        // ':' plus six hex digits: address and the two lookahead PDU bytes
        transport::read_exact(&mut self.transport, &mut self.buffer[0..7])?;
        if self.buffer[0] != ASCII_START_BYTE {
            return Err(ErrorKind::FrameBroken);
        }
        adu::decode_hex_in_place(self.buffer, 1, 0, 3)?;
        if self.buffer[0] != self.unit_id {
            return Err(ErrorKind::FrameBroken);
        }
        let function_code = self.buffer[1];
        let second_byte = self.buffer[2];
        if function_code & 0x80 != 0 {
            let mut trailer = [0u8; 4];
            transport::read_exact(&mut self.transport, &mut trailer)?;
            if trailer[2] != b'\r' || trailer[3] != b'\n' {
                return Err(ErrorKind::FrameBroken);
            }
            let lrc = (adu::hex_value(trailer[0])? << 4) | adu::hex_value(trailer[1])?;
            adu::check_lrc(&[self.unit_id, function_code, second_byte, lrc])?;
            return Err(exception_error(second_byte));
        }
        let pdu_len = pdu::response_pdu_len(function_code, second_byte)?;
        let remaining = pdu_len - 2;
        // remaining payload digits plus the LRC digits and CR LF
        let char_end = 3 + remaining * 2 + 4;
        if char_end > self.buffer.len() {
            return Err(ErrorKind::Oob);
        }
        transport::read_exact(&mut self.transport, &mut self.buffer[3..char_end])?;
        adu::decode_hex_in_place(self.buffer, 3, 3, remaining)?;
        let trailer_at = 3 + remaining * 2;
        if self.buffer[trailer_at + 2] != b'\r' || self.buffer[trailer_at + 3] != b'\n' {
            return Err(ErrorKind::FrameBroken);
        }
        let lrc = (adu::hex_value(self.buffer[trailer_at])? << 4)
            | adu::hex_value(self.buffer[trailer_at + 1])?;
        let bin_len = 1 + pdu_len;
        if calc_lrc(&self.buffer[..bin_len]) != lrc {
            return Err(ErrorKind::FrameCrcError);
        }
        pdu::parse_response(&self.buffer[1..bin_len])
    }

    fn receive_tcp(&mut self, transaction_id: u16) -> Result<Response<'_>, ErrorKind> {
        if self.buffer.len() < MBAP_HEADER_SIZE + 2 {
            return Err(ErrorKind::Oob);
        }
        transport::read_exact(&mut self.transport, &mut self.buffer[0..MBAP_HEADER_SIZE])?;
        let header = adu::parse_mbap(&self.buffer[..MBAP_HEADER_SIZE])?;
        if header.transaction_id != transaction_id || header.unit_id != self.unit_id {
            return Err(ErrorKind::FrameBroken);
        }
        transport::read_exact(&mut self.transport, &mut self.buffer[7..9])?;
        let function_code = self.buffer[7];
        let second_byte = self.buffer[8];
        if function_code & 0x80 != 0 {
            if header.length != 3 {
                return Err(ErrorKind::FrameBroken);
            }
            return Err(exception_error(second_byte));
        }
        let pdu_len = pdu::response_pdu_len(function_code, second_byte)?;
        // the MBAP length counts the unit id and the PDU
        if header.length != pdu_len + 1 {
            return Err(ErrorKind::FrameBroken);
        }
        let total = MBAP_HEADER_SIZE + pdu_len;
        if total > self.buffer.len() {
            return Err(ErrorKind::Oob);
        }
        transport::read_exact(&mut self.transport, &mut self.buffer[9..total])?;
        pdu::parse_response(&self.buffer[MBAP_HEADER_SIZE..total])
    }

    /// Reads `quantity` coils starting at `start_address` into `values`.
    pub fn read_coils<V: VectorTrait<bool>>(
        &mut self,
        start_address: u16,
        quantity: u16,
        values: &mut V,
    ) -> Result<(), ErrorKind> {
        let request = Request::ReadCoils {
            start_address,
            quantity,
        };
        match self.send_request(&request)? {
            Response::ReadCoils { coil_status } => unpack_bits(coil_status, quantity, values),
            _ => Err(ErrorKind::FrameBroken),
        }
    }

    /// Reads `quantity` discrete inputs starting at `start_address`.
    pub fn read_discrete_inputs<V: VectorTrait<bool>>(
        &mut self,
        start_address: u16,
        quantity: u16,
        values: &mut V,
    ) -> Result<(), ErrorKind> {
        let request = Request::ReadDiscreteInputs {
            start_address,
            quantity,
        };
        match self.send_request(&request)? {
            Response::ReadDiscreteInputs { input_status } => {
                unpack_bits(input_status, quantity, values)
            }
            _ => Err(ErrorKind::FrameBroken),
        }
    }

    /// Reads `quantity` holding registers starting at `start_address`.
    pub fn read_holding_registers<V: VectorTrait<u16>>(
        &mut self,
        start_address: u16,
        quantity: u16,
        values: &mut V,
    ) -> Result<(), ErrorKind> {
        let request = Request::ReadHoldingRegisters {
            start_address,
            quantity,
        };
        match self.send_request(&request)? {
            Response::ReadHoldingRegisters { registers } => {
                copy_registers(registers, quantity, values)
            }
            _ => Err(ErrorKind::FrameBroken),
        }
    }

    /// Reads `quantity` input registers starting at `start_address`.
    pub fn read_input_registers<V: VectorTrait<u16>>(
        &mut self,
        start_address: u16,
        quantity: u16,
        values: &mut V,
    ) -> Result<(), ErrorKind> {
        let request = Request::ReadInputRegisters {
            start_address,
            quantity,
        };
        match self.send_request(&request)? {
            Response::ReadInputRegisters { registers } => {
                copy_registers(registers, quantity, values)
            }
            _ => Err(ErrorKind::FrameBroken),
        }
    }

    /// Turns the coil at `address` on or off.
    pub fn write_single_coil(&mut self, address: u16, value: bool) -> Result<(), ErrorKind> {
        let wire_value = if value { COIL_VALUE_ON } else { COIL_VALUE_OFF };
        let request = Request::WriteSingleCoil {
            address,
            value: wire_value,
        };
        match self.send_request(&request)? {
            Response::WriteSingleCoil {
                address: echo_address,
                value: echo_value,
            } if echo_address == address && echo_value == wire_value => Ok(()),
            _ => Err(ErrorKind::FrameBroken),
        }
    }

    /// Writes `value` to the holding register at `address`.
    pub fn write_single_register(&mut self, address: u16, value: u16) -> Result<(), ErrorKind> {
        let request = Request::WriteSingleRegister { address, value };
        match self.send_request(&request)? {
            Response::WriteSingleRegister {
                address: echo_address,
                ..
            } if echo_address == address => Ok(()),
            _ => Err(ErrorKind::FrameBroken),
        }
    }

    /// Writes a run of coils starting at `start_address`.
    pub fn write_multiple_coils(
        &mut self,
        start_address: u16,
        coils: &[bool],
    ) -> Result<(), ErrorKind> {
        if coils.is_empty() || coils.len() > WRITE_COILS_MAX_QUANTITY as usize {
            return Err(ErrorKind::IllegalDataValue);
        }
        let quantity = coils.len() as u16;
        let mut packed = [0u8; (WRITE_COILS_MAX_QUANTITY as usize + 7) / 8];
        for (i, on) in coils.iter().enumerate() {
            if *on {
                packed[i / 8] |= 1 << (i % 8);
            }
        }
        let request = Request::WriteMultipleCoils {
            start_address,
            quantity,
            values: &packed[..coil_byte_count(quantity)],
        };
        match self.send_request(&request)? {
            Response::WriteMultipleCoils {
                start_address: echo_start,
                quantity: echo_quantity,
            } if echo_start == start_address && echo_quantity == quantity => Ok(()),
            _ => Err(ErrorKind::FrameBroken),
        }
    }

    /// Writes a run of holding registers starting at `start_address`.
    pub fn write_multiple_registers(
        &mut self,
        start_address: u16,
        values: &[u16],
    ) -> Result<(), ErrorKind> {
        if values.is_empty() || values.len() > WRITE_REGISTERS_MAX_QUANTITY as usize {
            return Err(ErrorKind::IllegalDataValue);
        }
        let quantity = values.len() as u16;
        let request = Request::WriteMultipleRegisters {
            start_address,
            quantity,
            values,
        };
        match self.send_request(&request)? {
            Response::WriteMultipleRegisters {
                start_address: echo_start,
                quantity: echo_quantity,
            } if echo_start == start_address && echo_quantity == quantity => Ok(()),
            _ => Err(ErrorKind::FrameBroken),
        }
    }
}

fn exception_error(code: u8) -> ErrorKind {
    if code == 0 {
        // the function code claims an exception but no code was provided
        ErrorKind::Failure
    } else {
        ErrorKind::from_exception_code(code)
    }
}

fn unpack_bits<V: VectorTrait<bool>>(
    payload: &[u8],
    quantity: u16,
    values: &mut V,
) -> Result<(), ErrorKind> {
    if payload.len() < coil_byte_count(quantity) {
        return Err(ErrorKind::FrameBroken);
    }
    for i in 0..quantity as usize {
        let bit = payload[i / 8] >> (i % 8) & 1;
        values.push(bit == 1)?;
    }
    Ok(())
}

fn copy_registers<V: VectorTrait<u16>>(
    registers: Registers<'_>,
    quantity: u16,
    values: &mut V,
) -> Result<(), ErrorKind> {
    if registers.len() < quantity as usize {
        return Err(ErrorKind::FrameBroken);
    }
    for word in registers.iter().take(quantity as usize) {
        values.push(word)?;
    }
    Ok(())
}
