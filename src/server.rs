//! Modbus server dispatcher
//!
//! [`ModbusServer`] reads one ADU at a time from its transport, verifies the
//! framing, locates the callbacks registered for the inbound unit id and
//! dispatches the request function to them, then sends back a normal or
//! exception reply. Broadcast requests (unit id 0) are executed but never
//! answered.

use crate::adu::{self, AduWriter, ModbusProto, ASCII_START_BYTE, MBAP_HEADER_SIZE};
use crate::consts::{
    ModbusFunction, ADDRESS_ANY, BROADCAST_ADDRESS, COIL_VALUE_OFF, COIL_VALUE_ON,
    READ_BITS_MAX_QUANTITY, READ_REGISTERS_MAX_QUANTITY, WRITE_COILS_MAX_QUANTITY,
    WRITE_REGISTERS_MAX_QUANTITY,
};
use crate::error::ErrorKind;
use crate::pdu::coil_byte_count;
use crate::transport::{self, Transport};

/// Number of (listening address, callbacks) slots in a server handle
pub const SERVER_MAX_LISTENERS: usize = 10;

/// Callbacks answering requests for one listening address.
///
/// Read callbacks are invoked once per coil or register in the requested
/// range, accumulating the reply. Every method defaults to
/// [`ErrorKind::IllegalFunction`], which becomes the standard exception
/// reply for operations a device does not implement. A callback may return
/// any Modbus exception kind to turn the reply into that exception, or
/// [`ErrorKind::Ignored`] to suppress the reply entirely (useful for
/// [`ADDRESS_ANY`] listeners that answer selectively).
pub trait Callbacks {
    fn read_coil(&mut self, _unit_id: u8, _address: u16) -> Result<bool, ErrorKind> {
        Err(ErrorKind::IllegalFunction)
    }

    fn read_discrete_input(&mut self, _unit_id: u8, _address: u16) -> Result<bool, ErrorKind> {
        Err(ErrorKind::IllegalFunction)
    }

    fn read_holding_register(&mut self, _unit_id: u8, _address: u16) -> Result<u16, ErrorKind> {
        Err(ErrorKind::IllegalFunction)
    }

    fn read_input_register(&mut self, _unit_id: u8, _address: u16) -> Result<u16, ErrorKind> {
        Err(ErrorKind::IllegalFunction)
    }

    fn write_coil(&mut self, _unit_id: u8, _address: u16, _value: bool) -> Result<(), ErrorKind> {
        Err(ErrorKind::IllegalFunction)
    }

    fn write_holding_register(
        &mut self,
        _unit_id: u8,
        _address: u16,
        _value: u16,
    ) -> Result<(), ErrorKind> {
        Err(ErrorKind::IllegalFunction)
    }
}

struct CallbackSlot<'h> {
    address: u16,
    callbacks: &'h mut (dyn Callbacks + 'h),
}

/// One inbound ADU, located inside the scratch buffer
struct RequestFrame {
    transaction_id: u16,
    unit_id: u8,
    pdu_start: usize,
    pdu_len: usize,
}

/// Modbus server handle
///
/// ```rust,no_run
/// use smolmodbus::{Callbacks, ErrorKind, ModbusProto, ModbusServer};
///
/// struct Device {
///     holdings: [u16; 16],
/// }
///
/// impl Callbacks for Device {
///     fn read_holding_register(&mut self, _unit: u8, address: u16) -> Result<u16, ErrorKind> {
///         self.holdings
///             .get(address as usize)
///             .copied()
///             .ok_or(ErrorKind::IllegalDataAddress)
///     }
///     fn write_holding_register(
///         &mut self,
///         _unit: u8,
///         address: u16,
///         value: u16,
///     ) -> Result<(), ErrorKind> {
///         match self.holdings.get_mut(address as usize) {
///             Some(slot) => {
///                 *slot = value;
///                 Ok(())
///             }
///             None => Err(ErrorKind::IllegalDataAddress),
///         }
///     }
/// }
///
/// fn serve(stream: std::net::TcpStream) -> Result<(), ErrorKind> {
///     let mut device = Device { holdings: [0; 16] };
///     let mut buf = [0u8; 260];
///     let mut server = ModbusServer::new(stream, ModbusProto::Tcp, &mut buf);
///     server.set_callback(1, Some(&mut device))?;
///     server.run_forever()
/// }
/// ```
pub struct ModbusServer<'b, 'h, T: Transport> {
    transport: T,
    proto: ModbusProto,
    buffer: &'b mut [u8],
    slots: [Option<CallbackSlot<'h>>; SERVER_MAX_LISTENERS],
}

impl<'b, 'h, T: Transport> ModbusServer<'b, 'h, T> {
    /// Creates a server over the given transport and encapsulation. The
    /// scratch buffer holds one request and one reply at a time; size it
    /// with [`ModbusProto::max_adu_size`] to accept any request.
    pub fn new(transport: T, proto: ModbusProto, buffer: &'b mut [u8]) -> Self {
        Self {
            transport,
            proto,
            buffer,
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Registers `callbacks` for a listening address, replacing a previous
    /// registration for the same address. [`ADDRESS_ANY`] listens on every
    /// unit id. Passing `None` clears the registration.
    ///
    /// Fails with [`ErrorKind::Capacity`] when all [`SERVER_MAX_LISTENERS`]
    /// slots are taken.
    pub fn set_callback(
        &mut self,
        address: u16,
        callbacks: Option<&'h mut (dyn Callbacks + 'h)>,
    ) -> Result<(), ErrorKind> {
        if address > ADDRESS_ANY {
            return Err(ErrorKind::InvalidArgument);
        }
        match callbacks {
            Some(callbacks) => {
                if let Some(slot) = self
                    .slots
                    .iter_mut()
                    .flatten()
                    .find(|slot| slot.address == address)
                {
                    slot.callbacks = callbacks;
                    return Ok(());
                }
                match self.slots.iter_mut().find(|slot| slot.is_none()) {
                    Some(slot) => {
                        *slot = Some(CallbackSlot { address, callbacks });
                        Ok(())
                    }
                    None => Err(ErrorKind::Capacity),
                }
            }
            None => {
                for slot in self.slots.iter_mut() {
                    if slot.as_ref().map_or(false, |s| s.address == address) {
                        *slot = None;
                    }
                }
                Ok(())
            }
        }
    }

    /// Serves one request: reads a full ADU, dispatches it and sends the
    /// reply. Framing errors (bad checksum, broken frame) are returned
    /// without a reply being sent; the handle stays usable.
    pub fn run_iteration(&mut self) -> Result<(), ErrorKind> {
        let frame = match self.proto {
            ModbusProto::Rtu => self.read_rtu_request()?,
            ModbusProto::Ascii => self.read_ascii_request()?,
            ModbusProto::Tcp => self.read_tcp_request()?,
        };
        self.dispatch(frame)
    }

    /// Serves requests until the transport fails.
    ///
    /// Per-request protocol errors (broken frames, checksum mismatches,
    /// timeouts) are swallowed and the loop keeps serving; only a transport
    /// failure ends it.
    pub fn run_forever(&mut self) -> Result<(), ErrorKind> {
        loop {
            match self.run_iteration() {
                Ok(()) => {}
                Err(ErrorKind::Transport) => return Err(ErrorKind::Transport),
                Err(_) => {}
            }
        }
    }

    fn read_tcp_request(&mut self) -> Result<RequestFrame, ErrorKind> {
        if self.buffer.len() < MBAP_HEADER_SIZE {
            return Err(ErrorKind::Oob);
        }
        transport::read_exact(&mut self.transport, &mut self.buffer[0..MBAP_HEADER_SIZE])?;
        let header = adu::parse_mbap(&self.buffer[..MBAP_HEADER_SIZE])?;
        // the unit id, first byte counted by the MBAP length, is already read
        let total = 6 + header.length;
        if total > self.buffer.len() {
            return Err(ErrorKind::Oob);
        }
        transport::read_exact(&mut self.transport, &mut self.buffer[MBAP_HEADER_SIZE..total])?;
        Ok(RequestFrame {
            transaction_id: header.transaction_id,
            unit_id: header.unit_id,
            pdu_start: MBAP_HEADER_SIZE,
            pdu_len: header.length - 1,
        })
    }

    fn read_rtu_request(&mut self) -> Result<RequestFrame, ErrorKind> {
        if self.buffer.len() < 8 {
            return Err(ErrorKind::Oob);
        }
        transport::read_exact(&mut self.transport, &mut self.buffer[0..2])?;
        let unit_id = self.buffer[0];
        let function_code = self.buffer[1];
        let total = match function_code {
            0x01..=0x06 => {
                // fixed five-byte PDU plus the CRC trailer
                transport::read_exact(&mut self.transport, &mut self.buffer[2..8])?;
                8
            }
            0x0F | 0x10 => {
                transport::read_exact(&mut self.transport, &mut self.buffer[2..7])?;
                let byte_count = self.buffer[6] as usize;
                let total = 1 + 6 + byte_count + 2;
                if total > self.buffer.len() {
                    return Err(ErrorKind::Oob);
                }
                transport::read_exact(&mut self.transport, &mut self.buffer[7..total])?;
                total
            }
            _ => {
                // the length of an unknown function cannot be derived, so its
                // tail stays unread and the CRC cannot be checked; answer
                // with the standard exception and report the failure
                if unit_id != BROADCAST_ADDRESS {
                    self.send_exception(0, unit_id, function_code, ErrorKind::IllegalFunction)?;
                }
                return Err(ErrorKind::IllegalFunction);
            }
        };
        adu::check_rtu_trailer(&self.buffer[..total])?;
        Ok(RequestFrame {
            transaction_id: 0,
            unit_id,
            pdu_start: 1,
            pdu_len: total - 3,
        })
    }

    fn read_ascii_request(&mut self) -> Result<RequestFrame, ErrorKind> {
        if self.buffer.len() < 11 {
            return Err(ErrorKind::Oob);
        }
        transport::read_exact(&mut self.transport, &mut self.buffer[0..1])?;
        if self.buffer[0] != ASCII_START_BYTE {
            return Err(ErrorKind::FrameBroken);
        }
        // frames end with CR LF, collect until LF or the buffer runs out
        let mut end = 1;
        loop {
            if end >= self.buffer.len() {
                return Err(ErrorKind::Oob);
            }
            transport::read_exact(&mut self.transport, &mut self.buffer[end..end + 1])?;
            end += 1;
            if self.buffer[end - 1] == b'\n' {
                break;
            }
        }
        if end < 3 || self.buffer[end - 2] != b'\r' {
            return Err(ErrorKind::FrameBroken);
        }
        let digits = end - 3;
        // at least the address, a function code and the LRC
        if digits < 6 || digits % 2 != 0 {
            return Err(ErrorKind::FrameBroken);
        }
        let bin_len = digits / 2;
        adu::decode_hex_in_place(self.buffer, 1, 0, bin_len)?;
        adu::check_lrc(&self.buffer[..bin_len])?;
        Ok(RequestFrame {
            transaction_id: 0,
            unit_id: self.buffer[0],
            pdu_start: 1,
            pdu_len: bin_len - 2,
        })
    }

    fn find_slot(&self, unit_id: u8) -> Option<usize> {
        let exact = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Some(s) if s.address == u16::from(unit_id)));
        exact.or_else(|| {
            self.slots
                .iter()
                .position(|slot| matches!(slot, Some(s) if s.address == ADDRESS_ANY))
        })
    }

    fn dispatch(&mut self, frame: RequestFrame) -> Result<(), ErrorKind> {
        let unit_id = frame.unit_id;
        let broadcast = unit_id == BROADCAST_ADDRESS;
        if frame.pdu_len < 5 {
            return Err(ErrorKind::FrameBroken);
        }
        let function_code = self.buffer[frame.pdu_start];
        let slot_index = match self.find_slot(unit_id) {
            Some(index) => index,
            None => {
                // nobody listens on this unit id
                return if broadcast {
                    Ok(())
                } else {
                    self.send_exception(
                        frame.transaction_id,
                        unit_id,
                        function_code,
                        ErrorKind::IllegalFunction,
                    )
                };
            }
        };
        let function = match ModbusFunction::try_from(function_code) {
            Ok(function) => function,
            Err(kind) => {
                return if broadcast {
                    Ok(())
                } else {
                    self.send_exception(frame.transaction_id, unit_id, function_code, kind)
                };
            }
        };
        #[cfg(feature = "log")]
        log::debug!("dispatching {:?} for unit {}", function, unit_id);
        let field_a = u16::from_be_bytes([
            self.buffer[frame.pdu_start + 1],
            self.buffer[frame.pdu_start + 2],
        ]);
        let field_b = u16::from_be_bytes([
            self.buffer[frame.pdu_start + 3],
            self.buffer[frame.pdu_start + 4],
        ]);
        match function {
            ModbusFunction::ReadCoils
            | ModbusFunction::ReadDiscreteInputs
            | ModbusFunction::ReadHoldingRegisters
            | ModbusFunction::ReadInputRegisters => {
                if broadcast {
                    // a broadcast read has nobody to answer to
                    return Ok(());
                }
                if frame.pdu_len != 5 {
                    return Err(ErrorKind::FrameBroken);
                }
                let max = if function == ModbusFunction::ReadCoils
                    || function == ModbusFunction::ReadDiscreteInputs
                {
                    READ_BITS_MAX_QUANTITY
                } else {
                    READ_REGISTERS_MAX_QUANTITY
                };
                if field_b < 1 || field_b > max {
                    return self.send_exception(
                        frame.transaction_id,
                        unit_id,
                        function_code,
                        ErrorKind::IllegalDataValue,
                    );
                }
                if function.byte() <= 0x02 {
                    self.reply_read_bits(
                        frame.transaction_id,
                        unit_id,
                        function,
                        field_a,
                        field_b,
                        slot_index,
                    )
                } else {
                    self.reply_read_registers(
                        frame.transaction_id,
                        unit_id,
                        function,
                        field_a,
                        field_b,
                        slot_index,
                    )
                }
            }
            ModbusFunction::WriteSingleCoil => {
                if frame.pdu_len != 5 {
                    return Err(ErrorKind::FrameBroken);
                }
                if field_b != COIL_VALUE_ON && field_b != COIL_VALUE_OFF {
                    return if broadcast {
                        Ok(())
                    } else {
                        self.send_exception(
                            frame.transaction_id,
                            unit_id,
                            function_code,
                            ErrorKind::IllegalDataValue,
                        )
                    };
                }
                let outcome = match self.slots[slot_index].as_mut() {
                    Some(slot) => {
                        slot.callbacks
                            .write_coil(unit_id, field_a, field_b == COIL_VALUE_ON)
                    }
                    None => return Err(ErrorKind::Failure),
                };
                self.finish_write(
                    frame.transaction_id,
                    unit_id,
                    function,
                    field_a,
                    field_b,
                    broadcast,
                    outcome,
                )
            }
            ModbusFunction::WriteSingleRegister => {
                if frame.pdu_len != 5 {
                    return Err(ErrorKind::FrameBroken);
                }
                let outcome = match self.slots[slot_index].as_mut() {
                    Some(slot) => slot
                        .callbacks
                        .write_holding_register(unit_id, field_a, field_b),
                    None => return Err(ErrorKind::Failure),
                };
                self.finish_write(
                    frame.transaction_id,
                    unit_id,
                    function,
                    field_a,
                    field_b,
                    broadcast,
                    outcome,
                )
            }
            ModbusFunction::WriteMultipleCoils => {
                if frame.pdu_len < 6 {
                    return Err(ErrorKind::FrameBroken);
                }
                let byte_count = self.buffer[frame.pdu_start + 5] as usize;
                if frame.pdu_len != 6 + byte_count {
                    return Err(ErrorKind::FrameBroken);
                }
                if field_b < 1
                    || field_b > WRITE_COILS_MAX_QUANTITY
                    || byte_count != coil_byte_count(field_b)
                {
                    return if broadcast {
                        Ok(())
                    } else {
                        self.send_exception(
                            frame.transaction_id,
                            unit_id,
                            function_code,
                            ErrorKind::IllegalDataValue,
                        )
                    };
                }
                let payload = frame.pdu_start + 6;
                let mut outcome = Ok(());
                for i in 0..field_b {
                    let address = match field_a.checked_add(i) {
                        Some(address) => address,
                        None => {
                            outcome = Err(ErrorKind::IllegalDataAddress);
                            break;
                        }
                    };
                    let bit = self.buffer[payload + (i as usize) / 8] >> ((i as usize) % 8) & 1;
                    let slot = match self.slots[slot_index].as_mut() {
                        Some(slot) => slot,
                        None => return Err(ErrorKind::Failure),
                    };
                    if let Err(kind) = slot.callbacks.write_coil(unit_id, address, bit == 1) {
                        outcome = Err(kind);
                        break;
                    }
                }
                self.finish_write(
                    frame.transaction_id,
                    unit_id,
                    function,
                    field_a,
                    field_b,
                    broadcast,
                    outcome,
                )
            }
            ModbusFunction::WriteMultipleRegisters => {
                if frame.pdu_len < 6 {
                    return Err(ErrorKind::FrameBroken);
                }
                let byte_count = self.buffer[frame.pdu_start + 5] as usize;
                if frame.pdu_len != 6 + byte_count {
                    return Err(ErrorKind::FrameBroken);
                }
                if field_b < 1
                    || field_b > WRITE_REGISTERS_MAX_QUANTITY
                    || byte_count != 2 * field_b as usize
                {
                    return if broadcast {
                        Ok(())
                    } else {
                        self.send_exception(
                            frame.transaction_id,
                            unit_id,
                            function_code,
                            ErrorKind::IllegalDataValue,
                        )
                    };
                }
                let payload = frame.pdu_start + 6;
                let mut outcome = Ok(());
                for i in 0..field_b {
                    let address = match field_a.checked_add(i) {
                        Some(address) => address,
                        None => {
                            outcome = Err(ErrorKind::IllegalDataAddress);
                            break;
                        }
                    };
                    let at = payload + 2 * i as usize;
                    let value = u16::from_be_bytes([self.buffer[at], self.buffer[at + 1]]);
                    let slot = match self.slots[slot_index].as_mut() {
                        Some(slot) => slot,
                        None => return Err(ErrorKind::Failure),
                    };
                    if let Err(kind) =
                        slot.callbacks.write_holding_register(unit_id, address, value)
                    {
                        outcome = Err(kind);
                        break;
                    }
                }
                self.finish_write(
                    frame.transaction_id,
                    unit_id,
                    function,
                    field_a,
                    field_b,
                    broadcast,
                    outcome,
                )
            }
        }
    }

    fn reply_read_bits(
        &mut self,
        transaction_id: u16,
        unit_id: u8,
        function: ModbusFunction,
        start_address: u16,
        quantity: u16,
        slot_index: usize,
    ) -> Result<(), ErrorKind> {
        let mut packed = [0u8; (READ_BITS_MAX_QUANTITY as usize + 7) / 8];
        let mut outcome = Ok(());
        for i in 0..quantity {
            let address = match start_address.checked_add(i) {
                Some(address) => address,
                None => {
                    outcome = Err(ErrorKind::IllegalDataAddress);
                    break;
                }
            };
            let slot = match self.slots[slot_index].as_mut() {
                Some(slot) => slot,
                None => return Err(ErrorKind::Failure),
            };
            let result = if function == ModbusFunction::ReadCoils {
                slot.callbacks.read_coil(unit_id, address)
            } else {
                slot.callbacks.read_discrete_input(unit_id, address)
            };
            match result {
                Ok(true) => packed[(i as usize) / 8] |= 1 << ((i as usize) % 8),
                Ok(false) => {}
                Err(kind) => {
                    outcome = Err(kind);
                    break;
                }
            }
        }
        match outcome {
            Ok(()) => {
                let byte_count = coil_byte_count(quantity);
                self.send_pdu(transaction_id, unit_id, |adu| {
                    adu.push_u8(function.byte())?;
                    adu.push_u8(byte_count as u8)?;
                    adu.push_bytes(&packed[..byte_count])
                })
            }
            Err(ErrorKind::Ignored) => Ok(()),
            Err(kind) => self.send_exception(transaction_id, unit_id, function.byte(), kind),
        }
    }

    fn reply_read_registers(
        &mut self,
        transaction_id: u16,
        unit_id: u8,
        function: ModbusFunction,
        start_address: u16,
        quantity: u16,
        slot_index: usize,
    ) -> Result<(), ErrorKind> {
        let mut words = [0u16; READ_REGISTERS_MAX_QUANTITY as usize];
        let mut outcome = Ok(());
        for i in 0..quantity {
            let address = match start_address.checked_add(i) {
                Some(address) => address,
                None => {
                    outcome = Err(ErrorKind::IllegalDataAddress);
                    break;
                }
            };
            let slot = match self.slots[slot_index].as_mut() {
                Some(slot) => slot,
                None => return Err(ErrorKind::Failure),
            };
            let result = if function == ModbusFunction::ReadHoldingRegisters {
                slot.callbacks.read_holding_register(unit_id, address)
            } else {
                slot.callbacks.read_input_register(unit_id, address)
            };
            match result {
                Ok(value) => words[i as usize] = value,
                Err(kind) => {
                    outcome = Err(kind);
                    break;
                }
            }
        }
        match outcome {
            Ok(()) => self.send_pdu(transaction_id, unit_id, |adu| {
                adu.push_u8(function.byte())?;
                adu.push_u8((quantity * 2) as u8)?;
                for word in &words[..quantity as usize] {
                    adu.push_u16(*word)?;
                }
                Ok(())
            }),
            Err(ErrorKind::Ignored) => Ok(()),
            Err(kind) => self.send_exception(transaction_id, unit_id, function.byte(), kind),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_write(
        &mut self,
        transaction_id: u16,
        unit_id: u8,
        function: ModbusFunction,
        field_a: u16,
        field_b: u16,
        broadcast: bool,
        outcome: Result<(), ErrorKind>,
    ) -> Result<(), ErrorKind> {
        match outcome {
            Ok(()) => {
                if broadcast {
                    return Ok(());
                }
                self.send_pdu(transaction_id, unit_id, |adu| {
                    adu.push_u8(function.byte())?;
                    adu.push_u16(field_a)?;
                    adu.push_u16(field_b)
                })
            }
            Err(ErrorKind::Ignored) => Ok(()),
            Err(kind) => {
                if broadcast {
                    return Ok(());
                }
                self.send_exception(transaction_id, unit_id, function.byte(), kind)
            }
        }
    }

    fn send_exception(
        &mut self,
        transaction_id: u16,
        unit_id: u8,
        function_code: u8,
        kind: ErrorKind,
    ) -> Result<(), ErrorKind> {
        // callback failures without a standard code become exception 04
        let code = kind.exception_code().unwrap_or(0x04);
        #[cfg(feature = "log")]
        log::debug!(
            "replying exception {:02X} to function {:02X} for unit {}",
            code,
            function_code,
            unit_id
        );
        self.send_pdu(transaction_id, unit_id, |adu| {
            adu.push_u8(function_code | 0x80)?;
            adu.push_u8(code)
        })
    }

    fn send_pdu(
        &mut self,
        transaction_id: u16,
        unit_id: u8,
        build: impl FnOnce(&mut AduWriter<'_>) -> Result<(), ErrorKind>,
    ) -> Result<(), ErrorKind> {
        let mut adu = AduWriter::begin(self.buffer, self.proto, transaction_id, unit_id)?;
        build(&mut adu)?;
        let frame = adu.finalize()?;
        transport::write_all(&mut self.transport, frame)
    }
}
