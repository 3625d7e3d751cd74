mod common;

use common::{MockTransport, TestDevice};
use smolmodbus::checksum::calc_crc16;
use smolmodbus::consts::ADDRESS_ANY;
use smolmodbus::{Callbacks, ErrorKind, ModbusProto, ModbusServer};

fn rtu_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = payload.to_vec();
    frame.extend_from_slice(&calc_crc16(payload).to_le_bytes());
    frame
}

#[test]
fn test_tcp_read_holding_registers() {
    let mut device = TestDevice::new();
    device.holdings[0] = 0xABCD;
    device.holdings[1] = 0x0102;
    let request = [
        0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x00, 0x00, 0x02,
    ];
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 260];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Tcp, &mut buf);
        server.set_callback(0x11, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    assert_eq!(
        transport.tx,
        [0x00, 0x07, 0x00, 0x00, 0x00, 0x07, 0x11, 0x03, 0x04, 0xAB, 0xCD, 0x01, 0x02]
    );
}

#[test]
fn test_rtu_write_single_register() {
    let mut device = TestDevice::new();
    let request = rtu_frame(&[0x05, 0x06, 0x00, 0x03, 0xBE, 0xEF]);
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 256];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
        server.set_callback(5, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    // the write is echoed verbatim
    assert_eq!(transport.tx, request);
    assert_eq!(device.holdings[3], 0xBEEF);
}

#[test]
fn test_rtu_broadcast_write_is_silent() {
    let mut device = TestDevice::new();
    let request = rtu_frame(&[0x00, 0x06, 0x00, 0x03, 0xBE, 0xEF]);
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 256];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
        server.set_callback(ADDRESS_ANY, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    assert!(transport.tx.is_empty());
    assert_eq!(device.holdings[3], 0xBEEF);
}

#[test]
fn test_unknown_unit_yields_exception() {
    let mut device = TestDevice::new();
    let request = rtu_frame(&[0x09, 0x03, 0x00, 0x00, 0x00, 0x01]);
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 256];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
        server.set_callback(5, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    assert_eq!(transport.tx, rtu_frame(&[0x09, 0x83, 0x01]));
}

#[test]
fn test_any_wildcard_answers_all_units() {
    let mut device = TestDevice::new();
    device.holdings[0] = 7;
    let request = rtu_frame(&[0x2A, 0x03, 0x00, 0x00, 0x00, 0x01]);
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 256];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
        server.set_callback(ADDRESS_ANY, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    assert_eq!(transport.tx, rtu_frame(&[0x2A, 0x03, 0x02, 0x00, 0x07]));
}

struct SilentDevice;

impl Callbacks for SilentDevice {
    fn read_holding_register(&mut self, _unit_id: u8, _address: u16) -> Result<u16, ErrorKind> {
        Err(ErrorKind::Ignored)
    }
}

#[test]
fn test_ignored_suppresses_reply() {
    let mut device = SilentDevice;
    let request = rtu_frame(&[0x05, 0x03, 0x00, 0x00, 0x00, 0x01]);
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 256];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
        server.set_callback(ADDRESS_ANY, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    assert!(transport.tx.is_empty());
}

#[test]
fn test_callback_exception_becomes_reply() {
    // addresses 30..35 run past the 32-register device
    let mut device = TestDevice::new();
    let request = rtu_frame(&[0x05, 0x03, 0x00, 0x1E, 0x00, 0x05]);
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 256];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
        server.set_callback(5, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    assert_eq!(transport.tx, rtu_frame(&[0x05, 0x83, 0x02]));
}

#[test]
fn test_invalid_quantity_yields_exception() {
    let mut device = TestDevice::new();
    for quantity in [[0x00, 0x00], [0x00, 0x7E]] {
        let request = rtu_frame(&[0x05, 0x03, 0x00, 0x00, quantity[0], quantity[1]]);
        let mut transport = MockTransport::new(&request);
        let mut buf = [0u8; 256];
        {
            let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
            server.set_callback(5, Some(&mut device)).unwrap();
            server.run_iteration().unwrap();
        }
        assert_eq!(transport.tx, rtu_frame(&[0x05, 0x83, 0x03]));
    }
}

#[test]
fn test_unknown_function_yields_exception() {
    let mut device = TestDevice::new();
    // function 0x2B cannot be sized, the server replies without a CRC check
    let request = [0x05, 0x2B, 0x0E, 0x01, 0x00];
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 256];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
        server.set_callback(5, Some(&mut device)).unwrap();
        assert_eq!(server.run_iteration(), Err(ErrorKind::IllegalFunction));
    }
    assert_eq!(transport.tx, rtu_frame(&[0x05, 0xAB, 0x01]));
}

#[test]
fn test_rtu_crc_error_gets_no_reply() {
    let mut device = TestDevice::new();
    let mut request = rtu_frame(&[0x05, 0x03, 0x00, 0x00, 0x00, 0x01]);
    let last = request.len() - 1;
    request[last] ^= 0xFF;
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 256];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
        server.set_callback(5, Some(&mut device)).unwrap();
        assert_eq!(server.run_iteration(), Err(ErrorKind::FrameCrcError));
    }
    assert!(transport.tx.is_empty());
}

#[test]
fn test_rtu_write_multiple_coils() {
    let mut device = TestDevice::new();
    // six coils at address 4, pattern 0b100101
    let request = rtu_frame(&[0x01, 0x0F, 0x00, 0x04, 0x00, 0x06, 0x01, 0x25]);
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 256];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Rtu, &mut buf);
        server.set_callback(1, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    assert_eq!(
        transport.tx,
        rtu_frame(&[0x01, 0x0F, 0x00, 0x04, 0x00, 0x06])
    );
    assert_eq!(
        &device.coils[4..10],
        [true, false, true, false, false, true]
    );
}

#[test]
fn test_tcp_write_multiple_registers() {
    let mut device = TestDevice::new();
    let request = [
        0x00, 0x01, 0x00, 0x00, 0x00, 0x0B, 0x01, 0x10, 0x00, 0x08, 0x00, 0x02, 0x04, 0x11, 0x22,
        0x33, 0x44,
    ];
    let mut transport = MockTransport::new(&request);
    let mut buf = [0u8; 260];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Tcp, &mut buf);
        server.set_callback(1, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    assert_eq!(
        transport.tx,
        [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x10, 0x00, 0x08, 0x00, 0x02]
    );
    assert_eq!(device.holdings[8], 0x1122);
    assert_eq!(device.holdings[9], 0x3344);
}

#[test]
fn test_ascii_read_holding_registers() {
    let mut device = TestDevice::new();
    device.holdings[0] = 0x1234;
    device.holdings[1] = 0x5678;
    let mut transport = MockTransport::new(b":110300000002EA\r\n");
    let mut buf = [0u8; 513];
    {
        let mut server = ModbusServer::new(&mut transport, ModbusProto::Ascii, &mut buf);
        server.set_callback(0x11, Some(&mut device)).unwrap();
        server.run_iteration().unwrap();
    }
    assert_eq!(transport.tx, b":11030412345678D4\r\n");
}

#[test]
fn test_callback_table_management() {
    let mut buf = [0u8; 256];
    let transport = MockTransport::new(&[]);
    let mut devices: Vec<TestDevice> = (0..11).map(|_| TestDevice::new()).collect();
    let mut server = ModbusServer::new(transport, ModbusProto::Rtu, &mut buf);
    {
        let mut iter = devices.iter_mut();
        for address in 1u16..=10 {
            let device = iter.next().unwrap();
            server.set_callback(address, Some(device)).unwrap();
        }
        // eleventh listener has no slot
        let device = iter.next().unwrap();
        assert_eq!(
            server.set_callback(11, Some(device)),
            Err(ErrorKind::Capacity)
        );
    }
    // replacing a registered address is not an insertion
    let mut replacement = TestDevice::new();
    server.set_callback(5, Some(&mut replacement)).unwrap();
    // clearing frees the slot for a new address
    server.set_callback(5, None).unwrap();
    let mut late = TestDevice::new();
    server.set_callback(200, Some(&mut late)).unwrap();
    let mut out_of_range = TestDevice::new();
    assert_eq!(
        server.set_callback(300, Some(&mut out_of_range)),
        Err(ErrorKind::InvalidArgument)
    );
}
