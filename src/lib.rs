//! # smolmodbus - a small, portable Modbus protocol engine
//!
//! smolmodbus speaks Modbus RTU, ASCII and TCP on both sides of the wire: a
//! blocking client engine and a callback-driven server dispatcher, built on
//! top of a byte transport you provide. The core performs no allocation, has
//! no OS dependency and fully supports no_std: all working memory is a
//! caller-provided scratch buffer plus the stack.
//!
//! ## Features
//!
//! * client and server over RTU, ASCII and TCP (MBAP) encapsulations
//! * transport independent: anything with blocking `read`/`write` works,
//!   serial ports and sockets alike
//! * zero allocation, **no_std fully supported**
//! * responses are decoded into `Vec`, `FixedVec` or `heapless::Vec` through
//!   one storage trait
//! * requests are range-checked against the standard before they are sent
//!
//! ## Client
//!
//! ```rust,no_run
//! use smolmodbus::{transport, ModbusClient, ModbusProto};
//!
//! let stream = transport::connect("10.0.0.7", 502).unwrap();
//! let mut buf = [0u8; 260];
//! let mut client = ModbusClient::new(stream, ModbusProto::Tcp, &mut buf);
//! client.set_unit_id(1);
//!
//! let mut registers: Vec<u16> = Vec::new();
//! client.read_holding_registers(0x006B, 3, &mut registers).unwrap();
//! println!("{:04X?}", registers);
//!
//! client.write_single_coil(0x000B, true).unwrap();
//! ```
//!
//! The same client drives a serial line by passing `ModbusProto::Rtu` or
//! `ModbusProto::Ascii` and a transport wrapping the port.
//!
//! ## Server
//!
//! The server owns no register bank. Instead, callbacks registered per
//! listening address answer each coil or register access, so the data can
//! live wherever the application keeps it:
//!
//! ```rust,no_run
//! use smolmodbus::{Callbacks, ErrorKind, ModbusProto, ModbusServer};
//!
//! struct Plc {
//!     holdings: [u16; 100],
//! }
//!
//! impl Callbacks for Plc {
//!     fn read_holding_register(&mut self, _unit: u8, address: u16) -> Result<u16, ErrorKind> {
//!         self.holdings
//!             .get(address as usize)
//!             .copied()
//!             .ok_or(ErrorKind::IllegalDataAddress)
//!     }
//! }
//!
//! let listener = std::net::TcpListener::bind("0.0.0.0:502").unwrap();
//! let (stream, _) = listener.accept().unwrap();
//! let mut plc = Plc { holdings: [0; 100] };
//! let mut buf = [0u8; 260];
//! let mut server = ModbusServer::new(stream, ModbusProto::Tcp, &mut buf);
//! server.set_callback(1, Some(&mut plc)).unwrap();
//! server.run_forever().unwrap();
//! ```
//!
//! Functions a callback does not implement are answered with the standard
//! `ILLEGAL FUNCTION` exception. A callback can return any Modbus exception
//! kind to map a domain failure onto the wire, or [`ErrorKind::Ignored`] to
//! stay silent (useful with the [`consts::ADDRESS_ANY`] wildcard listener).
//!
//! ## no_std
//!
//! Disable the default `std` feature and pick an output storage:
//!
//! ```toml
//! smolmodbus = { version = "*", default-features = false, features = ["heapless"] }
//! ```
//!
//! Optional features: `std` (on by default), `fixedvec`, `heapless`, `defmt`
//! (derive `defmt::Format` on the public enums) and `log` (trace engine
//! milestones through the `log` facade).
#![cfg_attr(not(feature = "std"), no_std)]

pub mod adu;
pub mod checksum;
pub mod client;
pub mod consts;
pub mod error;
pub mod pdu;
pub mod server;
pub mod transport;
pub mod vector;

pub use adu::ModbusProto;
pub use client::ModbusClient;
pub use consts::ModbusFunction;
pub use error::ErrorKind;
pub use pdu::{Registers, Request, Response};
pub use server::{Callbacks, ModbusServer};
pub use transport::Transport;
pub use vector::VectorTrait;
