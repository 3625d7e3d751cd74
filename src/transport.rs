//! Byte transport consumed by the protocol engines
//!
//! The core performs all I/O through the [`Transport`] trait and stays free
//! of any OS dependency. Short reads and writes are legal: the engines loop
//! until a frame is complete. A transport signals closure by returning
//! `Ok(0)` and a deadline expiry with [`ErrorKind::Timeout`]; cancellation is
//! expressed the same way, by making further calls fail.

use crate::error::ErrorKind;

/// Blocking byte-oriented transport
pub trait Transport {
    /// Reads up to `buf.len()` bytes, returning how many were read.
    /// `Ok(0)` means the transport is closed.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind>;

    /// Writes up to `buf.len()` bytes, returning how many were written.
    /// `Ok(0)` means the transport is closed.
    fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        (**self).write(buf)
    }
}

/// Writes the whole buffer, looping over short writes.
pub(crate) fn write_all<T: Transport + ?Sized>(
    transport: &mut T,
    mut buf: &[u8],
) -> Result<(), ErrorKind> {
    while !buf.is_empty() {
        let written = transport.write(buf)?;
        if written == 0 {
            return Err(ErrorKind::Transport);
        }
        buf = buf.get(written..).unwrap_or(&[]);
    }
    Ok(())
}

/// Fills the whole buffer, looping over short reads.
pub(crate) fn read_exact<T: Transport + ?Sized>(
    transport: &mut T,
    buf: &mut [u8],
) -> Result<(), ErrorKind> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = transport.read(&mut buf[filled..])?;
        if read == 0 {
            return Err(ErrorKind::Transport);
        }
        filled += read;
    }
    Ok(())
}

#[cfg(feature = "std")]
mod tcp {
    use super::Transport;
    use crate::error::ErrorKind;
    use std::io::{Read, Write};
    use std::net::{TcpStream, ToSocketAddrs};

    fn map_io_error(e: &std::io::Error) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ErrorKind::Timeout,
            _ => ErrorKind::Transport,
        }
    }

    impl Transport for TcpStream {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
            Read::read(self, buf).map_err(|e| map_io_error(&e))
        }
        fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
            Write::write(self, buf).map_err(|e| map_io_error(&e))
        }
    }

    /// Resolves `host` and connects a TCP stream suitable for Modbus TCP.
    pub fn connect(host: &str, port: u16) -> Result<TcpStream, ErrorKind> {
        let mut addrs = (host, port)
            .to_socket_addrs()
            .map_err(|_| ErrorKind::HostResolution)?;
        let addr = addrs.next().ok_or(ErrorKind::HostResolution)?;
        TcpStream::connect(addr).map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
            _ => ErrorKind::OpenSocket,
        })
    }
}

#[cfg(feature = "std")]
pub use tcp::connect;
