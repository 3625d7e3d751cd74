#![allow(dead_code)]

use smolmodbus::{Callbacks, ErrorKind, Transport};

/// Scripted transport: serves reads from a canned byte sequence (at most
/// `chunk` bytes per call, to exercise short-read handling) and records
/// everything written. Reading past the script reports a closed transport.
pub struct MockTransport {
    rx: Vec<u8>,
    pos: usize,
    chunk: usize,
    pub tx: Vec<u8>,
}

impl MockTransport {
    pub fn new(rx: &[u8]) -> Self {
        Self::chunked(rx, usize::MAX)
    }

    pub fn chunked(rx: &[u8], chunk: usize) -> Self {
        Self {
            rx: rx.to_vec(),
            pos: 0,
            chunk,
            tx: Vec::new(),
        }
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        if self.pos >= self.rx.len() {
            return Ok(0);
        }
        let take = buf.len().min(self.chunk).min(self.rx.len() - self.pos);
        buf[..take].copy_from_slice(&self.rx[self.pos..self.pos + take]);
        self.pos += take;
        Ok(take)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// A small device with 32 of each register type, answering out-of-range
/// accesses with the ILLEGAL DATA ADDRESS exception.
pub struct TestDevice {
    pub coils: [bool; 32],
    pub discretes: [bool; 32],
    pub holdings: [u16; 32],
    pub inputs: [u16; 32],
}

impl TestDevice {
    pub fn new() -> Self {
        Self {
            coils: [false; 32],
            discretes: [false; 32],
            holdings: [0; 32],
            inputs: [0; 32],
        }
    }
}

impl Callbacks for TestDevice {
    fn read_coil(&mut self, _unit_id: u8, address: u16) -> Result<bool, ErrorKind> {
        self.coils
            .get(address as usize)
            .copied()
            .ok_or(ErrorKind::IllegalDataAddress)
    }

    fn read_discrete_input(&mut self, _unit_id: u8, address: u16) -> Result<bool, ErrorKind> {
        self.discretes
            .get(address as usize)
            .copied()
            .ok_or(ErrorKind::IllegalDataAddress)
    }

    fn read_holding_register(&mut self, _unit_id: u8, address: u16) -> Result<u16, ErrorKind> {
        self.holdings
            .get(address as usize)
            .copied()
            .ok_or(ErrorKind::IllegalDataAddress)
    }

    fn read_input_register(&mut self, _unit_id: u8, address: u16) -> Result<u16, ErrorKind> {
        self.inputs
            .get(address as usize)
            .copied()
            .ok_or(ErrorKind::IllegalDataAddress)
    }

    fn write_coil(&mut self, _unit_id: u8, address: u16, value: bool) -> Result<(), ErrorKind> {
        match self.coils.get_mut(address as usize) {
            Some(coil) => {
                *coil = value;
                Ok(())
            }
            None => Err(ErrorKind::IllegalDataAddress),
        }
    }

    fn write_holding_register(
        &mut self,
        _unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), ErrorKind> {
        match self.holdings.get_mut(address as usize) {
            Some(holding) => {
                *holding = value;
                Ok(())
            }
            None => Err(ErrorKind::IllegalDataAddress),
        }
    }
}
