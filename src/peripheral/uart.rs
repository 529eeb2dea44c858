//! Serial-style adapter: a thin pass-through over the generic endpoint,
//! exposing send/receive/available/flush/close.

use super::{Endpoint, PeripheralTransport, Role};
use crate::error::{Result, SimulithError};
use std::net::ToSocketAddrs;

pub struct UartPort {
    endpoint: Endpoint,
}

impl UartPort {
    pub fn new(name: impl Into<String>, address: impl ToSocketAddrs, role: Role) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(name, address, role)?,
        })
    }

    pub fn init(&mut self) -> Result<()> {
        self.endpoint.init()
    }

    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.endpoint.send(data)
    }

    pub fn available(&mut self) -> Result<bool> {
        self.endpoint.available()
    }

    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.endpoint.receive(buf)
    }

    /// No-op beyond validating the port is open: the underlying transport
    /// has no internal write buffering to flush.
    pub fn flush(&self) -> Result<()> {
        if self.endpoint.is_open() {
            Ok(())
        } else {
            Err(SimulithError::Unavailable(format!(
                "endpoint '{}' is not open",
                self.endpoint.name()
            )))
        }
    }

    pub fn close(&mut self) -> Result<()> {
        self.endpoint.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_succeeds_once_open() {
        let mut port = UartPort::new("uart_test", "127.0.0.1:16100", Role::Server).unwrap();
        port.init().unwrap();
        assert!(port.flush().is_ok());
    }
}
