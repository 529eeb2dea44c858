//! Single-bit digital-IO-style adapter. Uses a 2-byte structured message —
//! a command byte (0=read, 1=write, 2=toggle) followed by a value byte —
//! rather than the raw byte-stream surface the other adapters share.

use super::{Endpoint, PeripheralTransport, Role};
use crate::error::{Result, SimulithError};
use std::net::ToSocketAddrs;

/// Default base port for GPIO bus addresses, per `simulith_gpio.h`.
pub const BASE_PORT: u16 = 9000;

const CMD_READ: u8 = 0;
const CMD_WRITE: u8 = 1;
const CMD_TOGGLE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

pub struct GpioPin {
    endpoint: Endpoint,
    pin: u8,
    direction: Direction,
}

impl GpioPin {
    pub fn new(
        name: impl Into<String>,
        address: impl ToSocketAddrs,
        role: Role,
        pin: u8,
        direction: Direction,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(name, address, role)?,
            pin,
            direction,
        })
    }

    pub fn init(&mut self) -> Result<()> {
        self.endpoint.init()
    }

    /// Sets the pin's value. Only `0` and `1` are valid.
    pub fn write(&mut self, value: u8) -> Result<()> {
        if value > 1 {
            return Err(SimulithError::InvalidArgument(format!(
                "gpio value must be 0 or 1, got {value}"
            )));
        }
        self.endpoint.send(&[CMD_WRITE, value])?;
        tracing::debug!(pin = self.pin, value, "gpio write");
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<()> {
        self.endpoint.send(&[CMD_TOGGLE, 0])?;
        tracing::debug!(pin = self.pin, "gpio toggle");
        Ok(())
    }

    /// Sends a read request, then performs a single non-blocking receive.
    /// Returns the peer's reported value, or `0` if no response is
    /// available yet — this never waits for one.
    pub fn read(&mut self) -> Result<u8> {
        self.endpoint.send(&[CMD_READ, 0])?;
        let mut buf = [0u8; 2];
        let n = self.endpoint.receive(&mut buf)?;
        Ok(if n >= 2 { buf[1] } else { 0 })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn close(&mut self) -> Result<()> {
        self.endpoint.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn write_rejects_out_of_range_values() {
        let mut pin = GpioPin::new(
            "gpio_a",
            "127.0.0.1:19000",
            Role::Client,
            3,
            Direction::Output,
        )
        .unwrap();
        pin.init().unwrap();
        assert!(pin.write(2).is_err());
        assert!(pin.write(0).is_ok());
        assert!(pin.write(1).is_ok());
    }

    #[test]
    fn read_returns_zero_with_no_response() {
        let mut pin = GpioPin::new(
            "gpio_b",
            "127.0.0.1:19001",
            Role::Client,
            4,
            Direction::Input,
        )
        .unwrap();
        pin.init().unwrap();
        assert_eq!(pin.read().unwrap(), 0);
    }

    #[test]
    fn read_returns_peers_reported_value() {
        let mut out = GpioPin::new(
            "gpio_out",
            "127.0.0.1:19002",
            Role::Server,
            5,
            Direction::Output,
        )
        .unwrap();
        let mut inp = GpioPin::new(
            "gpio_in",
            "127.0.0.1:19002",
            Role::Client,
            5,
            Direction::Input,
        )
        .unwrap();
        out.init().unwrap();
        inp.init().unwrap();

        // `inp` probes first so `out` (the server) learns its peer.
        let _ = inp.read();
        sleep(Duration::from_millis(10));
        // Drain the read-request `out` just received and reply with a value.
        let mut scratch = [0u8; 2];
        let _ = out.endpoint.receive(&mut scratch);
        out.write(1).unwrap();
        sleep(Duration::from_millis(10));

        assert_eq!(inp.read().unwrap(), 1);
    }
}
