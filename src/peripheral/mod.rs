//! The peripheral transport fabric: a generic, non-blocking, point-to-point
//! byte transport (`Endpoint`) plus thin bus-specific adapters built on top
//! of it (`uart`, `i2c`, `spi`, `gpio`).
//!
//! Every operation here is synchronous and returns immediately — there are
//! no suspension points anywhere in this module, matching the non-blocking
//! discipline the peripheral endpoint must uphold.

pub mod gpio;
pub mod i2c;
pub mod spi;
pub mod uart;

use crate::error::{Result, SimulithError};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// The receive buffer's fixed capacity, in bytes.
pub const BUFFER_CAPACITY: usize = 1024;

/// The largest single message the transport will hand to the wire.
pub const MAX_MESSAGE_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Open,
}

/// The capability set every bus adapter is built from: init, send, available,
/// receive, close. Bus adapters compose an `Endpoint` rather than
/// implementing this trait directly, but it documents the shared surface.
pub trait PeripheralTransport {
    fn init(&mut self) -> Result<()>;
    fn send(&mut self, data: &[u8]) -> Result<usize>;
    fn available(&mut self) -> Result<bool>;
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn close(&mut self) -> Result<()>;
}

/// One side of a point-to-point peripheral bus pair.
///
/// The server role binds the shared address; the client role connects to
/// it. A server endpoint learns its peer's address from the first datagram
/// it ever receives — there is no prior handshake, matching the "fail
/// gracefully if the peer is unavailable" requirement: sending before any
/// peer has been heard from simply fails rather than blocking.
pub struct Endpoint {
    name: String,
    role: Role,
    address: SocketAddr,
    socket: Option<UdpSocket>,
    peer: Option<SocketAddr>,
    state: State,
    recv_buf: VecDeque<u8>,
    overflow_count: u64,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, address: impl ToSocketAddrs, role: Role) -> Result<Self> {
        let address = address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SimulithError::InvalidArgument("address did not resolve".into()))?;
        Ok(Self {
            name: name.into(),
            role,
            address,
            socket: None,
            peer: None,
            state: State::Uninitialized,
            recv_buf: VecDeque::with_capacity(BUFFER_CAPACITY),
            overflow_count: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }

    /// Number of arriving messages dropped whole because they would have
    /// overflowed the receive buffer. Callers can poll this to detect a
    /// peer outpacing their drain rate without an out-of-band channel.
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == State::Open {
            Ok(())
        } else {
            Err(SimulithError::Unavailable(format!(
                "endpoint '{}' is not open",
                self.name
            )))
        }
    }

    /// Drains at most one pending datagram from the OS socket into the
    /// receive buffer. A message that would overflow the buffer is dropped
    /// whole rather than truncated, per the overflow policy.
    fn poll(&mut self) -> Result<()> {
        let socket = self.socket.as_ref().expect("ensure_open called by caller");
        let mut scratch = [0u8; MAX_MESSAGE_LEN];
        match socket.recv_from(&mut scratch) {
            Ok((n, from)) => {
                if self.role == Role::Server {
                    self.peer = Some(from);
                }
                if self.recv_buf.len() + n > BUFFER_CAPACITY {
                    self.overflow_count += 1;
                    let err = SimulithError::Overflow;
                    tracing::warn!(
                        endpoint = %self.name,
                        dropped_bytes = n,
                        overflow_count = self.overflow_count,
                        error = %err,
                        "dropping message whole"
                    );
                    return Ok(());
                }
                self.recv_buf.extend(&scratch[..n]);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(SimulithError::Unavailable(format!("receive: {e}"))),
        }
    }
}

impl PeripheralTransport for Endpoint {
    fn init(&mut self) -> Result<()> {
        if self.state == State::Open {
            return Ok(());
        }
        let socket = match self.role {
            Role::Server => UdpSocket::bind(self.address)
                .map_err(|e| SimulithError::Unavailable(format!("bind {}: {e}", self.address)))?,
            Role::Client => {
                let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| {
                    SimulithError::Unavailable(format!("bind ephemeral port: {e}"))
                })?;
                socket.connect(self.address).map_err(|e| {
                    SimulithError::Unavailable(format!("connect {}: {e}", self.address))
                })?;
                self.peer = Some(self.address);
                socket
            }
        };
        socket.set_nonblocking(true)?;
        tracing::info!(
            endpoint = %self.name,
            role = ?self.role,
            address = %self.address,
            "peripheral endpoint opened"
        );
        self.socket = Some(socket);
        self.state = State::Open;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        if data.is_empty() || data.len() > MAX_MESSAGE_LEN {
            return Err(SimulithError::InvalidArgument(format!(
                "message length {} outside 1..={MAX_MESSAGE_LEN}",
                data.len()
            )));
        }
        let peer = self.peer.ok_or_else(|| {
            SimulithError::Unavailable(format!("endpoint '{}' has no known peer yet", self.name))
        })?;
        let socket = self.socket.as_ref().unwrap();
        match socket.send_to(data, peer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(SimulithError::Unavailable("send queue full".into()))
            }
            Err(e) => Err(SimulithError::Unavailable(format!("send to {peer}: {e}"))),
        }
    }

    fn available(&mut self) -> Result<bool> {
        self.ensure_open()?;
        self.poll()?;
        Ok(!self.recv_buf.is_empty())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        self.poll()?;
        let n = buf.len().min(self.recv_buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.recv_buf.pop_front().expect("checked len above");
        }
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.socket = None;
        self.peer = None;
        self.recv_buf.clear();
        self.state = State::Uninitialized;
        tracing::info!(endpoint = %self.name, "peripheral endpoint closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn poll_until<F: FnMut() -> Result<bool>>(mut f: F) -> bool {
        for _ in 0..200 {
            if f().unwrap_or(false) {
                return true;
            }
            sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn send_receive_round_trip() {
        let mut a = Endpoint::new("a", "127.0.0.1:16000", Role::Server).unwrap();
        let mut b = Endpoint::new("b", "127.0.0.1:16000", Role::Client).unwrap();
        a.init().unwrap();
        b.init().unwrap();

        // The server does not know its peer until it has heard from it, so
        // the first message of a pair must flow client -> server.
        assert_eq!(b.send(&[0x12, 0x34, 0x56]).unwrap(), 3);
        assert!(poll_until(|| a.available()));
        let mut buf = [0u8; 3];
        assert_eq!(a.receive(&mut buf).unwrap(), 3);
        assert_eq!(buf, [0x12, 0x34, 0x56]);

        assert_eq!(a.send(&buf).unwrap(), 3);
        assert!(poll_until(|| b.available()));
        let mut buf2 = [0u8; 3];
        assert_eq!(b.receive(&mut buf2).unwrap(), 3);
        assert_eq!(buf2, buf);
    }

    #[test]
    fn oversized_message_rejected_at_send() {
        let mut b = Endpoint::new("ovf_b", "127.0.0.1:16001", Role::Client).unwrap();
        b.init().unwrap();
        let oversized = vec![0xFFu8; MAX_MESSAGE_LEN + 1];
        assert!(b.send(&oversized).is_err());
    }

    #[test]
    fn unread_buffer_overflow_drops_whole_arriving_message() {
        let mut a = Endpoint::new("fill_a", "127.0.0.1:16010", Role::Server).unwrap();
        let mut b = Endpoint::new("fill_b", "127.0.0.1:16010", Role::Client).unwrap();
        a.init().unwrap();
        b.init().unwrap();

        // Fill the receive buffer to within 10 bytes of capacity without
        // ever draining it.
        let chunk = vec![0xAAu8; 1000];
        b.send(&chunk).unwrap();
        assert!(poll_until(|| a.available()));

        // A second message that would overflow the remaining 24 bytes is
        // dropped whole; the buffer keeps exactly what it already had.
        let overflowing = vec![0xBBu8; 100];
        b.send(&overflowing).unwrap();
        sleep(Duration::from_millis(20));
        assert!(a.available().unwrap());

        let mut buf = [0u8; 1024];
        let n = a.receive(&mut buf).unwrap();
        assert_eq!(n, 1000);
        assert!(buf[..n].iter().all(|&b| b == 0xAA));
        assert_eq!(a.overflow_count(), 1);
    }

    #[test]
    fn uninitialized_send_fails() {
        let mut a = Endpoint::new("uninit", "127.0.0.1:16002", Role::Client).unwrap();
        assert!(a.send(&[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn close_uninitialized_fails() {
        let mut a = Endpoint::new("uninit2", "127.0.0.1:16003", Role::Client).unwrap();
        assert!(a.close().is_err());
    }

    #[test]
    fn repeated_init_is_idempotent() {
        let mut a = Endpoint::new("idem", "127.0.0.1:16004", Role::Server).unwrap();
        a.init().unwrap();
        a.init().unwrap();
    }

    #[test]
    fn multiple_messages_concatenate_in_buffer() {
        let mut a = Endpoint::new("multi_a", "127.0.0.1:16005", Role::Server).unwrap();
        let mut b = Endpoint::new("multi_b", "127.0.0.1:16005", Role::Client).unwrap();
        a.init().unwrap();
        b.init().unwrap();

        for msg in [b"one".as_slice(), b"two".as_slice(), b"three".as_slice()] {
            b.send(msg).unwrap();
            sleep(Duration::from_millis(2));
        }

        assert!(poll_until(|| a.available()));
        let mut buf = [0u8; 32];
        // Messages are not boundary-preserved once buffered: draining
        // eventually yields the concatenation in send order.
        let mut collected = Vec::new();
        for _ in 0..20 {
            let n = a.receive(&mut buf).unwrap();
            collected.extend_from_slice(&buf[..n]);
            if collected.len() >= b"onetwothree".len() {
                break;
            }
            sleep(Duration::from_millis(5));
        }
        assert_eq!(collected, b"onetwothree");
    }

    #[test]
    fn receive_on_empty_endpoint_returns_zero() {
        let mut a = Endpoint::new("empty", "127.0.0.1:16006", Role::Client).unwrap();
        a.init().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(a.receive(&mut buf).unwrap(), 0);
    }
}
