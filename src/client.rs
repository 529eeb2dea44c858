//! The Tick Client: a simple blocking "wait for next tick" primitive
//! embedded in each simulator process, paired with the one-time handshake
//! and the acknowledgment discipline that unblocks the coordinator.

use crate::error::{Result, SimulithError};
use std::future::Future;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_frame(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
    let len = (data.len() as u32).to_le_bytes();
    stream.write_all(&len).await?;
    stream.write_all(data).await?;
    Ok(())
}

/// Connects to a coordinator, performs the one-time handshake, and exposes
/// `wait_for_tick`/`run_loop` to the hosting simulator.
pub struct TickClient {
    id: String,
    pub_stream: TcpStream,
    rep_stream: TcpStream,
}

impl TickClient {
    /// Connects to both coordinator addresses. Fails with invalid-argument
    /// if `id` is empty, longer than [`crate::coordinator::MAX_CLIENT_ID_LEN`]
    /// printable characters, or contains non-printable bytes; fails with
    /// unavailable if either address cannot be connected.
    pub async fn initialize(
        pub_addr: impl ToSocketAddrs,
        rep_addr: impl ToSocketAddrs,
        id: impl Into<String>,
        rate_ns: u64,
    ) -> Result<Self> {
        let id = id.into();
        if !crate::coordinator::is_valid_client_id(&id) {
            return Err(SimulithError::InvalidArgument(format!(
                "client id must be 1..={} printable, non-space characters",
                crate::coordinator::MAX_CLIENT_ID_LEN
            )));
        }
        if rate_ns == 0 {
            return Err(SimulithError::InvalidArgument(
                "rate_ns must be nonzero".into(),
            ));
        }

        let pub_stream = TcpStream::connect(pub_addr)
            .await
            .map_err(|e| SimulithError::Unavailable(format!("connect publish channel: {e}")))?;
        let rep_stream = TcpStream::connect(rep_addr)
            .await
            .map_err(|e| SimulithError::Unavailable(format!("connect reply channel: {e}")))?;

        Ok(Self {
            id,
            pub_stream,
            rep_stream,
        })
    }

    /// Sends `READY <id>` and waits for a single reply. Succeeds only when
    /// the reply is exactly `ACK`.
    pub async fn handshake(&mut self) -> Result<()> {
        let request = format!("READY {}", self.id);
        write_frame(&mut self.rep_stream, request.as_bytes()).await?;
        let reply = read_frame(&mut self.rep_stream).await?;
        match reply.as_slice() {
            b"ACK" => {
                tracing::info!(id = self.id, "handshake acknowledged");
                Ok(())
            }
            b"DUP_ID" => Err(SimulithError::Protocol(format!(
                "client id '{}' already registered",
                self.id
            ))),
            b"ERR" => Err(SimulithError::Protocol("malformed handshake".into())),
            other => Err(SimulithError::Protocol(format!(
                "unexpected handshake reply: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// Receives one tick broadcast, sends this client's id as
    /// acknowledgment, waits for the `ACK` reply, and returns the tick
    /// value in nanoseconds.
    pub async fn wait_for_tick(&mut self) -> Result<u64> {
        let mut frame = [0u8; 8];
        self.pub_stream.read_exact(&mut frame).await?;
        let tick_ns = u64::from_le_bytes(frame);

        write_frame(&mut self.rep_stream, self.id.as_bytes()).await?;
        let reply = read_frame(&mut self.rep_stream).await?;
        if reply != b"ACK" {
            return Err(SimulithError::Protocol(format!(
                "unexpected ack reply: {:?}",
                String::from_utf8_lossy(&reply)
            )));
        }
        Ok(tick_ns)
    }

    /// Repeatedly calls `wait_for_tick` and invokes `callback` between
    /// receipt and acknowledgment. The callback for tick k is guaranteed to
    /// complete before the acknowledgment for tick k is sent.
    pub async fn run_loop<F, Fut>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            let tick_ns = self.receive_tick().await?;
            callback(tick_ns).await;
            self.acknowledge().await?;
        }
    }

    async fn receive_tick(&mut self) -> Result<u64> {
        let mut frame = [0u8; 8];
        self.pub_stream.read_exact(&mut frame).await?;
        Ok(u64::from_le_bytes(frame))
    }

    async fn acknowledge(&mut self) -> Result<()> {
        write_frame(&mut self.rep_stream, self.id.as_bytes()).await?;
        let reply = read_frame(&mut self.rep_stream).await?;
        if reply != b"ACK" {
            return Err(SimulithError::Protocol(format!(
                "unexpected ack reply: {:?}",
                String::from_utf8_lossy(&reply)
            )));
        }
        Ok(())
    }

    /// Releases the underlying transports. The TCP streams close on drop;
    /// this exists to give the public contract an explicit, documented
    /// shutdown point.
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!(id = self.id, "client shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::TickCoordinator;

    #[tokio::test]
    async fn initialize_rejects_oversized_client_id() {
        let long_id = "x".repeat(crate::coordinator::MAX_CLIENT_ID_LEN + 1);
        let err = TickClient::initialize("127.0.0.1:1", "127.0.0.1:1", long_id, 10_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, SimulithError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn handshake_then_ticks_in_order() {
        let mut coordinator = TickCoordinator::initialize(
            "127.0.0.1:40100",
            "127.0.0.1:40101",
            1,
            10_000_000,
        )
        .await
        .unwrap();

        let server = tokio::spawn(async move {
            coordinator.run().await.unwrap();
        });

        let mut client = TickClient::initialize("127.0.0.1:40100", "127.0.0.1:40101", "c1", 10_000_000)
            .await
            .unwrap();
        client.handshake().await.unwrap();

        let mut ticks = Vec::new();
        for _ in 0..5 {
            ticks.push(client.wait_for_tick().await.unwrap());
        }
        assert_eq!(ticks, vec![0, 10_000_000, 20_000_000, 30_000_000, 40_000_000]);

        server.abort();
    }

    #[tokio::test]
    async fn duplicate_handshake_id_is_rejected() {
        let mut coordinator = TickCoordinator::initialize(
            "127.0.0.1:40110",
            "127.0.0.1:40111",
            2,
            10_000_000,
        )
        .await
        .unwrap();
        let server = tokio::spawn(async move {
            coordinator.run().await.unwrap();
        });

        let mut first = TickClient::initialize("127.0.0.1:40110", "127.0.0.1:40111", "dup", 10_000_000)
            .await
            .unwrap();
        first.handshake().await.unwrap();

        let mut second = TickClient::initialize("127.0.0.1:40110", "127.0.0.1:40111", "dup", 10_000_000)
            .await
            .unwrap();
        let err = second.handshake().await.unwrap_err();
        assert!(matches!(err, SimulithError::Protocol(_)));

        server.abort();
    }
}
