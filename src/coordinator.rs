//! The Tick Coordinator: the unique authority for simulated time and the
//! rendezvous point for every participating simulator.
//!
//! Communication happens over two bound TCP addresses: a broadcast channel
//! (coordinator writes, never reads) carrying the 8-byte little-endian tick
//! value, and a request/reply channel carrying the handshake and per-tick
//! acknowledgment vocabulary. Both channels reuse a length-prefixed framing
//! for request/reply traffic; the broadcast channel needs no framing since
//! every frame is a fixed 8 bytes.
//!
//! Every connection on both channels is read and written from the single
//! task that runs [`TickCoordinator::run`] — no per-connection task is ever
//! spawned. Reply-channel connections are polled with `TcpStream::try_read`,
//! the same non-blocking-receive discipline the peripheral endpoint uses
//! over its UDP sockets, so the registry and the tick barrier are only ever
//! touched from one place.

use crate::error::{Result, SimulithError};
use std::io;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Maximum number of clients a coordinator can register, mirroring the
/// original's fixed-size client table.
pub const MAX_CLIENTS: usize = 32;

/// Maximum length of a client identifier, mirroring the original's bounded
/// `char id[64]` registry field (63 printable bytes + NUL terminator).
pub const MAX_CLIENT_ID_LEN: usize = 63;

const MIN_SPEED: f64 = 1.0 / 64.0;
const MAX_SPEED: f64 = 1024.0;
const DIAG_INTERVAL_NS: u64 = 10_000_000_000;

type ConnId = usize;

struct ClientSlot {
    id: String,
    acknowledged: bool,
}

/// Operator commands recognized on the coordinator's standard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperatorCommand {
    TogglePause,
    SpeedUp,
    SpeedDown,
    Quit,
}

fn parse_operator_command(line: &str) -> Option<OperatorCommand> {
    let trimmed = line.trim();
    match trimmed {
        "p" => Some(OperatorCommand::TogglePause),
        "+" => Some(OperatorCommand::SpeedUp),
        "-" => Some(OperatorCommand::SpeedDown),
        "quit" => Some(OperatorCommand::Quit),
        _ => None,
    }
}

/// A client identifier is valid if it is non-empty, no longer than
/// [`MAX_CLIENT_ID_LEN`], and made up entirely of printable, non-space
/// ASCII characters (so it can never be confused with the `READY <id>`
/// framing's own separator).
pub(crate) fn is_valid_client_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_CLIENT_ID_LEN && id.chars().all(|c| c.is_ascii_graphic())
}

/// One reply-channel TCP connection, read with non-blocking polls from the
/// coordinator's single task. Frames are length-prefixed (`u32` little-
/// endian length, then that many bytes); `read_buf` accumulates partial
/// reads across polls.
struct ReplyConn {
    stream: TcpStream,
    read_buf: Vec<u8>,
    closed: bool,
}

impl ReplyConn {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: Vec::new(),
            closed: false,
        }
    }

    /// Attempts to assemble one complete frame without blocking. Returns
    /// `Ok(None)` if no complete frame is available yet (including the
    /// would-block case), `Ok(Some(frame))` once one is, and `Err` if the
    /// peer has gone away. Once a connection reports an error it is marked
    /// closed and every subsequent poll returns `Ok(None)` rather than
    /// re-logging the same failure.
    fn try_read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            if self.read_buf.len() >= 4 {
                let len = u32::from_le_bytes(self.read_buf[0..4].try_into().unwrap()) as usize;
                if self.read_buf.len() >= 4 + len {
                    let frame = self.read_buf[4..4 + len].to_vec();
                    self.read_buf.drain(0..4 + len);
                    return Ok(Some(frame));
                }
            }
            let mut scratch = [0u8; 4096];
            match self.stream.try_read(&mut scratch) {
                Ok(0) => {
                    self.closed = true;
                    return Err(io::Error::new(ErrorKind::UnexpectedEof, "peer closed connection"));
                }
                Ok(n) => self.read_buf.extend_from_slice(&scratch[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => {
                    self.closed = true;
                    return Err(e);
                }
            }
        }
    }

    async fn write_frame(&mut self, data: &[u8]) -> io::Result<()> {
        let len = (data.len() as u32).to_le_bytes();
        self.stream.write_all(&len).await?;
        self.stream.write_all(data).await?;
        Ok(())
    }
}

/// Owns simulated time and drives the handshake and tick loop. Created by
/// [`TickCoordinator::initialize`], consumed by [`TickCoordinator::run`] and
/// [`TickCoordinator::shutdown`].
pub struct TickCoordinator {
    pub_listener: TcpListener,
    rep_listener: TcpListener,
    expected_clients: usize,
    interval_ns: u64,
    clients: Vec<ClientSlot>,
    current_time_ns: u64,
    paused: bool,
    speed: f64,
    broadcast_conns: Vec<TcpStream>,
    rep_conns: Vec<ReplyConn>,
    last_diag_sim_ns: u64,
    last_diag_wall: Option<Instant>,
    operator_rx: mpsc::UnboundedReceiver<String>,
}

impl TickCoordinator {
    /// Binds both addresses and prepares the coordinator to accept
    /// registrations. Fails if `client_count` is outside `1..=MAX_CLIENTS`,
    /// if `interval_ns` is zero, or if either address cannot be bound.
    pub async fn initialize(
        pub_addr: impl ToSocketAddrs,
        rep_addr: impl ToSocketAddrs,
        client_count: usize,
        interval_ns: u64,
    ) -> Result<Self> {
        if client_count == 0 || client_count > MAX_CLIENTS {
            return Err(SimulithError::InvalidArgument(format!(
                "client count must be in 1..={MAX_CLIENTS}, got {client_count}"
            )));
        }
        if interval_ns == 0 {
            return Err(SimulithError::InvalidArgument(
                "tick interval must be nonzero".into(),
            ));
        }

        let pub_listener = TcpListener::bind(pub_addr)
            .await
            .map_err(|e| SimulithError::Unavailable(format!("bind publish channel: {e}")))?;
        let rep_listener = TcpListener::bind(rep_addr)
            .await
            .map_err(|e| SimulithError::Unavailable(format!("bind reply channel: {e}")))?;

        let (operator_tx, operator_rx) = mpsc::unbounded_channel();
        spawn_operator_input_reader(operator_tx);

        tracing::info!(
            clients_expected = client_count,
            interval_ns,
            "simulith coordinator initialized"
        );

        Ok(Self {
            pub_listener,
            rep_listener,
            expected_clients: client_count,
            interval_ns,
            clients: Vec::with_capacity(MAX_CLIENTS),
            current_time_ns: 0,
            paused: false,
            speed: 1.0,
            broadcast_conns: Vec::with_capacity(client_count),
            rep_conns: Vec::new(),
            last_diag_sim_ns: 0,
            last_diag_wall: None,
            operator_rx,
        })
    }

    /// Overrides the coordinator's initial speed multiplier (e.g. from an
    /// operator-supplied CLI flag), clamped to the same `[2^-6, 2^10]`
    /// bounds the `+`/`-` operator commands respect. Call before [`run`](
    /// Self::run); the tick loop reads `self.speed` directly.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
        tracing::info!(speed = self.speed, "initial speed set");
    }

    /// Runs the handshake phase followed by the tick loop. Blocks
    /// indefinitely until the operator issues `quit`.
    pub async fn run(&mut self) -> Result<()> {
        self.accept_broadcast_connections().await?;
        self.handshake().await?;
        self.tick_loop().await
    }

    async fn accept_broadcast_connections(&mut self) -> Result<()> {
        tracing::info!("waiting for publish-channel connections...");
        while self.broadcast_conns.len() < self.expected_clients {
            let (stream, _addr) = self.pub_listener.accept().await?;
            self.broadcast_conns.push(stream);
        }
        Ok(())
    }

    /// Non-blocking attempt to accept one pending reply-channel connection.
    /// Races the accept against a short sleep so the single coordinator
    /// task never parks on it — callers interleave this with polling
    /// already-open connections in the same loop.
    async fn try_accept_reply_connection(&mut self) {
        tokio::select! {
            biased;
            accepted = self.rep_listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => self.rep_conns.push(ReplyConn::new(stream)),
                    Err(e) => tracing::warn!(error = %e, "reply-channel accept failed"),
                }
            }
            _ = tokio::time::sleep(Duration::from_micros(200)) => {}
        }
    }

    async fn reply(&mut self, conn: ConnId, payload: &[u8]) {
        if let Err(e) = self.rep_conns[conn].write_frame(payload).await {
            tracing::warn!(conn, error = %e, "failed to send reply");
        }
    }

    fn slot_for_id(&mut self, id: &str) -> Option<&mut ClientSlot> {
        self.clients.iter_mut().find(|c| c.id == id)
    }

    /// Reads request messages until exactly `expected_clients` distinct
    /// registrations have been accepted. New reply-channel connections
    /// (including ones that only ever send a duplicate or malformed
    /// request) are accepted for as long as the handshake is incomplete.
    async fn handshake(&mut self) -> Result<()> {
        tracing::info!("waiting for clients to be ready...");
        while self.clients.len() < self.expected_clients {
            self.try_accept_reply_connection().await;

            let mut progressed = false;
            for idx in 0..self.rep_conns.len() {
                match self.rep_conns[idx].try_read_frame() {
                    Ok(Some(payload)) => {
                        progressed = true;
                        self.handle_handshake_request(idx, &payload).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(conn = idx, error = %e, "reply connection lost during handshake");
                    }
                }
            }
            if !progressed {
                tokio::task::yield_now().await;
            }
        }
        tracing::info!("all clients ready, starting tick broadcast");
        Ok(())
    }

    async fn handle_handshake_request(&mut self, conn: ConnId, payload: &[u8]) {
        let text = String::from_utf8_lossy(payload);

        let Some(id) = text.strip_prefix("READY ").map(str::to_string) else {
            tracing::warn!(message = %text, "invalid handshake message");
            self.reply(conn, b"ERR").await;
            return;
        };
        if !is_valid_client_id(&id) {
            tracing::warn!(id, "invalid client id (empty, too long, or non-printable)");
            self.reply(conn, b"ERR").await;
            return;
        }
        if self.clients.iter().any(|c| c.id == id) {
            tracing::warn!(id, "rejecting duplicate client id");
            self.reply(conn, b"DUP_ID").await;
            return;
        }
        self.clients.push(ClientSlot {
            id: id.clone(),
            acknowledged: false,
        });
        self.reply(conn, b"ACK").await;
        tracing::info!(
            id,
            registered = self.clients.len(),
            expected = self.expected_clients,
            "registered client"
        );
    }

    fn all_acknowledged(&self) -> bool {
        self.clients.iter().all(|c| c.acknowledged)
    }

    fn reset_acknowledgments(&mut self) {
        for c in &mut self.clients {
            c.acknowledged = false;
        }
    }

    async fn broadcast_tick(&mut self) -> Result<()> {
        let frame = self.current_time_ns.to_le_bytes();
        for conn in &mut self.broadcast_conns {
            if let Err(e) = conn.write_all(&frame).await {
                tracing::warn!(error = %e, "broadcast write failed");
            }
        }
        self.maybe_log_diagnostics();
        Ok(())
    }

    fn maybe_log_diagnostics(&mut self) {
        if self.current_time_ns.saturating_sub(self.last_diag_sim_ns) < DIAG_INTERVAL_NS {
            return;
        }
        let now = Instant::now();
        if let Some(last_wall) = self.last_diag_wall {
            let sim_elapsed = (self.current_time_ns - self.last_diag_sim_ns) as f64 / 1e9;
            let real_elapsed = now.duration_since(last_wall).as_secs_f64();
            let actual_speed = if real_elapsed > 0.0 {
                sim_elapsed / real_elapsed
            } else {
                0.0
            };
            tracing::info!(
                sim_time_s = self.current_time_ns as f64 / 1e9,
                attempted_speed = self.speed,
                actual_speed,
                "simulation progress"
            );
        }
        self.last_diag_sim_ns = self.current_time_ns;
        self.last_diag_wall = Some(now);
    }

    fn apply_operator_command(&mut self, cmd: OperatorCommand) {
        match cmd {
            OperatorCommand::TogglePause => {
                self.paused = !self.paused;
                tracing::info!(paused = self.paused, "pause toggled");
            }
            OperatorCommand::SpeedUp => {
                self.speed = (self.speed * 2.0).min(MAX_SPEED);
                tracing::info!(speed = self.speed, "speed increased");
            }
            OperatorCommand::SpeedDown => {
                self.speed = (self.speed / 2.0).max(MIN_SPEED);
                tracing::info!(speed = self.speed, "speed decreased");
            }
            OperatorCommand::Quit => {}
        }
    }

    fn poll_operator_input(&mut self) -> Option<OperatorCommand> {
        while let Ok(line) = self.operator_rx.try_recv() {
            if let Some(cmd) = parse_operator_command(&line) {
                return Some(cmd);
            }
            tracing::warn!(input = %line, "unknown operator command");
        }
        None
    }

    /// Runs the handshake-complete tick loop until `quit` is received.
    async fn tick_loop(&mut self) -> Result<()> {
        self.reset_acknowledgments();
        loop {
            if let Some(cmd) = self.poll_operator_input() {
                if cmd == OperatorCommand::Quit {
                    tracing::info!("exiting simulation");
                    return Ok(());
                }
                self.apply_operator_command(cmd);
            }

            if self.paused {
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }

            let start = Instant::now();
            self.broadcast_tick().await?;
            self.reset_acknowledgments();

            if !self.collect_acknowledgments().await? {
                // `quit` was issued mid-barrier.
                return Ok(());
            }

            self.pace(start).await;
            self.current_time_ns += self.interval_ns;
        }
    }

    /// Collects acknowledgments until every expected client has responded.
    /// Returns `false` if the operator quit mid-collection. Every reply
    /// connection is polled in turn from this same task — no background
    /// task ever touches the registry.
    async fn collect_acknowledgments(&mut self) -> Result<bool> {
        let mut cli_check_counter: u64 = 0;
        while !self.all_acknowledged() {
            let mut progressed = false;
            for idx in 0..self.rep_conns.len() {
                match self.rep_conns[idx].try_read_frame() {
                    Ok(Some(payload)) => {
                        progressed = true;
                        let client_id = String::from_utf8_lossy(&payload).to_string();
                        if let Some(slot) = self.slot_for_id(&client_id) {
                            slot.acknowledged = true;
                        } else {
                            tracing::warn!(client_id, "ack received from unknown client");
                        }
                        self.reply(idx, b"ACK").await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(conn = idx, error = %e, "reply connection lost during ack collection");
                    }
                }
            }
            if !progressed {
                self.yield_for_speed().await;
            }

            let cli_check_interval = if self.speed >= 256.0 {
                50_000
            } else if self.speed >= 128.0 {
                20_000
            } else if self.speed >= 64.0 {
                10_000
            } else if self.speed >= 16.0 {
                1_000
            } else {
                100
            };
            cli_check_counter += 1;
            if cli_check_counter % cli_check_interval == 0 {
                if let Some(cmd) = self.poll_operator_input() {
                    if cmd == OperatorCommand::Quit {
                        return Ok(false);
                    }
                    self.apply_operator_command(cmd);
                }
            }
        }
        Ok(true)
    }

    /// The tiered yield strategy used while polling for acknowledgments:
    /// spin at very high speed, yield the scheduler at medium speed, sleep
    /// ~1us at low speed, so wake-up jitter never swamps a short tick
    /// interval.
    async fn yield_for_speed(&self) {
        if self.speed >= 128.0 {
            std::hint::spin_loop();
        } else if self.speed >= 16.0 {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(Duration::from_micros(1)).await;
        }
    }

    /// The tiered pacing strategy for wall-clock progress between ticks.
    async fn pace(&self, start: Instant) {
        if self.speed <= 0.0 {
            return;
        }
        let target_ns = (self.interval_ns as f64 / self.speed).round().max(0.0) as u64;
        let elapsed_ns = start.elapsed().as_nanos() as u64;
        if elapsed_ns >= target_ns {
            return;
        }
        let residual_ns = target_ns - elapsed_ns;
        if self.speed >= 256.0 {
            // Run flat out; no wait.
        } else if self.speed >= 64.0 {
            let deadline = start + Duration::from_nanos(target_ns);
            while Instant::now() < deadline {
                std::hint::spin_loop();
            }
        } else {
            tokio::time::sleep(Duration::from_nanos(residual_ns)).await;
        }
    }

    /// Closes transports and releases resources. Safe to call after a
    /// failed initialize.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.broadcast_conns.clear();
        self.rep_conns.clear();
        tracing::info!("simulith coordinator shut down");
        Ok(())
    }
}

fn spawn_operator_input_reader(tx: mpsc::UnboundedSender<String>) {
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.clone()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}
