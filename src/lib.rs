//! # Simulith
//!
//! A discrete-time co-simulation core: a tick synchronizer that binds many
//! independent simulator processes to a single shared simulated-time axis,
//! and a peripheral transport fabric that emulates non-blocking hardware
//! buses between simulator pairs.

pub mod cli;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod peripheral;

pub use client::TickClient;
pub use coordinator::TickCoordinator;
pub use error::{Result, SimulithError};

/// The current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Well-known defaults matching the reference deployment.
pub mod defaults {
    /// Coordinator publish (tick broadcast) port.
    pub const COORDINATOR_PUB_PORT: u16 = 50000;

    /// Coordinator reply (handshake/acknowledgment) port.
    pub const COORDINATOR_REP_PORT: u16 = 50001;

    /// Default tick interval: 10 milliseconds of simulated time per tick.
    pub const INTERVAL_NS: u64 = 10_000_000;

    /// Maximum number of clients a coordinator will register.
    pub const MAX_CLIENTS: usize = crate::coordinator::MAX_CLIENTS;

    /// Maximum length, in printable characters, of a client identifier.
    pub const MAX_CLIENT_ID_LEN: usize = crate::coordinator::MAX_CLIENT_ID_LEN;
}
