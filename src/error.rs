use thiserror::Error;

/// The error kinds surfaced by the coordinator, client, and peripheral
/// endpoint APIs.
///
/// A "would-block" condition (no data yet available on a non-blocking
/// receive) is never represented here: callers see it as `Ok(0)` bytes or
/// `Ok(false)`, matching the non-blocking contract of the peripheral
/// endpoint.
#[derive(Error, Debug)]
pub enum SimulithError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("receive buffer overflow, message dropped")]
    Overflow,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimulithError>;
