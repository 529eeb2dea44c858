//! # Command-Line Interface Module
//!
//! Argument parsing for the two standalone binaries built on top of this
//! crate: the tick coordinator and a demo tick client. Both use `clap`'s
//! derive API for type-safe parsing and automatic help generation.

use clap::builder::styling::{AnsiColor, Styles};
use clap::Parser;
use std::time::Duration;

/// Defines the styles for the help message to replicate clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Simulith Coordinator - the authoritative tick source for a co-simulation run.
///
/// Binds a broadcast address and a request/reply address, waits for the
/// configured number of clients to register, then drives simulated time
/// forward one tick at a time, pacing wall-clock progress at the configured
/// speed multiplier.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct CoordinatorArgs {
    /// Address the tick-broadcast channel binds to.
    #[arg(long, default_value = "0.0.0.0:50000")]
    pub pub_addr: String,

    /// Address the handshake/acknowledgment channel binds to.
    #[arg(long, default_value = "0.0.0.0:50001")]
    pub rep_addr: String,

    /// Number of distinct clients the coordinator waits for before the tick
    /// loop begins. Must be in `1..=32`.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub client_count: u32,

    /// Tick interval, e.g. "10ms", "1s". Must be nonzero.
    #[arg(short = 'i', long, default_value = "10ms", value_parser = parse_duration)]
    pub interval: Duration,

    /// Initial speed multiplier (simulated seconds per wall second).
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,
}

/// Simulith Client demo - connects to a coordinator, performs the handshake,
/// and logs each tick it receives.
///
/// This binary exists so the crate is runnable end-to-end without a real
/// simulator attached; production use embeds the `TickClient` type directly.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct ClientArgs {
    /// Coordinator tick-broadcast address to connect to.
    #[arg(long, default_value = "127.0.0.1:50000")]
    pub pub_addr: String,

    /// Coordinator handshake/acknowledgment address to connect to.
    #[arg(long, default_value = "127.0.0.1:50001")]
    pub rep_addr: String,

    /// Unique identifier this client registers under.
    #[arg(long)]
    pub id: String,

    /// Number of ticks to run before exiting. If unset, runs indefinitely.
    #[arg(long)]
    pub ticks: Option<u64>,
}

/// Parses a human-readable duration: a non-negative number optionally
/// suffixed with `ms`, `s`, `m`, or `h`. A bare number is treated as seconds.
///
/// ```rust
/// # use std::time::Duration;
/// # use simulith::cli::parse_duration;
/// assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("invalid number in duration: {num_str}"))?;

    if num < 0.0 {
        return Err("duration cannot be negative".to_string());
    }

    let duration = match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs_f64(num),
        "m" => Duration::from_secs_f64(num * 60.0),
        "h" => Duration::from_secs_f64(num * 3600.0),
        _ => return Err(format!("invalid duration unit: {unit}")),
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_durations() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn coordinator_args_parse_defaults() {
        let args = CoordinatorArgs::parse_from(["simulith-coordinator"]);
        assert_eq!(args.client_count, 1);
        assert_eq!(args.interval, Duration::from_millis(10));
        assert_eq!(args.speed, 1.0);
    }

    #[test]
    fn client_args_require_id() {
        let args = ClientArgs::parse_from(["simulith-client", "--id", "c1"]);
        assert_eq!(args.id, "c1");
        assert_eq!(args.ticks, None);
    }
}
