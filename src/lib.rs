//! Minecraft Server List Ping client.
//!
//! Queries a server's status over raw TCP using either the modern JSON
//! protocol (1.7+) or the legacy kick-packet protocol (1.6 and older):
//!
//! ```no_run
//! # async fn run() -> Result<(), slping::PingError> {
//! use std::time::Duration;
//!
//! let status = slping::ping("mc.example.net", 25565, Duration::from_secs(5)).await?;
//! println!("{} ({}/{})", status.description, status.players.online, status.players.max);
//! # Ok(())
//! # }
//! ```
//!
//! The two protocols are never mixed on their own: [`ping`] and
//! [`legacy_ping`] each speak exactly one, and [`ping_with_fallback`] is the
//! explicit opt-in for trying modern first and legacy second.

pub mod batch;
pub mod error;
pub mod pinging;
pub mod resolution;

use std::time::Duration;

use log::debug;
use serde::Serialize;

pub use crate::{
    batch::{BatchProber, ProbeOutcome},
    error::PingError,
    pinging::{
        mc_legacy::{LegacyPingResult, LegacyPinger},
        mc_modern::{ping_json::PingResult, ModernPinger},
        PingOptions, Pinger, ServerAddress, DEFAULT_PORT, DEFAULT_TIMEOUT,
    },
};

/// Pings `host:port` with the modern status protocol.
pub async fn ping(host: &str, port: u16, timeout: Duration) -> Result<PingResult, PingError> {
    ModernPinger::new(PingOptions::with_timeout(timeout))
        .ping(&ServerAddress::new(host, port))
        .await
}

/// Pings `host:port` with the legacy (pre-1.7) protocol.
pub async fn legacy_ping(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<LegacyPingResult, PingError> {
    LegacyPinger::new(PingOptions::with_timeout(timeout))
        .ping(&ServerAddress::new(host, port))
        .await
}

/// Pings every address concurrently with the modern protocol and returns
/// once all of them have settled, in completion order.
pub async fn probe_batch(
    addresses: Vec<ServerAddress>,
    timeout: Duration,
) -> Vec<ProbeOutcome<ServerAddress, PingResult>> {
    BatchProber::new(ModernPinger::new(PingOptions::with_timeout(timeout)))
        .probe(addresses)
        .await
}

/// A status from whichever protocol answered.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ServerStatus {
    Modern(PingResult),
    Legacy(LegacyPingResult),
}

impl ServerStatus {
    pub fn description(&self) -> &str {
        match self {
            ServerStatus::Modern(status) => &status.description,
            ServerStatus::Legacy(status) => &status.description,
        }
    }

    pub fn latency_ms(&self) -> u32 {
        match self {
            ServerStatus::Modern(status) => status.latency_ms,
            ServerStatus::Legacy(status) => status.latency_ms,
        }
    }
}

/// Tries the modern protocol, then the legacy one on a fresh connection with
/// a fresh timeout.
///
/// Refused connections and DNS failures are not retried, since the legacy
/// protocol would fail the same way. If both protocols fail, the modern
/// error is returned.
pub async fn ping_with_fallback(
    address: &ServerAddress,
    options: &PingOptions,
) -> Result<ServerStatus, PingError> {
    let modern_error = match ModernPinger::new(options.clone()).ping(address).await {
        Ok(status) => return Ok(ServerStatus::Modern(status)),
        Err(e @ (PingError::ConnectionRefused(_) | PingError::DnsResolutionFailed(_))) => {
            return Err(e)
        }
        Err(e) => e,
    };

    debug!("modern ping of {address} failed ({modern_error}), trying legacy");
    LegacyPinger::new(options.clone())
        .ping(address)
        .await
        .map(ServerStatus::Legacy)
        .map_err(|_| modern_error)
}
