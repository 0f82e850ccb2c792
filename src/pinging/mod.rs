pub mod connection;
pub mod mc_legacy;
pub mod mc_modern;

use std::{fmt, future::Future, str::FromStr, time::Duration};

use serde::Serialize;

use crate::error::PingError;

pub const DEFAULT_PORT: u16 = 25565;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Protocol version sent in the modern handshake. Servers answer status
/// requests regardless of what version the client claims.
pub const DEFAULT_PROTOCOL_VERSION: i32 = 47;

/// Protocol byte sent in the 1.6 `MC|PingHost` extension (1.6.4).
pub const DEFAULT_LEGACY_PROTOCOL_VERSION: u8 = 78;

pub trait Pinger {
    /// The data returned from a ping.
    type Data;

    /// Pings `target` once. The whole exchange, DNS included, is bounded by
    /// the pinger's timeout.
    fn ping(
        &self,
        target: &ServerAddress,
    ) -> impl Future<Output = Result<Self::Data, PingError>> + Send;
}

/// Knobs shared by the modern and legacy pingers.
#[derive(Debug, Clone)]
pub struct PingOptions {
    /// One budget for resolve, connect, write and the entire read phase.
    pub timeout: Duration,
    pub protocol_version: i32,
    pub legacy_protocol_version: u8,
    /// Follow `_minecraft._tcp` SRV records before the A lookup.
    pub srv_lookup: bool,
    /// Append the 1.6 `MC|PingHost` extension to the legacy request.
    pub legacy_ping_host: bool,
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            legacy_protocol_version: DEFAULT_LEGACY_PROTOCOL_VERSION,
            srv_lookup: true,
            legacy_ping_host: false,
        }
    }
}

impl PingOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// A ping target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("empty server address")]
    Empty,
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
}

impl FromStr for ServerAddress {
    type Err = AddressParseError;

    /// Accepts `host`, `host:port`, `v6` and `[v6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressParseError::Empty);
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| AddressParseError::InvalidPort(s.to_owned()))?;
            let port = match after.strip_prefix(':') {
                Some(port) => port
                    .parse()
                    .map_err(|_| AddressParseError::InvalidPort(s.to_owned()))?,
                None if after.is_empty() => DEFAULT_PORT,
                None => return Err(AddressParseError::InvalidPort(s.to_owned())),
            };
            return Ok(Self::new(host, port));
        }

        match s.rsplit_once(':') {
            // more than one colon and no brackets: a bare IPv6 address
            Some((host, _)) if host.contains(':') => Ok(Self::new(s, DEFAULT_PORT)),
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| AddressParseError::InvalidPort(s.to_owned()))?;
                if host.is_empty() {
                    return Err(AddressParseError::Empty);
                }
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_addresses() {
        assert_eq!(
            "mc.example.net".parse::<ServerAddress>().unwrap(),
            ServerAddress::new("mc.example.net", 25565)
        );
        assert_eq!(
            " 127.0.0.1:25570 ".parse::<ServerAddress>().unwrap(),
            ServerAddress::new("127.0.0.1", 25570)
        );
        assert_eq!(
            "[::1]:25566".parse::<ServerAddress>().unwrap(),
            ServerAddress::new("::1", 25566)
        );
        assert_eq!(
            "::1".parse::<ServerAddress>().unwrap(),
            ServerAddress::new("::1", 25565)
        );
    }

    #[test]
    fn rejects_bad_addresses() {
        assert_eq!("".parse::<ServerAddress>(), Err(AddressParseError::Empty));
        assert!(matches!(
            "host:abc".parse::<ServerAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
        assert!(matches!(
            "host:70000".parse::<ServerAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
    }

    #[test]
    fn displays_with_port() {
        assert_eq!(ServerAddress::new("a.b", 1).to_string(), "a.b:1");
        assert_eq!(ServerAddress::new("::1", 2).to_string(), "[::1]:2");
    }
}
