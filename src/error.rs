use std::io;

use thiserror::Error;

use crate::pinging::mc_modern::{helpers::ProtocolError, StatusState};

/// Every way a single ping can fail.
///
/// A ping never panics or throws past this type: the batch prober hands one of
/// these back per server so callers can mark that server offline and move on.
#[derive(Error, Debug)]
pub enum PingError {
    /// The host name could not be resolved, and connecting with the literal
    /// host name failed as well.
    #[error("could not resolve host {0}")]
    DnsResolutionFailed(String),

    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    /// The deadline passed before the server sent a single byte.
    #[error("timed out waiting for the server")]
    ConnectionTimeout,

    /// The deadline passed part way through the response.
    #[error("timed out reading the server response")]
    ReadTimeout,

    #[error("VarInt longer than 5 bytes")]
    MalformedVarInt,

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("invalid status JSON")]
    JsonDecodeError(#[from] serde_json::Error),

    /// The host name does not fit the length field of the legacy
    /// `MC|PingHost` message.
    #[error("host name of {0} UTF-16 units is too long for a legacy ping")]
    HostnameTooLong(usize),

    #[error("malformed legacy response: {0}")]
    LegacyResponseMalformed(String),

    #[error("status sequence in unexpected state {0:?}")]
    UnknownProtocolState(StatusState),

    #[error("connection closed before a complete response arrived")]
    ConnectionClosed,

    #[error("ping cancelled")]
    Cancelled,

    #[error("IO error during ping")]
    Io(#[from] io::Error),
}

impl PingError {
    /// Whether this failure came from the deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PingError::ConnectionTimeout | PingError::ReadTimeout)
    }
}

impl From<ProtocolError> for PingError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::VarIntTooLarge => PingError::MalformedVarInt,
            ProtocolError::Incomplete => {
                PingError::MalformedPacket("packet ended unexpectedly".to_owned())
            }
            ProtocolError::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                PingError::MalformedPacket("packet ended unexpectedly".to_owned())
            }
            ProtocolError::IoError(e) => PingError::Io(e),
        }
    }
}
