use std::future::Future;

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use serde::Serialize;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::Instant,
};

use super::{
    connection::Connection, mc_modern::ping_json::PingVersion, PingOptions, Pinger,
    ServerAddress,
};
use crate::error::PingError;

const KICK_PACKET_ID: u8 = 0xFF;
const PLUGIN_MESSAGE_ID: u8 = 0xFA;
const PING_HOST_CHANNEL: &str = "MC|PingHost";
const LEGACY_MAGIC: &str = "§1";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LegacyPlayers {
    pub online: i32,
    pub max: i32,
}

/// A successful pre-1.7 ping. Legacy servers send neither a favicon nor a
/// player sample.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPingResult {
    pub online: bool,
    pub version: PingVersion,
    pub players: LegacyPlayers,
    pub description: String,
    pub latency_ms: u32,
}

/// Builds the legacy request: `FE 01`, optionally followed by the 1.6
/// `MC|PingHost` plugin message naming the host we meant to reach.
///
/// The message length is a `u16` covering the host name, so host names over
/// [`MAX_PING_HOST_UNITS`] UTF-16 units are [`PingError::HostnameTooLong`].
pub fn legacy_request(ping_host: Option<(&str, u16, u8)>) -> Result<Vec<u8>, PingError> {
    let mut request = vec![0xFE, 0x01];

    if let Some((hostname, port, protocol_version)) = ping_host {
        let channel = PING_HOST_CHANNEL.encode_utf16().collect::<Vec<_>>();
        let hostname = hostname.encode_utf16().collect::<Vec<_>>();
        if hostname.len() > MAX_PING_HOST_UNITS {
            return Err(PingError::HostnameTooLong(hostname.len()));
        }

        request.push(PLUGIN_MESSAGE_ID);
        push_utf16(&mut request, &channel);
        // protocol byte + host length + host + port
        let data_len = 7 + 2 * hostname.len();
        request.extend_from_slice(&(data_len as u16).to_be_bytes());
        request.push(protocol_version);
        push_utf16(&mut request, &hostname);
        request.extend_from_slice(&u32::from(port).to_be_bytes());
    }

    Ok(request)
}

/// Longest host name, in UTF-16 units, whose `MC|PingHost` data length still
/// fits in a `u16`.
pub const MAX_PING_HOST_UNITS: usize = (u16::MAX as usize - 7) / 2;

/// Writes a `u16` unit count followed by the units. Callers keep `units`
/// within `u16::MAX`.
fn push_utf16(out: &mut Vec<u8>, units: &[u16]) {
    out.extend_from_slice(&(units.len() as u16).to_be_bytes());
    for unit in units {
        out.extend_from_slice(&unit.to_be_bytes());
    }
}

/// Parses a kick packet from the front of `buf`.
///
/// Returns `Ok(None)` while the packet is still incomplete.
pub fn parse_kick_packet(buf: &[u8]) -> Result<Option<LegacyPingResult>, PingError> {
    let Some(&lead) = buf.first() else {
        return Ok(None);
    };
    if lead != KICK_PACKET_ID {
        return Err(PingError::LegacyResponseMalformed(format!(
            "received packet id {lead:#04x}, expected {KICK_PACKET_ID:#04x}"
        )));
    }
    if buf.len() < 3 {
        return Ok(None);
    }

    let units = BigEndian::read_u16(&buf[1..3]) as usize;
    let end = 3 + units * 2;
    if buf.len() < end {
        return Ok(None);
    }

    let mut utf16 = vec![0u16; units];
    BigEndian::read_u16_into(&buf[3..end], &mut utf16);
    let text = String::from_utf16(&utf16)
        .map_err(|_| PingError::LegacyResponseMalformed("invalid UTF-16 string".to_owned()))?;

    parse_legacy_fields(&text).map(Some)
}

/// Splits the NUL-delimited kick message
/// `§1 / protocol / version / motd / online / max`.
pub fn parse_legacy_fields(text: &str) -> Result<LegacyPingResult, PingError> {
    let fields = text.split('\0').collect::<Vec<_>>();
    if fields.len() < 6 {
        return Err(PingError::LegacyResponseMalformed(format!(
            "expected 6 fields, got {}",
            fields.len()
        )));
    }
    if fields[0] != LEGACY_MAGIC {
        return Err(PingError::LegacyResponseMalformed(format!(
            "unexpected reply from server: {}",
            fields[0]
        )));
    }

    let number = |name: &str, value: &str| {
        value.trim().parse::<i32>().map_err(|_| {
            PingError::LegacyResponseMalformed(format!("{name} is not a number: {value:?}"))
        })
    };

    Ok(LegacyPingResult {
        online: true,
        version: PingVersion {
            name: fields[2].to_owned(),
            protocol: number("protocol version", fields[1])?,
        },
        players: LegacyPlayers {
            online: number("online count", fields[4])?,
            max: number("max count", fields[5])?,
        },
        description: fields[3].to_owned(),
        latency_ms: 0,
    })
}

/// Sends the legacy request and reads the kick packet.
pub async fn legacy_exchange<S>(
    connection: &mut Connection<S>,
    request: &[u8],
) -> Result<LegacyPingResult, PingError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    connection.write_all(request).await?;

    let mut response = vec![];
    loop {
        if let Some(mut result) = parse_kick_packet(&response)? {
            result.latency_ms = connection.elapsed_ms();
            return Ok(result);
        }
        let chunk = connection.read_chunk().await?;
        response.extend_from_slice(chunk);
    }
}

/// Pings servers with the pre-1.7 kick-packet protocol.
#[derive(Debug, Clone, Default)]
pub struct LegacyPinger {
    pub options: PingOptions,
}

impl LegacyPinger {
    pub fn new(options: PingOptions) -> Self {
        Self { options }
    }
}

impl Pinger for LegacyPinger {
    type Data = LegacyPingResult;

    fn ping(
        &self,
        target: &ServerAddress,
    ) -> impl Future<Output = Result<Self::Data, PingError>> + Send {
        let options = self.options.clone();
        let target = target.clone();
        async move {
            let deadline = Instant::now() + options.timeout;
            debug!("legacy pinging {target}");

            let ping_host = options.legacy_ping_host.then_some((
                target.host.as_str(),
                target.port,
                options.legacy_protocol_version,
            ));
            let request = legacy_request(ping_host)?;

            let mut connection = Connection::open(&target, &options, deadline).await?;
            let result = legacy_exchange(&mut connection, &request).await?;
            drop(connection);

            debug!("{target} answered in {}ms", result.latency_ms);
            Ok(result)
        }
    }
}
