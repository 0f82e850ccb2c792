use std::{future::Future, io::Cursor};

use log::{debug, trace};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::Instant,
};

use self::{
    framing::{Packet, PacketBuffer},
    helpers::{McModernValue, ProtocolError, VarInt},
    ping_json::{PingResponse, PingResult},
};
use super::{connection::Connection, PingOptions, Pinger, ServerAddress};
use crate::error::PingError;

pub mod framing;
pub mod helpers;
pub mod ping_json;

const HANDSHAKE_ID: u32 = 0x00;
const STATUS_REQUEST_ID: u32 = 0x00;
const STATUS_RESPONSE_ID: u32 = 0x00;
const NEXT_STATE_STATUS: u32 = 1;

/// Where a status exchange currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    Idle,
    Connected,
    HandshakeSent,
    StatusRequestSent,
    AwaitingFrame,
    Parsed,
    Failed,
}

pub fn handshake_packet(
    hostname: &str,
    port: u16,
    protocol_version: i32,
) -> Result<Packet, ProtocolError> {
    let mut payload = vec![];
    // negative versions (-1 is "unknown") go out as their two's complement
    VarInt(protocol_version as u32).write_to(&mut payload)?;
    hostname.to_owned().write_to(&mut payload)?;
    port.write_to(&mut payload)?;
    VarInt(NEXT_STATE_STATUS).write_to(&mut payload)?;
    Ok(Packet::new(HANDSHAKE_ID, payload))
}

pub fn status_request_packet() -> Packet {
    Packet::new(STATUS_REQUEST_ID, vec![])
}

/// Drives handshake, status request and status response over one connection.
#[derive(Debug)]
pub struct StatusSequence {
    state: StatusState,
    packets: PacketBuffer,
}

impl Default for StatusSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSequence {
    pub fn new() -> Self {
        Self {
            state: StatusState::Idle,
            packets: PacketBuffer::new(),
        }
    }

    pub fn state(&self) -> StatusState {
        self.state
    }

    fn transition(&mut self, from: StatusState, to: StatusState) -> Result<(), PingError> {
        if self.state != from {
            let actual = self.state;
            self.state = StatusState::Failed;
            return Err(PingError::UnknownProtocolState(actual));
        }
        trace!("status sequence {from:?} -> {to:?}");
        self.state = to;
        Ok(())
    }

    /// Runs the whole exchange. Any error leaves the sequence in
    /// [`StatusState::Failed`].
    pub async fn run<S>(
        &mut self,
        connection: &mut Connection<S>,
        hostname: &str,
        port: u16,
        protocol_version: i32,
    ) -> Result<PingResponse, PingError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let result = self
            .exchange(connection, hostname, port, protocol_version)
            .await;
        if result.is_err() {
            self.state = StatusState::Failed;
        }
        result
    }

    async fn exchange<S>(
        &mut self,
        connection: &mut Connection<S>,
        hostname: &str,
        port: u16,
        protocol_version: i32,
    ) -> Result<PingResponse, PingError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.transition(StatusState::Idle, StatusState::Connected)?;

        // both requests go out before anything is read
        let handshake = handshake_packet(hostname, port, protocol_version)?;
        connection.write_all(&handshake.encode()).await?;
        self.transition(StatusState::Connected, StatusState::HandshakeSent)?;

        connection.write_all(&status_request_packet().encode()).await?;
        self.transition(StatusState::HandshakeSent, StatusState::StatusRequestSent)?;

        self.transition(StatusState::StatusRequestSent, StatusState::AwaitingFrame)?;
        let packet = loop {
            if let Some(packet) = self.packets.next_packet()? {
                break packet;
            }
            let chunk = connection.read_chunk().await?;
            self.packets.push(chunk);
        };

        self.decode_status(packet)
    }

    /// Checks the packet id and parses the JSON body of a status response.
    pub fn decode_status(&mut self, packet: Packet) -> Result<PingResponse, PingError> {
        if packet.id != STATUS_RESPONSE_ID {
            return Err(PingError::MalformedPacket(format!(
                "received wrong packet id {:#04x}, expected {STATUS_RESPONSE_ID:#04x}",
                packet.id
            )));
        }

        let json = String::read_from(&mut Cursor::new(&packet.payload))?;
        trace!("status JSON is {} bytes", json.len());
        let response: PingResponse = serde_json::from_str(&json)?;

        self.transition(StatusState::AwaitingFrame, StatusState::Parsed)?;
        Ok(response)
    }
}

/// Pings servers with the 1.7+ JSON status protocol.
#[derive(Debug, Clone, Default)]
pub struct ModernPinger {
    pub options: PingOptions,
}

impl ModernPinger {
    pub fn new(options: PingOptions) -> Self {
        Self { options }
    }
}

impl Pinger for ModernPinger {
    type Data = PingResult;

    fn ping(
        &self,
        target: &ServerAddress,
    ) -> impl Future<Output = Result<Self::Data, PingError>> + Send {
        let options = self.options.clone();
        let target = target.clone();
        async move {
            let deadline = Instant::now() + options.timeout;
            debug!("pinging {target}");

            let mut connection = Connection::open(&target, &options, deadline).await?;
            let response = StatusSequence::new()
                .run(
                    &mut connection,
                    &target.host,
                    target.port,
                    options.protocol_version,
                )
                .await?;
            let latency_ms = connection.elapsed_ms();
            drop(connection);

            debug!("{target} answered in {latency_ms}ms");
            Ok(PingResult::from_response(response, latency_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;

    const STATUS_JSON: &str = r#"{"version":{"name":"1.20.4","protocol":765},"players":{"online":3,"max":20},"description":"A Minecraft Server"}"#;

    fn status_response(json: &str) -> Vec<u8> {
        let mut payload = vec![];
        json.to_owned().write_to(&mut payload).unwrap();
        Packet::new(STATUS_RESPONSE_ID, payload).encode()
    }

    #[test]
    fn handshake_layout() {
        let packet = handshake_packet("localhost", 25565, 765).unwrap();
        let mut expected = vec![0xFD, 0x05, 0x09];
        expected.extend_from_slice(b"localhost");
        expected.extend_from_slice(&[0x63, 0xDD, 0x01]);
        assert_eq!(packet.id, 0x00);
        assert_eq!(packet.payload, expected);
    }

    #[tokio::test]
    async fn exchange_over_a_trickling_stream() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client, Instant::now() + Duration::from_secs(5));

        let server_task = tokio::spawn(async move {
            let handshake = handshake_packet("localhost", 25565, 765).unwrap().encode();
            let request = status_request_packet().encode();
            let mut received = vec![0; handshake.len() + request.len()];
            server.read_exact(&mut received).await.unwrap();
            assert_eq!(received, [handshake, request].concat());

            for byte in status_response(STATUS_JSON) {
                server.write_all(&[byte]).await.unwrap();
                server.flush().await.unwrap();
            }
            server
        });

        let mut sequence = StatusSequence::new();
        let response = sequence
            .run(&mut connection, "localhost", 25565, 765)
            .await
            .unwrap();
        assert_eq!(sequence.state(), StatusState::Parsed);

        let result = PingResult::from_response(response, connection.elapsed_ms());
        assert!(result.online);
        assert_eq!(result.players.online, 3);
        assert_eq!(result.description, "A Minecraft Server");

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn wrong_packet_id_is_malformed() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client, Instant::now() + Duration::from_secs(5));
        server.write_all(&Packet::new(0x01, vec![0; 8]).encode()).await.unwrap();

        let mut sequence = StatusSequence::new();
        let result = sequence.run(&mut connection, "localhost", 25565, 765).await;
        assert!(matches!(result, Err(PingError::MalformedPacket(_))));
        assert_eq!(sequence.state(), StatusState::Failed);
    }

    #[tokio::test]
    async fn bad_json_is_a_decode_error() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client, Instant::now() + Duration::from_secs(5));
        server.write_all(&status_response("{not json")).await.unwrap();

        let result = StatusSequence::new()
            .run(&mut connection, "localhost", 25565, 765)
            .await;
        assert!(matches!(result, Err(PingError::JsonDecodeError(_))));
    }

    #[tokio::test]
    async fn malformed_length_prefix_is_reported() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client, Instant::now() + Duration::from_secs(5));
        server.write_all(&[0x80, 0x80, 0x80, 0x80, 0x80]).await.unwrap();

        let result = StatusSequence::new()
            .run(&mut connection, "localhost", 25565, 765)
            .await;
        assert!(matches!(result, Err(PingError::MalformedVarInt)));
    }

    #[tokio::test]
    async fn oversized_string_length_is_malformed() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client, Instant::now() + Duration::from_secs(5));
        let payload = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F, b'{', b'}', b' ', b' '];
        server
            .write_all(&Packet::new(STATUS_RESPONSE_ID, payload).encode())
            .await
            .unwrap();

        let mut sequence = StatusSequence::new();
        let result = sequence.run(&mut connection, "localhost", 25565, 765).await;
        assert!(matches!(result, Err(PingError::MalformedPacket(_))));
        assert_eq!(sequence.state(), StatusState::Failed);
    }

    #[tokio::test]
    async fn a_finished_sequence_cannot_run_again() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client, Instant::now() + Duration::from_secs(5));
        server.write_all(&status_response(STATUS_JSON)).await.unwrap();

        let mut sequence = StatusSequence::new();
        sequence
            .run(&mut connection, "localhost", 25565, 765)
            .await
            .unwrap();

        let again = sequence.run(&mut connection, "localhost", 25565, 765).await;
        assert!(matches!(
            again,
            Err(PingError::UnknownProtocolState(StatusState::Parsed))
        ));
    }
}
