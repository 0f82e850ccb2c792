//! One TCP connection for one ping, bounded by a single deadline.

use std::io;

use log::trace;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::{timeout_at, Instant},
};

use super::{PingOptions, ServerAddress};
use crate::{
    error::PingError,
    resolution::{resolve_minecraft_target, ConnectTarget},
};

const READ_CHUNK: usize = 4096;

/// Owns the socket of a single in-flight ping.
///
/// The socket is closed when the connection is dropped, which happens on
/// every way out of a ping: success, a parse failure, an I/O error, or the
/// deadline expiring.
pub struct Connection<S = TcpStream> {
    stream: S,
    deadline: Instant,
    started: Instant,
    received: usize,
    chunk: Box<[u8]>,
}

impl Connection<TcpStream> {
    /// Resolves and connects to `address`. Resolution, connect and everything
    /// done later on the connection share `deadline`.
    pub async fn open(
        address: &ServerAddress,
        options: &PingOptions,
        deadline: Instant,
    ) -> Result<Self, PingError> {
        let target = timeout_at(
            deadline,
            resolve_minecraft_target(&address.host, address.port, options.srv_lookup),
        )
        .await
        .map_err(|_| PingError::ConnectionTimeout)?;

        let started = Instant::now();
        let connect = async {
            match &target {
                ConnectTarget::Resolved(addr) => TcpStream::connect(*addr).await,
                ConnectTarget::Literal(host, port) => {
                    TcpStream::connect((host.as_str(), *port)).await
                }
            }
        };
        let stream = timeout_at(deadline, connect)
            .await
            .map_err(|_| PingError::ConnectionTimeout)?
            .map_err(|e| connect_error(e, &target))?;

        trace!("connected to {address} in {:?}", started.elapsed());
        let mut connection = Self::new(stream, deadline);
        connection.started = started;
        Ok(connection)
    }
}

fn connect_error(err: io::Error, target: &ConnectTarget) -> PingError {
    match (err.kind(), target) {
        (io::ErrorKind::ConnectionRefused, ConnectTarget::Resolved(addr)) => {
            PingError::ConnectionRefused(addr.to_string())
        }
        (io::ErrorKind::ConnectionRefused, ConnectTarget::Literal(host, port)) => {
            PingError::ConnectionRefused(format!("{host}:{port}"))
        }
        (io::ErrorKind::TimedOut, _) => PingError::ConnectionTimeout,
        (_, ConnectTarget::Literal(host, _)) => PingError::DnsResolutionFailed(host.clone()),
        _ => PingError::Io(err),
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already connected stream. The latency clock starts now.
    pub fn new(stream: S, deadline: Instant) -> Self {
        Self {
            stream,
            deadline,
            started: Instant::now(),
            received: 0,
            chunk: vec![0; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Milliseconds since the connect attempt started.
    pub fn elapsed_ms(&self) -> u32 {
        u32::try_from(self.started.elapsed().as_millis()).unwrap_or(u32::MAX)
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), PingError> {
        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(data).await?;
            stream.flush().await
        };
        let written = timeout_at(self.deadline, write).await;
        match written {
            Ok(result) => Ok(result?),
            Err(_) => Err(self.timed_out()),
        }
    }

    /// Waits for the next bytes from the server.
    ///
    /// The returned slice is whatever a single read produced, which may be
    /// anything from one byte to several packets.
    pub async fn read_chunk(&mut self) -> Result<&[u8], PingError> {
        let read = timeout_at(self.deadline, self.stream.read(&mut self.chunk)).await;
        let read = match read {
            Ok(read) => read?,
            Err(_) => return Err(self.timed_out()),
        };
        if read == 0 {
            return Err(PingError::ConnectionClosed);
        }
        self.received += read;
        trace!("read {read} bytes ({} total)", self.received);
        Ok(&self.chunk[..read])
    }

    fn timed_out(&self) -> PingError {
        if self.received == 0 {
            PingError::ConnectionTimeout
        } else {
            PingError::ReadTimeout
        }
    }
}
