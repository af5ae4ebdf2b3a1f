//! Byte-stream transports used by network backed backends.

use std::io;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to resolve `{host}`: {source}")]
    Resolve { host: String, source: io::Error },

    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write to sink: {0}")]
    Sink(#[source] io::Error),
}

/// A sink for encoded metric payloads.
pub trait Transport: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// TCP connection to a metric collector.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Resolves `host` and tries every candidate address in order until one
    /// accepts the connection.
    pub fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let candidates = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?;

        let mut last_error = None;
        for addr in candidates {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    tracing::debug!(%addr, "connected to {host}:{port}");
                    return Ok(Self { stream, peer: addr });
                }
                Err(e) => {
                    tracing::debug!(%addr, "connection attempt failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(TransportError::Connect {
            host: host.to_string(),
            port,
            source: last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
            }),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Reads until the peer closes the stream, relaying everything to `sink`.
    /// Returns the number of bytes relayed.
    pub fn drain<W: Write>(&mut self, sink: &mut W) -> Result<u64, TransportError> {
        let mut buf = [0u8; 128];
        let mut total = 0u64;
        loop {
            let len = match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(len) => len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Read(e)),
            };
            sink.write_all(&buf[..len]).map_err(TransportError::Sink)?;
            total += len as u64;
        }
        Ok(total)
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).map_err(TransportError::Send)
    }
}
