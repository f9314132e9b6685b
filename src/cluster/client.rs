//! Peer client
//!
//! A RESP client connection to another cluster member. One request is in
//! flight at a time: `send` writes a command line and waits for its reply.

use crate::protocol::{RespEncoder, RespParser, RespValue};
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Client connection to a peer node
pub struct PeerClient<S = TcpStream> {
    addr: String,
    stream: S,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    timeout: Duration,
}

impl PeerClient<TcpStream> {
    /// Connect to `addr`, bounding the connect by `timeout`
    pub async fn connect(addr: &str, timeout: Duration) -> io::Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;

        debug!("Connected to peer {}", addr);
        Ok(PeerClient::from_stream(addr, stream, timeout))
    }
}

impl<S> PeerClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an established stream
    pub fn from_stream(addr: impl Into<String>, stream: S, timeout: Duration) -> Self {
        PeerClient {
            addr: addr.into(),
            stream,
            read_buffer: BytesMut::with_capacity(4096),
            write_buffer: BytesMut::with_capacity(4096),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one command line and wait for its reply
    pub async fn send(&mut self, cmd_line: &[Bytes]) -> io::Result<RespValue> {
        tokio::time::timeout(self.timeout, self.round_trip(cmd_line))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "peer reply timed out"))?
    }

    async fn round_trip(&mut self, cmd_line: &[Bytes]) -> io::Result<RespValue> {
        self.write_buffer.clear();
        RespEncoder::encode_cmd_line(&mut self.write_buffer, cmd_line);
        self.stream.write_all(&self.write_buffer).await?;
        self.stream.flush().await?;

        loop {
            match RespParser::parse(&mut self.read_buffer) {
                Ok(Some(reply)) => return Ok(reply),
                Ok(None) => {}
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            }

            if self.stream.read_buf(&mut self.read_buffer).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection",
                ));
            }
        }
    }
}
