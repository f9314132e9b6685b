//! Connection handling
//!
//! Manages individual client connections, parsing RESP commands
//! and sending responses.

use crate::connection::Session;
use crate::database::Database;
use crate::protocol::{RespEncoder, RespParser, RespValue};
use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Bound on flushing a reply once shutdown has started
const SHUTDOWN_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on received bytes not yet forming a complete command (1 GiB)
pub const MAX_QUERY_BUFFER: usize = 1024 * 1024 * 1024;

/// Client connection handler
pub struct ClientConnection<S = TcpStream> {
    /// Transport
    stream: S,

    /// Read buffer
    read_buffer: BytesMut,

    /// Write buffer
    write_buffer: BytesMut,

    /// Selected database
    session: Session,

    /// Unparsed input allowed before the client is disconnected
    max_query_buffer: usize,
}

impl<S> ClientConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a new connection handler
    pub fn new(stream: S) -> Self {
        ClientConnection {
            stream,
            read_buffer: BytesMut::with_capacity(4096),
            write_buffer: BytesMut::with_capacity(4096),
            session: Session::new(),
            max_query_buffer: MAX_QUERY_BUFFER,
        }
    }

    /// Override the bound on unparsed input
    pub fn with_max_query_buffer(mut self, limit: usize) -> Self {
        self.max_query_buffer = limit;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle the connection
    ///
    /// Reads commands until the client goes away or `shutdown` fires while
    /// the connection is idle. Commands already received are always answered.
    pub async fn handle<D: Database>(&mut self, db: &D, shutdown: &CancellationToken) -> io::Result<()> {
        loop {
            // Answer every complete frame already buffered
            loop {
                match RespParser::parse(&mut self.read_buffer) {
                    Ok(Some(frame)) => {
                        debug!("Parsed command: {}", frame);
                        if let Some(reply) = self.execute(db, frame).await {
                            self.send_response(reply, shutdown).await?;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Protocol error: {}", e);
                        self.read_buffer.clear();
                        let reply = RespValue::error(format!("ERR protocol error: {}", e));
                        self.send_response(reply, shutdown).await?;
                        break;
                    }
                }
            }

            let n = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Closing idle connection on shutdown");
                    return Ok(());
                }
                n = self.stream.read_buf(&mut self.read_buffer) => n?,
            };

            if self.read_buffer.len() > self.max_query_buffer {
                warn!("Query buffer over {} bytes, closing connection", self.max_query_buffer);
                self.read_buffer.clear();
                let reply = RespValue::error("ERR max query buffer length exceeded");
                self.send_response(reply, shutdown).await?;
                return Err(io::Error::new(io::ErrorKind::InvalidData, "query buffer limit exceeded"));
            }

            if n == 0 {
                return if self.read_buffer.is_empty() {
                    Ok(())
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    ))
                };
            }
        }
    }

    /// Run one frame; `None` means nothing is sent back
    async fn execute<D: Database>(&mut self, db: &D, frame: RespValue) -> Option<RespValue> {
        use base64::{engine::general_purpose, Engine as _};

        let cmd_line = match frame.into_cmd_line() {
            Ok(cmd_line) => cmd_line,
            Err(RespValue::Array(items)) if items.is_empty() => return None,
            Err(invalid) => {
                let b64 = general_purpose::STANDARD.encode(format!("{:?}", invalid).as_bytes());
                error!("Invalid command format - not an array of bulk strings. Command (B64): {}", b64);
                return Some(RespValue::error("ERR invalid command format"));
            }
        };

        let reply = db.exec(&mut self.session, &cmd_line).await;
        match reply {
            RespValue::NoReply => None,
            reply => {
                debug!("Response: {}", reply);
                Some(reply)
            }
        }
    }

    /// Send a response to the client
    async fn send_response(&mut self, response: RespValue, shutdown: &CancellationToken) -> io::Result<()> {
        self.write_buffer.clear();
        RespEncoder::encode_to(&mut self.write_buffer, &response);

        if shutdown.is_cancelled() {
            tokio::time::timeout(SHUTDOWN_WRITE_TIMEOUT, Self::write_all(&mut self.stream, &self.write_buffer))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "reply not flushed before shutdown"))?
        } else {
            Self::write_all(&mut self.stream, &self.write_buffer).await
        }
    }

    async fn write_all(stream: &mut S, buf: &[u8]) -> io::Result<()> {
        stream.write_all(buf).await?;
        stream.flush().await
    }
}
