//! Line-oriented byte transport over TCP (or any async stream).

use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::config::{ReadConfig, TelnetConfig};
use crate::channel::{PatternBuffer, PromptMatcher};
use crate::error::TransportError;

/// Transport over a plain TCP socket.
pub type TcpTransport = LineTransport<TcpStream>;

/// Outcome of a single poll of the socket.
enum Fill {
    Data(usize),
    Idle,
    Eof,
}

/// Result of a read operation.
#[derive(Debug)]
pub struct ReadResult {
    /// The data that was read.
    pub data: Vec<u8>,

    /// Whether the matcher matched.
    pub matched: bool,

    /// Whether the peer closed the stream.
    pub closed: bool,
}

impl ReadResult {
    /// Get the data as a string (lossy UTF-8).
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Byte stream with bounded chunked reads, line framing and Telnet
/// command stripping.
pub struct LineTransport<S> {
    stream: S,
    buffer: PatternBuffer,
    scratch: Vec<u8>,
    config: ReadConfig,

    /// Peer sent EOF.
    eof: bool,

    /// `close()` was called.
    shut: bool,
}

impl LineTransport<TcpStream> {
    /// Open a TCP connection to the configured host.
    pub async fn connect(config: &TelnetConfig) -> Result<Self, TransportError> {
        debug!("connecting to {}", config.socket_addr());

        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))?
        .map_err(|source| TransportError::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {}", e);
        }

        Ok(Self::from_stream(stream, config.read.clone()))
    }
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected stream.
    pub fn from_stream(stream: S, config: ReadConfig) -> Self {
        Self {
            stream,
            buffer: PatternBuffer::new(config.search_depth),
            scratch: vec![0; config.chunk_size.max(1)],
            config,
            eof: false,
            shut: false,
        }
    }

    /// Write all bytes and flush.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.shut {
            return Err(TransportError::Disconnected);
        }
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Poll the socket once for up to `wait`.
    async fn fill(&mut self, wait: Duration) -> Result<Fill, TransportError> {
        if self.eof || self.shut {
            return Ok(Fill::Eof);
        }
        match tokio::time::timeout(wait, self.stream.read(&mut self.scratch)).await {
            Err(_) => Ok(Fill::Idle),
            Ok(Ok(0)) => {
                debug!("peer closed the connection");
                self.eof = true;
                Ok(Fill::Eof)
            }
            Ok(Ok(n)) => {
                trace!("read {} bytes: {:?}", n, String::from_utf8_lossy(&self.scratch[..n]));
                self.buffer.extend(&self.scratch[..n]);
                Ok(Fill::Data(n))
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Time left until `deadline`, capped at one chunk poll.
    fn poll_window(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then(|| remaining.min(self.config.chunk_timeout))
    }

    /// Read until `matcher` matches the accumulated output.
    ///
    /// On a match, everything up to the end of the match is returned and
    /// the rest stays buffered. If the peer closes first, whatever was
    /// buffered is returned with `closed` set.
    pub async fn read_until<M: PromptMatcher + ?Sized>(
        &mut self,
        matcher: &M,
        timeout: Duration,
    ) -> Result<ReadResult, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(end) = self.buffer.search_tail(matcher) {
                return Ok(ReadResult {
                    data: self.buffer.split_to(end),
                    matched: true,
                    closed: false,
                });
            }
            if self.eof {
                return Ok(ReadResult {
                    data: self.buffer.take(),
                    matched: false,
                    closed: true,
                });
            }
            let Some(wait) = self.poll_window(deadline) else {
                return Err(TransportError::Timeout(timeout));
            };
            self.fill(wait).await?;
        }
    }

    /// Read one line, without its terminator.
    ///
    /// Returns `Ok(None)` when the peer closed with nothing buffered; an
    /// unterminated tail before EOF is returned as the last line.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.buffer.take_line() {
                return Ok(Some(line));
            }
            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = self.buffer.take();
                return Ok(Some(String::from_utf8_lossy(&rest).trim_end().to_string()));
            }
            let Some(wait) = self.poll_window(deadline) else {
                return Err(TransportError::Timeout(timeout));
            };
            self.fill(wait).await?;
        }
    }

    /// Collect whatever arrives until the line goes quiet for one chunk
    /// poll or `window` elapses.
    pub async fn read_available(&mut self, window: Duration) -> Result<ReadResult, TransportError> {
        let deadline = Instant::now() + window;
        while let Some(wait) = self.poll_window(deadline) {
            match self.fill(wait).await? {
                Fill::Data(_) => continue,
                Fill::Idle | Fill::Eof => break,
            }
        }
        Ok(ReadResult {
            data: self.buffer.take(),
            matched: false,
            closed: self.eof,
        })
    }

    /// Discard stale input, best-effort.
    ///
    /// Bounded by `drain_limit` bytes and `drain_timeout` per poll; read
    /// errors end the drain silently.
    pub async fn drain(&mut self) {
        let mut discarded = self.buffer.len();
        self.buffer.clear();

        while discarded < self.config.drain_limit {
            match self.fill(self.config.drain_timeout).await {
                Ok(Fill::Data(n)) => {
                    discarded += n;
                    self.buffer.clear();
                }
                _ => break,
            }
        }

        if discarded > 0 {
            debug!("drained {} stale bytes", discarded);
        }
    }

    /// Bytes received but not yet consumed, for diagnostics.
    pub fn pending(&self) -> String {
        self.buffer.as_str_lossy().into_owned()
    }

    /// Whether the peer has closed the stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn is_closed(&self) -> bool {
        self.shut
    }

    /// Shut down the write side. Idempotent; errors are logged and dropped.
    pub async fn close(&mut self) {
        if self.shut {
            return;
        }
        self.shut = true;
        if let Err(e) = self.stream.shutdown().await {
            debug!("error shutting down stream: {}", e);
        }
    }
}
