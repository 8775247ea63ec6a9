// C1: Line Transport. Framed line I/O over a TCP stream with timed reads
// and graceful partial-write tolerance (spec.md §4.1).

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// Hard cap on a single line; matches the ≤63-char name bound plus protocol
/// overhead with generous headroom.
pub const MAX_LINE: usize = 512;

/// Per-byte wait once a line has started (spec.md §4.1 "bulk window").
const BULK_BYTE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    Eof,
    Timeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "transport io error: {e}"),
            TransportError::Eof => write!(f, "peer closed connection"),
            TransportError::Timeout => write!(f, "read timed out"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Outcome of a single line read.
#[derive(Debug)]
pub enum ReadOutcome {
    Line(String),
    Eof,
    Timeout,
}

pub struct LineReader {
    half: OwnedReadHalf,
}

impl LineReader {
    pub fn new(half: OwnedReadHalf) -> Self {
        LineReader { half }
    }

    /// Reads one line terminated by `\n` (inclusive in the underlying bytes,
    /// stripped from the returned string), or until `MAX_LINE` bytes have
    /// accumulated. No buffering across calls: each call starts a fresh
    /// line (spec.md §4.1).
    pub async fn read_line(&mut self, max: usize) -> Result<ReadOutcome, TransportError> {
        self.read_line_inner(max, None).await
    }

    /// As `read_line`, but the first byte must arrive within `seconds`;
    /// once a line has started, subsequent bytes get the generous bulk
    /// window (spec.md §4.1).
    pub async fn read_line_timeout(
        &mut self,
        max: usize,
        seconds: u64,
    ) -> Result<ReadOutcome, TransportError> {
        self.read_line_inner(max, Some(Duration::from_secs(seconds)))
            .await
    }

    async fn read_line_inner(
        &mut self,
        max: usize,
        first_byte_timeout: Option<Duration>,
    ) -> Result<ReadOutcome, TransportError> {
        let mut line = String::new();
        let mut byte = [0u8; 1];
        let mut first = true;

        loop {
            let per_byte = if first {
                first_byte_timeout
            } else {
                Some(BULK_BYTE_TIMEOUT)
            };

            let read_result = match per_byte {
                Some(dur) => match timeout(dur, self.half.read_exact(&mut byte)).await {
                    Ok(inner) => inner,
                    Err(_) => return Ok(ReadOutcome::Timeout),
                },
                None => self.half.read_exact(&mut byte).await,
            };

            match read_result {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    if first {
                        return Ok(ReadOutcome::Eof);
                    }
                    // Peer closed mid-line; treat what we have as EOF too,
                    // since there is no terminator.
                    return Ok(ReadOutcome::Eof);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    // Transient; retry the same byte.
                    continue;
                }
                Err(e) => return Err(TransportError::Io(e)),
            }

            first = false;
            if byte[0] == b'\n' {
                return Ok(ReadOutcome::Line(line));
            }
            line.push(byte[0] as char);
            if line.len() >= max {
                return Ok(ReadOutcome::Line(line));
            }
        }
    }

    /// Non-blocking readiness check used by the match engine's
    /// non-active-peer probe (spec.md §4.4).
    pub async fn is_readable_now(&self) -> bool {
        matches!(
            timeout(Duration::from_millis(0), self.half.readable()).await,
            Ok(Ok(()))
        )
    }
}

pub struct LineWriter {
    half: OwnedWriteHalf,
}

impl LineWriter {
    pub fn new(half: OwnedWriteHalf) -> Self {
        LineWriter { half }
    }

    /// Writes one line, appending `\n`. Retries transient interrupts;
    /// `AsyncWriteExt::write_all` already loops over partial writes
    /// (spec.md §4.1).
    pub async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        loop {
            match self.half.write_all(&buf).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    pub async fn shutdown(&mut self) {
        let _ = self.half.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn reads_one_line_at_a_time() {
        let (client, server) = pair().await;
        let (r, _w) = server.into_split();
        let mut reader = LineReader::new(r);
        let (_cr, mut cw) = client.into_split();
        cw.write_all(b"hello\nworld\n").await.unwrap();

        match reader.read_line(MAX_LINE).await.unwrap() {
            ReadOutcome::Line(l) => assert_eq!(l, "hello"),
            other => panic!("unexpected {other:?}"),
        }
        match reader.read_line(MAX_LINE).await.unwrap() {
            ReadOutcome::Line(l) => assert_eq!(l, "world"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_times_out_waiting_for_first_byte() {
        let (_client, server) = pair().await;
        let (r, _w) = server.into_split();
        let mut reader = LineReader::new(r);
        match reader.read_line_timeout(MAX_LINE, 0).await.unwrap() {
            ReadOutcome::Timeout => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn eof_when_peer_closes_before_any_byte() {
        let (client, server) = pair().await;
        drop(client);
        let (r, _w) = server.into_split();
        let mut reader = LineReader::new(r);
        match reader.read_line(MAX_LINE).await.unwrap() {
            ReadOutcome::Eof => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}
