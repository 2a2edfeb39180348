//! Framed reading for the IMAP protocol.
//!
//! IMAP responses are CRLF-terminated lines that may embed literals
//! (`{n}\r\n` followed by exactly n bytes). A frame is one complete
//! response: every line and literal up to the CRLF that is not followed by
//! a literal. Literal payloads are copied without being scanned, so bytes
//! that look like protocol syntax inside a message never end a frame.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Literal-aware frame reader.
pub struct FramedReader<R> {
    reader: BufReader<R>,
    frame: BytesMut,
    idle_timeout: Option<Duration>,
}

impl<R> FramedReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a new reader without an idle limit.
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, inner),
            frame: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            idle_timeout: None,
        }
    }

    /// Fails reads with [`Error::Timeout`] when the server sends nothing for
    /// `timeout`. Every chunk received restarts the clock.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Reads one complete response frame, including any embedded literals.
    ///
    /// Not cancel-safe: dropping the future mid-frame loses the partial
    /// frame.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        self.frame.clear();

        loop {
            let start = self.frame.len();
            self.read_line().await?;

            let Some(literal_len) = parse_literal_length(&self.frame[start..]) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            self.read_literal(literal_len).await?;
        }

        Ok(self.frame.split().to_vec())
    }

    /// Appends one CRLF-terminated line to the frame.
    async fn read_line(&mut self) -> Result<()> {
        let mut line_len = 0;

        loop {
            let after_cr = line_len > 0 && self.frame.last() == Some(&b'\r');
            let buf = fill(&mut self.reader, self.idle_timeout).await?;

            if let Some(pos) = find_crlf(buf, after_cr) {
                let take = pos + 1;
                self.frame.extend_from_slice(&buf[..take]);
                self.reader.consume(take);
                return Ok(());
            }

            let len = buf.len();
            self.frame.extend_from_slice(buf);
            self.reader.consume(len);
            line_len += len;

            if line_len > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
    }

    async fn read_literal(&mut self, len: usize) -> Result<()> {
        let start = self.frame.len();
        self.frame.resize(start + len, 0);
        let limit = self.idle_timeout;
        let mut filled = start;
        while filled < start + len {
            let read = self.reader.read(&mut self.frame[filled..start + len]);
            let n = match limit {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| Error::Timeout(limit))??,
                None => read.await?,
            };
            if n == 0 {
                return Err(closed());
            }
            filled += n;
        }
        Ok(())
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        self.reader.get_mut()
    }

    /// Returns the underlying stream. Buffered bytes are discarded.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

async fn fill<R>(reader: &mut BufReader<R>, idle_timeout: Option<Duration>) -> Result<&[u8]>
where
    R: AsyncRead + Unpin,
{
    let buf = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.fill_buf())
            .await
            .map_err(|_| Error::Timeout(limit))??,
        None => reader.fill_buf().await?,
    };
    if buf.is_empty() {
        return Err(closed());
    }
    Ok(buf)
}

fn closed() -> Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed").into()
}

/// Finds the LF that ends the line in `buf`, returning its index.
///
/// `after_cr` says the previous chunk ended with CR, so a leading LF
/// completes the line.
fn find_crlf(buf: &[u8], after_cr: bool) -> Option<usize> {
    if after_cr && buf.first() == Some(&b'\n') {
        return Some(0);
    }
    buf.windows(2).position(|w| w == b"\r\n").map(|pos| pos + 1)
}

/// Parses a literal length from the end of a line.
///
/// Matches `{123}\r\n` and the non-synchronizing `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n", false), Some(6));
        assert_eq!(find_crlf(b"\r\n", false), Some(1));
        assert_eq!(find_crlf(b"no newline", false), None);
        assert_eq!(find_crlf(b"just\n", false), None);
        assert_eq!(find_crlf(b"\nrest", true), Some(0));
        assert_eq!(find_crlf(b"\nrest", false), None);
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
        assert_eq!(parse_literal_length(b"empty {}\r\n"), None);
    }

    #[tokio::test]
    async fn test_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedReader::new(mock);

        assert_eq!(framed.read_frame().await.unwrap(), b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_crlf_split_across_reads() {
        let mock = Builder::new()
            .read(b"* 3 EXISTS\r")
            .read(b"\n* 1 RECENT\r\n")
            .build();
        let mut framed = FramedReader::new(mock);

        assert_eq!(framed.read_frame().await.unwrap(), b"* 3 EXISTS\r\n");
        assert_eq!(framed.read_frame().await.unwrap(), b"* 1 RECENT\r\n");
    }

    #[tokio::test]
    async fn test_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = FramedReader::new(mock);

        assert_eq!(
            framed.read_frame().await.unwrap(),
            b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n"
        );
    }

    #[tokio::test]
    async fn test_literal_payload_is_not_scanned() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {11}\r\nA99 OK fake UID 4)\r\nA1 OK done\r\n")
            .build();
        let mut framed = FramedReader::new(mock);

        assert_eq!(
            framed.read_frame().await.unwrap(),
            b"* 1 FETCH (BODY[] {11}\r\nA99 OK fake UID 4)\r\n"
        );
        assert_eq!(framed.read_frame().await.unwrap(), b"A1 OK done\r\n");
    }

    #[tokio::test]
    async fn test_multiple_literals_in_one_frame() {
        let mock = Builder::new()
            .read(b"* 2 FETCH (BODY[HEADER] {4}\r\n{9}\r")
            .read(b"\n BODY[TEXT] {3}\r\n\r\n\r)\r\n")
            .build();
        let mut framed = FramedReader::new(mock);

        assert_eq!(
            framed.read_frame().await.unwrap(),
            b"* 2 FETCH (BODY[HEADER] {4}\r\n{9}\r\n BODY[TEXT] {3}\r\n\r\n\r)\r\n"
        );
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let header = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedReader::new(mock);

        let err = framed.read_frame().await.unwrap_err();
        assert!(err.to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedReader::new(mock);

        let err = framed.read_frame().await.unwrap_err();
        assert!(err.to_string().contains("line too long"));
    }

    #[tokio::test]
    async fn test_eof_is_connection_error() {
        let mock = Builder::new().read(b"* OK partial").build();
        let mut framed = FramedReader::new(mock);

        let err = framed.read_frame().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Connection);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout() {
        let (client, _server) = tokio::io::duplex(64);
        let mut framed = FramedReader::new(client).with_idle_timeout(Duration::from_secs(300));

        let err = framed.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(300)));
    }

    proptest! {
        #[test]
        fn literal_bytes_never_end_a_frame(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut frame = format!("* 1 FETCH (BODY[] {{{}}}\r\n", payload.len()).into_bytes();
            frame.extend_from_slice(&payload);
            frame.extend_from_slice(b")\r\n");
            let mut wire = frame.clone();
            wire.extend_from_slice(b"A1 OK done\r\n");

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (first, second) = runtime.block_on(async {
                let mut framed = FramedReader::new(wire.as_slice());
                (framed.read_frame().await.unwrap(), framed.read_frame().await.unwrap())
            });
            prop_assert_eq!(first, frame);
            prop_assert_eq!(second, b"A1 OK done\r\n".to_vec());
        }
    }
}
