//! Line-oriented duplex adapter over the transport.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default read timeout for replies.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest reply line accepted, terminator included.
///
/// RFC 5321 §4.5.3.1.5 limits reply lines to 512 octets; servers that send
/// longer extension lists exist, so this leaves generous headroom.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Byte stream the session talks SMTP over.
///
/// The stream must already be connected. Custom transports (TLS wrappers,
/// proxies, test doubles) plug in here.
pub trait Transport: Read + Write {
    /// Sets the deadline for a single blocking read.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying stream rejects the timeout.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Tears down the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    fn shutdown(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl Transport for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        Self::set_read_timeout(self, timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        Self::shutdown(self, Shutdown::Both)
    }
}

/// CRLF-framed dialog with the server.
///
/// This is the only part of the crate that touches the transport.
#[derive(Debug)]
pub struct LineDialog<S> {
    reader: BufReader<S>,
    timeout: Duration,
}

impl<S: Transport> LineDialog<S> {
    /// Wraps a connected stream using the default 30 second read timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout cannot be applied to the stream.
    pub fn new(stream: S) -> Result<Self> {
        Self::with_timeout(stream, DEFAULT_TIMEOUT)
    }

    /// Wraps a connected stream with a custom read timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is zero or cannot be applied.
    pub fn with_timeout(mut stream: S, timeout: Duration) -> Result<Self> {
        check_timeout(timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        Ok(Self {
            reader: BufReader::new(stream),
            timeout,
        })
    }

    /// Sends one command line, appending CRLF.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `line` contains CR or LF, or an I/O error if
    /// the write fails.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        tracing::debug!("> {line}");
        self.write_line(line)
    }

    /// Sends one line carrying credentials; the content is not logged.
    ///
    /// # Errors
    ///
    /// Same as [`send_line`](Self::send_line).
    pub fn send_line_masked(&mut self, line: &str) -> Result<()> {
        tracing::debug!("> <credentials>");
        self.write_line(line)
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        if line.contains(['\r', '\n']) {
            return Err(Error::Usage("command line must not contain CR or LF".into()));
        }
        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        self.send_raw(&buf)
    }

    /// Writes bytes verbatim and flushes them to the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data)?;
        self.flush()?;
        Ok(())
    }

    /// Reads one line and strips its CRLF (or bare LF) terminator.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on read failure, read timeout, or if the server
    /// closes the stream before a full line arrives, and a protocol error if
    /// the line is longer than [`MAX_LINE_LENGTH`].
    pub fn receive_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_LINE_LENGTH as u64);
        match limited.read_until(b'\n', &mut buf) {
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no reply within {:?}", self.timeout),
                )
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        if buf.last() != Some(&b'\n') && buf.len() == MAX_LINE_LENGTH {
            return Err(Error::Protocol(format!(
                "Reply line exceeds {MAX_LINE_LENGTH} bytes"
            )));
        }
        if buf.pop() != Some(b'\n') {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )
            .into());
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        let line = String::from_utf8_lossy(&buf).into_owned();
        tracing::trace!("< {line}");
        Ok(line)
    }

    /// Returns the read timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes the read timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is zero or cannot be applied.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        check_timeout(timeout)?;
        self.reader.get_mut().set_read_timeout(Some(timeout))?;
        self.timeout = timeout;
        Ok(())
    }

    /// Shuts the transport down.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport reports one.
    pub fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown()?;
        Ok(())
    }

    /// Returns the underlying stream.
    #[must_use]
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Unwraps the stream. Any buffered, unread input is discarded.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Payload bytes (the DATA body) go straight to the transport, unframed.
/// [`LineDialog::send_raw`] is `write_all` plus `flush` through this impl.
impl<S: Transport> Write for LineDialog<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reader.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.reader.get_mut().flush()
    }
}

fn check_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(Error::Usage("read timeout must be non-zero".into()));
    }
    Ok(())
}
