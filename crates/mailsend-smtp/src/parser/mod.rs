//! SMTP reply parser.
//!
//! Reply lines have the form `DDD<sep>TEXT` (RFC 5321 §4.2), where `<sep>` is
//! `-` on continuation lines and a space on the last line. A line of exactly
//! three digits is a complete last line with empty text.

use crate::connection::{LineDialog, Transport};
use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Most lines accepted in one reply.
///
/// Real EHLO replies list a few dozen extensions at most.
pub const MAX_REPLY_LINES: usize = 512;

/// One parsed reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLine<'a> {
    /// Reply code.
    pub code: ReplyCode,
    /// True for the final line of a reply.
    pub last: bool,
    /// Text after the separator.
    pub text: &'a str,
}

/// Parses a single reply line (without its CRLF).
///
/// # Errors
///
/// Returns a protocol error if the line does not start with a three digit
/// code or the separator is neither space nor `-`.
pub fn parse_reply_line(line: &str) -> Result<ReplyLine<'_>> {
    let bytes = line.as_bytes();
    let code = bytes
        .get(..3)
        .and_then(ReplyCode::from_digits)
        .ok_or_else(|| Error::Protocol(format!("Invalid reply line: {line:?}")))?;

    let last = match bytes.get(3) {
        None | Some(b' ') => true,
        Some(b'-') => false,
        Some(_) => {
            return Err(Error::Protocol(format!("Invalid reply separator: {line:?}")));
        }
    };

    Ok(ReplyLine {
        code,
        last,
        text: line.get(4..).unwrap_or(""),
    })
}

/// Accumulates reply lines into a [`Reply`].
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    code: Option<ReplyCode>,
    message: Vec<String>,
}

impl ReplyAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line. Returns the reply once its last line has been seen.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for a malformed line, a continuation line
    /// whose code differs from the first line, or a reply longer than
    /// [`MAX_REPLY_LINES`] lines.
    pub fn push(&mut self, line: &str) -> Result<Option<Reply>> {
        let parsed = parse_reply_line(line)?;
        if self.message.len() == MAX_REPLY_LINES {
            return Err(Error::Protocol(format!(
                "Reply has more than {MAX_REPLY_LINES} lines"
            )));
        }
        match self.code {
            Some(code) if code != parsed.code => {
                return Err(Error::Protocol(format!(
                    "Reply code changed from {code} to {} within a multi-line reply",
                    parsed.code
                )));
            }
            Some(_) => {}
            None => self.code = Some(parsed.code),
        }
        self.message.push(parsed.text.to_string());

        if parsed.last {
            Ok(Some(Reply::new(parsed.code, std::mem::take(&mut self.message))))
        } else {
            Ok(None)
        }
    }
}

/// Parses an SMTP reply from complete response lines.
///
/// # Errors
///
/// Returns an error if the reply is empty, malformed, ends early or has
/// trailing lines.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let mut assembler = ReplyAssembler::new();
    let mut lines = lines.iter();
    for line in lines.by_ref() {
        if let Some(reply) = assembler.push(line)? {
            if lines.next().is_some() {
                return Err(Error::Protocol("Trailing lines after final reply line".into()));
            }
            return Ok(reply);
        }
    }
    Err(Error::Protocol("Incomplete reply".into()))
}

/// Reads one complete reply from the dialog.
///
/// # Errors
///
/// Returns a transport error if reading fails and a protocol error if the
/// reply is malformed.
pub fn read_reply<S: Transport>(dialog: &mut LineDialog<S>) -> Result<Reply> {
    let mut assembler = ReplyAssembler::new();
    loop {
        let line = dialog.receive_line()?;
        if let Some(reply) = assembler.push(&line)? {
            return Ok(reply);
        }
    }
}
