//! DATA payload encoding: CRLF normalization and dot-stuffing (RFC 5321 §4.5.2).

use std::io::{self, Write};

/// Streaming dot-stuffer.
///
/// Bare LF is rewritten to CRLF, a `.` at the start of a line is doubled, and
/// [`finish`](Self::finish) emits the `.` terminator line. State is carried
/// across chunks so a CRLF split between two writes is still recognized.
#[derive(Debug, Clone, Copy)]
pub struct DotStuffer {
    at_line_start: bool,
    after_cr: bool,
}

impl Default for DotStuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DotStuffer {
    /// Creates a stuffer positioned at the start of a line.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            at_line_start: true,
            after_cr: false,
        }
    }

    /// Encodes one chunk of payload into `out`.
    pub fn stuff(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        out.reserve(chunk.len() + chunk.len() / 16);
        for &b in chunk {
            match b {
                b'\n' => {
                    if !self.after_cr {
                        out.push(b'\r');
                    }
                    out.push(b'\n');
                    self.at_line_start = true;
                    self.after_cr = false;
                    continue;
                }
                b'.' if self.at_line_start => out.push(b'.'),
                _ => {}
            }
            out.push(b);
            self.at_line_start = false;
            self.after_cr = b == b'\r';
        }
    }

    /// Terminates the payload, closing an unterminated last line first.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if self.after_cr {
            out.push(b'\n');
        } else if !self.at_line_start {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b".\r\n");
        *self = Self::new();
    }
}

/// Writer that dot-stuffs everything written through it.
#[derive(Debug)]
pub struct DataWriter<W: Write> {
    inner: W,
    stuffer: DotStuffer,
    buf: Vec<u8>,
}

impl<W: Write> DataWriter<W> {
    /// Wraps `inner`.
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            stuffer: DotStuffer::new(),
            buf: Vec::new(),
        }
    }

    /// Writes the end-of-data marker, flushes, and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or flush fails.
    pub fn finish(mut self) -> io::Result<W> {
        self.buf.clear();
        self.stuffer.finish(&mut self.buf);
        self.inner.write_all(&self.buf)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for DataWriter<W> {
    fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.buf.clear();
        self.stuffer.stuff(chunk, &mut self.buf);
        self.inner.write_all(&self.buf)?;
        Ok(chunk.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(chunks: &[&[u8]]) -> Vec<u8> {
        let mut writer = DataWriter::new(Vec::new());
        for chunk in chunks {
            writer.write_all(chunk).unwrap();
        }
        writer.finish().unwrap()
    }

    fn unstuff(wire: &[u8]) -> Vec<u8> {
        let body = wire.strip_suffix(b".\r\n").unwrap();
        let mut out = Vec::new();
        for line in body.split_inclusive(|&b| b == b'\n') {
            out.extend_from_slice(line.strip_prefix(b".").unwrap_or(line));
        }
        out
    }

    #[test]
    fn leading_dots_are_doubled() {
        assert_eq!(
            encode(&[b".hello\r\n..world\r\n"]),
            b"..hello\r\n...world\r\n.\r\n"
        );
    }

    #[test]
    fn lone_dot_line_is_stuffed() {
        assert_eq!(encode(&[b"a\r\n.\r\nb\r\n"]), b"a\r\n..\r\nb\r\n.\r\n");
    }

    #[test]
    fn inner_dots_are_untouched() {
        assert_eq!(encode(&[b"a.b\r\n"]), b"a.b\r\n.\r\n");
    }

    #[test]
    fn bare_lf_is_normalized() {
        assert_eq!(encode(&[b"Subject: hi\n\nhello\n"]), b"Subject: hi\r\n\r\nhello\r\n.\r\n");
    }

    #[test]
    fn missing_final_newline_is_added() {
        assert_eq!(encode(&[b"hello"]), b"hello\r\n.\r\n");
        assert_eq!(encode(&[b"hello\r"]), b"hello\r\n.\r\n");
    }

    #[test]
    fn empty_payload() {
        assert_eq!(encode(&[]), b".\r\n");
    }

    #[test]
    fn line_boundary_split_across_writes() {
        assert_eq!(encode(&[b"a\r", b"\n.b", b"\n", b".c"]), b"a\r\n..b\r\n..c\r\n.\r\n");
    }

    proptest! {
        #[test]
        fn unstuffing_restores_payload(
            lines in prop::collection::vec(("[.a-z ]{0,8}", any::<bool>()), 0..12),
            terminated in any::<bool>(),
            split in 0usize..64,
        ) {
            let mut payload = Vec::new();
            let mut expected = Vec::new();
            let count = lines.len();
            for (i, (text, crlf)) in lines.iter().enumerate() {
                payload.extend_from_slice(text.as_bytes());
                expected.extend_from_slice(text.as_bytes());
                if i + 1 < count || terminated {
                    let eol: &[u8] = if *crlf { b"\r\n" } else { b"\n" };
                    payload.extend_from_slice(eol);
                    expected.extend_from_slice(b"\r\n");
                } else if !text.is_empty() {
                    expected.extend_from_slice(b"\r\n");
                }
            }

            let at = split.min(payload.len());
            let wire = encode(&[&payload[..at], &payload[at..]]);
            prop_assert_eq!(unstuff(&wire), expected);
        }
    }
}
