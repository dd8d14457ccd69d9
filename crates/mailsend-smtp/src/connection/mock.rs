//! In-memory transport for unit tests.

use std::io::{self, Cursor, Read, Write};
use std::time::Duration;

use super::Transport;

/// Replays canned server output and records what the client wrote.
#[derive(Debug, Default)]
pub struct MockStream {
    input: Cursor<Vec<u8>>,
    pub output: Vec<u8>,
    pub timeout: Option<Duration>,
    pub shut_down: bool,
}

impl MockStream {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: Cursor::new(input.to_vec()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.shut_down = true;
        Ok(())
    }
}
