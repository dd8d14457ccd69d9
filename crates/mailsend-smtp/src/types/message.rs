//! Messages handed to the session for submission.

use std::io::{self, Write};

use super::Address;

/// A pre-rendered RFC 5322 message together with its envelope.
///
/// The session never looks inside the content: it only needs the envelope
/// and a producer of the header and body bytes. Line endings may be CRLF or
/// bare LF; dot-stuffing is applied by the session.
pub trait MailMessage {
    /// Reverse-path for `MAIL FROM`.
    fn sender(&self) -> &Address;

    /// Forward-paths for `RCPT TO`, in order.
    fn recipients(&self) -> &[Address];

    /// Writes the header and body bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    fn write_content(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Owned message with envelope and rendered content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: Address,
    recipients: Vec<Address>,
    content: Vec<u8>,
}

impl Message {
    /// Creates a message with no recipients.
    #[must_use]
    pub fn new(sender: Address, content: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            recipients: Vec::new(),
            content: content.into(),
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: Address) -> Self {
        self.recipients.push(recipient);
        self
    }

    /// Returns the rendered content.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

impl MailMessage for Message {
    fn sender(&self) -> &Address {
        &self.sender
    }

    fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    fn write_content(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&self.content)
    }
}
