//! Error types for SMTP operations.

use std::io;

use crate::types::Reply;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error, read timeout or unexpected end of stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Malformed reply from the server.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Well-formed reply with a status class that is not legal at this point.
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(Reply),

    /// Authentication could not be attempted or the exchange broke down.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Server rejected the credentials.
    #[error("Authentication rejected: {0}")]
    AuthRejected(Reply),

    /// Server returned a 4xx reply.
    #[error("Transient failure: {0}")]
    Transient(Reply),

    /// Server returned a 5xx reply.
    #[error("Permanent failure: {0}")]
    Permanent(Reply),

    /// Server did not accept the message after DATA.
    #[error("Delivery failed: {0}")]
    Delivery(Reply),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Client-side precondition violated.
    #[error("Usage error: {0}")]
    Usage(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// I/O failure, timeout or TLS failure.
    Transport,
    /// Malformed reply or reply of the wrong class.
    Protocol,
    /// Authentication failure.
    Auth,
    /// 4xx reply; retrying later may succeed.
    Transient,
    /// 5xx reply; the request will never succeed as stated.
    Permanent,
    /// Outcome of the submitted message is unknown.
    Delivery,
    /// Caller misuse detected before anything was sent.
    Usage,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Tls(_) => ErrorKind::Transport,
            Self::Protocol(_) | Self::UnexpectedReply(_) => ErrorKind::Protocol,
            Self::Auth(_) | Self::AuthRejected(_) => ErrorKind::Auth,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Permanent(_) => ErrorKind::Permanent,
            Self::Delivery(_) => ErrorKind::Delivery,
            Self::InvalidAddress(_) | Self::NotSupported(_) | Self::Usage(_) => ErrorKind::Usage,
        }
    }

    /// Returns the server reply that caused this error, if any.
    #[must_use]
    pub const fn reply(&self) -> Option<&Reply> {
        match self {
            Self::UnexpectedReply(reply)
            | Self::AuthRejected(reply)
            | Self::Transient(reply)
            | Self::Permanent(reply)
            | Self::Delivery(reply) => Some(reply),
            _ => None,
        }
    }

    /// Classifies a negative reply as transient (4xx) or permanent (5xx).
    ///
    /// Replies of any other class are reported as unexpected.
    #[must_use]
    pub fn from_reply(reply: Reply) -> Self {
        if reply.is_transient_error() {
            Self::Transient(reply)
        } else if reply.is_permanent_error() {
            Self::Permanent(reply)
        } else {
            Self::UnexpectedReply(reply)
        }
    }

    /// Returns true if the server reported a permanent (5xx) failure.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.reply().is_some_and(Reply::is_permanent_error)
    }

    /// Returns true if the server reported a transient (4xx) failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.reply().is_some_and(Reply::is_transient_error)
    }

    /// Returns true if the session can no longer be used after this error.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Protocol)
            || self
                .reply()
                .is_some_and(|reply| reply.code == crate::types::ReplyCode::SERVICE_UNAVAILABLE)
    }
}
