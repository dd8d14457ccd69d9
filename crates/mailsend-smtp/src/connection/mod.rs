//! SMTP connection management: transport, line dialog and session driver.

mod config;
mod data;
mod dialog;
#[cfg(test)]
pub(crate) mod mock;
mod session;
mod stream;

pub use config::{Config, ConfigBuilder, DEFAULT_PORT, Security, local_hostname};
pub use data::{DataWriter, DotStuffer};
pub use dialog::{DEFAULT_TIMEOUT, LineDialog, MAX_LINE_LENGTH, Transport};
pub use session::{LoginMethod, Session};
pub use stream::{SmtpStream, connect, connect_tls};

use crate::types::{AuthMechanism, Extension, Reply};
use std::collections::HashSet;

/// What the server told us about itself in the greeting and EHLO reply.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// True if the server accepted EHLO (ESMTP); false after a HELO fallback.
    pub extended: bool,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Records the extensions listed in an EHLO reply.
    ///
    /// The first line of the reply is the server's greeting text and is skipped.
    pub fn update_from_ehlo(&mut self, reply: &Reply) {
        self.extended = true;
        self.extensions = reply.message.iter().skip(1).map(|line| Extension::parse(line)).collect();
    }

    /// Forgets everything learned from EHLO.
    pub fn clear_extensions(&mut self) {
        self.extended = false;
        self.extensions.clear();
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}
