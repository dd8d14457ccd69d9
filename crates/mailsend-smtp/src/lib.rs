//! # mailsend-smtp
//!
//! A synchronous SMTP submission client implementing RFC 5321.
//!
//! ## Features
//!
//! - **Blocking session driver**: greeting, EHLO with HELO fallback, AUTH,
//!   MAIL/RCPT/DATA and QUIT, one command in flight at a time
//! - **Authentication**: CRAM-MD5, LOGIN, PLAIN
//! - **Correct DATA framing**: CRLF normalization and dot-stuffing
//! - **Pluggable transports**: any `Read + Write` stream via [`Transport`];
//!   plain TCP and rustls TLS (implicit or STARTTLS) included
//! - **Typed errors**: transient vs permanent failures are kept apart
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailsend_smtp::{Address, Config, LoginMethod, Message, Security, Session};
//!
//! fn main() -> mailsend_smtp::Result<()> {
//!     let config = Config::builder("smtp.example.com")
//!         .security(Security::StartTls)
//!         .build();
//!     let mut session = Session::connect(&config)?;
//!     session.login_with(LoginMethod::Plain, "user@example.com", "password")?;
//!
//!     let message = Message::new(
//!         Address::new("sender@example.com")?,
//!         "Subject: Test\r\n\r\nHello, World!\r\n",
//!     )
//!     .to(Address::new("recipient@example.com")?);
//!
//!     session.send_message(&message)?;
//!     session.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! ┌───────────┐  open  ┌─────────┐ EHLO/HELO ┌───────┐  AUTH  ┌───────────────┐
//! │ Connected │ ─────→ │ Greeted │ ────────→ │ Ready │ ─────→ │ Authenticated │
//! └───────────┘        └─────────┘           └───────┘        └───────────────┘
//!                                                 └── send_message ──┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Line dialog, session driver, streams and configuration
//! - [`parser`]: Reply parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies, messages)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Config, ConfigBuilder, DEFAULT_PORT, DEFAULT_TIMEOUT, LineDialog, LoginMethod,
    MAX_LINE_LENGTH, Security, ServerInfo, Session, SmtpStream, Transport,
};
pub use error::{Error, ErrorKind, Result};
pub use parser::MAX_REPLY_LINES;
pub use types::{
    Address, AuthMechanism, Extension, MailMessage, Message, Reply, ReplyCode, StatusClass,
};
