//! SMTP session driver.
//!
//! ```text
//!  Connected --open--> Greeted --EHLO/HELO--> Ready --AUTH--> Authenticated
//!                                               |                 |
//!                                               +-- send_message -+
//!  any state --close--> Closed
//! ```
//!
//! Commands are issued one at a time and each reply is read before the next
//! command is sent. Transport failures, malformed replies and 421 replies
//! poison the session; after that only [`Session::close`] is allowed.

use std::time::Duration;

use super::config::{Config, Security, local_hostname};
use super::data::DataWriter;
use super::dialog::{LineDialog, Transport};
use super::stream::{SmtpStream, connect, connect_tls};
use super::ServerInfo;
use crate::auth;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::read_reply;
use crate::types::{AuthMechanism, MailMessage, Reply, ReplyCode};

/// Authentication method for [`Session::login_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginMethod {
    /// Greet only.
    #[default]
    None,
    /// CRAM-MD5 challenge-response.
    CramMd5,
    /// LOGIN username/password prompts.
    Login,
    /// PLAIN with an initial response.
    Plain,
}

impl LoginMethod {
    /// Returns the SASL mechanism, or `None` for [`LoginMethod::None`].
    #[must_use]
    pub const fn mechanism(self) -> Option<AuthMechanism> {
        match self {
            Self::None => None,
            Self::CramMd5 => Some(AuthMechanism::CramMd5),
            Self::Login => Some(AuthMechanism::Login),
            Self::Plain => Some(AuthMechanism::Plain),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connected,
    Greeted,
    Ready,
    Authenticated,
    Closed,
}

/// Client-side SMTP session over a connected transport.
#[derive(Debug)]
pub struct Session<S: Transport> {
    dialog: LineDialog<S>,
    state: State,
    poisoned: bool,
    server_info: ServerInfo,
    local_name: Option<String>,
}

impl<S: Transport> Session<S> {
    /// Creates a session around a connected stream with the default 30 second
    /// read timeout. Nothing is read until [`open`](Self::open).
    ///
    /// # Errors
    ///
    /// Returns an error if the read timeout cannot be applied to the stream.
    pub fn new(stream: S) -> Result<Self> {
        Ok(Self::from_dialog(LineDialog::new(stream)?))
    }

    /// Creates a session with a custom read timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is zero or cannot be applied.
    pub fn with_timeout(stream: S, timeout: Duration) -> Result<Self> {
        Ok(Self::from_dialog(LineDialog::with_timeout(stream, timeout)?))
    }

    fn from_dialog(dialog: LineDialog<S>) -> Self {
        Self {
            dialog,
            state: State::Connected,
            poisoned: false,
            server_info: ServerInfo::default(),
            local_name: None,
        }
    }

    /// Returns the read timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.dialog.timeout()
    }

    /// Sets the read timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is zero or cannot be applied.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.dialog.set_timeout(timeout)
    }

    /// Overrides the name [`login_local`](Self::login_local) greets with.
    pub fn set_local_name(&mut self, name: impl Into<String>) {
        self.local_name = Some(name.into());
    }

    /// Returns true once the greeting has been read and until the session is closed.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(
            self.state,
            State::Greeted | State::Ready | State::Authenticated
        )
    }

    /// Returns true if an earlier failure left the session unusable.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns true after a successful AUTH exchange.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.state, State::Authenticated)
    }

    /// Returns what the server advertised in its greeting and EHLO reply.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns the transport.
    #[must_use]
    pub fn get_ref(&self) -> &S {
        self.dialog.get_ref()
    }

    /// Reads the server greeting. Does nothing if it was already read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedReply`] if the greeting is not 2xx, or a
    /// transport error (including a read timeout) if no greeting arrives.
    pub fn open(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.is_open() {
            return Ok(());
        }
        let result = self.read_greeting();
        self.guard(result)
    }

    fn read_greeting(&mut self) -> Result<()> {
        let reply = read_reply(&mut self.dialog)?;
        if !reply.is_success() {
            return Err(Error::UnexpectedReply(reply));
        }

        // First word after the code, e.g. "mx.example.org" in "220 mx.example.org ESMTP"
        self.server_info.hostname = reply
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        self.state = State::Greeted;
        tracing::debug!(server = %self.server_info.hostname, "greeted");
        Ok(())
    }

    /// Opens the session and greets the server with `EHLO hostname`, falling
    /// back to `HELO` if the server rejects EHLO with a 5xx reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transient`] if EHLO gets a 4xx reply and
    /// [`Error::UnexpectedReply`] if the HELO fallback is rejected.
    pub fn login(&mut self, hostname: &str) -> Result<()> {
        self.login_with_reply(hostname).map(drop)
    }

    /// Like [`login`](Self::login) but returns the EHLO (or HELO) reply, whose
    /// text lists the server capabilities.
    ///
    /// # Errors
    ///
    /// See [`login`](Self::login).
    pub fn login_with_reply(&mut self, hostname: &str) -> Result<Reply> {
        if hostname.is_empty() {
            return Err(Error::Usage("hello name must not be empty".into()));
        }
        self.open()?;
        let result = self.hello(hostname);
        self.guard(result)
    }

    /// Greets the server with this host's name.
    ///
    /// # Errors
    ///
    /// See [`login`](Self::login).
    pub fn login_local(&mut self) -> Result<()> {
        let name = self.local_name.clone().unwrap_or_else(local_hostname);
        self.login(&name)
    }

    /// Greets the server with this host's name and authenticates.
    ///
    /// # Errors
    ///
    /// See [`login_as`](Self::login_as).
    pub fn login_with(&mut self, method: LoginMethod, username: &str, password: &str) -> Result<()> {
        let name = self.local_name.clone().unwrap_or_else(local_hostname);
        self.login_as(&name, method, username, password)
    }

    /// Greets the server with `EHLO hostname` and, unless `method` is
    /// [`LoginMethod::None`], authenticates with the given credentials.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`login`](Self::login), [`Error::Auth`] if the
    /// server only accepted HELO or sent a malformed challenge, and
    /// [`Error::AuthRejected`] if the credentials were refused.
    pub fn login_as(
        &mut self,
        hostname: &str,
        method: LoginMethod,
        username: &str,
        password: &str,
    ) -> Result<()> {
        self.login(hostname)?;
        let Some(mechanism) = method.mechanism() else {
            return Ok(());
        };
        let result = self.authenticate(mechanism, username, password);
        self.guard(result)
    }

    fn hello(&mut self, hostname: &str) -> Result<Reply> {
        let reply = self.command(&Command::Ehlo {
            hostname: hostname.to_string(),
        })?;

        if reply.is_success() {
            self.server_info.update_from_ehlo(&reply);
        } else if reply.is_permanent_error() {
            tracing::debug!(%reply, "EHLO rejected, falling back to HELO");
            let reply = self.command(&Command::Helo {
                hostname: hostname.to_string(),
            })?;
            if !reply.is_success() {
                return Err(Error::UnexpectedReply(reply));
            }
            self.server_info.clear_extensions();
            self.state = State::Ready;
            return Ok(reply);
        } else {
            return Err(Error::from_reply(reply));
        }

        self.state = State::Ready;
        Ok(reply)
    }

    fn authenticate(&mut self, mechanism: AuthMechanism, username: &str, password: &str) -> Result<()> {
        if !self.server_info.extended {
            return Err(Error::Auth(
                "server accepted only HELO; AUTH requires ESMTP".into(),
            ));
        }
        if !self.server_info.auth_mechanisms().contains(&mechanism) {
            tracing::warn!(%mechanism, "server does not advertise this AUTH mechanism");
        }

        auth::authenticate(&mut self.dialog, mechanism, username, password)?;
        self.state = State::Authenticated;
        tracing::debug!(%mechanism, "authenticated");
        Ok(())
    }

    /// Submits one message: MAIL FROM, RCPT TO for every recipient, DATA and
    /// the dot-stuffed content.
    ///
    /// # Errors
    ///
    /// - [`Error::Usage`] if the session has not logged in or the message has
    ///   no recipients; nothing is sent in that case.
    /// - [`Error::Transient`] / [`Error::Permanent`] if MAIL, RCPT or DATA is
    ///   refused. A refused RCPT or DATA is followed by a best-effort RSET.
    /// - [`Error::Delivery`] if the server rejects the message after the data.
    pub fn send_message<M: MailMessage + ?Sized>(&mut self, message: &M) -> Result<()> {
        self.ensure_usable()?;
        if !matches!(self.state, State::Ready | State::Authenticated) {
            return Err(Error::Usage("send_message requires a successful login".into()));
        }
        if message.recipients().is_empty() {
            return Err(Error::Usage("message has no recipients".into()));
        }

        let result = self.transaction(message);
        self.guard(result)
    }

    fn transaction<M: MailMessage + ?Sized>(&mut self, message: &M) -> Result<()> {
        let reply = self.command(&Command::MailFrom {
            from: message.sender().clone(),
        })?;
        if !reply.is_success() {
            return Err(Error::from_reply(reply));
        }

        for recipient in message.recipients() {
            let reply = self.command(&Command::RcptTo {
                to: recipient.clone(),
            })?;
            if !(reply.is_success() || reply.is_intermediate()) {
                return Err(self.abort_transaction(reply));
            }
        }

        let reply = self.command(&Command::Data)?;
        if reply.code != ReplyCode::START_DATA {
            return Err(self.abort_transaction(reply));
        }

        tracing::debug!("> <message content>");
        let mut writer = DataWriter::new(&mut self.dialog);
        message.write_content(&mut writer)?;
        writer.finish()?;

        let reply = read_reply(&mut self.dialog)?;
        if !reply.is_success() {
            return Err(Error::Delivery(reply));
        }
        tracing::debug!(%reply, "message accepted");
        Ok(())
    }

    /// Sends RSET after a refused command and returns the error for `reply`.
    fn abort_transaction(&mut self, reply: Reply) -> Error {
        if reply.code != ReplyCode::SERVICE_UNAVAILABLE {
            match self.command(&Command::Rset) {
                Ok(rset) if rset.is_success() => {}
                Ok(rset) => tracing::debug!(%rset, "RSET refused"),
                Err(e) => {
                    tracing::warn!(error = %e, "RSET failed");
                    self.poisoned |= e.is_fatal();
                }
            }
        }
        Error::from_reply(reply)
    }

    /// Sends `command` (followed by a space and `arg`, if given) and returns
    /// the server's reply without classifying it.
    ///
    /// This is the escape hatch for extensions such as STARTTLS, VRFY or NOOP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the command contains CR or LF or the
    /// session is closed or poisoned, and transport or protocol errors from
    /// the exchange.
    pub fn send_command(&mut self, command: &str, arg: Option<&str>) -> Result<Reply> {
        self.ensure_usable()?;
        let line = match arg {
            Some(arg) => format!("{command} {arg}"),
            None => command.to_string(),
        };
        let result = self.exchange(&line);
        let reply = self.guard(result)?;
        if reply.code == ReplyCode::SERVICE_UNAVAILABLE {
            tracing::warn!(%reply, "server is closing the session");
            self.poisoned = true;
        }
        Ok(reply)
    }

    /// Sends QUIT (if the session is open and healthy), reads the reply and
    /// shuts the transport down. Failures are logged and swallowed.
    pub fn close(&mut self) {
        if self.state == State::Closed {
            return;
        }

        if self.is_open() && !self.poisoned {
            match self.command(&Command::Quit) {
                Ok(reply) if reply.is_success() => tracing::debug!(%reply, "QUIT"),
                Ok(reply) => tracing::debug!(%reply, "unexpected QUIT reply"),
                Err(e) => tracing::debug!(error = %e, "QUIT failed"),
            }
        }
        if let Err(e) = self.dialog.shutdown() {
            tracing::debug!(error = %e, "transport shutdown failed");
        }
        self.state = State::Closed;
    }

    /// Replaces the transport, e.g. with a TLS stream after a successful
    /// STARTTLS issued through [`send_command`](Self::send_command).
    ///
    /// The session returns to the greeted state with capabilities cleared, so
    /// the next `login*` call sends EHLO over the new transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the session is not open, or the error
    /// produced by `wrap`.
    pub fn upgrade<T, F>(self, wrap: F) -> Result<Session<T>>
    where
        T: Transport,
        F: FnOnce(S) -> Result<T>,
    {
        self.ensure_usable()?;
        if !self.is_open() {
            return Err(Error::Usage("transport can only be replaced after the greeting".into()));
        }

        let timeout = self.dialog.timeout();
        let mut server_info = self.server_info;
        server_info.clear_extensions();
        let local_name = self.local_name;

        let stream = wrap(self.dialog.into_inner())?;
        let mut session = Session::with_timeout(stream, timeout)?;
        session.state = State::Greeted;
        session.server_info = server_info;
        session.local_name = local_name;
        Ok(session)
    }

    /// Unwraps the transport without sending QUIT.
    pub fn into_inner(self) -> S {
        self.dialog.into_inner()
    }

    fn command(&mut self, command: &Command) -> Result<Reply> {
        let line = command.to_string();
        if command.is_sensitive() {
            self.dialog.send_line_masked(&line)?;
            return read_reply(&mut self.dialog);
        }
        self.exchange(&line)
    }

    fn exchange(&mut self, line: &str) -> Result<Reply> {
        self.dialog.send_line(line)?;
        read_reply(&mut self.dialog)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state == State::Closed {
            return Err(Error::Usage("session is closed".into()));
        }
        if self.poisoned {
            return Err(Error::Usage("session is poisoned; close it".into()));
        }
        Ok(())
    }

    /// Marks the session poisoned if `result` is an error it cannot recover from.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && !self.poisoned {
                tracing::warn!(error = %e, "session poisoned");
                self.poisoned = true;
            }
        }
        result
    }
}

impl Session<SmtpStream> {
    /// Connects according to `config`.
    ///
    /// With [`Security::StartTls`] the session is greeted, upgraded with
    /// STARTTLS and left open; call a `login*` method next to send EHLO over
    /// the encrypted channel.
    ///
    /// # Errors
    ///
    /// Returns connection, TLS or protocol errors.
    pub fn connect(config: &Config) -> Result<Self> {
        let stream = match config.security {
            Security::Implicit => connect_tls(&config.host, config.port, config.connect_timeout)?,
            Security::None | Security::StartTls => {
                connect(&config.host, config.port, config.connect_timeout)?
            }
        };

        let hello_name = config.hello_name();
        let mut session = Self::with_timeout(stream, config.read_timeout)?;
        session.set_local_name(hello_name.clone());

        if config.security == Security::StartTls {
            session.login(&hello_name)?;
            session = session.starttls(&config.host)?;
        }
        Ok(session)
    }

    /// Issues STARTTLS and upgrades the stream, verifying the certificate
    /// against `server_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the server did not advertise
    /// STARTTLS, the classified error if it refused the command, or a TLS
    /// error from the handshake.
    pub fn starttls(mut self, server_name: &str) -> Result<Self> {
        self.ensure_usable()?;
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let result = self.command(&Command::StartTls);
        let reply = self.guard(result)?;
        if reply.code != ReplyCode::SERVICE_READY {
            let result = Err(Error::from_reply(reply));
            return self.guard(result);
        }

        self.upgrade(|stream| stream.upgrade_to_tls(server_name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::mock::MockStream;
    use crate::error::ErrorKind;
    use crate::types::{Address, Message};

    fn session(script: &str) -> Session<MockStream> {
        Session::new(MockStream::new(script.as_bytes())).unwrap()
    }

    fn message() -> Message {
        Message::new(Address::new("a@x").unwrap(), "Subject: hi\r\n\r\nhello\r\n")
            .to(Address::new("b@y").unwrap())
    }

    #[test]
    fn open_reads_greeting_once() {
        let mut session = session("220 mx.example.org ESMTP\r\n");
        assert!(!session.is_open());
        session.open().unwrap();
        session.open().unwrap();
        assert!(session.is_open());
        assert_eq!(session.server_info().hostname, "mx.example.org");
        assert!(session.get_ref().output.is_empty());
    }

    #[test]
    fn open_rejects_negative_greeting() {
        let mut session = session("554 go away\r\n");
        let err = session.open().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(!session.is_open());
        assert!(session.is_poisoned());
    }

    #[test]
    fn ehlo_transient_failure_propagates() {
        let mut session = session("220 hi\r\n451 try later\r\n");
        let err = session.login("client.example").unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
        assert!(!session.is_poisoned());
        assert_eq!(session.get_ref().sent(), "EHLO client.example\r\n");
    }

    #[test]
    fn helo_fallback_keeps_extensions_empty() {
        let mut session = session("220 hi\r\n502 no\r\n250 ok\r\n");
        let reply = session.login_with_reply("client.example").unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert!(!session.server_info().extended);
        assert!(session.server_info().extensions.is_empty());
        assert_eq!(
            session.get_ref().sent(),
            "EHLO client.example\r\nHELO client.example\r\n"
        );
    }

    #[test]
    fn auth_after_helo_is_refused_before_sending() {
        let mut session = session("220 hi\r\n500 what\r\n250 ok\r\n");
        let err = session
            .login_as("client.example", LoginMethod::Login, "u", "p")
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(!session.get_ref().sent().contains("AUTH"));
    }

    #[test]
    fn login_with_plain() {
        let mut session = session("220 hi\r\n250-mx\r\n250 AUTH PLAIN\r\n235 ok\r\n");
        session
            .login_as("client.example", LoginMethod::Plain, "user", "pass")
            .unwrap();
        assert!(session.is_authenticated());
        assert_eq!(
            session.get_ref().sent(),
            "EHLO client.example\r\nAUTH PLAIN AHVzZXIAcGFzcw==\r\n"
        );
    }

    #[test]
    fn failed_auth_is_cancelled_before_next_command() {
        let mut session = session(concat!(
            "220 hi\r\n",
            "250-mx\r\n250 AUTH CRAM-MD5\r\n",
            "334 !!!notbase64!!!\r\n",
            "501 cancelled\r\n",
            "250 ok\r\n250 ok\r\n354 go\r\n250 queued\r\n",
        ));
        let err = session
            .login_as("client.example", LoginMethod::CramMd5, "u", "p")
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(!session.is_poisoned());
        assert!(!session.is_authenticated());

        session.send_message(&message()).unwrap();
        assert!(session.get_ref().sent().starts_with(
            "EHLO client.example\r\nAUTH CRAM-MD5\r\n*\r\nMAIL FROM:<a@x>\r\n"
        ));
    }

    #[test]
    fn unanswered_auth_cancellation_poisons() {
        let mut session = session("220 hi\r\n250-mx\r\n250 AUTH CRAM-MD5\r\n334 !!!notbase64!!!\r\n");
        let err = session
            .login_as("client.example", LoginMethod::CramMd5, "u", "p")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(session.is_poisoned());
    }

    #[test]
    fn oversized_greeting_poisons() {
        let greeting = format!("220 {}\r\n", "x".repeat(crate::connection::MAX_LINE_LENGTH));
        let mut session = session(&greeting);
        let err = session.open().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(session.is_poisoned());
    }

    #[test]
    fn send_before_login_is_usage_error() {
        let mut session = session("220 hi\r\n");
        let err = session.send_message(&message()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(session.get_ref().output.is_empty());
    }

    #[test]
    fn empty_recipient_list_sends_nothing() {
        let mut session = session("220 hi\r\n250 ok\r\n");
        session.login("client.example").unwrap();
        let sent_before = session.get_ref().output.len();

        let message = Message::new(Address::new("a@x").unwrap(), "body");
        let err = session.send_message(&message).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert_eq!(session.get_ref().output.len(), sent_before);
    }

    #[test]
    fn mail_from_rejection_is_classified() {
        let mut session = session("220 hi\r\n250 ok\r\n452 full\r\n");
        session.login("client.example").unwrap();
        let err = session.send_message(&message()).unwrap_err();
        assert!(err.is_transient());
        assert!(!session.get_ref().sent().contains("RSET"));
    }

    #[test]
    fn data_refusal_resets() {
        let mut session = session("220 hi\r\n250 ok\r\n250 ok\r\n250 ok\r\n554 no data\r\n250 reset\r\n");
        session.login("client.example").unwrap();
        let err = session.send_message(&message()).unwrap_err();
        assert!(err.is_permanent());
        assert!(session.get_ref().sent().ends_with("DATA\r\nRSET\r\n"));
        assert!(!session.is_poisoned());
    }

    #[test]
    fn final_rejection_is_delivery_error() {
        let mut session = session("220 hi\r\n250 ok\r\n250 ok\r\n250 ok\r\n354 go\r\n552 too big\r\n");
        session.login("client.example").unwrap();
        let err = session.send_message(&message()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Delivery);
        assert_eq!(err.reply().unwrap().to_string(), "552 too big");
    }

    #[test]
    fn service_closing_poisons() {
        let mut session = session("220 hi\r\n250 ok\r\n421 shutting down\r\n");
        session.login("client.example").unwrap();
        let err = session.send_message(&message()).unwrap_err();
        assert!(err.is_transient());
        assert!(session.is_poisoned());
        assert!(matches!(
            session.send_command("NOOP", None),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn send_command_returns_reply_verbatim() {
        let mut session = session("220 hi\r\n252 2.1.5 cannot verify\r\n");
        session.open().unwrap();
        let reply = session.send_command("VRFY", Some("postmaster")).unwrap();
        assert_eq!(reply.code.as_u16(), 252);
        assert_eq!(reply.message_text(), "2.1.5 cannot verify");
        assert_eq!(session.get_ref().sent(), "VRFY postmaster\r\n");
    }

    #[test]
    fn close_is_idempotent() {
        let mut session = session("220 hi\r\n221 bye\r\n");
        session.open().unwrap();
        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(session.get_ref().sent(), "QUIT\r\n");
        assert!(session.get_ref().shut_down);
    }

    #[test]
    fn close_without_greeting_skips_quit() {
        let mut session = session("");
        session.close();
        assert!(session.get_ref().output.is_empty());
        assert!(matches!(session.open(), Err(Error::Usage(_))));
    }

    #[test]
    fn upgrade_requires_new_hello() {
        let mut session = session("220 hi\r\n250-mx\r\n250 STARTTLS\r\n220 go ahead\r\n");
        session.login("client.example").unwrap();
        let reply = session.send_command("STARTTLS", None).unwrap();
        assert_eq!(reply.code, ReplyCode::SERVICE_READY);

        let session = session
            .upgrade(|_| Ok(MockStream::new(b"250 mx\r\n")))
            .unwrap();
        assert!(session.is_open());
        assert!(!session.server_info().extended);
        let mut session = session;
        assert!(matches!(session.send_message(&message()), Err(Error::Usage(_))));
        session.login("client.example").unwrap();
        assert_eq!(session.get_ref().sent(), "EHLO client.example\r\n");
    }
}
