//! SASL mechanisms for the SMTP AUTH command (RFC 4954).
//!
//! - CRAM-MD5 (RFC 2195)
//! - LOGIN (de-facto, base64 username and password prompts)
//! - PLAIN (RFC 4616), sent as an initial response
//!
//! An exchange that fails while the server is waiting for a response line
//! is cancelled with `*` so the next command is read as a command again.

use std::fmt::Write as _;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;
use zeroize::Zeroizing;

use crate::command::Command;
use crate::connection::{LineDialog, Transport};
use crate::error::{Error, Result};
use crate::parser::read_reply;
use crate::types::{AuthMechanism, Reply, ReplyCode};

type HmacMd5 = Hmac<Md5>;

/// Runs the AUTH exchange for `mechanism`.
pub(crate) fn authenticate<S: Transport>(
    dialog: &mut LineDialog<S>,
    mechanism: AuthMechanism,
    username: &str,
    password: &str,
) -> Result<()> {
    match mechanism {
        AuthMechanism::CramMd5 => cram_md5(dialog, username, password),
        AuthMechanism::Login => login(dialog, username, password),
        AuthMechanism::Plain => plain(dialog, username, password),
    }
}

fn cram_md5<S: Transport>(dialog: &mut LineDialog<S>, username: &str, password: &str) -> Result<()> {
    let reply = start(dialog, AuthMechanism::CramMd5)?;
    let encoded = match challenge_response(&reply, username, password) {
        Ok(encoded) => encoded,
        Err(e) => return Err(cancel(dialog, e)),
    };

    dialog.send_line_masked(&encoded)?;
    finish(dialog)
}

fn challenge_response(reply: &Reply, username: &str, password: &str) -> Result<Zeroizing<String>> {
    let challenge = STANDARD
        .decode(reply.message_text().trim())
        .map_err(|e| Error::Auth(format!("Malformed CRAM-MD5 challenge: {e}")))?;
    let response = cram_md5_response(username, password, &challenge)?;
    Ok(Zeroizing::new(STANDARD.encode(response.as_bytes())))
}

fn login<S: Transport>(dialog: &mut LineDialog<S>, username: &str, password: &str) -> Result<()> {
    // Prompt texts ("Username:", "Password:") vary between servers and are ignored.
    start(dialog, AuthMechanism::Login)?;

    dialog.send_line_masked(&STANDARD.encode(username.as_bytes()))?;
    expect(read_reply(dialog)?, ReplyCode::AUTH_CONTINUE)?;

    let encoded = Zeroizing::new(STANDARD.encode(password.as_bytes()));
    dialog.send_line_masked(&encoded)?;
    finish(dialog)
}

fn plain<S: Transport>(dialog: &mut LineDialog<S>, username: &str, password: &str) -> Result<()> {
    let response = plain_response(username, password);
    let mechanism = AuthMechanism::Plain.as_str();

    // Sized up front so the credential is never copied by a reallocation.
    let mut line = Zeroizing::new(String::with_capacity(6 + mechanism.len() + response.len()));
    line.push_str("AUTH ");
    line.push_str(mechanism);
    line.push(' ');
    line.push_str(&response);

    dialog.send_line_masked(&line)?;
    finish(dialog)
}

/// Sends `AUTH <mechanism>` and waits for the first 334 challenge.
fn start<S: Transport>(dialog: &mut LineDialog<S>, mechanism: AuthMechanism) -> Result<Reply> {
    let command = Command::Auth {
        mechanism,
        initial_response: None,
    };
    dialog.send_line(&command.to_string())?;
    expect(read_reply(dialog)?, ReplyCode::AUTH_CONTINUE)
}

/// Reads the outcome of the last response line; anything but 235 fails.
///
/// A further 334 means the server still wants input, so the exchange is
/// cancelled before returning.
fn finish<S: Transport>(dialog: &mut LineDialog<S>) -> Result<()> {
    let reply = read_reply(dialog)?;
    if reply.code == ReplyCode::AUTH_CONTINUE {
        return Err(cancel(dialog, Error::AuthRejected(reply)));
    }
    expect(reply, ReplyCode::AUTH_SUCCESS).map(drop)
}

/// Aborts an exchange the server is still waiting on (RFC 4954 `*`).
///
/// Returns `err` once the server has answered the cancellation. If the
/// cancellation itself fails, that failure is returned instead so the caller
/// sees a transport or protocol error.
fn cancel<S: Transport>(dialog: &mut LineDialog<S>, err: Error) -> Error {
    let cancelled = dialog.send_line("*").and_then(|()| read_reply(dialog));
    match cancelled {
        Ok(reply) => {
            tracing::debug!(%reply, "AUTH cancelled");
            err
        }
        Err(e) => {
            tracing::warn!(error = %e, "AUTH cancellation failed");
            e
        }
    }
}

fn expect(reply: Reply, code: ReplyCode) -> Result<Reply> {
    if reply.code == code {
        Ok(reply)
    } else {
        Err(Error::AuthRejected(reply))
    }
}

/// Builds the CRAM-MD5 response `username SP hex(HMAC-MD5(password, challenge))`.
pub(crate) fn cram_md5_response(
    username: &str,
    password: &str,
    challenge: &[u8],
) -> Result<Zeroizing<String>> {
    let key = Zeroizing::new(password.as_bytes().to_vec());
    let mut mac = HmacMd5::new_from_slice(&key)
        .map_err(|e| Error::Auth(format!("Invalid CRAM-MD5 key: {e}")))?;
    mac.update(challenge);
    let digest = mac.finalize().into_bytes();

    let mut response = Zeroizing::new(String::with_capacity(username.len() + 33));
    response.push_str(username);
    response.push(' ');
    for byte in digest {
        // Writing to a String cannot fail.
        let _ = write!(response, "{byte:02x}");
    }
    Ok(response)
}

/// Base64 of `\0username\0password` (empty authorization identity).
fn plain_response(username: &str, password: &str) -> Zeroizing<String> {
    let credentials = Zeroizing::new(format!("\0{username}\0{password}"));
    Zeroizing::new(STANDARD.encode(credentials.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::mock::MockStream;
    use md5::Digest;
    use proptest::prelude::*;

    fn dialog(script: &str) -> LineDialog<MockStream> {
        LineDialog::new(MockStream::new(script.as_bytes())).unwrap()
    }

    fn reference_hmac_md5(key: &[u8], msg: &[u8]) -> Vec<u8> {
        let mut block = [0u8; 64];
        if key.len() > 64 {
            block[..16].copy_from_slice(&Md5::digest(key));
        } else {
            block[..key.len()].copy_from_slice(key);
        }
        let ipad: Vec<u8> = block.iter().map(|b| b ^ 0x36).collect();
        let opad: Vec<u8> = block.iter().map(|b| b ^ 0x5c).collect();
        let inner = Md5::new().chain_update(&ipad).chain_update(msg).finalize();
        Md5::new()
            .chain_update(&opad)
            .chain_update(inner)
            .finalize()
            .to_vec()
    }

    #[test]
    fn cram_md5_known_answer() {
        let response = cram_md5_response(
            "tim",
            "tanstaaftanstaaf",
            b"<1896.697170952@postoffice.reston.mci.net>",
        )
        .unwrap();
        assert_eq!(response.as_str(), "tim b913a602c7eda7a495b4e6e7334d3890");
    }

    #[test]
    fn cram_md5_exchange() {
        let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
        let mut dialog = dialog(&format!("334 {challenge}\r\n235 2.7.0 Authentication successful\r\n"));
        authenticate(&mut dialog, AuthMechanism::CramMd5, "tim", "tanstaaftanstaaf").unwrap();

        let sent = dialog.get_ref().sent();
        let mut lines = sent.split("\r\n");
        assert_eq!(lines.next(), Some("AUTH CRAM-MD5"));
        let answer = STANDARD.decode(lines.next().unwrap()).unwrap();
        assert_eq!(answer, b"tim b913a602c7eda7a495b4e6e7334d3890");
    }

    #[test]
    fn cram_md5_bad_challenge_is_cancelled() {
        let mut dialog = dialog("334 !!!not base64!!!\r\n501 5.7.0 cancelled\r\n");
        let err = authenticate(&mut dialog, AuthMechanism::CramMd5, "u", "p").unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(dialog.get_ref().sent(), "AUTH CRAM-MD5\r\n*\r\n");
    }

    #[test]
    fn failed_cancellation_surfaces_transport_error() {
        let mut dialog = dialog("334 !!!not base64!!!\r\n");
        let err = authenticate(&mut dialog, AuthMechanism::CramMd5, "u", "p").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn extra_challenge_is_cancelled() {
        let mut dialog = dialog("334 VXNlcm5hbWU6\r\n334 UGFzc3dvcmQ6\r\n334 again\r\n501 cancelled\r\n");
        let err = authenticate(&mut dialog, AuthMechanism::Login, "user", "secret").unwrap_err();
        assert!(matches!(err, Error::AuthRejected(ref r) if r.code == ReplyCode::AUTH_CONTINUE));
        assert!(dialog.get_ref().sent().ends_with("c2VjcmV0\r\n*\r\n"));
    }

    #[test]
    fn plain_empty_challenge_is_cancelled() {
        let mut dialog = dialog("334 \r\n501 cancelled\r\n");
        let err = authenticate(&mut dialog, AuthMechanism::Plain, "user", "pass").unwrap_err();
        assert!(matches!(err, Error::AuthRejected(_)));
        assert_eq!(
            dialog.get_ref().sent(),
            "AUTH PLAIN AHVzZXIAcGFzcw==\r\n*\r\n"
        );
    }

    #[test]
    fn plain_response_is_zeroizing() {
        let response: Zeroizing<String> = plain_response("user", "pass");
        assert_eq!(response.as_str(), "AHVzZXIAcGFzcw==");
    }

    #[test]
    fn login_exchange() {
        let mut dialog = dialog("334 VXNlcm5hbWU6\r\n334 UGFzc3dvcmQ6\r\n235 ok\r\n");
        authenticate(&mut dialog, AuthMechanism::Login, "user", "secret").unwrap();
        assert_eq!(
            dialog.get_ref().sent(),
            "AUTH LOGIN\r\ndXNlcg==\r\nc2VjcmV0\r\n"
        );
    }

    #[test]
    fn login_rejected_password() {
        let mut dialog = dialog("334 VXNlcm5hbWU6\r\n334 UGFzc3dvcmQ6\r\n535 5.7.8 bad credentials\r\n");
        let err = authenticate(&mut dialog, AuthMechanism::Login, "user", "wrong").unwrap_err();
        assert!(matches!(err, Error::AuthRejected(ref r) if r.code == ReplyCode::AUTH_FAILED));
        assert!(err.to_string().contains("535 5.7.8 bad credentials"));
    }

    #[test]
    fn plain_exchange() {
        let mut dialog = dialog("235 ok\r\n");
        authenticate(&mut dialog, AuthMechanism::Plain, "user", "pass").unwrap();
        assert_eq!(dialog.get_ref().sent(), "AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
    }

    #[test]
    fn mechanism_not_supported() {
        let mut dialog = dialog("504 5.5.4 Unrecognized authentication type\r\n");
        let err = authenticate(&mut dialog, AuthMechanism::CramMd5, "u", "p").unwrap_err();
        assert!(matches!(err, Error::AuthRejected(_)));
    }

    proptest! {
        #[test]
        fn cram_md5_response_shape(
            username in "[a-z0-9.@]{1,16}",
            password in ".{0,80}",
            challenge in prop::collection::vec(any::<u8>(), 0..96),
        ) {
            let response = cram_md5_response(&username, &password, &challenge).unwrap();
            let (user, hex) = response.split_once(' ').unwrap();
            prop_assert_eq!(user, username.as_str());

            let expected: String = reference_hmac_md5(password.as_bytes(), &challenge)
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect();
            prop_assert_eq!(hex, expected.as_str());
        }
    }
}
