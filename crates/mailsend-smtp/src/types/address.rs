//! Email address types.

use crate::error::{Error, Result};

/// Mailbox address for the SMTP envelope (`local@domain`).
///
/// Serialized on the wire inside angle brackets by the command builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Extracts the address from a mailbox in display form.
    ///
    /// Accepts both `Jane Doe <jane@example.com>` and a bare
    /// `jane@example.com`.
    ///
    /// # Errors
    ///
    /// Returns an error if the brackets are unbalanced or the address is invalid.
    pub fn from_mailbox(mailbox: &str) -> Result<Self> {
        let mailbox = mailbox.trim();
        match (mailbox.rfind('<'), mailbox.rfind('>')) {
            (Some(open), Some(close)) if open < close && close == mailbox.len() - 1 => {
                Self::new(&mailbox[open + 1..close])
            }
            (None, None) => Self::new(mailbox),
            _ => Err(Error::InvalidAddress(format!(
                "Unbalanced angle brackets in {mailbox:?}"
            ))),
        }
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        if let Some(c) = addr
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>'))
        {
            return Err(Error::InvalidAddress(format!(
                "Address contains forbidden character {c:?}"
            )));
        }

        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress("Address must contain @".into()));
        };

        if domain.contains('@') {
            return Err(Error::InvalidAddress(
                "Address must have exactly one @".into(),
            ));
        }

        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(
                "Local and domain parts cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
    }

    #[test]
    fn test_invalid_address_no_at() {
        assert!(Address::new("userexample.com").is_err());
    }

    #[test]
    fn test_invalid_address_empty() {
        assert!(Address::new("").is_err());
    }

    #[test]
    fn test_invalid_address_empty_parts() {
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
    }

    #[test]
    fn test_invalid_address_two_ats() {
        assert!(Address::new("a@b@c").is_err());
    }

    #[test]
    fn test_rejects_line_breaks_and_brackets() {
        assert!(Address::new("a@b\r\nRCPT TO:<x@y>").is_err());
        assert!(Address::new("<a@b>").is_err());
        assert!(Address::new("a b@c").is_err());
    }

    #[test]
    fn test_from_mailbox_display_form() {
        let addr = Address::from_mailbox("Tim <tim@example.com>").unwrap();
        assert_eq!(addr.as_str(), "tim@example.com");
        let addr = Address::from_mailbox("  tim@example.com ").unwrap();
        assert_eq!(addr.as_str(), "tim@example.com");
    }

    #[test]
    fn test_from_mailbox_unbalanced() {
        assert!(Address::from_mailbox("Tim <tim@example.com").is_err());
        assert!(Address::from_mailbox("Tim tim@example.com>").is_err());
    }
}
