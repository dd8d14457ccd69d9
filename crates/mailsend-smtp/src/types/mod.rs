//! Core SMTP types.

mod address;
mod extension;
mod message;
mod reply;

pub use address::Address;
pub use extension::{AuthMechanism, Extension};
pub use message::{MailMessage, Message};
pub use reply::{Reply, ReplyCode, StatusClass};
