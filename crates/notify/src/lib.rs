//! Outbound mail: SMTP delivery and digest rendering (spec §6 `Mailer`, §4.4).

pub mod digest;
pub mod error;
pub mod mailer;

pub use digest::DigestRenderer;
pub use error::NotifyError;
pub use mailer::{Mailer, RecordingMailer, SmtpMailer};
