//! `Mailer`: the single outbound channel used for completion/error/timeout
//! notifications and the daily digest (spec §6). Every send targets the
//! user's own address (`SmtpConfig::user_email`) — there is no multi-
//! recipient notion here, unlike the broader alerting trait this grew out of.

use async_trait::async_trait;
use inboxd_core::config::SmtpConfig;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::error::NotifyError;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        sender_name: &str,
    ) -> Result<(), NotifyError>;
}

/// Delivers mail via SMTP using `lettre`'s async Tokio transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// Build from [`SmtpConfig`]. Credentials are resolved from the
    /// `SMTP_USERNAME`/`SMTP_PASSWORD` environment variables; their absence
    /// is not an error (some relays allow unauthenticated local delivery).
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        if !config.is_configured() {
            return Err(NotifyError::Config(
                "SMTP is not configured (missing host or user_email)".to_string(),
            ));
        }

        let port = config.port_or_default();
        let use_implicit_tls = port == 465;
        let use_starttls = config.tls != Some(false);

        let mut builder = if use_implicit_tls || use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(port)
        };

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }

    fn from_mailbox(&self, sender_name: &str) -> Result<Mailbox, NotifyError> {
        let addr = format!("{} <{}>", sender_name, self.from);
        addr.parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        sender_name: &str,
    ) -> Result<(), NotifyError> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let message = Message::builder()
            .from(self.from_mailbox(sender_name)?)
            .to(to_mailbox)
            .subject(subject)
            .header(lettre::message::header::ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(to, subject, "mail delivered");
        Ok(())
    }
}

/// Records every send attempt instead of delivering it. Used by engine
/// tests that assert digest/notification content without a real SMTP
/// server.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: std::sync::Mutex<Vec<SentMail>>,
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        _sender_name: &str,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: Some(587),
            tls: Some(true),
            from: "alerts@example.com".into(),
            user_email: "me@example.com".into(),
        }
    }

    #[test]
    fn from_config_requires_configured_smtp() {
        let mut cfg = config();
        cfg.host = String::new();
        let err = SmtpMailer::from_config(&cfg).unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
    }

    #[test]
    fn from_config_builds_transport_for_valid_smtp() {
        assert!(SmtpMailer::from_config(&config()).is_ok());
    }

    #[tokio::test]
    async fn recording_mailer_captures_sends() {
        let mailer = RecordingMailer::new();
        mailer
            .send("me@example.com", "Digest", "<p>hi</p>", "Inboxd")
            .await
            .unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Digest");
    }
}
