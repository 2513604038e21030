//! Outbound email delivery.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::{NotifyError, ScanError};
use crate::notify::composer::Alert;

/// Delivers one alert to a recipient list.
#[async_trait]
pub trait EmailTransport: Send + Sync + fmt::Debug {
    /// Sends `alert` as a single message addressed to every recipient.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] if the message cannot be built, the relay
    /// rejects it, or delivery exceeds the transport's timeout.
    async fn send(&self, recipients: &[String], alert: &Alert) -> Result<(), NotifyError>;
}

/// SMTP relay credentials and endpoint.
#[derive(Clone)]
pub struct SmtpSettings {
    /// Relay host name.
    pub host: String,
    /// Relay port (STARTTLS).
    pub port: u16,
    /// Login; also used as the sender address.
    pub username: String,
    /// Password.
    pub password: String,
    /// Bound on a single delivery.
    pub timeout: Duration,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// [`EmailTransport`] over an authenticated STARTTLS relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    relay: String,
    timeout: Duration,
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .field("relay", &self.relay)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Builds a mailer for `settings`. No connection is made until the
    /// first send.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if the username is not a valid mail
    /// address or the relay cannot be configured.
    pub fn new(settings: SmtpSettings) -> Result<Self, ScanError> {
        let from: Mailbox = settings
            .username
            .parse()
            .map_err(|e| ScanError::Config(format!("invalid SMTP username as sender: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| ScanError::Config(format!("invalid SMTP relay {}: {e}", settings.host)))?
            .port(settings.port)
            .credentials(Credentials::new(settings.username, settings.password))
            .timeout(Some(settings.timeout))
            .build();

        Ok(Self {
            transport,
            from,
            relay: format!("{}:{}", settings.host, settings.port),
            timeout: settings.timeout,
        })
    }
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    async fn send(&self, recipients: &[String], alert: &Alert) -> Result<(), NotifyError> {
        let message = build_message(&self.from, recipients, alert)?;
        tokio::time::timeout(self.timeout, self.transport.send(message))
            .await
            .map_err(|_| NotifyError::Timeout("email"))?
            .map_err(|e| NotifyError::Email(e.to_string()))?;
        tracing::info!(relay = %self.relay, recipients = recipients.len(), subject = %alert.subject, "alert email sent");
        Ok(())
    }
}

fn build_message(from: &Mailbox, recipients: &[String], alert: &Alert) -> Result<Message, NotifyError> {
    let mut builder = Message::builder().from(from.clone()).subject(alert.subject.clone());
    for recipient in recipients {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| NotifyError::Email(format!("invalid recipient {recipient:?}: {e}")))?;
        builder = builder.to(to);
    }
    builder
        .multipart(MultiPart::alternative_plain_html(
            alert.text.clone(),
            alert.html.clone(),
        ))
        .map_err(|e| NotifyError::Email(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn alert() -> Alert {
        Alert {
            subject: "Dragonite".to_string(),
            text: "Dragonite will disappear at 12:00:00\nhttp://x".to_string(),
            html: "<p>Dragonite</p>".to_string(),
            image_urls: vec!["http://x".to_string()],
        }
    }

    fn settings(username: &str) -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: username.to_string(),
            password: "hunter2".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn message_has_all_recipients_and_both_parts() {
        let Ok(from) = "scanner@example.com".parse::<Mailbox>() else {
            panic!("valid mailbox");
        };
        let recipients = vec!["a@example.com".to_string(), "b@example.com".to_string()];
        let Ok(message) = build_message(&from, &recipients, &alert()) else {
            panic!("message should build");
        };
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
        assert!(raw.contains("Subject: Dragonite"));
        assert!(raw.contains("a@example.com"));
        assert!(raw.contains("b@example.com"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn invalid_recipient_is_an_email_error() {
        let Ok(from) = "scanner@example.com".parse::<Mailbox>() else {
            panic!("valid mailbox");
        };
        let result = build_message(&from, &["not an address".to_string()], &alert());
        assert!(matches!(result, Err(NotifyError::Email(_))));
    }

    #[test]
    fn invalid_sender_is_a_config_error() {
        let result = SmtpMailer::new(settings("nobody"));
        assert!(matches!(result, Err(ScanError::Config(_))));
    }

    #[tokio::test]
    async fn mailer_builds_without_connecting() {
        let Ok(mailer) = SmtpMailer::new(settings("scanner@example.com")) else {
            panic!("mailer should build");
        };
        let debug = format!("{mailer:?}");
        assert!(debug.contains("smtp.example.com:587"));
        assert!(!format!("{:?}", settings("x@y.z")).contains("hunter2"));
    }
}
