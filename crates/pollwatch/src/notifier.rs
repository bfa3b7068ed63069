//! Operator notifications.
//!
//! The engine only sees the [`Notifier`] trait. [`SmtpNotifier`] delivers
//! HTML mail over an implicit-TLS SMTP session.

use chrono::Local;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::NotifyError;

/// Delivers a subject/body message to an operator
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Timestamp format used in every message and log line
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_stamp() -> String { Local::now().format(TIMESTAMP_FORMAT).to_string() }

/// Implicit-TLS SMTP port
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// SMTP account used for notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub sender: String,
    pub password: String,
    pub receiver: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_SMTP_PORT,
            sender: String::new(),
            password: String::new(),
            receiver: String::new(),
        }
    }
}

impl SmtpSettings {
    /// Notifications are only enabled when every field is filled in
    pub fn is_complete(&self) -> bool {
        !self.server.is_empty()
            && self.port != 0
            && !self.sender.is_empty()
            && !self.password.is_empty()
            && !self.receiver.is_empty()
    }
}

/// Sends HTML mail through an SSL-wrapped SMTP session
pub struct SmtpNotifier {
    settings: SmtpSettings,
    /// Context line shown at the top of each mail, e.g. the exam stage
    context: String,
}

impl SmtpNotifier {
    pub fn new(settings: SmtpSettings, context: impl Into<String>) -> Result<Self, NotifyError> {
        if !settings.is_complete() {
            return Err(NotifyError::Config("incomplete SMTP settings".to_string()));
        }

        Ok(Self { settings, context: context.into() })
    }

    /// Send the setup check message
    pub async fn send_test(&self) -> Result<(), NotifyError> {
        let (subject, body) = test_message();
        self.deliver(&subject, &body).await
    }

    async fn deliver(&self, subject: &str, html: &str) -> Result<(), NotifyError> {
        let sender = self
            .settings
            .sender
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Config(format!("sender address: {e}")))?;
        let receiver = self
            .settings
            .receiver
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Config(format!("receiver address: {e}")))?;

        let message = Message::builder()
            .from(sender)
            .to(receiver)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| NotifyError::Config(format!("message: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.settings.server)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(self.settings.port)
            .credentials(Credentials::new(
                self.settings.sender.clone(),
                self.settings.password.clone(),
            ))
            .build();

        debug!(server = %self.settings.server, port = self.settings.port, "Sending mail");
        transport.send(message).await.map_err(classify_smtp_error)?;
        info!(subject, "Mail sent");

        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let html = envelope(&self.context, body);
        self.deliver(subject, &html).await
    }
}

/// 535 and friends are credential problems; everything else is transport
fn classify_smtp_error(error: lettre::transport::smtp::Error) -> NotifyError {
    let auth_failure = error.status().is_some_and(|code| code.to_string().starts_with("53"));
    if auth_failure {
        NotifyError::Auth(error.to_string())
    } else {
        NotifyError::Transport(error.to_string())
    }
}

/// Wrap a message body in the common HTML frame
pub fn envelope(context: &str, content: &str) -> String {
    format!(
        "<h2>Result watch notification</h2>\n<p>Stage: {context}</p>\n<p>Sent at: {}</p>\n<hr>\n{content}\n<p style=\"color:gray\">Sent automatically by pollwatch, do not reply</p>\n",
        now_stamp()
    )
}

/// Subject and body announcing a published result
pub fn success_message(payload: &str) -> (String, String) {
    ("Result published".to_string(), format!("<h3>Result published</h3>\n<p>{payload}</p>"))
}

/// Subject and body of the throttled failure reminder
pub fn failure_summary(stage: &str, attempts: u32, last_reason: &str, at: &str) -> (String, String) {
    let subject = format!("Result query failure reminder - {attempts} attempts so far");
    let body = format!(
        "<h3>Result query failure reminder</h3>\n<p>Stage: {stage}</p>\n<p>Attempts so far: {attempts}</p>\n<p>Last error: {last_reason}</p>\n<p>Last attempt at: {at}</p>"
    );
    (subject, body)
}

/// Subject and body used to check the SMTP setup
pub fn test_message() -> (String, String) {
    let body = format!(
        "<h2>Test mail</h2>\n<p>This is a test message from pollwatch.</p>\n<p>If you can read it, your mail settings are correct.</p>\n<p style=\"color:gray\">Sent at: {}</p>",
        now_stamp()
    );
    ("pollwatch test mail".to_string(), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            server: "smtp.x.test".into(),
            port: 465,
            sender: "bot@x.test".into(),
            password: "secret".into(),
            receiver: "me@x.test".into(),
        }
    }

    #[test]
    fn test_incomplete_settings_rejected() {
        let mut incomplete = settings();
        incomplete.password.clear();
        assert!(!incomplete.is_complete());
        assert!(matches!(SmtpNotifier::new(incomplete, "2025 H1"), Err(NotifyError::Config(_))));
        assert!(SmtpNotifier::new(settings(), "2025 H1").is_ok());
    }

    #[tokio::test]
    async fn test_bad_sender_is_config_error() {
        let mut bad = settings();
        bad.sender = "not an address".into();
        let notifier = SmtpNotifier::new(bad, "2025 H1").unwrap();

        let result = notifier.notify("subject", "body").await;
        assert!(matches!(result, Err(NotifyError::Config(_))), "got {result:?}");
    }

    #[test]
    fn test_failure_summary_contents() {
        let (subject, body) = failure_summary("2025 H1", 20, "HTTP error: 502", "2025-06-30 10:00:00");
        assert!(subject.contains("20 attempts"));
        assert!(body.contains("2025 H1"));
        assert!(body.contains("HTTP error: 502"));
        assert!(body.contains("2025-06-30 10:00:00"));
    }

    #[test]
    fn test_envelope_wraps_content() {
        let html = envelope("2025 H1", "<p>inner</p>");
        assert!(html.contains("Stage: 2025 H1"));
        assert!(html.contains("<p>inner</p>"));
    }
}
