//! Outbound mail: OTP codes and collaboration invitations.
//!
//! Delivery is best-effort. [`send_best_effort`] logs and counts failures and
//! never surfaces them to the request that triggered the mail.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use tales_core::model::CollaborationRole;

use crate::config::MailConfig;

/// Subject line of OTP mails.
pub const OTP_SUBJECT: &str = "Your OTP for YourTales";

/// What a mail is for; used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    /// Account verification or password reset code.
    Otp,
    /// Collaboration invitation.
    Invitation,
}

impl MailKind {
    /// Returns the metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Otp => "otp",
            Self::Invitation => "invitation",
        }
    }
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Category.
    pub kind: MailKind,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

impl OutgoingMail {
    /// Renders an OTP mail.
    #[must_use]
    pub fn otp(to: &str, code: &str, ttl_secs: u64) -> Self {
        let minutes = ttl_secs.div_ceil(60);
        Self {
            kind: MailKind::Otp,
            to: to.to_string(),
            subject: OTP_SUBJECT.to_string(),
            html: format!(
                "<p>Your OTP is: <strong>{code}</strong>. It expires in {minutes} minutes.</p>"
            ),
        }
    }

    /// Renders a collaboration invitation.
    #[must_use]
    ///
    /// `inviter` and `title` are user-supplied and are escaped.
    pub fn invitation(to: &str, inviter: &str, title: &str, role: CollaborationRole) -> Self {
        let inviter = escape_html(inviter);
        let title = escape_html(title);
        Self {
            kind: MailKind::Invitation,
            to: to.to_string(),
            subject: format!("{inviter} invited you to collaborate on \"{title}\""),
            html: format!(
                "<p>{inviter} invited you to join <strong>{title}</strong> on YourTales as {}.</p>\
                 <p>Sign in with this address to accept or decline.</p>",
                role.as_str().to_ascii_lowercase()
            ),
        }
    }
}

/// Escapes text for interpolation into HTML element content or attributes.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c if c.is_control() => escaped.push(' '),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Errors from a mail transport.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The relay could not be reached.
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The relay answered with a non-success status.
    #[error("mail relay rejected message with status {status}")]
    Rejected {
        /// HTTP status returned by the relay.
        status: u16,
    },
}

/// A mail transport.
#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    /// Delivers one message.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Builds the transport selected by configuration.
#[must_use]
pub fn from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match config.relay_url.as_deref() {
        Some(url) => {
            tracing::info!(relay_url = %url, "Using HTTP mail relay");
            Arc::new(HttpRelayMailer::new(
                url,
                config.relay_token.clone(),
                config.from.clone(),
            ))
        }
        None => {
            tracing::warn!("TALES_MAIL_RELAY_URL not set; mail will be written to the log");
            Arc::new(LogMailer)
        }
    }
}

/// Sends `mail`, logging and counting the outcome.
pub async fn send_best_effort(mailer: &dyn Mailer, mail: OutgoingMail) {
    let kind = mail.kind.as_str();
    match mailer.send(&mail).await {
        Ok(()) => {
            tracing::info!(kind, to = %mail.to, "mail sent");
            crate::metrics::record_mail(kind, true);
        }
        Err(err) => {
            tracing::error!(kind, to = %mail.to, error = %err, "mail delivery failed");
            crate::metrics::record_mail(kind, false);
        }
    }
}

/// Writes messages to the log instead of sending them (development).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        tracing::warn!(
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.html,
            "mail relay not configured; message not sent"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct HttpRelayMailer {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    from: String,
}

impl std::fmt::Debug for HttpRelayMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRelayMailer")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl HttpRelayMailer {
    /// Creates a relay client.
    #[must_use]
    pub fn new(url: impl Into<String>, token: Option<String>, from: impl Into<String>) -> Self {
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "Failed to configure reqwest client; using defaults"
                );
                reqwest::Client::new()
            }
        };
        Self {
            http,
            url: url.into(),
            token,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpRelayMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let payload = RelayPayload {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            html: &mail.html,
        };
        let mut request = self.http.post(&self.url).json(&payload);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Keeps sent messages in memory (tests).
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl MemoryMailer {
    /// Creates an empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every message sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }

    /// Returns the code from the newest OTP mail addressed to `to`.
    #[must_use]
    pub fn latest_otp(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|mail| mail.kind == MailKind::Otp && mail.to.eq_ignore_ascii_case(to))
            .and_then(|mail| extract_code(&mail.html))
    }
}

fn extract_code(html: &str) -> Option<String> {
    let start = html.find("<strong>")? + "<strong>".len();
    let end = start + html[start..].find("</strong>")?;
    Some(html[start..end].to_string())
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}
