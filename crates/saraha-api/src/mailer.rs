//! Outbound email. Handlers enqueue and move on; a worker task owns delivery.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, email: &OutboundEmail) -> anyhow::Result<()>;
}

/// Writes mail to the log instead of sending it. Used when no relay is set.
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, email: &OutboundEmail) -> anyhow::Result<()> {
        info!(to = %email.to, subject = %email.subject, "Email (log transport)");
        debug!("{}", email.text);
        Ok(())
    }
}

/// Posts each email as JSON to an HTTP relay.
pub struct RelayTransport {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl RelayTransport {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl EmailTransport for RelayTransport {
    fn name(&self) -> &str {
        "relay"
    }

    async fn deliver(&self, email: &OutboundEmail) -> anyhow::Result<()> {
        let mut req = self.client.post(&self.url).json(email);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send().await?.error_for_status()?;
        Ok(())
    }
}

/// Fire-and-forget handle onto the delivery queue.
#[derive(Clone)]
pub struct EmailDispatcher {
    tx: mpsc::Sender<OutboundEmail>,
}

impl EmailDispatcher {
    /// Dispatcher plus the raw receiving end, for callers that drain the
    /// queue themselves.
    pub fn channel() -> (Self, mpsc::Receiver<OutboundEmail>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        (Self { tx }, rx)
    }

    /// Start a worker that delivers everything queued through `transport`.
    pub fn spawn(transport: Arc<dyn EmailTransport>) -> Self {
        let (dispatcher, mut rx) = Self::channel();
        info!("Email transport: {}", transport.name());

        tokio::spawn(async move {
            while let Some(email) = rx.recv().await {
                if let Err(e) = transport.deliver(&email).await {
                    warn!(to = %email.to, "Email delivery failed: {:#}", e);
                }
            }
        });

        dispatcher
    }

    /// Never blocks. A full or closed queue drops the email with a warning.
    pub fn send(&self, email: OutboundEmail) {
        if let Err(e) = self.tx.try_send(email) {
            warn!("Email dropped before delivery: {}", e);
        }
    }
}

// -- Templates --

fn wrap(from: &str, to: &str, subject: &str, text: String, html: String) -> OutboundEmail {
    OutboundEmail {
        from: from.to_string(),
        to: to.to_string(),
        subject: subject.to_string(),
        text,
        html,
    }
}

pub fn verification_email(from: &str, to: &str, name: &str, link: &str) -> OutboundEmail {
    wrap(
        from,
        to,
        "Confirm your email",
        format!("Hi {name},\n\nConfirm your email address by opening this link:\n{link}\n"),
        format!(
            "<p>Hi {name},</p><p>Confirm your email address:</p>\
             <p><a href=\"{link}\">Verify email</a></p>"
        ),
    )
}

pub fn otp_email(from: &str, to: &str, name: &str, otp: &str) -> OutboundEmail {
    wrap(
        from,
        to,
        "Password reset code",
        format!("Hi {name},\n\nYour password reset code is {otp}. It expires in 10 minutes.\n"),
        format!(
            "<p>Hi {name},</p><p>Your password reset code is <b>{otp}</b>.</p>\
             <p>It expires in 10 minutes.</p>"
        ),
    )
}

pub fn password_changed_email(from: &str, to: &str, name: &str) -> OutboundEmail {
    wrap(
        from,
        to,
        "Your password was changed",
        format!("Hi {name},\n\nYour password has been updated.\n"),
        format!("<p>Hi {name},</p><p>Your password has been updated.</p>"),
    )
}

pub fn profile_updated_email(from: &str, to: &str, name: &str) -> OutboundEmail {
    wrap(
        from,
        to,
        "Your profile was updated",
        format!("Hi {name},\n\nYour profile details have been updated.\n"),
        format!("<p>Hi {name},</p><p>Your profile details have been updated.</p>"),
    )
}

pub fn account_deleted_email(from: &str, to: &str, name: &str) -> OutboundEmail {
    wrap(
        from,
        to,
        "Your account was deleted",
        format!("Goodbye {name},\n\nYour account and received messages have been deleted.\n"),
        format!("<p>Goodbye {name},</p><p>Your account and received messages have been deleted.</p>"),
    )
}
