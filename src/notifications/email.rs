//! Outbound email: a bounded queue drained by one worker thread.
//!
//! Sending never blocks and never reports failure to the caller. A full
//! queue or a stopped worker drops the message with a warning; delivery
//! errors are logged by the worker. At most once, no retry.

use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail relay HTTP error: {0}")]
    Http(String),

    #[error("Mail relay rejected message (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Email queue is full")]
    QueueFull,

    #[error("Email worker is stopped")]
    Stopped,
}

/// Message handed to a transport. Serializes to the relay's JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Delivers one message. Called only from the email worker thread.
pub trait MailTransport: Send {
    fn deliver(&self, email: &OutboundEmail) -> Result<(), MailError>;
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct HttpMailRelay {
    url: String,
    timeout: Duration,
}

impl HttpMailRelay {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            timeout,
        }
    }
}

impl MailTransport for HttpMailRelay {
    fn deliver(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| MailError::Http(e.to_string()))?;

        let response = client
            .post(&self.url)
            .json(email)
            .send()
            .map_err(|e| MailError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Used when no relay is configured: records the message in the log only.
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn deliver(&self, email: &OutboundEmail) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email (log only)");
        Ok(())
    }
}

/// Test transport: keeps every delivered message, or fails every delivery.
#[derive(Clone, Default)]
pub struct CapturingTransport {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    fail: bool,
}

impl CapturingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl MailTransport for CapturingTransport {
    fn deliver(&self, email: &OutboundEmail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Rejected {
                status: 550,
                body: "mailbox unavailable".into(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }
}

/// Handle to the email worker.
///
/// Dropping the channel closes the queue, lets the worker drain what is
/// already queued, then joins it.
pub struct EmailChannel {
    from: String,
    sender: Option<SyncSender<OutboundEmail>>,
    handle: Option<JoinHandle<()>>,
}

impl EmailChannel {
    /// Spawns the worker. `capacity` bounds the number of queued messages.
    pub fn start(transport: Box<dyn MailTransport>, from: &str, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<OutboundEmail>(capacity.max(1));

        let handle = std::thread::spawn(move || {
            tracing::info!("Email worker started");
            for email in receiver {
                match transport.deliver(&email) {
                    Ok(()) => tracing::info!(to = %email.to, subject = %email.subject, "Email sent"),
                    Err(e) => tracing::warn!(
                        to = %email.to,
                        subject = %email.subject,
                        error = %e,
                        "Email delivery failed"
                    ),
                }
            }
            tracing::info!("Email worker shutting down");
        });

        Self {
            from: from.to_string(),
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    /// Queues a message without blocking. Drops it with a warning when the
    /// queue is full or the worker has stopped.
    pub fn send(&self, to: &str, subject: &str, html: &str) {
        if let Err(e) = self.try_send(to, subject, html) {
            tracing::warn!(to = %to, subject = %subject, error = %e, "Email dropped");
        }
    }

    fn try_send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        let sender = self.sender.as_ref().ok_or(MailError::Stopped)?;
        let email = OutboundEmail {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        };
        sender.try_send(email).map_err(|e| match e {
            TrySendError::Full(_) => MailError::QueueFull,
            TrySendError::Disconnected(_) => MailError::Stopped,
        })
    }
}

impl Drop for EmailChannel {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
