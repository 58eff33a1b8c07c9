//! Outbound email
//!
//! The task processor only needs [`EmailSender`]. [`HttpMailer`] delivers
//! through a transactional-mail HTTP API; [`LogMailer`] writes the message
//! to the log instead, for local runs.

pub mod http;

pub use http::HttpMailer;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("email has no recipients")]
    NoRecipients,

    #[error("mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail API rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// HTML email message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub content: String,
}

impl Email {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            subject: subject.into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, email: &Email) -> Result<(), MailError>;
}

/// Logs messages instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send_email(&self, email: &Email) -> Result<(), MailError> {
        if email.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        tracing::info!(
            to = ?email.to,
            subject = %email.subject,
            content = %email.content,
            "email not delivered (log mailer)"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records sent messages; fails the first `fail_times` sends
    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub(crate) sent: Mutex<Vec<Email>>,
        fail_times: AtomicUsize,
    }

    impl RecordingMailer {
        pub(crate) fn failing(times: usize) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_times: AtomicUsize::new(times),
            }
        }

        pub(crate) fn sent(&self) -> Vec<Email> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingMailer {
        async fn send_email(&self, email: &Email) -> Result<(), MailError> {
            let remaining = self.fail_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_times.store(remaining - 1, Ordering::SeqCst);
                return Err(MailError::Rejected {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }
}
