//! HTTP mail API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Email, EmailSender, MailError};

/// Request body accepted by the mail API
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: String,
    to: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    cc: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    bcc: &'a [String],
    subject: &'a str,
    html: &'a str,
}

pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    sender_name: String,
    sender_address: String,
}

impl HttpMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        sender_name: impl Into<String>,
        sender_address: impl Into<String>,
    ) -> Result<Self, MailError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            sender_name: sender_name.into(),
            sender_address: sender_address.into(),
        })
    }

    fn from_header(&self) -> String {
        format!("{} <{}>", self.sender_name, self.sender_address)
    }
}

#[async_trait]
impl EmailSender for HttpMailer {
    async fn send_email(&self, email: &Email) -> Result<(), MailError> {
        if email.to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        let body = SendRequest {
            from: self.from_header(),
            to: &email.to,
            cc: &email.cc,
            bcc: &email.bcc,
            subject: &email.subject,
            html: &email.content,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "mail API rejected message");
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to = ?email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}
