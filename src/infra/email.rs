//! Outgoing email.
//!
//! Messages are written to the structured log; a deployment that needs
//! real delivery plugs an SMTP or API-backed [`EmailSender`] in its place.

use async_trait::async_trait;
use tracing::info;

use crate::domain::{AppError, EmailMessage, EmailSender};

#[derive(Debug, Clone)]
pub struct LogEmailSender {
    from: String,
}

impl LogEmailSender {
    pub fn new(from: &str) -> Self {
        Self {
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "Email dispatched"
        );
        Ok(())
    }
}
