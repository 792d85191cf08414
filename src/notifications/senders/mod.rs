use async_trait::async_trait;
use thiserror::Error;

pub mod discord;
pub mod email;
pub mod telegram;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Email address error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Email build error: {0}")]
    Email(#[from] lettre::error::Error),
}

/// Delivers an alert message to one destination of a single alert type.
///
/// `destination` is whatever the alert configuration stores for that type:
/// a webhook URL, a chat id or an e-mail address.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> Result<(), SenderError>;
}

/// Turns a non-success response into `SendFailed`, keeping the body for diagnosis.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    target: &str,
) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(SenderError::SendFailed(format!(
        "{target} returned non-success status: {status}. Body: {error_body}"
    )))
}
