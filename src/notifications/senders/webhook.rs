use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client};
use tera::{Context, Tera};

use super::{ensure_success, NotificationHandler, SenderError};

pub const SERVICE_NAME: &str = "Watchdog Uptime Monitoring";

/// Body sent when no template is configured. Values are JSON-encoded by the
/// template itself so any message text stays valid JSON.
pub const DEFAULT_BODY_TEMPLATE: &str = r#"{"alertMessage": {{ alert_message | json_encode() | safe }}, "service": {{ service | json_encode() | safe }}, "timestamp": {{ timestamp | json_encode() | safe }}}"#;

/// POSTs a JSON document rendered from a Tera template to the destination URL.
pub struct WebhookSender {
    client: Client,
    body_template: String,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new(Client::new(), None)
    }
}

impl WebhookSender {
    pub fn new(client: Client, body_template: Option<String>) -> Self {
        Self {
            client,
            body_template: body_template.unwrap_or_else(|| DEFAULT_BODY_TEMPLATE.to_string()),
        }
    }

    pub fn render_body(&self, message: &str) -> Result<String, SenderError> {
        let mut context = Context::new();
        context.insert("alert_message", message);
        context.insert("service", SERVICE_NAME);
        context.insert("timestamp", &Utc::now().to_rfc3339());
        let body = Tera::one_off(&self.body_template, &context, false)
            .map_err(|e| SenderError::TemplatingError(e.to_string()))?;
        serde_json::from_str::<serde_json::Value>(&body).map_err(|e| {
            SenderError::TemplatingError(format!("rendered body is not valid JSON: {e}"))
        })?;
        Ok(body)
    }
}

#[async_trait]
impl NotificationHandler for WebhookSender {
    async fn send(&self, destination: &str, message: &str) -> Result<(), SenderError> {
        let body = self.render_body(message)?;
        let response = self
            .client
            .post(destination)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        ensure_success(response, "Webhook").await
    }
}
