use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::senders::discord::DiscordSender;
use super::senders::email::{EmailSender, SmtpSettings};
use super::senders::telegram::TelegramSender;
use super::senders::webhook::WebhookSender;
use super::senders::NotificationHandler;
use crate::db::enums::AlertType;

/// Sender settings taken from the server configuration.
#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    pub smtp: Option<SmtpSettings>,
    pub telegram_bot_token: Option<String>,
    pub webhook_body_template: Option<String>,
}

/// Maps each alert type to the handler that delivers it. Adding a channel
/// only takes a `register` call.
#[derive(Default, Clone)]
pub struct NotificationRegistry {
    handlers: HashMap<AlertType, Arc<dyn NotificationHandler>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the built-in senders. Telegram and e-mail are only available
    /// when their credentials are configured.
    pub fn from_settings(settings: &NotificationSettings) -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::new();
        registry.register(
            AlertType::GenericWebhook,
            Arc::new(WebhookSender::new(
                client.clone(),
                settings.webhook_body_template.clone(),
            )),
        );
        registry.register(
            AlertType::DiscordWebhook,
            Arc::new(DiscordSender::new(client.clone())),
        );

        match settings.telegram_bot_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => registry.register(
                AlertType::Telegram,
                Arc::new(TelegramSender::new(client, token)),
            ),
            None => info!("No Telegram bot token configured, TELEGRAM alerts are disabled."),
        }

        match &settings.smtp {
            Some(smtp) => match EmailSender::new(smtp) {
                Ok(sender) => registry.register(AlertType::Email, Arc::new(sender)),
                Err(e) => warn!(error = %e, host = %smtp.host, "Invalid SMTP settings, EMAIL alerts are disabled."),
            },
            None => info!("No SMTP host configured, EMAIL alerts are disabled."),
        }
        registry
    }

    pub fn register(&mut self, alert_type: AlertType, handler: Arc<dyn NotificationHandler>) {
        self.handlers.insert(alert_type, handler);
    }

    pub fn get(&self, alert_type: AlertType) -> Option<Arc<dyn NotificationHandler>> {
        self.handlers.get(&alert_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<AlertType> {
        let mut types: Vec<AlertType> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}
