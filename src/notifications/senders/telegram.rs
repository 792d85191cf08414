use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{ensure_success, NotificationHandler, SenderError};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Sends through the Telegram Bot API. The destination is the chat id.
pub struct TelegramSender {
    client: Client,
    bot_token: String,
    api_base: String,
}

impl TelegramSender {
    pub fn new(client: Client, bot_token: impl Into<String>) -> Self {
        Self {
            client,
            bot_token: bot_token.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Escapes text for Telegram MarkdownV2.
    /// Characters to escape: _ * [ ] ( ) ~ ` > # + - = | { } . !
    fn escape_markdown_v2(text: &str) -> String {
        let mut escaped_text = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '='
                | '|' | '{' | '}' | '.' | '!' | '\\' => {
                    escaped_text.push('\\');
                    escaped_text.push(c);
                }
                _ => escaped_text.push(c),
            }
        }
        escaped_text
    }
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[async_trait]
impl NotificationHandler for TelegramSender {
    async fn send(&self, destination: &str, message: &str) -> Result<(), SenderError> {
        let chat_id = destination.trim();
        if chat_id.is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "Telegram chat id is empty.".to_string(),
            ));
        }
        let api_url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let escaped_message = Self::escape_markdown_v2(message);
        let payload = TelegramMessage {
            chat_id,
            text: &escaped_message,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&api_url).json(&payload).send().await?;
        ensure_success(response, "Telegram API").await
    }
}
