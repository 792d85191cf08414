use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{ensure_success, NotificationHandler, SenderError};

/// Discord rejects message content longer than this.
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Serialize)]
struct DiscordMessage<'a> {
    content: &'a str,
}

/// Posts the message to a Discord incoming webhook URL.
pub struct DiscordSender {
    client: Client,
}

impl Default for DiscordSender {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl DiscordSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn truncate_content(message: &str) -> &str {
    match message.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}

#[async_trait]
impl NotificationHandler for DiscordSender {
    async fn send(&self, destination: &str, message: &str) -> Result<(), SenderError> {
        let payload = DiscordMessage {
            content: truncate_content(message),
        };
        let response = self.client.post(destination).json(&payload).send().await?;
        ensure_success(response, "Discord webhook").await
    }
}
