use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::{NotificationHandler, SenderError};

pub const ALERT_SUBJECT: &str = "Watchdog Uptime Alert!";
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Sends plain-text alert mails over a STARTTLS SMTP relay.
pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailSender {
    pub fn new(settings: &SmtpSettings) -> Result<Self, SenderError> {
        let from: Mailbox = settings.from_address.parse()?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port);
        if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

pub(crate) fn build_alert_mail(from: Mailbox, to: &str, message: &str) -> Result<Message, SenderError> {
    let to: Mailbox = to.trim().parse()?;
    let mail = Message::builder()
        .from(from)
        .to(to)
        .subject(ALERT_SUBJECT)
        .header(ContentType::TEXT_PLAIN)
        .body(message.to_string())?;
    Ok(mail)
}

#[async_trait]
impl NotificationHandler for EmailSender {
    async fn send(&self, destination: &str, message: &str) -> Result<(), SenderError> {
        let mail = build_alert_mail(self.from.clone(), destination, message)?;
        self.mailer.send(mail).await?;
        info!(to = destination, "Alert email sent.");
        Ok(())
    }
}
