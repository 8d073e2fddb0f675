use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::config::EmailConfig;

use super::{render_body, Message};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("building message failed: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp failure: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Sends plain-text summaries over SMTP.
pub struct EmailNotifier {
    cfg: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(cfg: EmailConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)?
            .port(cfg.smtp_port);
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ));
        }
        Ok(EmailNotifier {
            transport: builder.build(),
            cfg,
        })
    }

    pub async fn send(&self, msg: &Message) -> Result<(), NotifyError> {
        let from: Mailbox = self.cfg.from.parse()?;
        let mut builder = lettre::Message::builder().from(from).subject(format!(
            "{} {} by {}",
            msg.filename,
            msg.direction.verb(),
            self.cfg.company_name,
        ));
        for recipient in &self.cfg.to {
            builder = builder.to(recipient.parse()?);
        }
        let email = builder.body(render_body(&self.cfg.company_name, msg))?;
        self.transport.send(email).await?;
        Ok(())
    }
}
