use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Failed to build email: {0}")]
    Build(String),
    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// A plain-text email ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound email channel
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError>;
}

/// Connection settings for [`SmtpMailer`]
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
    /// Use an implicit/STARTTLS relay; plain connections are for local relays only
    pub use_tls: bool,
    /// Upper bound on one SMTP exchange
    pub timeout: Duration,
}

/// SMTP mailer on the async tokio transport
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_header: String,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Result<Self, MailerError> {
        let mut builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| MailerError::Transport(format!("SMTP relay error: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };

        builder = builder
            .port(settings.port)
            .timeout(Some(settings.timeout));
        if let (Some(username), Some(password)) = (settings.username, settings.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from_header: format!("{} <{}>", settings.from_name, settings.from_address),
        })
    }

    fn build_message(&self, message: &EmailMessage) -> Result<Message, MailerError> {
        Message::builder()
            .from(
                self.from_header
                    .parse()
                    .map_err(|e| MailerError::InvalidAddress(format!("from: {e}")))?,
            )
            .to(message
                .to
                .parse()
                .map_err(|e| MailerError::InvalidAddress(format!("to: {e}")))?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| MailerError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, message), fields(subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError> {
        let email = self.build_message(message)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MailerError::Transport(e.to_string()))?;

        info!("Email handed to SMTP relay");
        Ok(())
    }
}
