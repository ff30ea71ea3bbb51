use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{Mailer, MessageId, NotifyError, OutgoingEmail};
use crate::config::SmtpConfig;

pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .timeout(Some(config.timeout));
        if config.starttls {
            let params = TlsParameters::new(config.host.clone())
                .map_err(|err| NotifyError::Transport(format!("tls setup failed: {err}")))?;
            builder = builder.tls(Tls::Required(params));
        } else {
            builder = builder.tls(Tls::None);
        }
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(host = %config.host, port = config.port, starttls = config.starttls, "smtp transport configured");
        Ok(Self {
            from,
            transport: builder.build(),
        })
    }

    fn message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    fn build(&self, email: OutgoingEmail, message_id: String) -> Result<Message, NotifyError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject)
            .message_id(Some(message_id));

        let built = match email.html {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            ),
            None => builder.header(ContentType::TEXT_PLAIN).body(email.text),
        };
        built.map_err(|err| NotifyError::Message(err.to_string()))
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, NotifyError> {
    raw.parse().map_err(|err: lettre::address::AddressError| NotifyError::Address {
        address: raw.to_string(),
        reason: err.to_string(),
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    async fn send(&self, email: OutgoingEmail) -> Result<MessageId, NotifyError> {
        let message_id = self.message_id();
        let message = self.build(email, message_id.clone())?;
        self.transport
            .send(message)
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        Ok(MessageId(message_id))
    }
}
