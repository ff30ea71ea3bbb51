use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use crate::documents::{snapshot::format_amount, template::escape};
use crate::payments::{PaymentAttempt, PaymentObserver};
use crate::submissions::Submission;

pub mod smtp;

pub use smtp::SmtpMailer;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid address {address:?}: {reason}")]
    Address { address: String, reason: String },
    #[error("failed to build message: {0}")]
    Message(String),
    #[error("smtp delivery failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: OutgoingEmail) -> Result<MessageId, NotifyError>;
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    admin_email: String,
}

impl NotificationDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, admin_email: impl Into<String>) -> Self {
        Self {
            mailer,
            admin_email: admin_email.into(),
        }
    }

    /// Alerts the admin about a new quote request. Failures are only logged:
    /// the quote is already stored.
    pub async fn quote_created(&self, quote: &Submission) -> Option<MessageId> {
        let message = quote.message.as_deref().unwrap_or_default();
        let email = OutgoingEmail {
            to: self.admin_email.clone(),
            subject: format!("Nouvelle demande de devis (#{})", quote.id),
            text: format!(
                "Nouvelle demande de devis par {} ({})\nMessage: {}",
                quote.name, quote.email, message
            ),
            html: Some(format!(
                "<p>Nouvelle demande de devis par <strong>{}</strong> ({})</p><p>Message: {}</p>",
                escape(&quote.name),
                escape(&quote.email),
                escape(message)
            )),
        };
        match self.mailer.send(email).await {
            Ok(id) => {
                info!(quote_id = quote.id, message_id = %id.0, "admin notified of new quote");
                Some(id)
            }
            Err(err) => {
                error!(quote_id = quote.id, error = %err, "failed to notify admin of new quote");
                None
            }
        }
    }

    /// Sends an operator reply to the submitter. The caller reports failures.
    pub async fn send_reply(
        &self,
        to: &str,
        subject: &str,
        message: &str,
    ) -> Result<MessageId, NotifyError> {
        let html = format!("<p>{}</p>", escape(message).replace('\n', "<br/>"));
        let id = self
            .mailer
            .send(OutgoingEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                text: message.to_string(),
                html: Some(html),
            })
            .await?;
        info!(to, message_id = %id.0, "reply sent");
        Ok(id)
    }

    fn receipt(&self, attempt: &PaymentAttempt) -> OutgoingEmail {
        let amount = attempt
            .amount
            .map(format_amount)
            .unwrap_or_else(|| "?".to_string());
        let currency = attempt.currency.as_deref().unwrap_or_default();
        let transaction = attempt.transaction_id.as_deref().unwrap_or_default();
        OutgoingEmail {
            to: self.admin_email.clone(),
            subject: format!("Paiement reçu pour le devis {}", attempt.quote.number),
            text: format!(
                "Paiement de {amount} {currency} confirmé pour le devis {} ({}).\nTransaction: {transaction}",
                attempt.quote.number,
                attempt.method.label()
            ),
            html: None,
        }
    }
}

impl PaymentObserver for NotificationDispatcher {
    fn payment_completed(&self, attempt: &PaymentAttempt) {
        let email = self.receipt(attempt);
        let mailer = Arc::clone(&self.mailer);
        let quote_id = attempt.quote.id;
        tokio::spawn(async move {
            if let Err(err) = mailer.send(email).await {
                error!(quote_id, error = %err, "failed to send payment receipt");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::submissions::SubmissionKind;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<OutgoingEmail>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for Recorder {
        async fn send(&self, email: OutgoingEmail) -> Result<MessageId, NotifyError> {
            if self.fail {
                return Err(NotifyError::Transport("connection refused".into()));
            }
            self.sent.lock().unwrap().push(email);
            Ok(MessageId("<1@test>".into()))
        }
    }

    fn quote() -> Submission {
        Submission {
            id: 12,
            kind: SubmissionKind::Quote,
            name: "Jean <b>".into(),
            email: "jean@example.com".into(),
            phone: None,
            category: None,
            message: Some("Besoin d'un site".into()),
            files: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn quote_alert_goes_to_admin_with_escaped_html() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = NotificationDispatcher::new(recorder.clone(), "admin@example.com");
        assert!(dispatcher.quote_created(&quote()).await.is_some());

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].to, "admin@example.com");
        assert_eq!(sent[0].subject, "Nouvelle demande de devis (#12)");
        assert!(sent[0].text.contains("Besoin d'un site"));
        assert!(sent[0].html.as_deref().unwrap().contains("Jean &lt;b&gt;"));
    }

    #[tokio::test]
    async fn quote_alert_failure_is_swallowed() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(recorder, "admin@example.com");
        assert!(dispatcher.quote_created(&quote()).await.is_none());
    }

    #[tokio::test]
    async fn reply_failure_is_reported() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(recorder, "admin@example.com");
        let result = dispatcher
            .send_reply("jean@example.com", "Votre devis", "Bonjour")
            .await;
        assert!(matches!(result, Err(NotifyError::Transport(_))));
    }
}
