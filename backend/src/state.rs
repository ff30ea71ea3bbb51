use std::sync::Arc;

use crate::{
    attachments::AttachmentValidator,
    config::AppConfig,
    documents::{DocumentRenderer, PdfEngine},
    notifications::{Mailer, NotificationDispatcher},
    payments::{BankDetails, PaymentLedger, SettlementGateway},
    storage::ObjectStorage,
    submissions::SubmissionStore,
};

/// External collaborators, built once at start-up (or faked in tests).
pub struct Collaborators {
    pub submissions: Arc<dyn SubmissionStore>,
    pub uploads: Arc<dyn ObjectStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub pdf_engine: Arc<dyn PdfEngine>,
    pub settlement: Arc<dyn SettlementGateway>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub attachments: AttachmentValidator,
    pub renderer: Arc<DocumentRenderer>,
    pub notifications: NotificationDispatcher,
    pub payments: Arc<PaymentLedger>,
    pub bank: Arc<BankDetails>,
}

impl AppState {
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Self {
        let notifications =
            NotificationDispatcher::new(collaborators.mailer, config.admin_email.clone());
        let renderer = DocumentRenderer::new(
            collaborators.pdf_engine,
            config.generated_dir.clone(),
            config.render_timeout,
        );
        let payments = PaymentLedger::new(
            collaborators.settlement,
            Arc::new(notifications.clone()),
        );
        let bank = BankDetails {
            iban: config.payment.iban.clone(),
            bic: config.payment.bic.clone(),
            beneficiary: config.payment.beneficiary.clone(),
        };

        Self {
            submissions: collaborators.submissions,
            attachments: AttachmentValidator::new(collaborators.uploads),
            renderer: Arc::new(renderer),
            notifications,
            payments: Arc::new(payments),
            bank: Arc::new(bank),
            config: Arc::new(config),
        }
    }
}
