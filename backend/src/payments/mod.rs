use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::documents::snapshot::DEFAULT_CURRENCY;
use crate::submissions::Submission;

pub mod ledger;

pub use ledger::{PaymentLedger, SettlementError, SettlementGateway, SimulatedGateway};

const CARD_DIGITS: usize = 16;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment attempt not found")]
    NotFound,
    #[error("invalid payment details: {0}")]
    InvalidDetails(String),
    #[error("cannot {action} a {from} payment")]
    InvalidTransition {
        from: PaymentStatus,
        action: &'static str,
    },
    #[error("a payment for quote {0} is already processing")]
    AttemptInFlight(String),
    #[error("quote {0} is already paid")]
    AlreadyPaid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    CreditCard,
    BankTransfer,
    Paypal,
}

impl PaymentMethod {
    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "carte bancaire",
            PaymentMethod::BankTransfer => "virement bancaire",
            PaymentMethod::Paypal => "PayPal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardDetails {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
    pub holder: String,
}

/// Form edits; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    pub method: Option<PaymentMethod>,
    pub card_number: Option<String>,
    pub expiry_date: Option<String>,
    pub cvv: Option<String>,
    pub cardholder_name: Option<String>,
    pub paypal_email: Option<String>,
}

/// Quote total the amount is frozen from.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmPricing {
    pub total: f64,
    pub currency: Option<String>,
}

/// Stored quote an attempt pays for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayableQuote {
    pub id: i32,
    pub number: String,
}

impl From<&Submission> for PayableQuote {
    fn from(quote: &Submission) -> Self {
        Self {
            id: quote.id,
            number: quote.quote_number(),
        }
    }
}

/// Moves `pending -> processing -> completed | failed`, never backwards.
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub quote: PayableQuote,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub card: CardDetails,
    pub paypal_email: Option<String>,
}

impl PaymentAttempt {
    pub fn new(quote: PayableQuote, method: PaymentMethod) -> Self {
        Self {
            id: Uuid::new_v4(),
            quote,
            amount: None,
            currency: None,
            method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            created_at: Utc::now(),
            processed_at: None,
            failure_reason: None,
            card: CardDetails::default(),
            paypal_email: None,
        }
    }

    fn require(&self, expected: PaymentStatus, action: &'static str) -> Result<(), PaymentError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(PaymentError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    pub fn apply(&mut self, update: PaymentUpdate) -> Result<(), PaymentError> {
        self.require(PaymentStatus::Pending, "edit")?;
        if let Some(method) = update.method {
            self.method = method;
        }
        if let Some(number) = update.card_number {
            self.card.number = format_card_number(&number);
        }
        if let Some(expiry) = update.expiry_date {
            self.card.expiry = expiry.trim().to_string();
        }
        if let Some(cvv) = update.cvv {
            self.card.cvv = cvv.chars().filter(char::is_ascii_digit).take(4).collect();
        }
        if let Some(holder) = update.cardholder_name {
            self.card.holder = holder.trim().to_string();
        }
        if let Some(email) = update.paypal_email {
            let email = email.trim().to_string();
            self.paypal_email = (!email.is_empty()).then_some(email);
        }
        Ok(())
    }

    /// `pending -> processing`: validates the method fields and freezes the
    /// amount.
    pub fn confirm(&mut self, pricing: &ConfirmPricing) -> Result<(), PaymentError> {
        self.require(PaymentStatus::Pending, "confirm")?;
        if !pricing.total.is_finite() || pricing.total <= 0.0 {
            return Err(PaymentError::InvalidDetails(
                "amount must be greater than zero".into(),
            ));
        }
        if self.method == PaymentMethod::CreditCard {
            validate_card(&self.card)?;
        }
        let currency = pricing
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_uppercase();

        self.amount = Some(pricing.total);
        self.currency = Some(currency);
        self.status = PaymentStatus::Processing;
        Ok(())
    }

    /// `processing -> completed`. Returns `false` when the attempt was already
    /// completed so callers fire their callbacks once.
    pub fn complete(&mut self, transaction_id: String) -> Result<bool, PaymentError> {
        if self.status == PaymentStatus::Completed {
            return Ok(false);
        }
        self.require(PaymentStatus::Processing, "complete")?;
        self.status = PaymentStatus::Completed;
        self.transaction_id = Some(transaction_id);
        self.processed_at = Some(Utc::now());
        Ok(true)
    }

    /// `processing -> failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), PaymentError> {
        self.require(PaymentStatus::Processing, "fail")?;
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.processed_at = Some(Utc::now());
        Ok(())
    }
}

/// Keeps digits only (at most 16) and groups them by four.
pub fn format_card_number(raw: &str) -> String {
    let digits: Vec<char> = raw
        .chars()
        .filter(char::is_ascii_digit)
        .take(CARD_DIGITS)
        .collect();
    digits
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

fn validate_card(card: &CardDetails) -> Result<(), PaymentError> {
    let digits = card.number.chars().filter(char::is_ascii_digit).count();
    if digits != CARD_DIGITS {
        return Err(PaymentError::InvalidDetails(format!(
            "card number must have {CARD_DIGITS} digits"
        )));
    }
    if !valid_expiry(&card.expiry) {
        return Err(PaymentError::InvalidDetails(
            "expiry date must be MM/YY".into(),
        ));
    }
    if !(3..=4).contains(&card.cvv.len()) {
        return Err(PaymentError::InvalidDetails("cvv must have 3 or 4 digits".into()));
    }
    if card.holder.is_empty() {
        return Err(PaymentError::InvalidDetails(
            "cardholder name is required".into(),
        ));
    }
    Ok(())
}

fn valid_expiry(raw: &str) -> bool {
    let Some((month, year)) = raw.split_once('/') else {
        return false;
    };
    let two_digits = |s: &str| s.len() == 2 && s.chars().all(|c| c.is_ascii_digit());
    two_digits(month) && two_digits(year) && matches!(month.parse::<u8>(), Ok(1..=12))
}

/// Hooks run once per completed attempt.
pub trait PaymentObserver: Send + Sync + 'static {
    fn payment_completed(&self, attempt: &PaymentAttempt);
}

#[derive(Debug, Clone)]
pub struct BankDetails {
    pub iban: String,
    pub bic: String,
    pub beneficiary: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PaymentInstructions {
    Card,
    BankTransfer {
        iban: String,
        bic: String,
        beneficiary: String,
        reference: String,
    },
    Redirect {
        notice: String,
    },
}

/// Client-facing view; card data is masked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: Uuid,
    pub quote_id: i32,
    pub quote_number: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub card_last4: Option<String>,
    pub cardholder_name: Option<String>,
    pub paypal_email: Option<String>,
    pub instructions: PaymentInstructions,
}

impl PaymentView {
    pub fn new(attempt: PaymentAttempt, bank: &BankDetails) -> Self {
        let digits: String = attempt.card.number.chars().filter(char::is_ascii_digit).collect();
        let card_last4 = (digits.len() >= 4).then(|| digits[digits.len() - 4..].to_string());
        let instructions = match attempt.method {
            PaymentMethod::CreditCard => PaymentInstructions::Card,
            PaymentMethod::BankTransfer => PaymentInstructions::BankTransfer {
                iban: bank.iban.clone(),
                bic: bank.bic.clone(),
                beneficiary: bank.beneficiary.clone(),
                reference: attempt.quote.number.clone(),
            },
            PaymentMethod::Paypal => PaymentInstructions::Redirect {
                notice: "Vous serez redirigé vers PayPal pour finaliser votre paiement en toute sécurité."
                    .into(),
            },
        };
        Self {
            id: attempt.id,
            quote_id: attempt.quote.id,
            quote_number: attempt.quote.number,
            amount: attempt.amount,
            currency: attempt.currency,
            method: attempt.method,
            status: attempt.status,
            transaction_id: attempt.transaction_id,
            created_at: attempt.created_at,
            processed_at: attempt.processed_at,
            failure_reason: attempt.failure_reason,
            card_last4,
            cardholder_name: (!attempt.card.holder.is_empty()).then_some(attempt.card.holder),
            paypal_email: attempt.paypal_email,
            instructions,
        }
    }
}
