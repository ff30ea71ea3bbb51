use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::extract::JsonBody;
use crate::error::{AppError, AppResult};
use crate::payments::{
    ConfirmPricing, PayableQuote, PaymentAttempt, PaymentMethod, PaymentUpdate, PaymentView,
};
use crate::state::AppState;
use crate::submissions::SubmissionKind;

/// A quote as the client names it: its id, or its `DEV-YYYY-NNN` number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum QuoteKey {
    Id(i32),
    Label(String),
}

impl QuoteKey {
    /// Row id to look up, plus the quote number the row must carry.
    fn lookup(&self) -> AppResult<(i32, Option<&str>)> {
        let label = match self {
            QuoteKey::Id(id) => return Ok((*id, None)),
            QuoteKey::Label(label) => label.trim(),
        };
        if label.is_empty() {
            return Err(AppError::bad_request("quoteId is required"));
        }
        if let Ok(id) = label.parse() {
            return Ok((id, None));
        }
        let id = label
            .rsplit_once('-')
            .and_then(|(_, id)| id.parse().ok())
            .ok_or_else(|| AppError::not_found("Quote not found"))?;
        Ok((id, Some(label)))
    }
}

async fn resolve_quote(state: &AppState, key: &QuoteKey) -> AppResult<PayableQuote> {
    let (id, number) = key.lookup()?;
    state
        .submissions
        .find(SubmissionKind::Quote, id)
        .await?
        .filter(|quote| number.map_or(true, |number| quote.quote_number() == number))
        .map(|quote| PayableQuote::from(&quote))
        .ok_or_else(|| AppError::not_found("Quote not found"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPaymentRequest {
    pub quote_id: QuoteKey,
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::CreditCard
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub pricing: ConfirmPricing,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub payment: PaymentView,
}

fn respond(state: &AppState, attempt: PaymentAttempt) -> Json<PaymentResponse> {
    Json(PaymentResponse {
        payment: PaymentView::new(attempt, &state.bank),
    })
}

pub async fn start_payment(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<StartPaymentRequest>,
) -> AppResult<(StatusCode, Json<PaymentResponse>)> {
    let quote = resolve_quote(&state, &payload.quote_id).await?;
    let attempt = state.payments.start(quote, payload.method)?;
    Ok((StatusCode::CREATED, respond(&state, attempt)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<PaymentResponse>> {
    let attempt = state.payments.get(payment_id)?;
    Ok(respond(&state, attempt))
}

pub async fn update_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    JsonBody(update): JsonBody<PaymentUpdate>,
) -> AppResult<Json<PaymentResponse>> {
    let attempt = state.payments.update(payment_id, update)?;
    Ok(respond(&state, attempt))
}

/// Answers once the attempt is processing; settlement continues in the
/// background and is observed through `GET /api/payments/:id`.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    JsonBody(payload): JsonBody<ConfirmPaymentRequest>,
) -> AppResult<(StatusCode, Json<PaymentResponse>)> {
    let attempt = state
        .payments
        .confirm_and_settle(payment_id, &payload.pricing)?;
    Ok((StatusCode::ACCEPTED, respond(&state, attempt)))
}
