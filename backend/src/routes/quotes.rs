use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};
use validator::Validate;

use super::extract::{JsonBody, QueryParams, ValidJson};
use super::submissions::{verify_files, ListQuery, QuoteView};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::submissions::{FileRef, NewQuoteReply, NewSubmission, QuoteReply, SubmissionKind};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuoteRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub service: Option<String>,
    pub message: Option<String>,
    pub files: Option<Vec<FileRef>>,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    pub quote: QuoteView,
}

#[derive(Serialize)]
pub struct QuoteListResponse {
    pub quotes: Vec<QuoteView>,
}

pub async fn create_quote(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateQuoteRequest>,
) -> AppResult<(StatusCode, Json<QuoteResponse>)> {
    // Field errors win over attachment errors.
    let new = NewSubmission {
        name: payload.name,
        email: payload.email,
        phone: payload.phone,
        category: payload.service,
        message: payload.message,
        files: payload.files,
    }
    .prepared()?;
    verify_files(&state, new.files.as_deref()).await?;

    let quote = state
        .submissions
        .create(SubmissionKind::Quote, new)
        .await?;
    info!(quote_id = quote.id, "quote request stored");

    state.notifications.quote_created(&quote).await;

    Ok((
        StatusCode::CREATED,
        Json(QuoteResponse {
            quote: quote.into(),
        }),
    ))
}

pub async fn list_quotes(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListQuery>,
) -> AppResult<Json<QuoteListResponse>> {
    let category = query.service.clone();
    let filter = query.into_filter(category)?;
    let quotes = state
        .submissions
        .list(SubmissionKind::Quote, filter)
        .await?;
    Ok(Json(QuoteListResponse {
        quotes: quotes.into_iter().map(QuoteView::from).collect(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplyRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub subject: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
}

pub async fn reply_to_quote(
    State(state): State<AppState>,
    Path(quote_id): Path<i32>,
    ValidJson(payload): ValidJson<ReplyRequest>,
) -> AppResult<Json<Value>> {
    let quote = state
        .submissions
        .find(SubmissionKind::Quote, quote_id)
        .await?
        .ok_or_else(|| AppError::not_found("Quote not found"))?;

    let message_id = state
        .notifications
        .send_reply(&quote.email, &payload.subject, &payload.message)
        .await?;

    // The email is already out; a failed audit row must not turn into an error.
    if let Err(err) = state
        .submissions
        .record_reply(NewQuoteReply {
            quote_id: quote.id,
            subject: payload.subject,
            message: payload.message,
            message_id: message_id.0.clone(),
        })
        .await
    {
        error!(quote_id = quote.id, error = %err, "failed to record quote reply");
    }

    Ok(Json(json!({ "ok": true, "messageId": message_id.0 })))
}

#[derive(Serialize)]
pub struct ReplyListResponse {
    pub replies: Vec<QuoteReply>,
}

pub async fn list_quote_replies(
    State(state): State<AppState>,
    Path(quote_id): Path<i32>,
) -> AppResult<Json<ReplyListResponse>> {
    if state
        .submissions
        .find(SubmissionKind::Quote, quote_id)
        .await?
        .is_none()
    {
        return Err(AppError::not_found("Quote not found"));
    }
    let replies = state.submissions.list_replies(quote_id).await?;
    Ok(Json(ReplyListResponse { replies }))
}
