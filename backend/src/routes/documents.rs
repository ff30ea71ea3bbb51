use axum::{extract::State, Json};

use super::extract::JsonBody;
use crate::documents::{GeneratedDocument, QuoteSnapshot};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn generate_document(
    State(state): State<AppState>,
    JsonBody(snapshot): JsonBody<Option<QuoteSnapshot>>,
) -> AppResult<Json<GeneratedDocument>> {
    let snapshot = snapshot.ok_or_else(|| AppError::bad_request("No data provided"))?;
    let document = state.renderer.render(&snapshot).await?;
    Ok(Json(document))
}
