use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::extract::JsonBody;
use crate::attachments::ListedAttachment;
use crate::auth::UploadAdmin;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub image_data: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub name: String,
    pub original_name: String,
    pub size: usize,
    pub mime_type: &'static str,
}

/// The credential is checked by [`UploadAdmin`] before the body is parsed.
pub async fn upload(
    _admin: UploadAdmin,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UploadRequest>,
) -> AppResult<Json<UploadResponse>> {
    let image_data = payload
        .image_data
        .filter(|data| !data.is_empty())
        .ok_or_else(|| AppError::bad_request("No image data provided"))?;

    let attachment = state
        .attachments
        .accept(&image_data, payload.file_name.as_deref())
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        url: attachment.url,
        name: attachment.name,
        original_name: attachment.original_name,
        size: attachment.size,
        mime_type: attachment.mime_type,
    }))
}

#[derive(Serialize)]
pub struct UploadListResponse {
    pub images: Vec<ListedAttachment>,
}

pub async fn list_uploads(State(state): State<AppState>) -> AppResult<Json<UploadListResponse>> {
    let images = state.attachments.list().await?;
    Ok(Json(UploadListResponse { images }))
}
