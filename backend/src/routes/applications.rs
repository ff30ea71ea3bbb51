use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::extract::{JsonBody, QueryParams};
use super::submissions::{verify_files, ApplicationView, ListQuery};
use crate::error::AppResult;
use crate::state::AppState;
use crate::submissions::{FileRef, NewSubmission, SubmissionKind};

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub message: Option<String>,
    pub files: Option<Vec<FileRef>>,
}

#[derive(Serialize)]
pub struct ApplicationResponse {
    pub application: ApplicationView,
}

#[derive(Serialize)]
pub struct ApplicationListResponse {
    pub applications: Vec<ApplicationView>,
}

pub async fn create_application(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateApplicationRequest>,
) -> AppResult<(StatusCode, Json<ApplicationResponse>)> {
    // Field errors win over attachment errors.
    let new = NewSubmission {
        name: payload.name,
        email: payload.email,
        phone: payload.phone,
        category: payload.position,
        message: payload.message,
        files: payload.files,
    }
    .prepared()?;
    verify_files(&state, new.files.as_deref()).await?;

    let application = state
        .submissions
        .create(SubmissionKind::Application, new)
        .await?;
    info!(application_id = application.id, "application stored");

    Ok((
        StatusCode::CREATED,
        Json(ApplicationResponse {
            application: application.into(),
        }),
    ))
}

pub async fn list_applications(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListQuery>,
) -> AppResult<Json<ApplicationListResponse>> {
    let category = query.position.clone();
    let filter = query.into_filter(category)?;
    let applications = state
        .submissions
        .list(SubmissionKind::Application, filter)
        .await?;
    Ok(Json(ApplicationListResponse {
        applications: applications
            .into_iter()
            .map(ApplicationView::from)
            .collect(),
    }))
}
