use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::submissions::{
    parse_date_bound, DateBound, FileRef, Submission, SubmissionFilter, DEFAULT_LIST_LIMIT,
    MAX_LIST_LIMIT,
};

/// List query string. Values stay strings so empty parameters (`?search=`)
/// mean "no filter" instead of failing to parse.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub search: Option<String>,
    pub service: Option<String>,
    pub position: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_count(field: &str, raw: Option<String>) -> AppResult<Option<i64>> {
    match non_empty(raw) {
        None => Ok(None),
        Some(raw) => match raw.parse::<i64>() {
            Ok(value) if value >= 0 => Ok(Some(value)),
            _ => Err(AppError::validation(
                json!({ field: "must be a non-negative integer" }),
            )),
        },
    }
}

fn parse_bound(field: &str, raw: Option<String>, bound: DateBound) -> AppResult<Option<DateTime<Utc>>> {
    match non_empty(raw) {
        None => Ok(None),
        Some(raw) => parse_date_bound(&raw, bound).map(Some).ok_or_else(|| {
            AppError::validation(json!({ field: "must be a date (YYYY-MM-DD) or RFC 3339 timestamp" }))
        }),
    }
}

impl ListQuery {
    /// `category` is the resource's own filter column (`service` or `position`).
    pub fn into_filter(self, category: Option<String>) -> AppResult<SubmissionFilter> {
        let filter = SubmissionFilter {
            search: non_empty(self.search),
            category: non_empty(category),
            created_from: parse_bound("startDate", self.start_date, DateBound::Start)?,
            created_until: parse_bound("endDate", self.end_date, DateBound::End)?,
            limit: parse_count("limit", self.limit)?
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .min(MAX_LIST_LIMIT),
            offset: parse_count("offset", self.offset)?.unwrap_or(0),
        };
        if let (Some(from), Some(until)) = (filter.created_from, filter.created_until) {
            if from > until {
                return Err(AppError::validation(
                    json!({ "startDate": "must not be after endDate" }),
                ));
            }
        }
        Ok(filter)
    }
}

/// Rejects any file reference that was not issued by the upload endpoint.
pub async fn verify_files(state: &AppState, files: Option<&[FileRef]>) -> AppResult<()> {
    for file in files.unwrap_or_default() {
        state.attachments.verify_issued(&file.url).await?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteView {
    pub id: i32,
    pub quote_number: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub service: Option<String>,
    pub message: Option<String>,
    pub files: Option<Vec<FileRef>>,
    pub created_at: DateTime<Utc>,
}

impl From<Submission> for QuoteView {
    fn from(value: Submission) -> Self {
        Self {
            quote_number: value.quote_number(),
            id: value.id,
            name: value.name,
            email: value.email,
            phone: value.phone,
            service: value.category,
            message: value.message,
            files: value.files,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub message: Option<String>,
    pub files: Option<Vec<FileRef>>,
    pub created_at: DateTime<Utc>,
}

impl From<Submission> for ApplicationView {
    fn from(value: Submission) -> Self {
        Self {
            id: value.id,
            name: value.name,
            email: value.email,
            phone: value.phone,
            position: value.category,
            message: value.message,
            files: value.files,
            created_at: value.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_parameters_mean_no_filter() {
        let query = ListQuery {
            search: Some("".into()),
            service: Some("  ".into()),
            limit: Some("".into()),
            ..Default::default()
        };
        let category = query.service.clone();
        let filter = query.into_filter(category).unwrap();
        assert!(filter.search.is_none());
        assert!(filter.category.is_none());
        assert_eq!(filter.limit, DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn limit_is_capped_and_negative_values_rejected() {
        let capped = ListQuery {
            limit: Some("5000".into()),
            ..Default::default()
        }
        .into_filter(None)
        .unwrap();
        assert_eq!(capped.limit, MAX_LIST_LIMIT);

        let err = ListQuery {
            offset: Some("-1".into()),
            ..Default::default()
        }
        .into_filter(None)
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let err = ListQuery {
            start_date: Some("2026-02-01".into()),
            end_date: Some("2026-01-01".into()),
            ..Default::default()
        }
        .into_filter(None)
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
