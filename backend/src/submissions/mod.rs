use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

pub mod memory;
pub mod postgres;

pub use memory::MemorySubmissionStore;
pub use postgres::PgSubmissionStore;

pub const DEFAULT_LIST_LIMIT: i64 = 200;
pub const MAX_LIST_LIMIT: i64 = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid submission: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("malformed files column: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0} does not exist")]
    MissingParent(String),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionKind {
    Quote,
    Application,
}

impl SubmissionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionKind::Quote => "quote",
            SubmissionKind::Application => "application",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    pub name: String,
}

/// A submission as accepted from a client. `category` is the quote's
/// `service` or the application's `position`.
#[derive(Debug, Clone, Validate)]
pub struct NewSubmission {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub message: Option<String>,
    pub files: Option<Vec<FileRef>>,
}

impl NewSubmission {
    /// Trims the identity fields and checks them before anything is written.
    pub fn prepared(mut self) -> StoreResult<Self> {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_string();
        self.validate()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: i32,
    pub kind: SubmissionKind,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub message: Option<String>,
    pub files: Option<Vec<FileRef>>,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    pub fn quote_number(&self) -> String {
        format!("DEV-{}-{:03}", self.created_at.year(), self.id)
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for SubmissionFilter {
    fn default() -> Self {
        Self {
            search: None,
            category: None,
            created_from: None,
            created_until: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl SubmissionFilter {
    /// `ILIKE` pattern for the free-text search, with wildcards escaped.
    pub fn search_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|search| {
            let escaped = search
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        })
    }

    pub fn matches(&self, submission: &Submission) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = submission.name.to_lowercase().contains(&needle)
                || submission.email.to_lowercase().contains(&needle)
                || submission
                    .message
                    .as_deref()
                    .is_some_and(|message| message.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if submission.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if submission.created_at < from {
                return false;
            }
        }
        if let Some(until) = self.created_until {
            if submission.created_at > until {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Start,
    End,
}

/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS` (read as UTC) and
/// bare dates. A bare end date covers the whole day.
pub fn parse_date_bound(raw: &str, bound: DateBound) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = match bound {
        DateBound::Start => NaiveTime::MIN,
        DateBound::End => NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)?,
    };
    Some(date.and_time(time).and_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteReply {
    pub id: i32,
    pub quote_id: i32,
    pub subject: String,
    pub message: String,
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuoteReply {
    pub quote_id: i32,
    pub subject: String,
    pub message: String,
    pub message_id: String,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync + 'static {
    /// Validates and persists one submission; the record and its file list are
    /// written together or not at all.
    async fn create(&self, kind: SubmissionKind, new: NewSubmission) -> StoreResult<Submission>;

    /// Newest first, ties broken by id.
    async fn list(
        &self,
        kind: SubmissionKind,
        filter: SubmissionFilter,
    ) -> StoreResult<Vec<Submission>>;

    async fn find(&self, kind: SubmissionKind, id: i32) -> StoreResult<Option<Submission>>;

    async fn record_reply(&self, reply: NewQuoteReply) -> StoreResult<QuoteReply>;

    async fn list_replies(&self, quote_id: i32) -> StoreResult<Vec<QuoteReply>>;
}
