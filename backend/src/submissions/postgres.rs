use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use tracing::info;

use super::{
    FileRef, NewQuoteReply, NewSubmission, QuoteReply, StoreError, StoreResult, Submission,
    SubmissionFilter, SubmissionKind, SubmissionStore,
};
use crate::db::{PgPool, PgPooledConnection};
use crate::models::{
    ApplicationRow, NewApplicationRow, NewQuoteReplyRow, NewQuoteRow, QuoteReplyRow, QuoteRow,
};
use crate::schema::{applications, quote_replies, quotes};

/// Key of the transaction-scoped advisory lock serializing schema setup.
const SCHEMA_LOCK_KEY: i64 = 0x7175_6f74_6566_6c6f;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS quotes (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT,
    service TEXT,
    message TEXT,
    files JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS quotes_created_at_idx ON quotes (created_at DESC);

CREATE TABLE IF NOT EXISTS applications (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT,
    position TEXT,
    message TEXT,
    files JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS applications_created_at_idx ON applications (created_at DESC);

CREATE TABLE IF NOT EXISTS quote_replies (
    id SERIAL PRIMARY KEY,
    quote_id INTEGER NOT NULL REFERENCES quotes (id) ON DELETE CASCADE,
    subject TEXT NOT NULL,
    message TEXT NOT NULL,
    message_id TEXT NOT NULL,
    sent_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS quote_replies_quote_id_idx ON quote_replies (quote_id);
"#;

/// Postgres-backed store. Tables are created on first use.
#[derive(Clone)]
pub struct PgSubmissionStore {
    pool: PgPool,
    schema_ready: Arc<AtomicBool>,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates the tables now instead of on the first request.
    pub async fn prepare(&self) -> StoreResult<()> {
        self.with_conn(|_| Ok(())).await
    }

    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgPooledConnection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let schema_ready = Arc::clone(&self.schema_ready);
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            ensure_schema(&mut conn, &schema_ready)?;
            op(&mut conn)
        })
        .await?
    }
}

fn ensure_schema(conn: &mut PgPooledConnection, ready: &AtomicBool) -> StoreResult<()> {
    if ready.load(Ordering::Acquire) {
        return Ok(());
    }
    // Concurrent `CREATE TABLE IF NOT EXISTS` can still collide on pg_type.
    conn.transaction::<_, StoreError, _>(|conn| {
        diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
            .bind::<BigInt, _>(SCHEMA_LOCK_KEY)
            .execute(conn)?;
        conn.batch_execute(SCHEMA_SQL)?;
        Ok(())
    })?;
    if !ready.swap(true, Ordering::AcqRel) {
        info!("submission tables ready");
    }
    Ok(())
}

fn files_to_column(files: &Option<Vec<FileRef>>) -> StoreResult<Option<serde_json::Value>> {
    files
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(StoreError::from)
}

fn files_from_column(value: Option<serde_json::Value>) -> StoreResult<Option<Vec<FileRef>>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

impl QuoteRow {
    fn into_submission(self) -> StoreResult<Submission> {
        Ok(Submission {
            id: self.id,
            kind: SubmissionKind::Quote,
            name: self.name,
            email: self.email,
            phone: self.phone,
            category: self.service,
            message: self.message,
            files: files_from_column(self.files)?,
            created_at: self.created_at,
        })
    }
}

impl ApplicationRow {
    fn into_submission(self) -> StoreResult<Submission> {
        Ok(Submission {
            id: self.id,
            kind: SubmissionKind::Application,
            name: self.name,
            email: self.email,
            phone: self.phone,
            category: self.position,
            message: self.message,
            files: files_from_column(self.files)?,
            created_at: self.created_at,
        })
    }
}

impl From<QuoteReplyRow> for QuoteReply {
    fn from(row: QuoteReplyRow) -> Self {
        QuoteReply {
            id: row.id,
            quote_id: row.quote_id,
            subject: row.subject,
            message: row.message,
            message_id: row.message_id,
            sent_at: row.sent_at,
        }
    }
}

// `quotes` and `applications` only differ by the name of the category column.
macro_rules! filtered_query {
    ($table:ident, $category:ident, $filter:expr) => {{
        let filter: &SubmissionFilter = $filter;
        let mut query = $table::table.into_boxed();
        if let Some(pattern) = filter.search_pattern() {
            query = query.filter(
                $table::name
                    .ilike(pattern.clone())
                    .or($table::email.ilike(pattern.clone()))
                    .or($table::message.assume_not_null().ilike(pattern)),
            );
        }
        if let Some(category) = filter.category.clone() {
            query = query.filter($table::$category.eq(category));
        }
        if let Some(from) = filter.created_from {
            query = query.filter($table::created_at.ge(from));
        }
        if let Some(until) = filter.created_until {
            query = query.filter($table::created_at.le(until));
        }
        query
            .order(($table::created_at.desc(), $table::id.desc()))
            .limit(filter.limit)
            .offset(filter.offset)
    }};
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn create(&self, kind: SubmissionKind, new: NewSubmission) -> StoreResult<Submission> {
        let new = new.prepared()?;
        let files = files_to_column(&new.files)?;
        self.with_conn(move |conn| {
            conn.transaction(|conn| match kind {
                SubmissionKind::Quote => {
                    let row: QuoteRow = diesel::insert_into(quotes::table)
                        .values(&NewQuoteRow {
                            name: new.name,
                            email: new.email,
                            phone: new.phone,
                            service: new.category,
                            message: new.message,
                            files,
                        })
                        .get_result(conn)?;
                    row.into_submission()
                }
                SubmissionKind::Application => {
                    let row: ApplicationRow = diesel::insert_into(applications::table)
                        .values(&NewApplicationRow {
                            name: new.name,
                            email: new.email,
                            phone: new.phone,
                            position: new.category,
                            message: new.message,
                            files,
                        })
                        .get_result(conn)?;
                    row.into_submission()
                }
            })
        })
        .await
    }

    async fn list(
        &self,
        kind: SubmissionKind,
        filter: SubmissionFilter,
    ) -> StoreResult<Vec<Submission>> {
        self.with_conn(move |conn| match kind {
            SubmissionKind::Quote => filtered_query!(quotes, service, &filter)
                .load::<QuoteRow>(conn)?
                .into_iter()
                .map(QuoteRow::into_submission)
                .collect(),
            SubmissionKind::Application => filtered_query!(applications, position, &filter)
                .load::<ApplicationRow>(conn)?
                .into_iter()
                .map(ApplicationRow::into_submission)
                .collect(),
        })
        .await
    }

    async fn find(&self, kind: SubmissionKind, id: i32) -> StoreResult<Option<Submission>> {
        self.with_conn(move |conn| match kind {
            SubmissionKind::Quote => quotes::table
                .find(id)
                .first::<QuoteRow>(conn)
                .optional()?
                .map(QuoteRow::into_submission)
                .transpose(),
            SubmissionKind::Application => applications::table
                .find(id)
                .first::<ApplicationRow>(conn)
                .optional()?
                .map(ApplicationRow::into_submission)
                .transpose(),
        })
        .await
    }

    async fn record_reply(&self, reply: NewQuoteReply) -> StoreResult<QuoteReply> {
        self.with_conn(move |conn| {
            let row: QuoteReplyRow = diesel::insert_into(quote_replies::table)
                .values(&NewQuoteReplyRow {
                    quote_id: reply.quote_id,
                    subject: reply.subject,
                    message: reply.message,
                    message_id: reply.message_id,
                })
                .get_result(conn)
                .map_err(|err| match err {
                    diesel::result::Error::DatabaseError(
                        diesel::result::DatabaseErrorKind::ForeignKeyViolation,
                        _,
                    ) => StoreError::MissingParent(format!("quote {}", reply.quote_id)),
                    other => StoreError::Database(other),
                })?;
            Ok(row.into())
        })
        .await
    }

    async fn list_replies(&self, quote_id: i32) -> StoreResult<Vec<QuoteReply>> {
        self.with_conn(move |conn| {
            let rows: Vec<QuoteReplyRow> = quote_replies::table
                .filter(quote_replies::quote_id.eq(quote_id))
                .order((quote_replies::sent_at.asc(), quote_replies::id.asc()))
                .load(conn)?;
            Ok(rows.into_iter().map(QuoteReply::from).collect())
        })
        .await
    }
}
