use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    NewQuoteReply, NewSubmission, QuoteReply, StoreError, StoreResult, Submission,
    SubmissionFilter, SubmissionKind, SubmissionStore,
};

#[derive(Default)]
struct Tables {
    quotes: Vec<Submission>,
    applications: Vec<Submission>,
    replies: Vec<QuoteReply>,
}

impl Tables {
    fn table(&self, kind: SubmissionKind) -> &Vec<Submission> {
        match kind {
            SubmissionKind::Quote => &self.quotes,
            SubmissionKind::Application => &self.applications,
        }
    }

    fn table_mut(&mut self, kind: SubmissionKind) -> &mut Vec<Submission> {
        match kind {
            SubmissionKind::Quote => &mut self.quotes,
            SubmissionKind::Application => &mut self.applications,
        }
    }
}

/// Process-local store backing the integration tests.
#[derive(Default)]
pub struct MemorySubmissionStore {
    tables: Mutex<Tables>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts with an explicit creation time.
    pub fn insert_at(
        &self,
        kind: SubmissionKind,
        new: NewSubmission,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Submission> {
        let new = new.prepared()?;
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let table = tables.table_mut(kind);
        let id = table.last().map_or(1, |last| last.id + 1);
        let submission = Submission {
            id,
            kind,
            name: new.name,
            email: new.email,
            phone: new.phone,
            category: new.category,
            message: new.message,
            files: new.files,
            created_at,
        };
        table.push(submission.clone());
        Ok(submission)
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create(&self, kind: SubmissionKind, new: NewSubmission) -> StoreResult<Submission> {
        self.insert_at(kind, new, Utc::now())
    }

    async fn list(
        &self,
        kind: SubmissionKind,
        filter: SubmissionFilter,
    ) -> StoreResult<Vec<Submission>> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut matched: Vec<Submission> = tables
            .table(kind)
            .iter()
            .filter(|submission| filter.matches(submission))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matched
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn find(&self, kind: SubmissionKind, id: i32) -> StoreResult<Option<Submission>> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tables.table(kind).iter().find(|s| s.id == id).cloned())
    }

    async fn record_reply(&self, reply: NewQuoteReply) -> StoreResult<QuoteReply> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if !tables.quotes.iter().any(|quote| quote.id == reply.quote_id) {
            return Err(StoreError::MissingParent(format!("quote {}", reply.quote_id)));
        }
        let stored = QuoteReply {
            id: tables.replies.len() as i32 + 1,
            quote_id: reply.quote_id,
            subject: reply.subject,
            message: reply.message,
            message_id: reply.message_id,
            sent_at: Utc::now(),
        };
        tables.replies.push(stored.clone());
        Ok(stored)
    }

    async fn list_replies(&self, quote_id: i32) -> StoreResult<Vec<QuoteReply>> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tables
            .replies
            .iter()
            .filter(|reply| reply.quote_id == quote_id)
            .cloned()
            .collect())
    }
}
