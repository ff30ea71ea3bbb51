use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = quotes)]
pub struct QuoteRow {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub service: Option<String>,
    pub message: Option<String>,
    pub files: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = quotes)]
pub struct NewQuoteRow {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub service: Option<String>,
    pub message: Option<String>,
    pub files: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = applications)]
pub struct ApplicationRow {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub message: Option<String>,
    pub files: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = applications)]
pub struct NewApplicationRow {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub message: Option<String>,
    pub files: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = quote_replies)]
pub struct QuoteReplyRow {
    pub id: i32,
    pub quote_id: i32,
    pub subject: String,
    pub message: String,
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = quote_replies)]
pub struct NewQuoteReplyRow {
    pub quote_id: i32,
    pub subject: String,
    pub message: String,
    pub message_id: String,
}
