//! Diesel models mapping to the database schema.
//!
//! Dates are stored as `YYYY-MM-DD` text and timestamps as RFC3339 UTC text,
//! so lexical order matches chronological order.

use diesel::prelude::*;

use crate::schema::{quotes, symbol_metadata};

/// A row in [`crate::schema::quotes`]: one daily record.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = quotes, check_for_backend(diesel::sqlite::Sqlite))]
pub struct QuoteRow {
    pub symbol: String,
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// JSON object of extra numeric fields.
    pub indicators: Option<String>,
    pub checksum: String,
}

/// A row in [`crate::schema::symbol_metadata`].
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = symbol_metadata, check_for_backend(diesel::sqlite::Sqlite))]
pub struct MetadataRow {
    pub symbol: String,
    pub last_updated: String,
    pub data_version: i32,
    pub range_start: String,
    pub range_end: String,
    pub record_count: i32,
    pub size_bytes: i64,
    pub access_count: i32,
    pub last_accessed: String,
    pub priority: i32,
}

/// Columns rewritten by a put; access bookkeeping and priority survive it.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = symbol_metadata)]
pub struct MetadataPut<'a> {
    pub last_updated: &'a str,
    pub data_version: i32,
    pub range_start: &'a str,
    pub range_end: &'a str,
}
