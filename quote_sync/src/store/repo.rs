//! Synchronous Diesel queries behind [`LocalCacheStore`](super::LocalCacheStore).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel::{QueryableByName, sql_query};
use market_data_ingestor::models::{DateRange, OhlcvRecord};

use crate::errors::{DataIntegrityError, StoreError};
use crate::integrity::{self, canonical_f64, record_checksum};
use crate::models::rows::{MetadataPut, MetadataRow, QuoteRow};
use crate::models::{DEFAULT_PRIORITY, SymbolMetadata};
use crate::schema::quotes::dsl as q;
use crate::schema::symbol_metadata::dsl as sm;
use crate::tz;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(QueryableByName)]
struct Footprint {
    #[diesel(sql_type = BigInt)]
    records: i64,
    #[diesel(sql_type = BigInt)]
    bytes: i64,
}

fn date_text(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| StoreError::Database(format!("bad date {s:?}: {e}")))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    tz::parse_ts_to_utc(s).map_err(|e| StoreError::Database(e.to_string()))
}

fn to_i32(n: u64) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn to_u64(n: impl TryInto<u64>) -> u64 {
    n.try_into().unwrap_or(0)
}

fn quote_row(record: &OhlcvRecord) -> Result<QuoteRow, StoreError> {
    let indicators = record
        .indicators
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

    Ok(QuoteRow {
        symbol: record.symbol.clone(),
        date: date_text(record.date),
        open: canonical_f64(record.open),
        high: canonical_f64(record.high),
        low: canonical_f64(record.low),
        close: canonical_f64(record.close),
        volume: canonical_f64(record.volume),
        indicators,
        checksum: record_checksum(record),
    })
}

/// Rebuilds a record from its row and checks it against the stored checksum.
fn verified_record(row: QuoteRow) -> Result<OhlcvRecord, StoreError> {
    let key = format!("{}/{}", row.symbol, row.date);
    let corrupt = || StoreError::Integrity(DataIntegrityError::ChecksumMismatch { key: key.clone() });

    let date = NaiveDate::parse_from_str(&row.date, DATE_FORMAT).map_err(|_| corrupt())?;
    let indicators = match row.indicators.as_deref() {
        Some(json) => Some(serde_json::from_str::<BTreeMap<String, f64>>(json).map_err(|_| corrupt())?),
        None => None,
    };

    let record = OhlcvRecord {
        symbol: row.symbol,
        date,
        open: row.open,
        high: row.high,
        low: row.low,
        close: row.close,
        volume: row.volume,
        indicators,
    };
    integrity::verify(&key, &row.checksum, &record_checksum(&record))?;
    Ok(record)
}

fn metadata(row: MetadataRow) -> Result<SymbolMetadata, StoreError> {
    let date_range = DateRange::new(parse_date(&row.range_start)?, parse_date(&row.range_end)?)
        .map_err(|e| StoreError::Database(e.to_string()))?;

    Ok(SymbolMetadata {
        last_updated: parse_ts(&row.last_updated)?,
        last_accessed: parse_ts(&row.last_accessed)?,
        symbol: row.symbol,
        data_version: to_u64(row.data_version) as u32,
        date_range,
        record_count: to_u64(row.record_count),
        size_bytes: to_u64(row.size_bytes),
        access_count: to_u64(row.access_count),
        priority: u8::try_from(row.priority).unwrap_or(DEFAULT_PRIORITY),
    })
}

/// Records of `symbol` with `range.start <= date <= range.end`, ascending.
///
/// Every row is checksum-verified; the first mismatch aborts the read.
pub fn select_range(conn: &mut SqliteConnection, symbol: &str, range: &DateRange) -> Result<Vec<OhlcvRecord>, StoreError> {
    let rows: Vec<QuoteRow> = q::quotes
        .filter(q::symbol.eq(symbol))
        .filter(q::date.ge(date_text(range.start())))
        .filter(q::date.le(date_text(range.end())))
        .order(q::date.asc())
        .select(QuoteRow::as_select())
        .load(conn)?;

    rows.into_iter().map(verified_record).collect()
}

/// Bumps the access counter of `symbol`, if it is cached.
pub fn touch(conn: &mut SqliteConnection, symbol: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
    diesel::update(sm::symbol_metadata.find(symbol))
        .set((
            sm::access_count.eq(sm::access_count + 1),
            sm::last_accessed.eq(tz::to_rfc3339_millis(now)),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn find_metadata(conn: &mut SqliteConnection, symbol: &str) -> Result<Option<SymbolMetadata>, StoreError> {
    sm::symbol_metadata
        .find(symbol)
        .select(MetadataRow::as_select())
        .first(conn)
        .optional()?
        .map(metadata)
        .transpose()
}

pub fn all_metadata(conn: &mut SqliteConnection) -> Result<Vec<SymbolMetadata>, StoreError> {
    sm::symbol_metadata
        .order(sm::symbol.asc())
        .select(MetadataRow::as_select())
        .load(conn)?
        .into_iter()
        .map(metadata)
        .collect()
}

fn footprint(conn: &mut SqliteConnection, symbol: &str) -> Result<Footprint, StoreError> {
    // 40 bytes for the five f64 columns.
    Ok(sql_query(
        "SELECT COUNT(*) AS records, \
                COALESCE(SUM(LENGTH(symbol) + LENGTH(date) + 40 + COALESCE(LENGTH(indicators), 0) + LENGTH(checksum)), 0) AS bytes \
         FROM quotes WHERE symbol = ?",
    )
    .bind::<Text, _>(symbol)
    .get_result(conn)?)
}

/// Upserts `records` under `symbol` and folds `range` into its metadata.
///
/// Runs in one immediate transaction: either every record and the metadata
/// update land, or nothing does.
pub fn upsert_batch(
    conn: &mut SqliteConnection,
    symbol: &str,
    records: &[OhlcvRecord],
    range: &DateRange,
    now: DateTime<Utc>,
) -> Result<SymbolMetadata, StoreError> {
    if let Some(stray) = records.iter().find(|r| r.symbol != symbol) {
        return Err(StoreError::WriteFailed(format!(
            "record for {} in a batch for {symbol}",
            stray.symbol
        )));
    }
    let rows = records.iter().map(quote_row).collect::<Result<Vec<_>, _>>()?;

    let mut covered = *range;
    if let (Some(first), Some(last)) = (records.iter().map(|r| r.date).min(), records.iter().map(|r| r.date).max()) {
        covered = covered.union(&DateRange::new(first, last).map_err(|e| StoreError::WriteFailed(e.to_string()))?);
    }
    let now_text = tz::to_rfc3339_millis(now);

    conn.immediate_transaction(|conn| {
        let previous = find_metadata(conn, symbol)?;
        let (version, covered) = match &previous {
            Some(prev) => (prev.data_version.saturating_add(1), prev.date_range.union(&covered)),
            None => (1, covered),
        };
        let (start, end) = (date_text(covered.start()), date_text(covered.end()));

        let fresh = MetadataRow {
            symbol: symbol.to_string(),
            last_updated: now_text.clone(),
            data_version: to_i32(u64::from(version)),
            range_start: start.clone(),
            range_end: end.clone(),
            record_count: 0,
            size_bytes: 0,
            access_count: 0,
            last_accessed: now_text.clone(),
            priority: i32::from(DEFAULT_PRIORITY),
        };
        diesel::insert_into(sm::symbol_metadata)
            .values(&fresh)
            .on_conflict(sm::symbol)
            .do_update()
            .set(&MetadataPut {
                last_updated: &now_text,
                data_version: to_i32(u64::from(version)),
                range_start: &start,
                range_end: &end,
            })
            .execute(conn)?;

        for row in &rows {
            diesel::insert_into(q::quotes)
                .values(row)
                .on_conflict((q::symbol, q::date))
                .do_update()
                .set(row)
                .execute(conn)?;
        }

        let totals = footprint(conn, symbol)?;
        diesel::update(sm::symbol_metadata.find(symbol))
            .set((
                sm::record_count.eq(to_i32(to_u64(totals.records))),
                sm::size_bytes.eq(totals.bytes),
            ))
            .execute(conn)?;

        find_metadata(conn, symbol)?.ok_or_else(|| StoreError::WriteFailed(format!("metadata for {symbol} vanished")))
    })
}

/// Removes `symbol` and its records. Returns whether it was cached.
pub fn delete_symbol(conn: &mut SqliteConnection, symbol: &str) -> Result<bool, StoreError> {
    conn.immediate_transaction(|conn| {
        diesel::delete(q::quotes.filter(q::symbol.eq(symbol))).execute(conn)?;
        let removed = diesel::delete(sm::symbol_metadata.find(symbol)).execute(conn)?;
        Ok(removed > 0)
    })
}

/// Empties the store. Returns the number of symbols removed.
pub fn delete_all(conn: &mut SqliteConnection) -> Result<usize, StoreError> {
    conn.immediate_transaction(|conn| {
        diesel::delete(q::quotes).execute(conn)?;
        Ok(diesel::delete(sm::symbol_metadata).execute(conn)?)
    })
}

pub fn delete_symbols(conn: &mut SqliteConnection, symbols: &[String]) -> Result<usize, StoreError> {
    conn.immediate_transaction(|conn| {
        diesel::delete(q::quotes.filter(q::symbol.eq_any(symbols))).execute(conn)?;
        Ok(diesel::delete(sm::symbol_metadata.filter(sm::symbol.eq_any(symbols))).execute(conn)?)
    })
}

pub fn count_records(conn: &mut SqliteConnection) -> Result<u64, StoreError> {
    let n: i64 = q::quotes.count().get_result(conn)?;
    Ok(to_u64(n))
}

pub fn update_priority(conn: &mut SqliteConnection, symbol: &str, priority: u8) -> Result<(), StoreError> {
    let updated = diesel::update(sm::symbol_metadata.find(symbol))
        .set(sm::priority.eq(i32::from(priority)))
        .execute(conn)?;
    if updated == 0 {
        return Err(StoreError::NotFound(symbol.to_string()));
    }
    Ok(())
}
