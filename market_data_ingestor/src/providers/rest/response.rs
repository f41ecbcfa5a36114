//! Decoding of upstream JSON bodies into the canonical models.
//!
//! Quote rows arrive loosely typed: numbers are frequently strings, sometimes
//! empty or `null`. A single bad field is coerced to `0.0` rather than failing
//! the row, so one malformed value never discards a whole series.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::FetchError;
use crate::models::{DateRange, OhlcvRecord, SymbolInfo};

const DATE_KEYS: &[&str] = &["Date", "date"];
const CODE_KEYS: &[&str] = &["Code", "code", "symbol"];
const NAME_KEYS: &[&str] = &["CompanyName", "name", "Name"];
const SECTOR_KEYS: &[&str] = &["Sector33CodeName", "Sector17CodeName", "sector", "Sector"];

const OPEN_KEYS: &[&str] = &["Open", "open"];
const HIGH_KEYS: &[&str] = &["High", "high"];
const LOW_KEYS: &[&str] = &["Low", "low"];
const CLOSE_KEYS: &[&str] = &["Close", "close"];
const VOLUME_KEYS: &[&str] = &["Volume", "volume"];

#[derive(Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct RefreshResponse {
    #[serde(rename = "idToken")]
    pub id_token: Option<String>,
}

/// Coerces a loosely typed JSON value to a float; anything unparsable is `0.0`.
pub fn coerce_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn first<'a>(row: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| row.get(*k))
}

fn text(row: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match first(row, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .ok()
}

/// Upstream codes may carry a trailing check digit ("72030" for "7203").
fn code_matches(code: &str, symbol: &str) -> bool {
    code == symbol || (symbol.len() == 4 && code.len() == 5 && code.starts_with(symbol) && code.ends_with('0'))
}

/// Locates the row array: `{"daily_quotes": [...]}`, `{"quotes": [...]}` or a bare array.
fn rows<'a>(body: &'a Value, keys: &[&str]) -> Result<&'a Vec<Value>, FetchError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(obj) => keys
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .ok_or_else(|| FetchError::InvalidResponse(format!("expected one of {keys:?} in response body"))),
        _ => Err(FetchError::InvalidResponse("response body is not a JSON object or array".into())),
    }
}

/// Turns a `/quotes` body into records for `symbol` within `range`.
///
/// Rows for other symbols, rows with an unparsable date and rows outside the
/// range are dropped. The result is ascending with one record per date.
pub fn parse_quotes(body: &Value, symbol: &str, range: &DateRange) -> Result<Vec<OhlcvRecord>, FetchError> {
    let mut by_date: BTreeMap<NaiveDate, OhlcvRecord> = BTreeMap::new();

    for row in rows(body, &["daily_quotes", "quotes"])? {
        let Some(row) = row.as_object() else { continue };

        if let Some(code) = text(row, CODE_KEYS) {
            if !code_matches(&code, symbol) {
                continue;
            }
        }

        let Some(date) = text(row, DATE_KEYS).as_deref().and_then(parse_date) else {
            continue;
        };
        if !range.contains(date) {
            continue;
        }

        let mut record = OhlcvRecord::new(symbol, date).with_prices(
            coerce_f64(first(row, OPEN_KEYS)),
            coerce_f64(first(row, HIGH_KEYS)),
            coerce_f64(first(row, LOW_KEYS)),
            coerce_f64(first(row, CLOSE_KEYS)),
            coerce_f64(first(row, VOLUME_KEYS)),
        );

        let known = [DATE_KEYS, CODE_KEYS, OPEN_KEYS, HIGH_KEYS, LOW_KEYS, CLOSE_KEYS, VOLUME_KEYS];
        let indicators: BTreeMap<String, f64> = row
            .iter()
            .filter(|(k, _)| !known.iter().any(|set| set.contains(&k.as_str())))
            .filter_map(|(k, v)| numeric(v).map(|n| (k.clone(), n)))
            .collect();
        if !indicators.is_empty() {
            record.indicators = Some(indicators);
        }

        by_date.insert(date, record);
    }

    Ok(by_date.into_values().collect())
}

/// Turns a `/listing` body into catalog entries, first occurrence of a code wins.
///
/// Rows missing a code or a name are skipped.
pub fn parse_listing(body: &Value) -> Result<Vec<SymbolInfo>, FetchError> {
    let mut by_code: IndexMap<String, SymbolInfo> = IndexMap::new();

    for row in rows(body, &["info", "listing", "symbols"])? {
        let Some(row) = row.as_object() else { continue };
        let (Some(code), Some(name)) = (text(row, CODE_KEYS), text(row, NAME_KEYS)) else {
            continue;
        };
        by_code.entry(code.clone()).or_insert(SymbolInfo {
            code,
            name,
            sector: text(row, SECTOR_KEYS),
        });
    }

    Ok(by_code.into_values().collect())
}
