use chrono::NaiveDate;
use serde::Serialize;

use crate::models::DateRange;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Query string for `GET /quotes`.
#[derive(Debug, Clone, Serialize)]
pub struct QuotesQuery {
    pub code: String,
    pub from: String,
    pub to: String,
}

impl QuotesQuery {
    pub fn new(symbol: &str, range: &DateRange) -> Self {
        Self {
            code: symbol.to_string(),
            from: format_date(range.start()),
            to: format_date(range.end()),
        }
    }
}

fn format_date(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

/// Body of `POST /auth`.
#[derive(Serialize)]
pub(crate) struct LoginBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body of `POST /refresh`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshBody<'a> {
    pub refresh_token: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_uses_iso_dates() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        let q = QuotesQuery::new("7203", &range);
        assert_eq!(q.from, "2024-01-01");
        assert_eq!(q.to, "2024-01-31");
    }

    #[test]
    fn refresh_body_is_camel_case() {
        let body = serde_json::to_value(RefreshBody { refresh_token: "r" }).unwrap();
        assert_eq!(body, serde_json::json!({ "refreshToken": "r" }));
    }
}
