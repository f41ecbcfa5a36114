//! Unverified JWT expiry decoding.
//!
//! The signature is **not** checked. The decoded `exp` claim is only a hint
//! used to skip a pointless probe of a token that is about to expire.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Decodes the `exp` claim of a compact JWT (`header.payload.signature`).
///
/// Returns `None` for anything that is not three dot-separated segments with a
/// base64url JSON payload carrying a numeric `exp`.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    // Some issuers keep the `=` padding even though RFC 7515 drops it.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// `true` if the token's expiry lies more than `buffer` after `now`.
///
/// Undecodable tokens are treated as expired.
pub fn is_fresh(token: &str, now: DateTime<Utc>, buffer: Duration) -> bool {
    decode_expiry(token).is_some_and(|exp| exp > now + buffer)
}

#[cfg(test)]
pub(crate) fn encode_unsigned(exp: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp.timestamp()));
    format!("{header}.{payload}.sig")
}
