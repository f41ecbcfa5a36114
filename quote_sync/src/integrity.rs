//! Checksums for cached data.

use market_data_ingestor::models::OhlcvRecord;
use sha2::{Digest, Sha256};

use crate::errors::DataIntegrityError;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Folds `-0.0` into `0.0`.
///
/// SQLite stores a REAL without a fractional part as an integer, which
/// drops the sign of zero, so values are canonicalized before they are
/// hashed or written.
pub fn canonical_f64(value: f64) -> f64 {
    value + 0.0
}

/// Checksum of one quote record.
///
/// Floats are hashed by the bit pattern of [`canonical_f64`] so that a value
/// read back from SQLite hashes identically to the one written.
pub fn record_checksum(record: &OhlcvRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.symbol.as_bytes());
    hasher.update(b"|");
    hasher.update(record.date.to_string().as_bytes());
    for value in [record.open, record.high, record.low, record.close, record.volume] {
        hasher.update(b"|");
        hasher.update(canonical_f64(value).to_bits().to_be_bytes());
    }
    if let Some(indicators) = &record.indicators {
        for (name, value) in indicators {
            hasher.update(b"|");
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(canonical_f64(*value).to_bits().to_be_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Compares `actual` against the checksum stored for `key`.
pub fn verify(key: &str, expected: &str, actual: &str) -> Result<(), DataIntegrityError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DataIntegrityError::ChecksumMismatch { key: key.to_string() })
    }
}
