//! At-rest encoding for in-memory cache entries.
//!
//! Values are serialized to JSON. Payloads above the compression threshold
//! are gzip-compressed. The checksum covers the bytes actually stored, so
//! corruption is detected before decompression is attempted.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::CacheError;
use crate::integrity::{self, sha256_hex};

/// Stored form of one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub compressed: bool,
    pub checksum: String,
}

pub fn encode<T: Serialize>(value: &T, compression_threshold: usize) -> Result<Encoded, CacheError> {
    let json = serde_json::to_vec(value).map_err(|e| CacheError::Encode(e.to_string()))?;

    let (bytes, compressed) = if json.len() > compression_threshold {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).map_err(|e| CacheError::Encode(e.to_string()))?;
        let gz = encoder.finish().map_err(|e| CacheError::Encode(e.to_string()))?;
        (gz, true)
    } else {
        (json, false)
    };

    let checksum = sha256_hex(&bytes);
    Ok(Encoded {
        bytes,
        compressed,
        checksum,
    })
}

/// Verifies, decompresses and deserializes an entry stored under `key`.
pub fn decode<T: DeserializeOwned>(key: &str, encoded: &Encoded) -> Result<T, CacheError> {
    integrity::verify(key, &encoded.checksum, &sha256_hex(&encoded.bytes))?;

    if encoded.compressed {
        let mut json = Vec::new();
        GzDecoder::new(encoded.bytes.as_slice())
            .read_to_end(&mut json)
            .map_err(|e| CacheError::Encode(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| CacheError::Encode(e.to_string()))
    } else {
        serde_json::from_slice(&encoded.bytes).map_err(|e| CacheError::Encode(e.to_string()))
    }
}
