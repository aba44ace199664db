//! Value Codec Module
//!
//! Serialization, gzip compression and cache-key derivation for stored values.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::cache::entry::Codec;
use crate::error::{CacheError, Result};

/// Cache keys are a truncated hex digest; 16 chars keeps keys compact while
/// leaving 64 bits of collision resistance.
const KEY_DIGEST_LEN: usize = 16;

// == Key Derivation ==
/// Derives the storage key for a raw caller key within a namespace.
///
/// The namespace is folded into the digest so unrelated producers cannot
/// collide even when they pick identical raw keys.
pub fn cache_key(namespace: &str, raw_key: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", namespace, raw_key).as_bytes());
    let mut hex = String::with_capacity(KEY_DIGEST_LEN);
    for byte in digest.iter().take(KEY_DIGEST_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

// == Serialization ==
/// Serializes a value to its stored byte form, applying the codec.
pub fn encode<T: Serialize>(value: &T, codec: Codec) -> Result<Vec<u8>> {
    let serialized = serde_json::to_vec(value)?;
    match codec {
        Codec::None => Ok(serialized),
        Codec::Gzip => compress(&serialized),
    }
}

/// Decodes stored bytes back into a value, reversing the codec.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], codec: Codec) -> Result<T> {
    let plain = match codec {
        Codec::None => bytes.to_vec(),
        Codec::Gzip => decompress(bytes)?,
    };
    Ok(serde_json::from_slice(&plain)?)
}

// == Compression ==
/// Gzip-compresses a serialized payload.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CacheError::Compression(format!("gzip write failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Compression(format!("gzip finish failed: {}", e)))
}

/// Decompresses a gzip payload.
///
/// Malformed input is an error here; the orchestrator maps it to a cache
/// miss so callers never have to distinguish corruption from absence.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut plain = Vec::new();
    decoder
        .read_to_end(&mut plain)
        .map_err(|e| CacheError::Compression(format!("gzip read failed: {}", e)))?;
    Ok(plain)
}
