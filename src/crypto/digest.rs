use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Computes the lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Computes the SHA-256 digest of `data` on the blocking pool.
///
/// Large payloads would otherwise stall the executor for the duration of
/// the hash.
pub async fn sha256_hex_async(data: Bytes) -> Result<String> {
    tokio::task::spawn_blocking(move || sha256_hex(&data))
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("digest task failed: {}", e))))
}
