//! SHA-256 checksum verification for bulk archive downloads
//!
//! Every archive file has a sibling checksum file at `{data_url}.CHECKSUM`
//! containing `<64-char-hex>  <filename>`. Verification policy:
//!
//! | Scenario              | Behavior                                   |
//! |-----------------------|--------------------------------------------|
//! | Checksum matches      | accept the download                        |
//! | Checksum mismatch     | hard error - corruption, never cache       |
//! | Checksum file missing | skip verification - old files have none    |
//! | Checksum fetch fails  | transient error, caller may retry          |

use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Checksum handling errors
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// Hash mismatch: the downloaded bytes are not what the provider
    /// published. Data corruption, not a transient condition.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    /// The checksum file exists but cannot be understood. Indicates an
    /// upstream format change; treated as hard as a mismatch.
    #[error("invalid checksum format: {0}")]
    InvalidFormat(String),

    /// Could not retrieve the checksum file for a transient reason.
    #[error("failed to fetch checksum file: {0}")]
    FetchFailed(String),
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Parse the first token of a checksum file as a SHA-256 hex digest.
pub fn parse_checksum_line(content: &str) -> Result<String, ChecksumError> {
    let hash = content
        .split_whitespace()
        .next()
        .ok_or_else(|| ChecksumError::InvalidFormat("empty checksum file".to_string()))?;

    if hash.len() != 64 {
        return Err(ChecksumError::InvalidFormat(format!(
            "hash length {} (expected 64)",
            hash.len()
        )));
    }
    if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ChecksumError::InvalidFormat(format!(
            "non-hex characters in hash: {hash}"
        )));
    }
    Ok(hash.to_lowercase())
}

/// Fetch the expected digest for a data URL.
///
/// `Ok(None)` means verification should be skipped: the checksum file does
/// not exist (HTTP 404) or timed out - neither should block the download
/// itself.
pub async fn expected_checksum(
    client: &reqwest::Client,
    data_url: &str,
    timeout: Duration,
) -> Result<Option<String>, ChecksumError> {
    let checksum_url = format!("{data_url}.CHECKSUM");
    debug!(
        event_type = "checksum_fetch_start",
        checksum_url = %checksum_url,
        "Fetching checksum"
    );

    let response = match client.get(&checksum_url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            warn!(
                event_type = "checksum_timeout",
                checksum_url = %checksum_url,
                "Checksum fetch timed out, skipping verification"
            );
            return Ok(None);
        }
        Err(e) => return Err(ChecksumError::FetchFailed(e.to_string())),
    };

    let status = response.status();
    if status.as_u16() == 404 {
        warn!(
            event_type = "checksum_not_found",
            checksum_url = %checksum_url,
            "Checksum file not available, skipping verification"
        );
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ChecksumError::FetchFailed(format!("HTTP {status}")));
    }

    let content = response
        .text()
        .await
        .map_err(|e| ChecksumError::FetchFailed(e.to_string()))?;
    let hash = parse_checksum_line(&content)?;

    debug!(
        event_type = "checksum_fetch_complete",
        expected_hash = %hash,
        "Checksum fetched"
    );
    Ok(Some(hash))
}

/// Compare downloaded bytes against an expected digest.
pub fn verify(data: &[u8], expected: &str) -> Result<(), ChecksumError> {
    let actual = sha256_hex(data);
    let expected = expected.to_lowercase();
    if actual != expected {
        return Err(ChecksumError::Mismatch { expected, actual });
    }
    Ok(())
}
