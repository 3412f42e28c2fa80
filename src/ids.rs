//! File id generation and the `user_id` UUIDv4 validation rule (spec §3, §6.1, §6.4).

use rand::RngCore;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::error::AppError;

const MAX_ID_ATTEMPTS: u32 = 3;

/// `file_{unix_seconds}_{random8hex}_{sha256_8hex}` (spec §6.4).
pub fn generate_file_id(file_bytes: &[u8]) -> String {
    let unix_seconds = chrono::Utc::now().timestamp();
    let mut random_bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    let random8 = hex::encode(random_bytes);

    let mut hasher = Sha256::new();
    hasher.update(file_bytes);
    let digest = hasher.finalize();
    let sha256_8 = hex::encode(&digest[..4]);

    format!("file_{unix_seconds}_{random8}_{sha256_8}")
}

/// Generates a `file_id`, retrying up to `MAX_ID_ATTEMPTS` times on collision
/// against whatever `exists` reports (spec §4.1 step 2).
///
/// `exists` is async because a real implementation must hit the Metadata
/// Store; it is a plain closure here so ingestion and tests can share one
/// retry loop without depending on the store trait directly.
pub async fn generate_unique_file_id<F, Fut>(file_bytes: &[u8], exists: F) -> Result<String, AppError>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<bool, AppError>>,
{
    for attempt in 0..MAX_ID_ATTEMPTS {
        let candidate = generate_file_id(file_bytes);
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
        tracing::warn!(attempt, candidate, "file_id collision, regenerating");
    }
    Err(AppError::IdGenerationExhausted)
}

fn user_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$",
        )
        .expect("static user_id regex is valid")
    })
}

/// Validates the `user_id` header per spec §6.1 (case-insensitive UUIDv4).
pub fn validate_user_id(user_id: &str) -> Result<(), AppError> {
    if user_id_pattern().is_match(&user_id.to_ascii_lowercase()) {
        Ok(())
    } else {
        Err(AppError::Validation {
            message: "user_id must be a UUID v4".to_string(),
        })
    }
}

/// First 16 hex characters of SHA-256(content), used for chunk dedup (spec §3, "Chunk").
pub fn content_hash_16(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_matches_expected_shape() {
        let id = generate_file_id(b"hello world");
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "file");
        assert_eq!(parts[2].len(), 8);
        assert_eq!(parts[3].len(), 8);
    }

    #[test]
    fn file_id_is_deterministic_in_content_suffix() {
        let a = generate_file_id(b"same bytes");
        let b = generate_file_id(b"same bytes");
        // timestamp/random differ, content hash suffix does not.
        assert_eq!(a.rsplit('_').next(), b.rsplit('_').next());
    }

    #[test]
    fn validates_uuid_v4() {
        assert!(validate_user_id("11111111-1111-4111-8111-111111111111").is_ok());
        assert!(validate_user_id("not-a-uuid").is_err());
        // UUID v1 (version nibble 1, not 4) must be rejected.
        assert!(validate_user_id("11111111-1111-1111-8111-111111111111").is_err());
    }

    #[tokio::test]
    async fn retries_on_collision_then_succeeds() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let id = generate_unique_file_id(b"x", |_candidate| {
            let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move { Ok(n < 2) }
        })
        .await
        .unwrap();
        assert!(id.starts_with("file_"));
    }

    #[tokio::test]
    async fn exhausts_after_three_collisions() {
        let err = generate_unique_file_id(b"x", |_| async { Ok(true) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "IDGenerationExhausted");
    }
}
