use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Result of presenting a nonce to a [`NonceStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceOutcome {
    /// First sighting of the nonce; it has been recorded.
    Accepted,
    /// The nonce was already used inside the retention window.
    Rejected,
}

/// Replay protection for OAuth nonces.
///
/// `check_and_record` must be atomic: two concurrent calls with the same nonce may not both
/// be accepted. Implementations decide how long nonces are retained, but should keep them at
/// least as long as the timestamp tolerance the launches are checked against.
#[async_trait]
pub trait NonceStore: Send + Sync {
    async fn check_and_record(
        &self,
        nonce: &str,
        timestamp: i64,
    ) -> Result<NonceOutcome, NonceStoreError>;
}

/// Failures of the store itself, as opposed to a rejected nonce.
#[derive(Debug, Error)]
pub enum NonceStoreError {
    #[error("Nonce store backend failure: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
}

/// In-process nonce store, the default when nothing else is configured.
///
/// Entries older than the expiry are swept on every check. Clones share the same map.
#[derive(Clone, Debug)]
pub struct MemoryNonceStore {
    used: Arc<Mutex<HashMap<String, i64>>>,
    expire_after: i64,
}

impl MemoryNonceStore {
    pub const DEFAULT_EXPIRY_SECS: i64 = 600;

    pub fn new() -> Self {
        Self::with_expiry(Self::DEFAULT_EXPIRY_SECS)
    }

    /// Keep nonces for `expire_after_secs` seconds past their launch timestamp.
    pub fn with_expiry(expire_after_secs: i64) -> Self {
        Self {
            used: Arc::new(Mutex::new(HashMap::new())),
            expire_after: expire_after_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.used.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.lock().is_empty()
    }

    fn check_now(&self, nonce: &str, timestamp: i64, now: i64) -> NonceOutcome {
        let cutoff = now - self.expire_after;
        let mut used = self.used.lock();
        used.retain(|_, seen_at| *seen_at >= cutoff);

        if used.contains_key(nonce) {
            return NonceOutcome::Rejected;
        }
        used.insert(nonce.to_string(), timestamp);
        NonceOutcome::Accepted
    }
}

impl Default for MemoryNonceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn check_and_record(
        &self,
        nonce: &str,
        timestamp: i64,
    ) -> Result<NonceOutcome, NonceStoreError> {
        Ok(self.check_now(nonce, timestamp, Utc::now().timestamp()))
    }
}
