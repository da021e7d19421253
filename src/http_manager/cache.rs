use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Tokens are refreshed this long before the server-reported expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);
/// Longest lifetime honoured, whatever the server reports.
const MAX_TTL: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Access tokens keyed by `(authority, scope)`.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    inner: Arc<Mutex<HashMap<(String, String), CachedToken>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, authority: &str, scope: &str) -> Option<String> {
        let mut guard = self.inner.lock().await;
        let key = (authority.to_string(), scope.to_string());
        match guard.get(&key) {
            Some(token) if token.expires_at > Instant::now() => Some(token.access_token.clone()),
            Some(_) => {
                guard.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Stores a token for the lifetime the server reported. Tokens without an
    /// `expires_in` are not cached.
    pub async fn store(
        &self,
        authority: &str,
        scope: &str,
        access_token: &str,
        expires_in: Option<u64>,
    ) {
        let Some(expires_at) = ttl_for(expires_in).and_then(|ttl| Instant::now().checked_add(ttl))
        else {
            return;
        };
        let mut guard = self.inner.lock().await;
        guard.insert(
            (authority.to_string(), scope.to_string()),
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}

fn ttl_for(expires_in: Option<u64>) -> Option<Duration> {
    match expires_in {
        None | Some(0) => None,
        Some(secs) => {
            let secs = secs.saturating_sub(EXPIRY_SKEW.as_secs()).max(EXPIRY_SKEW.as_secs());
            Some(Duration::from_secs(secs).min(MAX_TTL))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_subtracts_skew_with_floor() {
        assert_eq!(ttl_for(None), None);
        assert_eq!(ttl_for(Some(0)), None);
        assert_eq!(ttl_for(Some(3600)), Some(Duration::from_secs(3570)));
        assert_eq!(ttl_for(Some(10)), Some(Duration::from_secs(30)));
        assert_eq!(ttl_for(Some(u64::MAX)), Some(MAX_TTL));
    }

    #[tokio::test]
    async fn absurd_server_lifetime_is_capped() {
        let cache = TokenCache::new();
        cache.store("https://id", "ordering", "tok", Some(u64::MAX)).await;
        assert_eq!(cache.get("https://id", "ordering").await.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn tokens_are_scoped_by_authority_and_scope() {
        let cache = TokenCache::new();
        cache.store("https://id", "ordering", "tok", Some(3600)).await;
        cache.store("https://id", "no-expiry", "tok2", None).await;

        assert_eq!(cache.get("https://id", "ordering").await.as_deref(), Some("tok"));
        assert_eq!(cache.get("https://id", "other").await, None);
        assert_eq!(cache.get("https://elsewhere", "ordering").await, None);
        assert_eq!(cache.get("https://id", "no-expiry").await, None);

        cache.clear().await;
        assert_eq!(cache.get("https://id", "ordering").await, None);
    }
}
