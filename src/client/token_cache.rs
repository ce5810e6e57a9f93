//! In-memory cache of the upload credential.
//!
//! The lock is only held to read or replace the cached entry, never across
//! the fetch, so two callers racing past an expired entry may both refetch.
//! Each write replaces the whole entry, so no caller ever sees a torn token.

use super::{CREDENTIAL_FAILED, ClientError, ClientResult, Clock, SystemClock, TokenIssuer};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Tokens are refreshed once they are this close to expiring.
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadToken {
    pub credential: String,
    pub domain: String,
    pub bucket: String,
    pub expires_at: DateTime<Utc>,
}

impl UploadToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(REFRESH_BUFFER_SECS)
    }
}

pub struct UploadTokenCache {
    issuer: Arc<dyn TokenIssuer>,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<UploadToken>>,
}

impl UploadTokenCache {
    pub fn new(issuer: Arc<dyn TokenIssuer>) -> Self {
        Self::with_clock(issuer, Arc::new(SystemClock))
    }

    pub fn with_clock(issuer: Arc<dyn TokenIssuer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer,
            clock,
            cached: Mutex::new(None),
        }
    }

    fn cached_fresh(&self, now: DateTime<Utc>) -> Option<UploadToken> {
        let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        cached.as_ref().filter(|t| t.is_fresh(now)).cloned()
    }

    /// Return a credential valid for at least the refresh buffer, fetching
    /// a new one when needed.
    pub async fn get_token(&self) -> ClientResult<UploadToken> {
        if let Some(token) = self.cached_fresh(self.clock.now()) {
            return Ok(token);
        }

        tracing::debug!("requesting upload credential");
        let grant = self.issuer.issue_token().await.map_err(|err| match err {
            ClientError::Credential(msg) if !msg.is_empty() => ClientError::Credential(msg),
            other => {
                tracing::warn!(error = %other, "upload credential request failed");
                ClientError::Credential(CREDENTIAL_FAILED.into())
            }
        })?;

        let token = UploadToken {
            credential: grant.token,
            domain: grant.domain,
            bucket: grant.bucket,
            expires_at: self.clock.now() + Duration::seconds(grant.expires),
        };
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::UploadTokenGrant;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct ManualClock(pub Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub fn new() -> Self {
            Self(Mutex::new(Utc::now()))
        }

        pub fn advance(&self, secs: i64) {
            *self.0.lock().unwrap() += Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Issues `tok-1`, `tok-2`, ... or fails while `fail` is set.
    pub struct CountingIssuer {
        pub calls: AtomicUsize,
        pub ttl: i64,
        pub fail: Mutex<Option<ClientError>>,
    }

    impl CountingIssuer {
        pub fn new(ttl: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                ttl,
                fail: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TokenIssuer for CountingIssuer {
        async fn issue_token(&self) -> ClientResult<UploadTokenGrant> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(err) = self.fail.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(UploadTokenGrant {
                token: format!("tok-{}", n),
                domain: "https://cdn.test/".into(),
                bucket: "walnut-images".into(),
                expires: self.ttl,
            })
        }
    }

    #[tokio::test]
    async fn reuses_token_until_refresh_buffer() {
        let issuer = Arc::new(CountingIssuer::new(3600));
        let clock = Arc::new(ManualClock::new());
        let cache = UploadTokenCache::with_clock(issuer.clone(), clock.clone());

        assert_eq!(cache.get_token().await.unwrap().credential, "tok-1");
        clock.advance(3600 - REFRESH_BUFFER_SECS - 1);
        assert_eq!(cache.get_token().await.unwrap().credential, "tok-1");
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);

        clock.advance(1);
        assert_eq!(cache.get_token().await.unwrap().credential, "tok-2");
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_lived_grant_is_refetched_every_call() {
        let issuer = Arc::new(CountingIssuer::new(60));
        let cache = UploadTokenCache::with_clock(issuer.clone(), Arc::new(ManualClock::new()));

        cache.get_token().await.unwrap();
        cache.get_token().await.unwrap();
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_empty() {
        let issuer = Arc::new(CountingIssuer::new(3600));
        *issuer.fail.lock().unwrap() = Some(ClientError::Fetch("connection refused".into()));
        let cache = UploadTokenCache::with_clock(issuer.clone(), Arc::new(ManualClock::new()));

        assert_eq!(
            cache.get_token().await.unwrap_err(),
            ClientError::Credential(CREDENTIAL_FAILED.into())
        );

        *issuer.fail.lock().unwrap() =
            Some(ClientError::Credential("upload storage is not configured".into()));
        assert_eq!(
            cache.get_token().await.unwrap_err().to_string(),
            "upload storage is not configured"
        );

        *issuer.fail.lock().unwrap() = None;
        assert_eq!(cache.get_token().await.unwrap().credential, "tok-3");
    }
}
