//! Time-bounded introspection cache.
//!
//! Wraps any [`TokenIntrospector`]. Only active verdicts are cached, keyed by
//! the SHA-256 of the token, for at most the configured TTL and never past
//! the token's `exp`. Inactive verdicts and failures always go back to the
//! identity provider, so revocation is visible within one TTL.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use sha2::{Digest, Sha256};

use crate::auth::introspection::{IntrospectionError, IntrospectionResult, TokenIntrospector};

/// Entries beyond this count trigger a sweep of expired ones.
const SWEEP_THRESHOLD: usize = 10_000;

struct CachedVerdict {
    result: IntrospectionResult,
    valid_until: Instant,
}

pub struct CachedIntrospector {
    inner: Arc<dyn TokenIntrospector>,
    ttl: Duration,
    entries: DashMap<String, CachedVerdict>,
}

impl CachedIntrospector {
    pub fn new(inner: Arc<dyn TokenIntrospector>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &str, now: Instant) -> Option<IntrospectionResult> {
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.valid_until > now)
            .map(|entry| entry.result.clone());
        if hit.is_none() {
            self.entries.remove(key);
        }
        hit
    }

    fn store(&self, key: String, result: &IntrospectionResult, now: Instant) {
        let lifetime = match result.remaining_lifetime(SystemTime::now()) {
            Some(remaining) => remaining.min(self.ttl),
            None => self.ttl,
        };
        if lifetime.is_zero() {
            return;
        }

        if self.entries.len() >= SWEEP_THRESHOLD {
            self.entries.retain(|_, entry| entry.valid_until > now);
        }
        self.entries.insert(
            key,
            CachedVerdict {
                result: result.clone(),
                valid_until: now + lifetime,
            },
        );
    }
}

impl TokenIntrospector for CachedIntrospector {
    fn introspect<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<IntrospectionResult, IntrospectionError>> {
        async move {
            let key = token_key(token);
            if let Some(result) = self.lookup(&key, Instant::now()) {
                tracing::trace!("Introspection cache hit");
                return Ok(result);
            }

            let result = self.inner.introspect(token).await?;
            if result.active {
                self.store(key, &result, Instant::now());
            }
            Ok(result)
        }
        .boxed()
    }
}

fn token_key(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
