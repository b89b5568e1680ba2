// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process TTL caches keyed by user email.
//!
//! Two caches share the same expiry discipline: a stable per-user visitor
//! id (tracking pixel / analytics) and the Google profile picture URL.
//! Both are advisory - losing them on restart is harmless. An entry is
//! served strictly until its recorded TTL elapses, never after.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Default TTL for visitor ids (24 hours).
pub const VISITOR_ID_TTL_SECS: i64 = 24 * 60 * 60;

/// Default TTL for cached profile pictures (1 hour).
pub const AVATAR_TTL_SECS: i64 = 60 * 60;

#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// TTL cache for small per-user strings.
#[derive(Clone)]
pub struct TtlCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Get the cached value, or `None` once the recorded TTL has elapsed.
    pub fn get(&self, email: &str) -> Option<String> {
        self.get_at(email, Utc::now())
    }

    /// Store a value, stamping its expiry from the cache TTL.
    pub fn insert(&self, email: &str, value: String) {
        self.insert_at(email, value, Utc::now());
    }

    pub fn remove(&self, email: &str) {
        self.entries.remove(email);
    }

    /// Clock-injected variant of [`get`] for tests.
    pub fn get_at(&self, email: &str, now: DateTime<Utc>) -> Option<String> {
        let entry = self.entries.get(email)?;
        if now >= entry.expires_at {
            drop(entry);
            self.entries.remove(email);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Clock-injected variant of [`insert`] for tests.
    pub fn insert_at(&self, email: &str, value: String, now: DateTime<Utc>) {
        self.entries.insert(
            email.to_string(),
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }
}

/// Visitor-id cache with regeneration on expiry.
#[derive(Clone)]
pub struct VisitorIdCache {
    cache: TtlCache,
}

impl VisitorIdCache {
    pub fn new() -> Self {
        Self {
            cache: TtlCache::new(VISITOR_ID_TTL_SECS),
        }
    }

    /// Current visitor id, or `None` once its TTL has elapsed.
    pub fn get(&self, email: &str) -> Option<String> {
        self.cache.get(email)
    }

    /// Drop a user's visitor id (account deletion).
    pub fn remove(&self, email: &str) {
        self.cache.remove(email);
    }

    /// Current visitor id, regenerated if the TTL has elapsed.
    pub fn get_or_generate(&self, email: &str) -> String {
        self.get_or_generate_at(email, Utc::now())
    }

    /// Clock-injected variant of [`get_or_generate`] for tests.
    pub fn get_or_generate_at(&self, email: &str, now: DateTime<Utc>) -> String {
        if let Some(id) = self.cache.get_at(email, now) {
            return id;
        }
        let id = generate_visitor_id(email, now);
        self.cache.insert_at(email, id.clone(), now);
        id
    }
}

impl Default for VisitorIdCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive an opaque visitor id from the email and generation time.
fn generate_visitor_id(email: &str, now: DateTime<Utc>) -> String {
    use sha2::{Digest, Sha256};

    let nanos = now.timestamp_nanos_opt().unwrap_or_default();
    let digest = Sha256::digest(format!("visitor:{email}:{nanos}").as_bytes());
    hex::encode(&digest[..16])
}
