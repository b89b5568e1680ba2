// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! TTL behavior of the visitor-id and profile-picture caches.

use chrono::{Duration, Utc};
use mailient::services::visitor::{TtlCache, VisitorIdCache, AVATAR_TTL_SECS, VISITOR_ID_TTL_SECS};

#[test]
fn test_avatar_cache_serves_until_ttl() {
    let cache = TtlCache::new(AVATAR_TTL_SECS);
    let t0 = Utc::now();
    let url = "https://lh3.googleusercontent.com/a/pic".to_string();

    cache.insert_at("ada@example.com", url.clone(), t0);

    // Any instant strictly before the recorded TTL: still cached
    let almost = t0 + Duration::seconds(AVATAR_TTL_SECS - 1);
    assert_eq!(cache.get_at("ada@example.com", almost), Some(url));
}

#[test]
fn test_avatar_cache_expires_at_ttl_never_before() {
    let cache = TtlCache::new(AVATAR_TTL_SECS);
    let t0 = Utc::now();

    cache.insert_at("ada@example.com", "url".to_string(), t0);

    // Exactly at the TTL boundary the entry is gone (regenerate)
    let at_ttl = t0 + Duration::seconds(AVATAR_TTL_SECS);
    assert!(cache.get_at("ada@example.com", at_ttl).is_none());

    // And the removal sticks
    assert!(cache.get_at("ada@example.com", t0).is_none());
}

#[test]
fn test_visitor_id_null_after_ttl() {
    let visitors = VisitorIdCache::new();
    let t0 = Utc::now();

    let id = visitors.get_or_generate_at("ada@example.com", t0);
    assert!(!id.is_empty());

    // Before TTL: same id. After TTL: regenerated (a different id).
    let within = visitors.get_or_generate_at("ada@example.com", t0 + Duration::seconds(60));
    assert_eq!(id, within);

    let after = visitors
        .get_or_generate_at("ada@example.com", t0 + Duration::seconds(VISITOR_ID_TTL_SECS));
    assert_ne!(id, after);
}

#[test]
fn test_visitor_get_without_generate() {
    let visitors = VisitorIdCache::new();
    assert!(visitors.get("cold@example.com").is_none());

    let id = visitors.get_or_generate("cold@example.com");
    assert_eq!(visitors.get("cold@example.com"), Some(id));
}

#[test]
fn test_remove_clears_entry() {
    let visitors = VisitorIdCache::new();
    let id = visitors.get_or_generate("ada@example.com");
    assert!(!id.is_empty());

    visitors.remove("ada@example.com");
    assert!(visitors.get("ada@example.com").is_none());
}
