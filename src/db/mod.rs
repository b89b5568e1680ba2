//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TOKENS: &str = "tokens";
    pub const PROFILES: &str = "profiles";
    pub const EMAILS: &str = "emails";
    pub const MISSIONS: &str = "missions";
    pub const CAMPAIGNS: &str = "campaigns";
    pub const CAMPAIGN_CONTACTS: &str = "campaign_contacts";
    pub const TEMPLATES: &str = "templates";
    /// Subscription state mirrored from billing webhooks (keyed by email)
    pub const SUBSCRIPTIONS: &str = "subscriptions";
}

/// Document ID for per-user singleton documents (users, profiles, tokens,
/// subscriptions). Emails contain characters Firestore path segments
/// dislike, so they are urlencoded.
pub fn user_doc_id(email: &str) -> String {
    urlencoding::encode(email).into_owned()
}

/// Generate a new document ID from a seed, the current time, and a
/// process-wide counter (two calls in the same nanosecond still differ).
pub fn generate_id(seed: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let digest = Sha256::digest(format!("{seed}:{nanos}:{count}").as_bytes());
    hex::encode(&digest[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_doc_id_escapes_email() {
        assert_eq!(user_doc_id("ada@example.com"), "ada%40example.com");
    }

    #[test]
    fn generate_id_is_unique_per_call() {
        let a = generate_id("seed");
        let b = generate_id("seed");
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
    }
}
