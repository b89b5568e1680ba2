// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Cached Gmail message model for storage and API.

use serde::{Deserialize, Serialize};

/// Cached message record in Firestore.
///
/// A trimmed projection of the Gmail message resource, refreshed by the
/// mailbox sync task. Attachment bytes are never cached; they are fetched
/// from Gmail on demand and passed through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEmail {
    /// Gmail message ID (also used as document ID)
    pub message_id: String,
    /// Owner email address
    pub owner: String,
    /// Gmail thread ID
    pub thread_id: String,
    /// From header
    pub from: String,
    /// To header
    pub to: String,
    /// Subject header
    pub subject: String,
    /// Short plain-text snippet
    pub snippet: String,
    /// Message date (ISO 8601, from Gmail internalDate)
    pub date: String,
    /// Gmail label IDs (INBOX, SENT, UNREAD, ...)
    pub label_ids: Vec<String>,
    /// Whether the owner sent this message
    pub is_sent: bool,
    /// When this record was last synced
    pub synced_at: String,
}

impl CachedEmail {
    /// Best-effort display address extracted from a From/To header
    /// (`"Ada Lovelace <ada@example.com>"` -> `ada@example.com`).
    pub fn header_address(header: &str) -> &str {
        match (header.rfind('<'), header.rfind('>')) {
            (Some(start), Some(end)) if start < end => &header[start + 1..end],
            _ => header.trim(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_address_with_display_name() {
        assert_eq!(
            CachedEmail::header_address("Ada Lovelace <ada@example.com>"),
            "ada@example.com"
        );
    }

    #[test]
    fn header_address_bare() {
        assert_eq!(
            CachedEmail::header_address("  ada@example.com "),
            "ada@example.com"
        );
    }

    #[test]
    fn header_address_malformed_brackets() {
        // '<' after '>' means no well-formed angle-addr; fall back to trim
        assert_eq!(CachedEmail::header_address(">backwards<"), ">backwards<");
    }
}
