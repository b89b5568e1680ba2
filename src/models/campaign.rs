// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cold-outreach campaign models.
//!
//! A campaign owns a template and a follow-up cadence (`follow_up_days`);
//! contacts advance through stages as follow-ups are sent. A contact is
//! "due" purely by date comparison against its stage's delay.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Campaign lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

/// Campaign record stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Document ID
    pub id: String,
    /// Owner email address
    pub owner: String,
    pub name: String,
    /// Template used for the initial send and follow-ups
    pub template_id: String,
    /// Days to wait before each follow-up stage (stage N uses index N)
    #[serde(default)]
    pub follow_up_days: Vec<u32>,
    pub status: CampaignStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// A recipient within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignContact {
    /// Document ID
    pub id: String,
    pub campaign_id: String,
    /// Owner email address (denormalized for per-user queries)
    pub owner: String,
    pub email_address: String,
    pub name: String,
    /// Number of follow-ups already sent (0 = only the initial send)
    #[serde(default)]
    pub stage: u32,
    /// When the contact was last emailed (ISO 8601)
    pub last_contacted_at: Option<String>,
    /// Set by the tracking pixel on first open
    pub opened_at: Option<String>,
    /// Set when a reply from the contact is detected
    #[serde(default)]
    pub replied: bool,
    /// "active" or "unsubscribed"
    pub status: String,
}

impl CampaignContact {
    /// Whether this contact is due for its next follow-up at `now`.
    ///
    /// Contacts that replied, were never contacted, or have exhausted the
    /// campaign's follow-up stages are never due.
    pub fn is_due(&self, campaign: &Campaign, now: DateTime<Utc>) -> bool {
        if campaign.status != CampaignStatus::Active || self.replied || self.status != "active" {
            return false;
        }
        let Some(delay_days) = campaign.follow_up_days.get(self.stage as usize) else {
            return false;
        };
        let Some(last) = self
            .last_contacted_at
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        else {
            return false;
        };
        now >= last.with_timezone(&Utc) + Duration::days(*delay_days as i64)
    }
}

/// Reusable outreach email template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachTemplate {
    /// Document ID
    pub id: String,
    /// Owner email address
    pub owner: String,
    pub name: String,
    pub subject: String,
    /// Body with `{{name}}` / `{{email}}` placeholders
    pub body: String,
    pub created_at: String,
}

impl OutreachTemplate {
    /// Substitute contact placeholders into the subject and body.
    pub fn render(&self, contact: &CampaignContact) -> (String, String) {
        let render_one = |text: &str| {
            text.replace("{{name}}", &contact.name)
                .replace("{{email}}", &contact.email_address)
        };
        (render_one(&self.subject), render_one(&self.body))
    }
}
