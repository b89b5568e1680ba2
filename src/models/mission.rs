// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Mission (follow-up goal) model.
//!
//! A mission tracks a user-defined goal tied to one or more email threads.
//! Missions are created by the user or by the auto-detection pass; the only
//! scheduling involved is date comparison against the deadline and the
//! escalation rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mission lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Active,
    Done,
    Archived,
}

/// An escalation step applied once the mission is overdue long enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    /// Days past the deadline before this rule applies
    pub after_days: u32,
    /// Free-form action label ("remind", "draft_followup", ...)
    pub action: String,
}

/// Mission record stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    /// Document ID
    pub id: String,
    /// Owner email address
    pub owner: String,
    pub title: String,
    /// What "done" means, in the user's words
    pub success_condition: String,
    /// Deadline (ISO 8601), if any
    pub deadline: Option<String>,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    /// Gmail thread IDs this mission tracks
    #[serde(default)]
    pub linked_thread_ids: Vec<String>,
    pub status: MissionStatus,
    pub created_at: String,
    pub updated_at: String,
    /// Set exactly once, when the mission first transitions to done
    pub completed_at: Option<String>,
}

impl Mission {
    /// Whether the mission's deadline has passed at `now`.
    ///
    /// Missions without a deadline (or with an unparseable one) are never due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status != MissionStatus::Active {
            return false;
        }
        self.deadline
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| now >= d.with_timezone(&Utc))
            .unwrap_or(false)
    }

    /// Highest escalation rule triggered at `now`, if any.
    ///
    /// Rules are matched by days-overdue; the rule with the largest
    /// `after_days` that has elapsed wins.
    pub fn escalation_level(&self, now: DateTime<Utc>) -> Option<&EscalationRule> {
        if !self.is_due(now) {
            return None;
        }
        let deadline = self
            .deadline
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())?
            .with_timezone(&Utc);

        let days_overdue = now.signed_duration_since(deadline).num_days().max(0) as u32;

        self.escalation_rules
            .iter()
            .filter(|r| r.after_days <= days_overdue)
            .max_by_key(|r| r.after_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mission_with_deadline(deadline: DateTime<Utc>) -> Mission {
        Mission {
            id: "m1".to_string(),
            owner: "ada@example.com".to_string(),
            title: "Close the Acme deal".to_string(),
            success_condition: "Signed contract received".to_string(),
            deadline: Some(deadline.to_rfc3339()),
            escalation_rules: vec![
                EscalationRule {
                    after_days: 0,
                    action: "remind".to_string(),
                },
                EscalationRule {
                    after_days: 3,
                    action: "draft_followup".to_string(),
                },
            ],
            linked_thread_ids: vec!["t1".to_string()],
            status: MissionStatus::Active,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: None,
        }
    }

    #[test]
    fn not_due_before_deadline() {
        let now = Utc::now();
        let mission = mission_with_deadline(now + Duration::days(2));
        assert!(!mission.is_due(now));
        assert!(mission.escalation_level(now).is_none());
    }

    #[test]
    fn due_after_deadline() {
        let now = Utc::now();
        let mission = mission_with_deadline(now - Duration::hours(1));
        assert!(mission.is_due(now));
        assert_eq!(mission.escalation_level(now).unwrap().action, "remind");
    }

    #[test]
    fn escalates_to_highest_elapsed_rule() {
        let now = Utc::now();
        let mission = mission_with_deadline(now - Duration::days(5));
        assert_eq!(
            mission.escalation_level(now).unwrap().action,
            "draft_followup"
        );
    }

    #[test]
    fn done_mission_is_never_due() {
        let now = Utc::now();
        let mut mission = mission_with_deadline(now - Duration::days(5));
        mission.status = MissionStatus::Done;
        assert!(!mission.is_due(now));
        assert!(mission.escalation_level(now).is_none());
    }

    #[test]
    fn missing_deadline_is_never_due() {
        let now = Utc::now();
        let mut mission = mission_with_deadline(now);
        mission.deadline = None;
        assert!(!mission.is_due(now));
    }
}
