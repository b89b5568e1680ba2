// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud Tasks service for rate-limited async processing.
//!
//! This service creates Cloud Tasks for:
//! - Syncing a user's mailbox after sign-in (and on schedule)
//! - Sending due outreach follow-ups (one task per contact)
//! - Deleting user data after a disconnect
//!
//! Uses the official google-cloud-tasks-v2 SDK.

use crate::error::AppError;
use crate::error::Result;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const MAX_CONCURRENT_TASKS: usize = 100;

/// Payload sent to the mailbox sync task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMailboxPayload {
    pub email: String,
    pub source: String, // "signin" or "scheduler"
}

/// Payload sent to the follow-up processing task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessFollowUpPayload {
    pub contact_id: String,
    pub campaign_id: String,
    pub owner: String,
}

/// Payload for user deletion task (GDPR compliance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUserPayload {
    pub email: String,
    pub source: String, // "user_request"
}

/// Result of a follow-up fan-out operation.
///
/// Provides detailed information about which contacts were successfully
/// queued and which failed, so the scan endpoint can report partial failures.
#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    /// Number of follow-ups successfully queued.
    pub queued: u32,
    /// Number of follow-ups that failed to queue.
    pub failed: u32,
    /// Contact IDs that failed to queue.
    pub failed_ids: Vec<String>,
}

impl FanOutResult {
    /// Returns true if all follow-ups were successfully queued.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Returns true if some follow-ups succeeded and some failed.
    pub fn is_partial_failure(&self) -> bool {
        self.queued > 0 && self.failed > 0
    }
}

/// Cloud Tasks client wrapper.
pub struct TasksService {
    project_id: String,
    location: String,
    queue_name: String,
    /// Mock: contact IDs that should fail when queued (test builds only).
    #[cfg(test)]
    mock_fail_ids: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl TasksService {
    pub fn new(project_id: &str, region: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            location: region.to_string(),
            queue_name: crate::config::OUTREACH_QUEUE_NAME.to_string(),
            #[cfg(test)]
            mock_fail_ids: std::sync::Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Set contact IDs that should fail when queued (test builds only).
    #[cfg(test)]
    pub fn set_mock_fail_ids(&self, ids: impl IntoIterator<Item = &'static str>) {
        let mut guard = self.mock_fail_ids.lock().unwrap();
        guard.clear();
        guard.extend(ids.into_iter().map(String::from));
    }

    /// Queue a mailbox sync for a user.
    pub async fn queue_sync_mailbox(
        &self,
        service_url: &str,
        payload: SyncMailboxPayload,
    ) -> Result<()> {
        self.queue_task(service_url, "/tasks/sync-mailbox", &payload)
            .await
    }

    /// Queue a single follow-up send.
    pub async fn queue_follow_up(
        &self,
        service_url: &str,
        payload: ProcessFollowUpPayload,
    ) -> Result<()> {
        self.queue_task(service_url, "/tasks/process-follow-up", &payload)
            .await
    }

    /// Queue a user deletion task (GDPR compliance).
    pub async fn queue_delete_user(
        &self,
        service_url: &str,
        payload: DeleteUserPayload,
    ) -> Result<()> {
        tracing::info!(
            email = %payload.email,
            source = %payload.source,
            "Queuing user deletion task"
        );
        self.queue_task(service_url, "/tasks/delete-user", &payload)
            .await
    }

    /// Generic task queuing helper.
    async fn queue_task<T: Serialize>(
        &self,
        service_url: &str,
        endpoint: &str,
        payload: &T,
    ) -> Result<()> {
        use google_cloud_tasks_v2::client::CloudTasks;
        use google_cloud_tasks_v2::model::{HttpRequest, OidcToken, Task};

        let client = CloudTasks::builder()
            .build()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks client error: {}", e)))?;

        let queue_path = format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        );

        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let http_request = HttpRequest::default()
            .set_url(format!("{}{}", service_url, endpoint))
            .set_http_method("POST")
            .set_body(axum::body::Bytes::from(body))
            .set_headers(std::collections::HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]))
            .set_oidc_token(
                OidcToken::default()
                    .set_service_account_email(format!(
                        "mailient-api@{}.iam.gserviceaccount.com",
                        self.project_id
                    ))
                    .set_audience(service_url.to_string()),
            );

        let task = Task::default().set_http_request(http_request);

        let _response = client
            .create_task()
            .set_parent(queue_path)
            .set_task(task)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks create error: {}", e)))?;

        Ok(())
    }

    /// Queue follow-up tasks for a batch of due contacts.
    ///
    /// Returns a `FanOutResult` with details about which contacts were
    /// successfully queued and which failed.
    pub async fn queue_follow_ups(
        &self,
        service_url: &str,
        follow_ups: Vec<ProcessFollowUpPayload>,
    ) -> FanOutResult {
        let count = follow_ups.len();
        let batch_success = Arc::new(AtomicU64::new(0));
        let failed_ids = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        stream::iter(follow_ups)
            .for_each_concurrent(MAX_CONCURRENT_TASKS, |payload| {
                let batch_success = Arc::clone(&batch_success);
                let failed_ids = Arc::clone(&failed_ids);
                async move {
                    // Check for mock failures in test builds
                    #[cfg(test)]
                    {
                        let should_fail = self
                            .mock_fail_ids
                            .lock()
                            .unwrap()
                            .contains(&payload.contact_id);
                        if should_fail {
                            tracing::warn!(contact_id = %payload.contact_id, "Mock failure for contact");
                            failed_ids.lock().await.push(payload.contact_id.clone());
                            return;
                        }
                    }

                    let contact_id = payload.contact_id.clone();
                    match self.queue_follow_up(service_url, payload).await {
                        Ok(_) => {
                            batch_success.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::warn!(
                                contact_id = %contact_id,
                                error = ?e,
                                "Failed to queue follow-up"
                            );
                            failed_ids.lock().await.push(contact_id);
                        }
                    }
                }
            })
            .await;

        let queued = batch_success.load(Ordering::Relaxed) as u32;
        let failed_ids = Arc::try_unwrap(failed_ids)
            .expect("All tasks completed, should have sole ownership")
            .into_inner();
        let failed = failed_ids.len() as u32;

        tracing::info!(
            requested = count,
            succeeded = queued,
            failed = failed,
            "Queued follow-up tasks"
        );

        FanOutResult {
            queued,
            failed,
            failed_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn follow_up(contact_id: &str) -> ProcessFollowUpPayload {
        ProcessFollowUpPayload {
            contact_id: contact_id.to_string(),
            campaign_id: "c1".to_string(),
            owner: "ada@example.com".to_string(),
        }
    }

    #[test]
    fn fan_out_result_complete_success() {
        let result = FanOutResult {
            queued: 5,
            failed: 0,
            failed_ids: vec![],
        };

        assert!(result.is_complete_success());
        assert!(!result.is_partial_failure());
    }

    #[test]
    fn fan_out_result_partial_failure() {
        let result = FanOutResult {
            queued: 2,
            failed: 1,
            failed_ids: vec!["ct3".to_string()],
        };

        assert!(!result.is_complete_success());
        assert!(result.is_partial_failure());
    }

    #[test]
    fn fan_out_result_empty_is_success() {
        let result = FanOutResult::default();

        assert!(result.is_complete_success());
        assert!(!result.is_partial_failure());
    }

    #[tokio::test]
    async fn queue_follow_ups_mock_failure() {
        // Transitive reqwest is built with rustls-no-provider; install a
        // process-default crypto provider so client construction returns an
        // error gracefully instead of panicking.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let service = TasksService::new("test-project", "us-west1");

        service.set_mock_fail_ids(["ct2"]);

        let result = service
            .queue_follow_ups(
                "http://localhost",
                vec![follow_up("ct1"), follow_up("ct2")],
            )
            .await;

        // Both fail: ct2 via the mock, ct1 because no Cloud Tasks backend
        // exists in tests - but the mock failure must be recorded.
        assert!(result.failed_ids.contains(&"ct2".to_string()));
        assert_eq!(result.queued, 0);
        assert_eq!(result.failed, 2);
    }

    #[tokio::test]
    async fn queue_follow_ups_empty_input() {
        let service = TasksService::new("test-project", "us-west1");

        let result = service.queue_follow_ups("http://localhost", vec![]).await;

        assert!(result.is_complete_success());
        assert_eq!(result.queued, 0);
        assert_eq!(result.failed, 0);
        assert!(result.failed_ids.is_empty());
    }

    #[test]
    fn set_mock_fail_ids_clears_previous() {
        let service = TasksService::new("test-project", "us-west1");

        service.set_mock_fail_ids(["ct1", "ct2"]);
        service.set_mock_fail_ids(["ct3"]);

        let guard = service.mock_fail_ids.lock().unwrap();
        assert!(!guard.contains("ct1"));
        assert!(guard.contains("ct3"));
    }
}
