// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users and profiles
//! - Tokens (encrypted OAuth tokens)
//! - Cached emails (mailbox sync)
//! - Missions, campaigns, contacts, templates
//! - Subscriptions (billing state)

use crate::db::{collections, user_doc_id};
use crate::error::AppError;
use crate::models::{
    CachedEmail, Campaign, CampaignContact, Mission, MissionStatus, OutreachTemplate, Profile,
    Subscription, User, UserTokens,
};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Cursor for forward pagination over cached emails.
#[derive(Debug, Clone, Copy)]
pub struct EmailQueryCursor<'a> {
    /// Date (RFC 3339) of the last email on the previous page
    pub date: &'a str,
    /// Message ID of the last email on the previous page
    pub message_id: &'a str,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by email.
    pub async fn get_user(&self, email: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_doc_id(email))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user_doc_id(&user.email))
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Get a profile by owner email.
    pub async fn get_profile(&self, email: &str) -> Result<Option<Profile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROFILES)
            .obj()
            .one(&user_doc_id(email))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a profile.
    pub async fn set_profile(&self, profile: &Profile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(user_doc_id(&profile.email))
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Token Operations ────────────────────────────────────────

    /// Get encrypted tokens for a user.
    ///
    /// `Ok(None)` means no mailbox connection exists; expiry is recorded
    /// inside the returned record and is the caller's concern.
    pub async fn get_tokens(&self, email: &str) -> Result<Option<UserTokens>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TOKENS)
            .obj()
            .one(&user_doc_id(email))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store encrypted tokens for a user.
    pub async fn set_tokens(&self, email: &str, tokens: &UserTokens) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::TOKENS)
            .document_id(user_doc_id(email))
            .object(tokens)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete tokens (disconnect).
    pub async fn delete_tokens(&self, email: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::TOKENS)
            .document_id(user_doc_id(email))
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Cached Email Operations ─────────────────────────────────

    fn email_doc_id(owner: &str, message_id: &str) -> String {
        format!("{}_{}", user_doc_id(owner), message_id)
    }

    /// Get a cached email by message ID.
    pub async fn get_email(
        &self,
        owner: &str,
        message_id: &str,
    ) -> Result<Option<CachedEmail>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::EMAILS)
            .obj()
            .one(&Self::email_doc_id(owner, message_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a cached email.
    pub async fn upsert_email(&self, email: &CachedEmail) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::EMAILS)
            .document_id(Self::email_doc_id(&email.owner, &email.message_id))
            .object(email)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get cached emails for a user, newest first, with cursor pagination.
    ///
    /// Dates are stored as RFC 3339 strings so lexicographic comparison is
    /// chronological. The cursor filter is `date <= cursor.date`; the caller
    /// drops leading rows that sort at or before the cursor's (date, id) pair.
    pub async fn get_emails_for_user(
        &self,
        owner: &str,
        sent_only: Option<bool>,
        cursor: Option<EmailQueryCursor<'_>>,
        limit: u32,
    ) -> Result<Vec<CachedEmail>, AppError> {
        let owner = owner.to_string();
        let cursor_date = cursor.map(|c| c.date.to_string());

        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::EMAILS)
            .filter(move |q| {
                let mut conditions = vec![q.field("owner").eq(owner.clone())];
                if let Some(sent) = sent_only {
                    conditions.push(q.field("is_sent").eq(sent));
                }
                if let Some(date) = cursor_date.clone() {
                    conditions.push(q.field("date").less_than_or_equal(date));
                }
                q.for_all(conditions)
            });

        query
            .order_by([
                ("date", firestore::FirestoreQueryDirection::Descending),
                ("message_id", firestore::FirestoreQueryDirection::Descending),
            ])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get all cached messages in a thread for a user.
    pub async fn get_thread_emails(
        &self,
        owner: &str,
        thread_id: &str,
    ) -> Result<Vec<CachedEmail>, AppError> {
        let owner = owner.to_string();
        let thread_id = thread_id.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::EMAILS)
            .filter(move |q| {
                q.for_all([
                    q.field("owner").eq(owner.clone()),
                    q.field("thread_id").eq(thread_id.clone()),
                ])
            })
            .order_by([("date", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Mission Operations ──────────────────────────────────────

    /// Get a mission by ID.
    pub async fn get_mission(&self, mission_id: &str) -> Result<Option<Mission>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::MISSIONS)
            .obj()
            .one(mission_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a mission.
    pub async fn upsert_mission(&self, mission: &Mission) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::MISSIONS)
            .document_id(&mission.id)
            .object(mission)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// List a user's missions, newest first, optionally filtered by status.
    pub async fn get_missions_for_user(
        &self,
        owner: &str,
        status: Option<MissionStatus>,
    ) -> Result<Vec<Mission>, AppError> {
        let owner = owner.to_string();
        // MissionStatus serializes to its lowercase wire name.
        let status_str = status.and_then(|s| serde_json::to_value(s).ok()).and_then(|v| {
            v.as_str().map(String::from)
        });

        self.get_client()?
            .fluent()
            .select()
            .from(collections::MISSIONS)
            .filter(move |q| {
                let mut conditions = vec![q.field("owner").eq(owner.clone())];
                if let Some(status) = status_str.clone() {
                    conditions.push(q.field("status").eq(status));
                }
                q.for_all(conditions)
            })
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a mission.
    pub async fn delete_mission(&self, mission_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::MISSIONS)
            .document_id(mission_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Campaign Operations ─────────────────────────────────────

    /// Get a campaign by ID.
    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CAMPAIGNS)
            .obj()
            .one(campaign_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a campaign.
    pub async fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CAMPAIGNS)
            .document_id(&campaign.id)
            .object(campaign)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// List a user's campaigns, newest first.
    pub async fn get_campaigns_for_user(&self, owner: &str) -> Result<Vec<Campaign>, AppError> {
        let owner = owner.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::CAMPAIGNS)
            .filter(move |q| q.for_all([q.field("owner").eq(owner.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a campaign.
    pub async fn delete_campaign(&self, campaign_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::CAMPAIGNS)
            .document_id(campaign_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// List all campaigns in "active" status (follow-up scan).
    pub async fn get_active_campaigns(&self) -> Result<Vec<Campaign>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::CAMPAIGNS)
            .filter(|q| q.for_all([q.field("status").eq("active")]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Campaign Contact Operations ─────────────────────────────

    /// Get a contact by ID.
    pub async fn get_contact(&self, contact_id: &str) -> Result<Option<CampaignContact>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CAMPAIGN_CONTACTS)
            .obj()
            .one(contact_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a contact.
    pub async fn upsert_contact(&self, contact: &CampaignContact) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CAMPAIGN_CONTACTS)
            .document_id(&contact.id)
            .object(contact)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// List contacts for a campaign.
    pub async fn get_contacts_for_campaign(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<CampaignContact>, AppError> {
        let campaign_id = campaign_id.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::CAMPAIGN_CONTACTS)
            .filter(move |q| q.for_all([q.field("campaign_id").eq(campaign_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Template Operations ─────────────────────────────────────

    /// Get a template by ID.
    pub async fn get_template(
        &self,
        template_id: &str,
    ) -> Result<Option<OutreachTemplate>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TEMPLATES)
            .obj()
            .one(template_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a template.
    pub async fn upsert_template(&self, template: &OutreachTemplate) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::TEMPLATES)
            .document_id(&template.id)
            .object(template)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// List a user's templates, newest first.
    pub async fn get_templates_for_user(
        &self,
        owner: &str,
    ) -> Result<Vec<OutreachTemplate>, AppError> {
        let owner = owner.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::TEMPLATES)
            .filter(move |q| q.for_all([q.field("owner").eq(owner.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a template.
    pub async fn delete_template(&self, template_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::TEMPLATES)
            .document_id(template_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Subscription Operations ─────────────────────────────────

    /// Get subscription state for a user.
    pub async fn get_subscription(&self, email: &str) -> Result<Option<Subscription>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SUBSCRIPTIONS)
            .obj()
            .one(&user_doc_id(email))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store subscription state for a user.
    pub async fn set_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SUBSCRIPTIONS)
            .document_id(user_doc_id(&subscription.email))
            .object(subscription)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }

    // ─── User Data Deletion (GDPR) ─────────────────────────────────

    /// Delete ALL data for a user (GDPR compliance).
    ///
    /// Deletes cached emails, missions, campaigns and their contacts,
    /// templates, the subscription record, the profile, and the user doc.
    ///
    /// Note: Tokens should be deleted separately by the caller after
    /// using them for Google token revocation.
    ///
    /// Returns the number of documents deleted.
    pub async fn delete_user_data(&self, email: &str) -> Result<usize, AppError> {
        let mut deleted_count = 0;
        let owner = email.to_string();

        // 1. Cached emails
        let owner_clone = owner.clone();
        let emails: Vec<CachedEmail> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::EMAILS)
            .filter(move |q| q.for_all([q.field("owner").eq(owner_clone.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let count = emails.len();
        self.batch_delete(&emails, collections::EMAILS, |m: &CachedEmail| {
            Self::email_doc_id(&m.owner, &m.message_id)
        })
        .await?;
        deleted_count += count;
        tracing::debug!(email, count, "Deleted cached emails");

        // 2. Missions
        let missions = self.get_missions_for_user(email, None).await?;
        let count = missions.len();
        self.batch_delete(&missions, collections::MISSIONS, |m: &Mission| m.id.clone())
            .await?;
        deleted_count += count;
        tracing::debug!(email, count, "Deleted missions");

        // 3. Campaigns and their contacts
        let campaigns = self.get_campaigns_for_user(email).await?;
        for campaign in &campaigns {
            let contacts = self.get_contacts_for_campaign(&campaign.id).await?;
            deleted_count += contacts.len();
            self.batch_delete(
                &contacts,
                collections::CAMPAIGN_CONTACTS,
                |c: &CampaignContact| c.id.clone(),
            )
            .await?;
        }
        let count = campaigns.len();
        self.batch_delete(&campaigns, collections::CAMPAIGNS, |c: &Campaign| {
            c.id.clone()
        })
        .await?;
        deleted_count += count;
        tracing::debug!(email, count, "Deleted campaigns");

        // 4. Templates
        let templates = self.get_templates_for_user(email).await?;
        let count = templates.len();
        self.batch_delete(&templates, collections::TEMPLATES, |t: &OutreachTemplate| {
            t.id.clone()
        })
        .await?;
        deleted_count += count;
        tracing::debug!(email, count, "Deleted templates");

        // 5. Subscription, profile, user doc
        for collection in [
            collections::SUBSCRIPTIONS,
            collections::PROFILES,
            collections::USERS,
        ] {
            self.get_client()?
                .fluent()
                .delete()
                .from(collection)
                .document_id(user_doc_id(email))
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            deleted_count += 1;
        }

        tracing::info!(email, deleted_count, "User data deletion complete");

        Ok(deleted_count)
    }
}
