//! SQLite-backed implementation of the service seams.
//!
//! [`SqliteStore`] wraps a [`Database`] and implements every storage trait
//! the scheduling services consume, plus the seeding helpers used by the
//! ingestion side and by tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::{
    AttemptId, BounceStatus, BounceType, EmailId, EmailStatus, FollowupAttempt, FollowupTemplate,
    ManualFollowup, TrackedEmail,
};
use crate::services::{
    ActivityStore, BounceGuard, ConfigStore, InsertOutcome, SchedulerStore, TemplateStore,
};

use super::database::Database;
use super::queries;

/// SQLite-backed store for the follow-up engine.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Wraps an open database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Registers a new tracked email (normally done by the ingestion side).
    pub async fn insert_tracked_email(&self, email: &TrackedEmail) -> Result<()> {
        queries::tracked_emails::insert(&self.db, email).await?;
        Ok(())
    }

    /// Fetches one tracked email.
    pub async fn tracked_email(&self, email_id: &EmailId) -> Result<Option<TrackedEmail>> {
        Ok(queries::tracked_emails::get_by_id(&self.db, email_id).await?)
    }

    /// Records a bounce for an email (normally done by webhook ingestion).
    pub async fn record_bounce(&self, email_id: &EmailId, bounce: BounceType) -> Result<()> {
        queries::tracked_emails::set_bounce(&self.db, email_id, bounce).await?;
        Ok(())
    }

    /// Records a detected manual follow-up.
    pub async fn record_manual_followup(&self, followup: &ManualFollowup) -> Result<()> {
        queries::manual_followups::insert(&self.db, followup).await?;
        Ok(())
    }

    /// Registers a follow-up template.
    pub async fn insert_template(&self, template: &FollowupTemplate) -> Result<()> {
        queries::templates::insert(&self.db, template).await?;
        Ok(())
    }

    /// Stores a configuration blob under a well-known key.
    pub async fn set_config(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        queries::config::set(&self.db, key, value).await?;
        Ok(())
    }
}

#[async_trait]
impl SchedulerStore for SqliteStore {
    async fn pending_emails(&self, recipient: Option<&str>) -> Result<Vec<TrackedEmail>> {
        Ok(queries::tracked_emails::list_pending(&self.db, recipient.map(String::from)).await?)
    }

    async fn has_active_attempt(&self, email_id: &EmailId, sequence: u32) -> Result<bool> {
        Ok(queries::attempts::has_active_at_sequence(&self.db, email_id, sequence).await?)
    }

    async fn insert_attempt(&self, attempt: &FollowupAttempt) -> Result<InsertOutcome> {
        Ok(queries::attempts::insert(&self.db, attempt).await?)
    }

    async fn update_email_status(&self, email_id: &EmailId, status: EmailStatus) -> Result<()> {
        queries::tracked_emails::set_status(&self.db, email_id, status).await?;
        Ok(())
    }

    async fn due_attempts(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(FollowupAttempt, TrackedEmail)>> {
        let due = queries::attempts::list_due(&self.db, now).await?;
        let mut joined = Vec::with_capacity(due.len());

        for attempt in due {
            match queries::tracked_emails::get_by_id(&self.db, &attempt.email_id).await? {
                Some(email) => joined.push((attempt, email)),
                None => {
                    warn!(attempt = %attempt.id, email = %attempt.email_id, "orphaned attempt");
                }
            }
        }

        Ok(joined)
    }

    async fn mark_attempt_sent(&self, id: &AttemptId, sent_at: DateTime<Utc>) -> Result<()> {
        queries::attempts::mark_sent(&self.db, id, sent_at).await?;
        Ok(())
    }

    async fn mark_attempt_failed(&self, id: &AttemptId, reason: &str) -> Result<()> {
        queries::attempts::mark_failed(&self.db, id, reason.to_owned()).await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for SqliteStore {
    async fn sent_attempts(&self, email_id: &EmailId) -> Result<Vec<FollowupAttempt>> {
        Ok(queries::attempts::list_sent(&self.db, email_id).await?)
    }

    async fn manual_followups(&self, email_id: &EmailId) -> Result<Vec<ManualFollowup>> {
        Ok(queries::manual_followups::list_for_email(&self.db, email_id).await?)
    }

    async fn total_followup_count(&self, email_id: &EmailId) -> Result<u32> {
        Ok(queries::attempts::total_followup_count(&self.db, email_id).await?)
    }
}

#[async_trait]
impl BounceGuard for SqliteStore {
    async fn bounce_status(&self, email_id: &EmailId) -> Result<BounceStatus> {
        let bounce = queries::tracked_emails::get_bounce(&self.db, email_id).await?;
        Ok(BounceStatus::from_bounce(bounce))
    }
}

#[async_trait]
impl TemplateStore for SqliteStore {
    async fn active_templates(&self) -> Result<Vec<FollowupTemplate>> {
        Ok(queries::templates::list_active(&self.db).await?)
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn followup_policy(&self) -> Result<Option<serde_json::Value>> {
        Ok(queries::config::get(&self.db, queries::config::KEY_FOLLOWUP_POLICY).await?)
    }

    async fn working_hours(&self) -> Result<Option<serde_json::Value>> {
        Ok(queries::config::get(&self.db, queries::config::KEY_WORKING_HOURS).await?)
    }
}
