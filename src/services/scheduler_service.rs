//! Continuous-mode follow-up scheduling.
//!
//! Each pass pulls the pending tracked emails, filters out non-retryable
//! bounces, enriches every candidate with its activity summary, runs the
//! eligibility gate, and persists the next follow-up in `scheduled` state
//! with a working-hours-adjusted target time. A separate delivery step,
//! [`SchedulerService::send_due_attempts`], later sends the attempts whose
//! time has arrived.
//!
//! Failures for one email never abort the batch: they are logged, appended
//! to the batch summary, and the pass moves on. Only an unreachable
//! configuration store or candidate list is fatal.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{FollowupPolicy, WorkingHoursConfig};
use crate::domain::{
    AttemptId, BounceStatus, EmailId, EmailStatus, FollowupAttempt, FollowupTemplate, TrackedEmail,
};
use crate::providers::templates::TemplateRenderer;
use crate::providers::transport::{MailTransport, OutboundMessage};

use super::activity_service::{self, ActivityStore};
use super::calendar_service::WorkingHoursCalendar;
use super::eligibility_service::{self, Eligibility, EligibilityInput, SkipReason};

/// Default ceiling on any single transport call during delivery.
const DEFAULT_SEND_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Fatal scheduling errors. Everything else is per-email and lands in the
/// batch summary instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration was present but malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configuration store or candidate list could not be read at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of persisting a follow-up attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The attempt row was created.
    Inserted,
    /// A non-cancelled attempt already occupies the sequence slot; a
    /// concurrent pass got there first. Benign.
    DuplicateSequence,
}

/// Storage seam for the scheduler.
#[async_trait]
pub trait SchedulerStore: Send + Sync {
    /// Tracked emails in `pending` status, optionally narrowed to one
    /// recipient address for debugging.
    async fn pending_emails(&self, recipient: Option<&str>) -> Result<Vec<TrackedEmail>>;

    /// Whether a non-cancelled attempt exists at (email, sequence).
    async fn has_active_attempt(&self, email_id: &EmailId, sequence: u32) -> Result<bool>;

    /// Persists an attempt. The storage layer's uniqueness constraint on
    /// (email, sequence, non-cancelled) is the authoritative idempotence
    /// guard; a violation reports [`InsertOutcome::DuplicateSequence`].
    async fn insert_attempt(&self, attempt: &FollowupAttempt) -> Result<InsertOutcome>;

    /// Applies a forward-only status transition to a tracked email.
    async fn update_email_status(&self, email_id: &EmailId, status: EmailStatus) -> Result<()>;

    /// Scheduled attempts whose target time is at or before `now`, paired
    /// with their tracked email.
    async fn due_attempts(&self, now: DateTime<Utc>)
        -> Result<Vec<(FollowupAttempt, TrackedEmail)>>;

    /// Marks a scheduled attempt as delivered.
    async fn mark_attempt_sent(&self, id: &AttemptId, sent_at: DateTime<Utc>) -> Result<()>;

    /// Marks an attempt as failed, preserving the reason text.
    async fn mark_attempt_failed(&self, id: &AttemptId, reason: &str) -> Result<()>;
}

/// Bounce lookup collaborator. Emails with a non-retryable bounce are
/// excluded from candidacy before any other evaluation.
#[async_trait]
pub trait BounceGuard: Send + Sync {
    async fn bounce_status(&self, email_id: &EmailId) -> Result<BounceStatus>;
}

/// Template lookup collaborator.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Active templates sorted by (sequence, id).
    async fn active_templates(&self) -> Result<Vec<FollowupTemplate>>;
}

/// Configuration store collaborator: raw JSON blobs keyed by concern.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn followup_policy(&self) -> Result<Option<serde_json::Value>>;
    async fn working_hours(&self) -> Result<Option<serde_json::Value>>;
}

/// One consistent configuration snapshot, loaded once per batch.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub policy: FollowupPolicy,
    pub calendar: WorkingHoursCalendar,
}

/// Options for one scheduling pass.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Narrow the candidate list to one recipient address.
    pub recipient: Option<String>,
    /// Optional trace/source tag echoed into logs.
    pub source: Option<String>,
}

/// Summary of one batch, the sole user-visible surface of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub success: bool,
    pub emails_analyzed: usize,
    pub emails_eligible: usize,
    pub followups_scheduled: usize,
    pub followups_sent: usize,
    pub followups_failed: usize,
    pub errors: Vec<String>,
}

impl BatchSummary {
    fn empty() -> Self {
        Self {
            success: true,
            emails_analyzed: 0,
            emails_eligible: 0,
            followups_scheduled: 0,
            followups_sent: 0,
            followups_failed: 0,
            errors: Vec::new(),
        }
    }

    /// HTTP-style result code: 200 for a processed batch (including one
    /// with zero eligible emails), 500 for a failed one.
    pub fn http_status(&self) -> u16 {
        if self.success {
            200
        } else {
            500
        }
    }
}

/// Loads and validates one configuration snapshot.
///
/// Absent configuration falls back to the documented defaults with a
/// warning. Present-but-malformed configuration is fatal for the batch.
pub async fn load_batch_config<C>(store: &C) -> Result<BatchConfig, SchedulerError>
where
    C: ConfigStore + ?Sized,
{
    let policy = match store
        .followup_policy()
        .await
        .map_err(|e| SchedulerError::Unavailable(e.to_string()))?
    {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| SchedulerError::Config(format!("followup policy: {e}")))?,
        None => {
            warn!("no follow-up policy configured, using defaults");
            FollowupPolicy::default()
        }
    };

    let working_hours: WorkingHoursConfig = match store
        .working_hours()
        .await
        .map_err(|e| SchedulerError::Unavailable(e.to_string()))?
    {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| SchedulerError::Config(format!("working hours: {e}")))?,
        None => {
            warn!("no working-hours calendar configured, using defaults");
            WorkingHoursConfig::default()
        }
    };

    let calendar = WorkingHoursCalendar::compile(&working_hours)
        .map_err(|e| SchedulerError::Config(e.to_string()))?;

    Ok(BatchConfig { policy, calendar })
}

/// Continuous-mode scheduler.
///
/// Generic over a single store type implementing every seam it needs, plus
/// a template renderer used to materialize subject and body at scheduling
/// time.
pub struct SchedulerService<S, R> {
    store: Arc<S>,
    renderer: R,
    send_timeout: StdDuration,
}

impl<S, R> SchedulerService<S, R>
where
    S: SchedulerStore + ActivityStore + BounceGuard + TemplateStore + ConfigStore,
    R: TemplateRenderer,
{
    /// Creates a scheduler over the given store and renderer.
    pub fn new(store: Arc<S>, renderer: R) -> Self {
        Self {
            store,
            renderer,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Overrides the per-send transport timeout.
    pub fn with_send_timeout(mut self, timeout: StdDuration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Runs one scheduling pass at `now`.
    pub async fn run_pass(
        &self,
        options: &PassOptions,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, SchedulerError> {
        let config = load_batch_config(self.store.as_ref()).await?;
        let templates = self
            .store
            .active_templates()
            .await
            .map_err(|e| SchedulerError::Unavailable(format!("template list: {e}")))?;
        let emails = self
            .store
            .pending_emails(options.recipient.as_deref())
            .await
            .map_err(|e| SchedulerError::Unavailable(format!("candidate list: {e}")))?;

        if let Some(source) = &options.source {
            info!(source, candidates = emails.len(), "scheduling pass started");
        } else {
            info!(candidates = emails.len(), "scheduling pass started");
        }

        let mut summary = BatchSummary::empty();

        for email in &emails {
            summary.emails_analyzed += 1;
            match self
                .process_email(email, &config, &templates, now)
                .await
            {
                Ok(EmailOutcome::Scheduled) => {
                    summary.emails_eligible += 1;
                    summary.followups_scheduled += 1;
                }
                Ok(EmailOutcome::AlreadyScheduled) => {
                    summary.emails_eligible += 1;
                }
                Ok(EmailOutcome::Skipped) => {}
                Err(e) => {
                    warn!(email = %email.id, error = %e, "email processing failed");
                    summary.errors.push(format!("{}: {e}", email.id));
                }
            }
        }

        info!(
            analyzed = summary.emails_analyzed,
            scheduled = summary.followups_scheduled,
            errors = summary.errors.len(),
            "scheduling pass finished"
        );

        Ok(summary)
    }

    async fn process_email(
        &self,
        email: &TrackedEmail,
        config: &BatchConfig,
        templates: &[FollowupTemplate],
        now: DateTime<Utc>,
    ) -> Result<EmailOutcome> {
        let bounce = self.store.bounce_status(&email.id).await?;
        if bounce.excludes_followup() {
            debug!(email = %email.id, bounce = ?bounce.bounce_type, "excluded by bounce");
            return Ok(EmailOutcome::Skipped);
        }

        let summary =
            activity_service::summarize(self.store.as_ref(), email, config.calendar.timezone(), now)
                .await?;
        let next_sequence = summary.next_sequence();
        let next_sequence_taken = self
            .store
            .has_active_attempt(&email.id, next_sequence)
            .await?;

        let decision = eligibility_service::evaluate(&EligibilityInput {
            email,
            summary: &summary,
            policy: &config.policy,
            templates,
            next_sequence_taken,
            now,
        });

        let (sequence, template) = match decision {
            Eligibility::Eligible { sequence, template } => (sequence, template),
            Eligibility::Skipped(reason) => {
                debug!(email = %email.id, %reason, "not eligible");
                self.apply_terminal_transition(email, &reason).await?;
                return Ok(EmailOutcome::Skipped);
            }
        };

        let delay = config
            .policy
            .effective_delay_hours(sequence, template.delay_hours);
        let raw_target = summary.last_activity + Duration::hours(delay);
        let (target, adjusted) = config.calendar.next_working_instant(raw_target);

        let rendered = self.renderer.render(template, email, sequence).await?;
        let attempt = FollowupAttempt::scheduled(
            AttemptId::from(Uuid::new_v4().to_string()),
            email.id.clone(),
            template.id.clone(),
            sequence,
            rendered.subject,
            rendered.body,
            target,
            adjusted,
        );

        match self.store.insert_attempt(&attempt).await? {
            InsertOutcome::Inserted => {
                let shift_hours = (target - raw_target).num_seconds() as f64 / 3600.0;
                info!(
                    email = %email.id,
                    sequence,
                    scheduled_for = %target,
                    adjusted,
                    shift_hours,
                    "follow-up scheduled"
                );
                Ok(EmailOutcome::Scheduled)
            }
            InsertOutcome::DuplicateSequence => {
                debug!(email = %email.id, sequence, "attempt already present, skipping");
                Ok(EmailOutcome::AlreadyScheduled)
            }
        }
    }

    /// Emails that can never become eligible again move to a terminal
    /// status so they stop being re-evaluated every pass.
    async fn apply_terminal_transition(
        &self,
        email: &TrackedEmail,
        reason: &SkipReason,
    ) -> Result<()> {
        let status = match reason {
            SkipReason::MaxFollowupsReached { .. } | SkipReason::SequenceExceedsMax { .. } => {
                Some(EmailStatus::MaxReached)
            }
            SkipReason::TimeframeExpired { .. } => Some(EmailStatus::Expired),
            _ => None,
        };

        if let Some(status) = status {
            info!(email = %email.id, status = status.as_str(), "tracked email retired");
            self.store.update_email_status(&email.id, status).await?;
        }
        Ok(())
    }

    /// Delivers scheduled attempts whose target time has arrived.
    ///
    /// Each send is timeout-bounded; a failure or timeout marks the attempt
    /// `failed` with the reason preserved and the pass continues. Failed
    /// attempts are not retried within the same pass.
    pub async fn send_due_attempts<T>(
        &self,
        transport: &T,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, SchedulerError>
    where
        T: MailTransport,
    {
        let due = self
            .store
            .due_attempts(now)
            .await
            .map_err(|e| SchedulerError::Unavailable(format!("due attempts: {e}")))?;

        let mut summary = BatchSummary::empty();
        if due.is_empty() {
            return Ok(summary);
        }

        let credential = transport
            .acquire_credential()
            .await
            .map_err(|e| SchedulerError::Unavailable(format!("transport credential: {e}")))?;

        for (attempt, email) in &due {
            summary.emails_analyzed += 1;
            let message = OutboundMessage {
                from: email.sender.clone(),
                to: email.recipients.clone(),
                subject: attempt.subject.clone(),
                body: attempt.body.clone(),
                conversation_id: email.conversation_id.clone(),
            };

            let send = tokio::time::timeout(
                self.send_timeout,
                transport.send_message(&credential, &message),
            )
            .await;

            let failure = match send {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!(
                    "send timed out after {}s",
                    self.send_timeout.as_secs()
                )),
            };

            match failure {
                None => {
                    self.store
                        .mark_attempt_sent(&attempt.id, now)
                        .await
                        .map_err(|e| SchedulerError::Unavailable(e.to_string()))?;
                    summary.followups_sent += 1;
                    info!(email = %email.id, sequence = attempt.sequence, "follow-up delivered");
                }
                Some(reason) => {
                    warn!(email = %email.id, sequence = attempt.sequence, %reason, "delivery failed");
                    self.store
                        .mark_attempt_failed(&attempt.id, &reason)
                        .await
                        .map_err(|e| SchedulerError::Unavailable(e.to_string()))?;
                    summary.followups_failed += 1;
                    summary.errors.push(format!("{}: {reason}", email.id));
                }
            }
        }

        Ok(summary)
    }
}

enum EmailOutcome {
    Scheduled,
    AlreadyScheduled,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, AttemptStatus, BounceType, ManualFollowup, TemplateId};
    use crate::providers::templates::PlaceholderRenderer;
    use crate::providers::transport::{Credential, TransportError};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::RwLock;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    struct MockStore {
        emails: RwLock<Vec<TrackedEmail>>,
        attempts: RwLock<Vec<FollowupAttempt>>,
        manuals: RwLock<Vec<ManualFollowup>>,
        templates: Vec<FollowupTemplate>,
        policy: Option<serde_json::Value>,
        working_hours: Option<serde_json::Value>,
        statuses: RwLock<HashMap<String, EmailStatus>>,
    }

    impl MockStore {
        fn new(emails: Vec<TrackedEmail>, templates: Vec<FollowupTemplate>) -> Self {
            Self {
                emails: RwLock::new(emails),
                attempts: RwLock::new(Vec::new()),
                manuals: RwLock::new(Vec::new()),
                templates,
                policy: None,
                working_hours: None,
                statuses: RwLock::new(HashMap::new()),
            }
        }

        fn attempt_count(&self) -> usize {
            self.attempts.read().unwrap().len()
        }
    }

    #[async_trait]
    impl SchedulerStore for MockStore {
        async fn pending_emails(&self, recipient: Option<&str>) -> Result<Vec<TrackedEmail>> {
            Ok(self
                .emails
                .read()
                .unwrap()
                .iter()
                .filter(|e| e.status == EmailStatus::Pending)
                .filter(|e| {
                    recipient
                        .map(|r| e.recipients.iter().any(|a| a.email == r))
                        .unwrap_or(true)
                })
                .cloned()
                .collect())
        }

        async fn has_active_attempt(&self, email_id: &EmailId, sequence: u32) -> Result<bool> {
            Ok(self.attempts.read().unwrap().iter().any(|a| {
                a.email_id == *email_id && a.sequence == sequence && a.status.occupies_slot()
            }))
        }

        async fn insert_attempt(&self, attempt: &FollowupAttempt) -> Result<InsertOutcome> {
            let mut attempts = self.attempts.write().unwrap();
            let duplicate = attempts.iter().any(|a| {
                a.email_id == attempt.email_id
                    && a.sequence == attempt.sequence
                    && a.status.occupies_slot()
            });
            if duplicate {
                return Ok(InsertOutcome::DuplicateSequence);
            }
            attempts.push(attempt.clone());
            Ok(InsertOutcome::Inserted)
        }

        async fn update_email_status(
            &self,
            email_id: &EmailId,
            status: EmailStatus,
        ) -> Result<()> {
            self.statuses
                .write()
                .unwrap()
                .insert(email_id.0.clone(), status);
            for email in self.emails.write().unwrap().iter_mut() {
                if email.id == *email_id {
                    email.status = status;
                }
            }
            Ok(())
        }

        async fn due_attempts(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<(FollowupAttempt, TrackedEmail)>> {
            let emails = self.emails.read().unwrap();
            Ok(self
                .attempts
                .read()
                .unwrap()
                .iter()
                .filter(|a| a.is_due(now))
                .filter_map(|a| {
                    emails
                        .iter()
                        .find(|e| e.id == a.email_id)
                        .map(|e| (a.clone(), e.clone()))
                })
                .collect())
        }

        async fn mark_attempt_sent(&self, id: &AttemptId, sent_at: DateTime<Utc>) -> Result<()> {
            for attempt in self.attempts.write().unwrap().iter_mut() {
                if attempt.id == *id {
                    attempt.mark_sent(sent_at);
                }
            }
            Ok(())
        }

        async fn mark_attempt_failed(&self, id: &AttemptId, reason: &str) -> Result<()> {
            for attempt in self.attempts.write().unwrap().iter_mut() {
                if attempt.id == *id {
                    attempt.mark_failed(reason);
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ActivityStore for MockStore {
        async fn sent_attempts(&self, email_id: &EmailId) -> Result<Vec<FollowupAttempt>> {
            Ok(self
                .attempts
                .read()
                .unwrap()
                .iter()
                .filter(|a| a.email_id == *email_id && a.status == AttemptStatus::Sent)
                .cloned()
                .collect())
        }

        async fn manual_followups(&self, email_id: &EmailId) -> Result<Vec<ManualFollowup>> {
            Ok(self
                .manuals
                .read()
                .unwrap()
                .iter()
                .filter(|m| m.email_id == *email_id)
                .cloned()
                .collect())
        }

        async fn total_followup_count(&self, email_id: &EmailId) -> Result<u32> {
            let sent = self
                .attempts
                .read()
                .unwrap()
                .iter()
                .filter(|a| a.email_id == *email_id && a.status == AttemptStatus::Sent)
                .count();
            let manual = self
                .manuals
                .read()
                .unwrap()
                .iter()
                .filter(|m| m.email_id == *email_id)
                .count();
            Ok((sent + manual) as u32)
        }
    }

    #[async_trait]
    impl BounceGuard for MockStore {
        async fn bounce_status(&self, email_id: &EmailId) -> Result<BounceStatus> {
            let bounce = self
                .emails
                .read()
                .unwrap()
                .iter()
                .find(|e| e.id == *email_id)
                .and_then(|e| e.bounce_type);
            Ok(BounceStatus::from_bounce(bounce))
        }
    }

    #[async_trait]
    impl TemplateStore for MockStore {
        async fn active_templates(&self) -> Result<Vec<FollowupTemplate>> {
            Ok(self.templates.clone())
        }
    }

    #[async_trait]
    impl ConfigStore for MockStore {
        async fn followup_policy(&self) -> Result<Option<serde_json::Value>> {
            Ok(self.policy.clone())
        }

        async fn working_hours(&self) -> Result<Option<serde_json::Value>> {
            Ok(self.working_hours.clone())
        }
    }

    struct RecordingTransport {
        fail: bool,
        sends: RwLock<Vec<OutboundMessage>>,
    }

    impl RecordingTransport {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                sends: RwLock::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn acquire_credential(&self) -> crate::providers::transport::Result<Credential> {
            Ok(Credential::new("test-token"))
        }

        async fn send_message(
            &self,
            _credential: &Credential,
            message: &OutboundMessage,
        ) -> crate::providers::transport::Result<()> {
            if self.fail {
                return Err(TransportError::Rejected {
                    status: 502,
                    detail: "upstream unavailable".to_string(),
                });
            }
            self.sends.write().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn pending_email(id: &str, sent_at: DateTime<Utc>) -> TrackedEmail {
        TrackedEmail {
            id: EmailId::from(id),
            sender: Address::with_name("sales@example.com", "Sales"),
            recipients: vec![Address::new("lead@example.org")],
            subject: "Proposal".to_string(),
            sent_at,
            status: EmailStatus::Pending,
            bounce_type: None,
            conversation_id: Some("conv-1".to_string()),
        }
    }

    fn level_templates() -> Vec<FollowupTemplate> {
        vec![
            FollowupTemplate {
                id: TemplateId::from("tpl-1"),
                sequence: 1,
                subject: "Re: {{subject}}".to_string(),
                body: "Hi {{recipient_name}}, any thoughts on this?".to_string(),
                delay_hours: Some(24),
                active: true,
            },
            FollowupTemplate {
                id: TemplateId::from("tpl-2"),
                sequence: 2,
                subject: "Re: {{subject}}".to_string(),
                body: "Checking in once more.".to_string(),
                delay_hours: Some(48),
                active: true,
            },
        ]
    }

    fn service(store: Arc<MockStore>) -> SchedulerService<MockStore, PlaceholderRenderer> {
        SchedulerService::new(store, PlaceholderRenderer)
    }

    #[tokio::test]
    async fn schedules_inside_working_hours_without_adjustment() {
        // Sent Monday 08:00 UTC, 24h delay → Tuesday 08:00 UTC, inside the
        // default Mon-Fri 07:00-18:00 window.
        let sent = utc(2026, 8, 3, 8, 0);
        let store = Arc::new(MockStore::new(
            vec![pending_email("email-1", sent)],
            level_templates(),
        ));
        let svc = service(store.clone());

        let summary = svc
            .run_pass(&PassOptions::default(), sent + Duration::hours(25))
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.emails_analyzed, 1);
        assert_eq!(summary.followups_scheduled, 1);

        let attempts = store.attempts.read().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].scheduled_for, utc(2026, 8, 4, 8, 0));
        assert!(!attempts[0].adjusted_for_working_hours);
        assert_eq!(attempts[0].status, AttemptStatus::Scheduled);
    }

    #[tokio::test]
    async fn friday_evening_target_is_adjusted_to_monday() {
        // Last activity Friday 17:30, level-1 delay forced to 1h via policy
        // override → raw target Friday 18:30 → adjusted to Monday 07:00.
        let sent = utc(2026, 8, 7, 17, 30);
        let mut store = MockStore::new(vec![pending_email("email-1", sent)], level_templates());
        store.policy = Some(serde_json::json!({
            "max_followups": 3,
            "max_per_day": 2,
            "total_timeframe_hours": 720,
            "level_delays": { "1": 1 }
        }));
        let store = Arc::new(store);
        let svc = service(store.clone());

        let summary = svc
            .run_pass(&PassOptions::default(), sent + Duration::hours(2))
            .await
            .unwrap();

        assert_eq!(summary.followups_scheduled, 1);
        let attempts = store.attempts.read().unwrap();
        assert_eq!(attempts[0].scheduled_for, utc(2026, 8, 10, 7, 0));
        assert!(attempts[0].adjusted_for_working_hours);
    }

    #[tokio::test]
    async fn second_pass_does_not_duplicate() {
        let sent = utc(2026, 8, 3, 8, 0);
        let store = Arc::new(MockStore::new(
            vec![pending_email("email-1", sent)],
            level_templates(),
        ));
        let svc = service(store.clone());
        let now = sent + Duration::hours(25);

        let first = svc.run_pass(&PassOptions::default(), now).await.unwrap();
        let second = svc.run_pass(&PassOptions::default(), now).await.unwrap();

        assert_eq!(first.followups_scheduled, 1);
        assert_eq!(second.followups_scheduled, 0);
        assert_eq!(store.attempt_count(), 1);
    }

    #[tokio::test]
    async fn hard_bounce_is_excluded() {
        let sent = utc(2026, 8, 3, 8, 0);
        let mut email = pending_email("email-1", sent);
        email.bounce_type = Some(BounceType::Hard);
        let store = Arc::new(MockStore::new(vec![email], level_templates()));
        let svc = service(store.clone());

        let summary = svc
            .run_pass(&PassOptions::default(), sent + Duration::hours(48))
            .await
            .unwrap();

        assert_eq!(summary.emails_analyzed, 1);
        assert_eq!(summary.followups_scheduled, 0);
        assert_eq!(store.attempt_count(), 0);
    }

    #[tokio::test]
    async fn expired_email_is_retired() {
        let sent = utc(2026, 6, 1, 8, 0);
        let store = Arc::new(MockStore::new(
            vec![pending_email("email-1", sent)],
            level_templates(),
        ));
        let svc = service(store.clone());

        // Far past the 720h default timeframe.
        let summary = svc
            .run_pass(&PassOptions::default(), sent + Duration::hours(1000))
            .await
            .unwrap();

        assert_eq!(summary.followups_scheduled, 0);
        assert_eq!(
            store.statuses.read().unwrap().get("email-1"),
            Some(&EmailStatus::Expired)
        );
    }

    #[tokio::test]
    async fn malformed_policy_is_fatal() {
        let sent = utc(2026, 8, 3, 8, 0);
        let mut store = MockStore::new(vec![pending_email("email-1", sent)], level_templates());
        store.policy = Some(serde_json::json!({ "max_followups": "three" }));
        let svc = service(Arc::new(store));

        let result = svc
            .run_pass(&PassOptions::default(), sent + Duration::hours(48))
            .await;
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }

    #[tokio::test]
    async fn recipient_filter_narrows_candidates() {
        let sent = utc(2026, 8, 3, 8, 0);
        let mut other = pending_email("email-2", sent);
        other.recipients = vec![Address::new("someone@else.example")];
        let store = Arc::new(MockStore::new(
            vec![pending_email("email-1", sent), other],
            level_templates(),
        ));
        let svc = service(store.clone());

        let options = PassOptions {
            recipient: Some("lead@example.org".to_string()),
            source: None,
        };
        let summary = svc
            .run_pass(&options, sent + Duration::hours(25))
            .await
            .unwrap();

        assert_eq!(summary.emails_analyzed, 1);
        assert_eq!(summary.followups_scheduled, 1);
    }

    #[tokio::test]
    async fn due_attempts_are_delivered() {
        let sent = utc(2026, 8, 3, 8, 0);
        let store = Arc::new(MockStore::new(
            vec![pending_email("email-1", sent)],
            level_templates(),
        ));
        let svc = service(store.clone());
        let now = sent + Duration::hours(25);

        svc.run_pass(&PassOptions::default(), now).await.unwrap();

        let transport = RecordingTransport::new(false);
        let summary = svc
            .send_due_attempts(&transport, utc(2026, 8, 4, 9, 0))
            .await
            .unwrap();

        assert_eq!(summary.followups_sent, 1);
        assert_eq!(summary.followups_failed, 0);
        let sends = transport.sends.read().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].conversation_id.as_deref(), Some("conv-1"));

        let attempts = store.attempts.read().unwrap();
        assert_eq!(attempts[0].status, AttemptStatus::Sent);
    }

    #[tokio::test]
    async fn failed_delivery_preserves_reason_and_continues() {
        let sent = utc(2026, 8, 3, 8, 0);
        let store = Arc::new(MockStore::new(
            vec![
                pending_email("email-1", sent),
                pending_email("email-2", sent),
            ],
            level_templates(),
        ));
        let svc = service(store.clone());
        let now = sent + Duration::hours(25);

        svc.run_pass(&PassOptions::default(), now).await.unwrap();

        let transport = RecordingTransport::new(true);
        let summary = svc
            .send_due_attempts(&transport, utc(2026, 8, 4, 9, 0))
            .await
            .unwrap();

        assert_eq!(summary.followups_sent, 0);
        assert_eq!(summary.followups_failed, 2);
        assert_eq!(summary.errors.len(), 2);

        let attempts = store.attempts.read().unwrap();
        for attempt in attempts.iter() {
            assert_eq!(attempt.status, AttemptStatus::Failed);
            assert!(attempt
                .failure_reason
                .as_deref()
                .unwrap()
                .contains("upstream unavailable"));
        }
    }
}
