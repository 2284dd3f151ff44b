//! Fixed-slot follow-up dispatch.
//!
//! Triggered at a small, predetermined set of times of day. Unlike the
//! continuous scheduler, eligible follow-ups are delivered immediately:
//! render, send through the mail transport (as a reply in the original
//! conversation), and record the attempt directly as `sent`, or as `failed`
//! with the captured reason. The eligibility gate, activity ledger, and
//! calendar are shared with the continuous mode; only the moment of
//! delivery and the initial attempt state differ.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{AttemptId, EmailStatus, FollowupAttempt, FollowupTemplate, TrackedEmail};
use crate::providers::templates::TemplateRenderer;
use crate::providers::transport::{Credential, MailTransport, OutboundMessage};

use super::activity_service::{self, ActivityStore};
// Shared with the continuous scheduler to keep one canonical component set.
use super::scheduler_service::{
    load_batch_config, BatchConfig, BatchSummary, BounceGuard, ConfigStore, InsertOutcome,
    SchedulerError, SchedulerStore, TemplateStore,
};
use super::eligibility_service::{self, Eligibility, EligibilityInput};

/// Default ceiling on any single transport call.
const DEFAULT_SEND_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// One of the predetermined times of day at which dispatch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSlot {
    Morning,
    Midday,
    Afternoon,
}

impl TimeSlot {
    /// Trigger-surface label for this slot.
    pub fn label(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Midday => "midday",
            TimeSlot::Afternoon => "afternoon",
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "morning" => Ok(TimeSlot::Morning),
            "midday" => Ok(TimeSlot::Midday),
            "afternoon" => Ok(TimeSlot::Afternoon),
            other => Err(format!("unknown time slot: {other}")),
        }
    }
}

/// Options for one dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// The slot this invocation serves.
    pub slot: TimeSlot,
    /// Optional trace/source tag echoed into logs.
    pub source: Option<String>,
    /// Narrow the candidate list to one recipient address.
    pub recipient: Option<String>,
}

impl DispatchOptions {
    /// Options for a plain slot run.
    pub fn for_slot(slot: TimeSlot) -> Self {
        Self {
            slot,
            source: None,
            recipient: None,
        }
    }
}

/// Fixed-slot dispatcher over the shared store seams, a template renderer,
/// and a mail transport.
pub struct DispatchService<S, R, T> {
    store: Arc<S>,
    renderer: R,
    transport: T,
    send_timeout: StdDuration,
}

impl<S, R, T> DispatchService<S, R, T>
where
    S: SchedulerStore + ActivityStore + BounceGuard + TemplateStore + ConfigStore,
    R: TemplateRenderer,
    T: MailTransport,
{
    /// Creates a dispatcher.
    pub fn new(store: Arc<S>, renderer: R, transport: T) -> Self {
        Self {
            store,
            renderer,
            transport,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Overrides the per-send transport timeout.
    pub fn with_send_timeout(mut self, timeout: StdDuration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Runs one dispatch pass for the slot at `now`.
    pub async fn run_slot(
        &self,
        options: &DispatchOptions,
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

        info!(
            slot = %options.slot,
            source = options.source.as_deref().unwrap_or("-"),
            candidates = emails.len(),
            "dispatch pass started"
        );

        let mut summary = BatchSummary {
            success: true,
            emails_analyzed: 0,
            emails_eligible: 0,
            followups_scheduled: 0,
            followups_sent: 0,
            followups_failed: 0,
            errors: Vec::new(),
        };

        if emails.is_empty() {
            return Ok(summary);
        }

        let credential = self
            .transport
            .acquire_credential()
            .await
            .map_err(|e| SchedulerError::Unavailable(format!("transport credential: {e}")))?;

        for email in &emails {
            summary.emails_analyzed += 1;
            match self
                .process_email(email, &config, &templates, &credential, now)
                .await
            {
                Ok(DispatchOutcome::Sent) => {
                    summary.emails_eligible += 1;
                    summary.followups_sent += 1;
                }
                Ok(DispatchOutcome::Failed(reason)) => {
                    summary.emails_eligible += 1;
                    summary.followups_failed += 1;
                    summary.errors.push(format!("{}: {reason}", email.id));
                }
                Ok(DispatchOutcome::Skipped) => {}
                Err(e) => {
                    warn!(email = %email.id, error = %e, "email processing failed");
                    summary.errors.push(format!("{}: {e}", email.id));
                }
            }
        }

        info!(
            slot = %options.slot,
            analyzed = summary.emails_analyzed,
            sent = summary.followups_sent,
            failed = summary.followups_failed,
            "dispatch pass finished"
        );

        Ok(summary)
    }

    async fn process_email(
        &self,
        email: &TrackedEmail,
        config: &BatchConfig,
        templates: &[FollowupTemplate],
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        let bounce = self.store.bounce_status(&email.id).await?;
        if bounce.excludes_followup() {
            debug!(email = %email.id, bounce = ?bounce.bounce_type, "excluded by bounce");
            return Ok(DispatchOutcome::Skipped);
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
                return Ok(DispatchOutcome::Skipped);
            }
        };

        let rendered = self.renderer.render(template, email, sequence).await?;
        let message = OutboundMessage {
            from: email.sender.clone(),
            to: email.recipients.clone(),
            subject: rendered.subject.clone(),
            body: rendered.body.clone(),
            conversation_id: email.conversation_id.clone(),
        };

        let send = tokio::time::timeout(
            self.send_timeout,
            self.transport.send_message(credential, &message),
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

        let attempt = match &failure {
            None => FollowupAttempt::sent(
                AttemptId::from(Uuid::new_v4().to_string()),
                email.id.clone(),
                template.id.clone(),
                sequence,
                rendered.subject,
                rendered.body,
                now,
            ),
            Some(reason) => FollowupAttempt::failed(
                AttemptId::from(Uuid::new_v4().to_string()),
                email.id.clone(),
                template.id.clone(),
                sequence,
                rendered.subject,
                rendered.body,
                now,
                reason.clone(),
            ),
        };

        if let InsertOutcome::DuplicateSequence = self.store.insert_attempt(&attempt).await? {
            // A concurrent pass already owns this sequence slot.
            debug!(email = %email.id, sequence, "attempt already present, skipping");
            return Ok(DispatchOutcome::Skipped);
        }

        match failure {
            None => {
                info!(email = %email.id, sequence, slot_delivery = true, "follow-up delivered");
                if sequence == config.policy.max_followups {
                    info!(email = %email.id, "final follow-up sent, handing off to manual handling");
                    self.store
                        .update_email_status(&email.id, EmailStatus::RequiresManualHandling)
                        .await?;
                }
                Ok(DispatchOutcome::Sent)
            }
            Some(reason) => {
                warn!(email = %email.id, sequence, %reason, "delivery failed");
                Ok(DispatchOutcome::Failed(reason))
            }
        }
    }
}

enum DispatchOutcome {
    Sent,
    Failed(String),
    Skipped,
}
