//! Follow-up attempt domain types.
//!
//! A [`FollowupAttempt`] is one scheduled-or-sent automated follow-up for a
//! tracked email. A [`ManualFollowup`] is a human-sent follow-up detected by
//! an external collaborator; it is read-only input here but counts toward the
//! same caps as automated ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AttemptId, EmailId, TemplateId};

/// Lifecycle status of a follow-up attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Persisted with a target time; a later pass delivers it.
    Scheduled,
    /// Delivered through the mail transport.
    Sent,
    /// Delivery was attempted and failed.
    Failed,
    /// Administratively cancelled. Does not occupy its sequence slot.
    Cancelled,
}

impl AttemptStatus {
    /// Whether this attempt occupies its (email, sequence) slot.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AttemptStatus::Cancelled)
    }

    /// Storage representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Scheduled => "scheduled",
            AttemptStatus::Sent => "sent",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Cancelled => "cancelled",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AttemptStatus::Scheduled),
            "sent" => Some(AttemptStatus::Sent),
            "failed" => Some(AttemptStatus::Failed),
            "cancelled" => Some(AttemptStatus::Cancelled),
            _ => None,
        }
    }
}

/// One scheduled-or-sent automated follow-up.
///
/// Sequence numbers are 1-based and dense: at most one non-cancelled attempt
/// exists per (email, sequence) pair, and sequences are requested in
/// increasing order with no skipping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupAttempt {
    /// Unique identifier for this attempt.
    pub id: AttemptId,
    /// The tracked email this attempt belongs to.
    pub email_id: EmailId,
    /// The template this attempt was rendered from.
    pub template_id: TemplateId,
    /// 1-based follow-up level.
    pub sequence: u32,
    /// Rendered subject line.
    pub subject: String,
    /// Rendered body.
    pub body: String,
    /// Target send time.
    pub scheduled_for: DateTime<Utc>,
    /// Actual send time, once delivered.
    pub sent_at: Option<DateTime<Utc>>,
    /// Current lifecycle status.
    pub status: AttemptStatus,
    /// Whether the target time was moved to fit the working-hours window.
    pub adjusted_for_working_hours: bool,
    /// Captured reason text, when delivery failed.
    pub failure_reason: Option<String>,
}

impl FollowupAttempt {
    /// Creates an attempt in `Scheduled` state for later delivery.
    #[allow(clippy::too_many_arguments)]
    pub fn scheduled(
        id: AttemptId,
        email_id: EmailId,
        template_id: TemplateId,
        sequence: u32,
        subject: impl Into<String>,
        body: impl Into<String>,
        scheduled_for: DateTime<Utc>,
        adjusted_for_working_hours: bool,
    ) -> Self {
        Self {
            id,
            email_id,
            template_id,
            sequence,
            subject: subject.into(),
            body: body.into(),
            scheduled_for,
            sent_at: None,
            status: AttemptStatus::Scheduled,
            adjusted_for_working_hours,
            failure_reason: None,
        }
    }

    /// Creates an attempt directly in `Sent` state (fixed-slot delivery).
    pub fn sent(
        id: AttemptId,
        email_id: EmailId,
        template_id: TemplateId,
        sequence: u32,
        subject: impl Into<String>,
        body: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email_id,
            template_id,
            sequence,
            subject: subject.into(),
            body: body.into(),
            scheduled_for: sent_at,
            sent_at: Some(sent_at),
            status: AttemptStatus::Sent,
            adjusted_for_working_hours: false,
            failure_reason: None,
        }
    }

    /// Creates an attempt directly in `Failed` state (fixed-slot delivery
    /// that did not go through).
    #[allow(clippy::too_many_arguments)]
    pub fn failed(
        id: AttemptId,
        email_id: EmailId,
        template_id: TemplateId,
        sequence: u32,
        subject: impl Into<String>,
        body: impl Into<String>,
        attempted_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id,
            email_id,
            template_id,
            sequence,
            subject: subject.into(),
            body: body.into(),
            scheduled_for: attempted_at,
            sent_at: None,
            status: AttemptStatus::Failed,
            adjusted_for_working_hours: false,
            failure_reason: Some(reason.into()),
        }
    }

    /// Marks a scheduled attempt as delivered.
    pub fn mark_sent(&mut self, sent_at: DateTime<Utc>) {
        self.status = AttemptStatus::Sent;
        self.sent_at = Some(sent_at);
    }

    /// Marks an attempt as failed, preserving the reason text.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = AttemptStatus::Failed;
        self.failure_reason = Some(reason.into());
    }

    /// Whether this attempt is due for delivery at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == AttemptStatus::Scheduled && self.scheduled_for <= now
    }
}

/// An externally detected, human-sent follow-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualFollowup {
    /// Unique identifier for this record.
    pub id: String,
    /// The tracked email the follow-up belongs to.
    pub email_id: EmailId,
    /// 1-based follow-up level the detection was attributed to.
    pub sequence: u32,
    /// When the manual follow-up was detected.
    pub detected_at: DateTime<Utc>,
}
