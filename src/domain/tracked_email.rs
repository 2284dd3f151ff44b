//! Tracked email domain types.
//!
//! A [`TrackedEmail`] is an outbound email being monitored for a reply. Reply
//! detection itself happens upstream; this crate consumes the records and
//! mutates their status as follow-ups are scheduled, capped out, or expired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Address, EmailId};

/// Errors raised by invalid status transitions.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("cannot transition from terminal status {from:?} to {to:?}")]
    Terminal { from: EmailStatus, to: EmailStatus },
}

/// Lifecycle status of a tracked email.
///
/// Transitions only move forward: once an email leaves `Pending` it never
/// returns, and a bounced email cannot un-bounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    /// Awaiting a reply; follow-ups may still be scheduled.
    Pending,
    /// A reply was detected.
    Responded,
    /// Administratively stopped.
    Stopped,
    /// The maximum follow-up count was reached.
    MaxReached,
    /// The original email bounced.
    Bounced,
    /// The total follow-up timeframe elapsed without a reply.
    Expired,
    /// The final follow-up went out; a human takes it from here.
    RequiresManualHandling,
}

impl EmailStatus {
    /// Returns true if follow-ups may still be scheduled for this status.
    pub fn is_actionable(&self) -> bool {
        matches!(self, EmailStatus::Pending)
    }

    /// Storage representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Pending => "pending",
            EmailStatus::Responded => "responded",
            EmailStatus::Stopped => "stopped",
            EmailStatus::MaxReached => "max_reached",
            EmailStatus::Bounced => "bounced",
            EmailStatus::Expired => "expired",
            EmailStatus::RequiresManualHandling => "requires_manual_handling",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EmailStatus::Pending),
            "responded" => Some(EmailStatus::Responded),
            "stopped" => Some(EmailStatus::Stopped),
            "max_reached" => Some(EmailStatus::MaxReached),
            "bounced" => Some(EmailStatus::Bounced),
            "expired" => Some(EmailStatus::Expired),
            "requires_manual_handling" => Some(EmailStatus::RequiresManualHandling),
            _ => None,
        }
    }
}

/// Classification of a delivery failure for the original email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BounceType {
    /// Permanent failure (bad address, rejected domain). Never retried.
    Hard,
    /// Transient failure (full mailbox, greylisting). May recover.
    Soft,
}

impl BounceType {
    /// Whether delivery may be retried after this bounce.
    pub fn can_retry(&self) -> bool {
        matches!(self, BounceType::Soft)
    }

    /// Storage representation of the bounce type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BounceType::Hard => "hard",
            BounceType::Soft => "soft",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hard" => Some(BounceType::Hard),
            "soft" => Some(BounceType::Soft),
            _ => None,
        }
    }
}

/// Bounce lookup result for a tracked email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BounceStatus {
    /// Whether any bounce was recorded for the original email.
    pub has_bounced: bool,
    /// Classification of the bounce, if one was recorded.
    pub bounce_type: Option<BounceType>,
    /// Whether the email remains a follow-up candidate despite the bounce.
    pub can_retry: bool,
}

impl BounceStatus {
    /// A clean record: no bounce on file.
    pub fn clean() -> Self {
        Self {
            has_bounced: false,
            bounce_type: None,
            can_retry: true,
        }
    }

    /// Builds the status from an optional recorded bounce type.
    pub fn from_bounce(bounce_type: Option<BounceType>) -> Self {
        match bounce_type {
            Some(bt) => Self {
                has_bounced: true,
                bounce_type: Some(bt),
                can_retry: bt.can_retry(),
            },
            None => Self::clean(),
        }
    }

    /// True when the bounce permanently excludes the email from follow-up.
    pub fn excludes_followup(&self) -> bool {
        self.has_bounced && !self.can_retry
    }
}

/// An outbound email being monitored for a reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEmail {
    /// Unique identifier for this email.
    pub id: EmailId,
    /// Sender address.
    pub sender: Address,
    /// Recipient addresses.
    pub recipients: Vec<Address>,
    /// Subject line of the original email.
    pub subject: String,
    /// When the original email went out.
    pub sent_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: EmailStatus,
    /// Recorded bounce classification, if the original bounced.
    pub bounce_type: Option<BounceType>,
    /// Provider conversation/thread identifier, used so follow-ups
    /// appear as replies in the original thread.
    pub conversation_id: Option<String>,
}

impl TrackedEmail {
    /// Applies a forward-only status transition.
    ///
    /// Only `Pending` emails can move; every other status is terminal.
    pub fn transition(&mut self, to: EmailStatus) -> Result<(), TransitionError> {
        if !self.status.is_actionable() {
            return Err(TransitionError::Terminal {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Elapsed hours since the original email went out.
    pub fn hours_since_sent(&self, now: DateTime<Utc>) -> f64 {
        (now - self.sent_at).num_seconds() as f64 / 3600.0
    }
}
