//! Eligibility evaluation for the next follow-up.
//!
//! Given one tracked email's activity summary, the process-wide policy, and
//! the current instant, decides whether the email may receive its next
//! automated follow-up right now and which template serves it. Pure
//! computation; callers supply every input including "now".

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::FollowupPolicy;
use crate::domain::{FollowupTemplate, TrackedEmail};

use super::activity_service::ActivitySummary;

/// Why an email was passed over this round. Skips are expected outcomes,
/// not errors; they surface in logs and batch diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Total follow-ups (automatic + manual) already at the policy ceiling.
    MaxFollowupsReached { total: u32, max: u32 },
    /// The next sequence number would exceed the policy ceiling.
    SequenceExceedsMax { next: u32, max: u32 },
    /// The per-day cap was already reached today.
    DailyCapReached { sent_today: u32, max: u32 },
    /// A non-cancelled attempt already occupies the next sequence slot.
    AlreadyScheduled { sequence: u32 },
    /// The minimum delay since the last activity has not elapsed.
    DelayNotElapsed {
        required_hours: i64,
        elapsed_hours: f64,
    },
    /// The total timeframe since the original send has run out.
    TimeframeExpired {
        elapsed_hours: f64,
        max_hours: i64,
    },
    /// No active template serves the next sequence level.
    NoTemplateForLevel { sequence: u32 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MaxFollowupsReached { total, max } => {
                write!(f, "max follow-ups reached ({total}/{max})")
            }
            SkipReason::SequenceExceedsMax { next, max } => {
                write!(f, "next sequence {next} exceeds max {max}")
            }
            SkipReason::DailyCapReached { sent_today, max } => {
                write!(f, "daily cap reached ({sent_today}/{max})")
            }
            SkipReason::AlreadyScheduled { sequence } => {
                write!(f, "sequence {sequence} already scheduled")
            }
            SkipReason::DelayNotElapsed {
                required_hours,
                elapsed_hours,
            } => write!(
                f,
                "delay not elapsed ({elapsed_hours:.1}h of {required_hours}h)"
            ),
            SkipReason::TimeframeExpired {
                elapsed_hours,
                max_hours,
            } => write!(
                f,
                "timeframe expired ({elapsed_hours:.1}h past a {max_hours}h limit)"
            ),
            SkipReason::NoTemplateForLevel { sequence } => {
                write!(f, "no active template for level {sequence}")
            }
        }
    }
}

/// Outcome of evaluating one email.
#[derive(Debug, Clone)]
pub enum Eligibility<'a> {
    /// The email may receive its next follow-up now.
    Eligible {
        /// The sequence number the follow-up takes.
        sequence: u32,
        /// The template serving that level.
        template: &'a FollowupTemplate,
    },
    /// The email was passed over this round.
    Skipped(SkipReason),
}

impl Eligibility<'_> {
    /// Convenience predicate for tests and diagnostics.
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }
}

/// Inputs to one eligibility decision.
#[derive(Debug)]
pub struct EligibilityInput<'a> {
    pub email: &'a TrackedEmail,
    pub summary: &'a ActivitySummary,
    pub policy: &'a FollowupPolicy,
    /// Active templates, sorted by (sequence, id).
    pub templates: &'a [FollowupTemplate],
    /// Whether a non-cancelled attempt already occupies the next sequence.
    pub next_sequence_taken: bool,
    pub now: DateTime<Utc>,
}

/// Decides whether the email is eligible for its next follow-up.
///
/// All conditions must hold: the total cap, the sequence cap, the per-day
/// cap, the idempotence guard, the per-level minimum delay since the last
/// activity, and the total timeframe since the original send. A missing
/// template for the level is a skip, not an error.
pub fn evaluate<'a>(input: &EligibilityInput<'a>) -> Eligibility<'a> {
    let EligibilityInput {
        email,
        summary,
        policy,
        templates,
        next_sequence_taken,
        now,
    } = input;

    if summary.total_followups >= policy.max_followups {
        return Eligibility::Skipped(SkipReason::MaxFollowupsReached {
            total: summary.total_followups,
            max: policy.max_followups,
        });
    }

    let next_sequence = summary.next_sequence();
    if next_sequence > policy.max_followups {
        return Eligibility::Skipped(SkipReason::SequenceExceedsMax {
            next: next_sequence,
            max: policy.max_followups,
        });
    }

    if summary.followups_sent_today >= policy.max_per_day {
        return Eligibility::Skipped(SkipReason::DailyCapReached {
            sent_today: summary.followups_sent_today,
            max: policy.max_per_day,
        });
    }

    if *next_sequence_taken {
        return Eligibility::Skipped(SkipReason::AlreadyScheduled {
            sequence: next_sequence,
        });
    }

    let template = match find_template(templates, next_sequence) {
        Some(template) => template,
        None => {
            return Eligibility::Skipped(SkipReason::NoTemplateForLevel {
                sequence: next_sequence,
            })
        }
    };

    let required_hours = policy.effective_delay_hours(next_sequence, template.delay_hours);
    let elapsed_hours = (*now - summary.last_activity).num_seconds() as f64 / 3600.0;
    if elapsed_hours < required_hours as f64 {
        return Eligibility::Skipped(SkipReason::DelayNotElapsed {
            required_hours,
            elapsed_hours,
        });
    }

    let since_original = email.hours_since_sent(*now);
    if since_original > policy.total_timeframe_hours as f64 {
        return Eligibility::Skipped(SkipReason::TimeframeExpired {
            elapsed_hours: since_original,
            max_hours: policy.total_timeframe_hours,
        });
    }

    Eligibility::Eligible {
        sequence: next_sequence,
        template,
    }
}

/// First active template at the level, in ascending id order.
///
/// Per-level uniqueness is not enforced anywhere; duplicate active
/// templates at one level are tolerated deterministically and logged.
pub fn find_template(templates: &[FollowupTemplate], level: u32) -> Option<&FollowupTemplate> {
    let mut matches: Vec<&FollowupTemplate> = templates
        .iter()
        .filter(|t| t.active && t.sequence == level)
        .collect();
    matches.sort_by(|a, b| a.id.0.cmp(&b.id.0));

    if matches.len() > 1 {
        warn!(
            level,
            count = matches.len(),
            chosen = %matches[0].id,
            "multiple active templates share a sequence level"
        );
    }

    matches.into_iter().next()
}
