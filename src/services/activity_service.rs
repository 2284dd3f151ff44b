//! Activity ledger over a tracked email's follow-up history.
//!
//! Aggregates automatic follow-ups and externally detected manual follow-ups
//! into a single read-only summary per candidate email: total count, most
//! recent activity of either kind, and how many follow-ups already went out
//! today. This service never mutates data.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::domain::{EmailId, FollowupAttempt, ManualFollowup, TrackedEmail};

/// Storage seam for activity aggregation.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// All automatic follow-ups delivered for the email, with sent
    /// timestamps. Order is not significant.
    async fn sent_attempts(&self, email_id: &EmailId) -> Result<Vec<FollowupAttempt>>;

    /// All manual follow-ups detected for the email.
    async fn manual_followups(&self, email_id: &EmailId) -> Result<Vec<ManualFollowup>>;

    /// Exact total follow-up count (automatic sent + manual), computed as a
    /// single aggregate on the storage side. This number gates the
    /// maximum-followups check and must not be approximated.
    async fn total_followup_count(&self, email_id: &EmailId) -> Result<u32>;
}

/// What kind of event the most recent activity was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// No follow-up of either kind exists; the original send counts.
    Original,
    /// The latest activity was an automatic follow-up.
    Automatic,
    /// The latest activity was a manual follow-up.
    Manual,
}

/// The most recent delivered automatic follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastAutomatic {
    /// Sequence level of the attempt.
    pub sequence: u32,
    /// When it was delivered.
    pub sent_at: DateTime<Utc>,
}

/// Read-only aggregation of an email's follow-up history.
#[derive(Debug, Clone)]
pub struct ActivitySummary {
    /// Exact count of all follow-ups (automatic sent + manual).
    pub total_followups: u32,
    /// Highest-sequence automatic follow-up with a sent timestamp.
    pub last_automatic: Option<LastAutomatic>,
    /// Most recently detected manual follow-up.
    pub last_manual: Option<DateTime<Utc>>,
    /// Timestamp of the most recent activity of either kind, falling back
    /// to the email's own send time.
    pub last_activity: DateTime<Utc>,
    /// Which kind of event `last_activity` refers to.
    pub last_activity_kind: ActivityKind,
    /// Automatic follow-ups delivered since the start of the current
    /// calendar day in the working-hours timezone.
    pub followups_sent_today: u32,
}

impl ActivitySummary {
    /// The sequence number the next automatic follow-up would take.
    pub fn next_sequence(&self) -> u32 {
        self.last_automatic.map(|a| a.sequence + 1).unwrap_or(1)
    }
}

/// Builds the activity summary for one tracked email.
///
/// `tz` is the working-hours timezone; "today" for the per-day cap is the
/// calendar day in that zone, not the process-local day.
pub async fn summarize<S>(
    store: &S,
    email: &TrackedEmail,
    tz: &Tz,
    now: DateTime<Utc>,
) -> Result<ActivitySummary>
where
    S: ActivityStore + ?Sized,
{
    let total_followups = store.total_followup_count(&email.id).await?;
    let attempts = store.sent_attempts(&email.id).await?;
    let manuals = store.manual_followups(&email.id).await?;

    let last_automatic = attempts
        .iter()
        .filter_map(|a| a.sent_at.map(|sent_at| (a.sequence, sent_at)))
        .max_by_key(|(sequence, _)| *sequence)
        .map(|(sequence, sent_at)| LastAutomatic { sequence, sent_at });

    let last_manual = manuals.iter().map(|m| m.detected_at).max();

    // Automatic wins only when strictly later; an exact tie counts as manual.
    let (last_activity, last_activity_kind) = match (last_automatic, last_manual) {
        (Some(auto), Some(manual)) => {
            if auto.sent_at > manual {
                (auto.sent_at, ActivityKind::Automatic)
            } else {
                (manual, ActivityKind::Manual)
            }
        }
        (Some(auto), None) => (auto.sent_at, ActivityKind::Automatic),
        (None, Some(manual)) => (manual, ActivityKind::Manual),
        (None, None) => (email.sent_at, ActivityKind::Original),
    };

    let today_start = day_start(tz, now);
    let followups_sent_today = attempts
        .iter()
        .filter_map(|a| a.sent_at)
        .filter(|sent_at| *sent_at >= today_start)
        .count() as u32;

    Ok(ActivitySummary {
        total_followups,
        last_automatic,
        last_manual,
        last_activity,
        last_activity_kind,
        followups_sent_today,
    })
}

/// Start of the calendar day containing `now` in `tz`, as a UTC instant.
///
/// Midnight can fall into a DST gap; step forward an hour at a time until
/// the wall time resolves.
fn day_start(tz: &Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.with_timezone(tz).date_naive();
    let mut naive = date.and_time(NaiveTime::MIN);
    for _ in 0..3 {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => naive += Duration::hours(1),
        }
    }
    now - Duration::hours(24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, AttemptId, EmailStatus, TemplateId};
    use pretty_assertions::assert_eq;
    use std::sync::RwLock;

    struct MockStore {
        attempts: RwLock<Vec<FollowupAttempt>>,
        manuals: RwLock<Vec<ManualFollowup>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                attempts: RwLock::new(Vec::new()),
                manuals: RwLock::new(Vec::new()),
            }
        }

        fn push_sent(&self, sequence: u32, sent_at: DateTime<Utc>) {
            let attempt = FollowupAttempt::sent(
                AttemptId::from(format!("attempt-{sequence}")),
                EmailId::from("email-1"),
                TemplateId::from("tpl-1"),
                sequence,
                "s",
                "b",
                sent_at,
            );
            self.attempts.write().unwrap().push(attempt);
        }

        fn push_manual(&self, sequence: u32, detected_at: DateTime<Utc>) {
            self.manuals.write().unwrap().push(ManualFollowup {
                id: format!("manual-{sequence}"),
                email_id: EmailId::from("email-1"),
                sequence,
                detected_at,
            });
        }
    }

    #[async_trait]
    impl ActivityStore for MockStore {
        async fn sent_attempts(&self, _email_id: &EmailId) -> Result<Vec<FollowupAttempt>> {
            Ok(self.attempts.read().unwrap().clone())
        }

        async fn manual_followups(&self, _email_id: &EmailId) -> Result<Vec<ManualFollowup>> {
            Ok(self.manuals.read().unwrap().clone())
        }

        async fn total_followup_count(&self, _email_id: &EmailId) -> Result<u32> {
            Ok((self.attempts.read().unwrap().len() + self.manuals.read().unwrap().len()) as u32)
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn sample_email(sent_at: DateTime<Utc>) -> TrackedEmail {
        TrackedEmail {
            id: EmailId::from("email-1"),
            sender: Address::new("sales@example.com"),
            recipients: vec![Address::new("lead@example.org")],
            subject: "Proposal".to_string(),
            sent_at,
            status: EmailStatus::Pending,
            bounce_type: None,
            conversation_id: None,
        }
    }

    fn utc_tz() -> Tz {
        "UTC".parse().unwrap()
    }

    #[tokio::test]
    async fn no_history_falls_back_to_original_send() {
        let store = MockStore::new();
        let email = sample_email(utc(2026, 8, 3, 8, 0));

        let summary = summarize(&store, &email, &utc_tz(), utc(2026, 8, 5, 9, 0))
            .await
            .unwrap();

        assert_eq!(summary.total_followups, 0);
        assert_eq!(summary.last_activity, email.sent_at);
        assert_eq!(summary.last_activity_kind, ActivityKind::Original);
        assert_eq!(summary.next_sequence(), 1);
        assert_eq!(summary.followups_sent_today, 0);
    }

    #[tokio::test]
    async fn last_automatic_is_highest_sequence() {
        let store = MockStore::new();
        store.push_sent(1, utc(2026, 8, 3, 9, 0));
        store.push_sent(2, utc(2026, 8, 4, 9, 0));
        let email = sample_email(utc(2026, 8, 1, 8, 0));

        let summary = summarize(&store, &email, &utc_tz(), utc(2026, 8, 5, 9, 0))
            .await
            .unwrap();

        let last = summary.last_automatic.unwrap();
        assert_eq!(last.sequence, 2);
        assert_eq!(last.sent_at, utc(2026, 8, 4, 9, 0));
        assert_eq!(summary.next_sequence(), 3);
        assert_eq!(summary.last_activity_kind, ActivityKind::Automatic);
    }

    #[tokio::test]
    async fn manual_counts_toward_total() {
        let store = MockStore::new();
        store.push_sent(1, utc(2026, 8, 3, 9, 0));
        store.push_sent(2, utc(2026, 8, 4, 9, 0));
        store.push_manual(3, utc(2026, 8, 4, 15, 0));
        let email = sample_email(utc(2026, 8, 1, 8, 0));

        let summary = summarize(&store, &email, &utc_tz(), utc(2026, 8, 5, 9, 0))
            .await
            .unwrap();

        assert_eq!(summary.total_followups, 3);
        assert_eq!(summary.last_activity, utc(2026, 8, 4, 15, 0));
        assert_eq!(summary.last_activity_kind, ActivityKind::Manual);
    }

    #[tokio::test]
    async fn exact_tie_resolves_to_manual() {
        let store = MockStore::new();
        let tie = utc(2026, 8, 4, 9, 0);
        store.push_sent(1, tie);
        store.push_manual(1, tie);
        let email = sample_email(utc(2026, 8, 1, 8, 0));

        let summary = summarize(&store, &email, &utc_tz(), utc(2026, 8, 5, 9, 0))
            .await
            .unwrap();

        assert_eq!(summary.last_activity, tie);
        assert_eq!(summary.last_activity_kind, ActivityKind::Manual);
    }

    #[tokio::test]
    async fn strictly_later_automatic_wins() {
        let store = MockStore::new();
        store.push_manual(1, utc(2026, 8, 4, 9, 0));
        store.push_sent(1, utc(2026, 8, 4, 9, 1));
        let email = sample_email(utc(2026, 8, 1, 8, 0));

        let summary = summarize(&store, &email, &utc_tz(), utc(2026, 8, 5, 9, 0))
            .await
            .unwrap();

        assert_eq!(summary.last_activity_kind, ActivityKind::Automatic);
    }

    #[tokio::test]
    async fn sent_today_counts_against_the_calendar_timezone() {
        let store = MockStore::new();
        // 2026-08-05 02:00 UTC is 22:00 on Aug 4 in New York: yesterday
        // there, today in UTC.
        store.push_sent(1, utc(2026, 8, 5, 2, 0));
        let email = sample_email(utc(2026, 8, 1, 8, 0));
        let now = utc(2026, 8, 5, 12, 0);

        let utc_summary = summarize(&store, &email, &utc_tz(), now).await.unwrap();
        assert_eq!(utc_summary.followups_sent_today, 1);

        let ny: Tz = "America/New_York".parse().unwrap();
        let ny_summary = summarize(&store, &email, &ny, now).await.unwrap();
        assert_eq!(ny_summary.followups_sent_today, 0);
    }

    #[tokio::test]
    async fn total_never_decreases_as_attempts_accumulate() {
        let store = MockStore::new();
        let email = sample_email(utc(2026, 8, 1, 8, 0));
        let now = utc(2026, 8, 5, 9, 0);
        let mut previous = 0;

        for sequence in 1..=4 {
            store.push_sent(sequence, utc(2026, 8, 1 + sequence, 9, 0));
            let summary = summarize(&store, &email, &utc_tz(), now).await.unwrap();
            assert!(summary.total_followups > previous);
            previous = summary.total_followups;
        }
    }
}
