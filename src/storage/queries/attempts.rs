//! Follow-up attempt database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, Row};

use crate::domain::{AttemptId, AttemptStatus, EmailId, FollowupAttempt, TemplateId};
use crate::services::InsertOutcome;
use crate::storage::database::{Database, DatabaseError, Result};

use super::{decode_ts, encode_ts};

/// Persists a follow-up attempt.
///
/// The partial unique index on (email, sequence, non-cancelled) is the
/// authoritative idempotence guard; a constraint violation reports
/// [`InsertOutcome::DuplicateSequence`] rather than an error.
pub async fn insert(db: &Database, attempt: &FollowupAttempt) -> Result<InsertOutcome> {
    let attempt = attempt.clone();

    db.with_conn(move |conn| {
        let now = encode_ts(Utc::now());
        let result = conn.execute(
            r#"
            INSERT INTO followup_attempts (
                id, email_id, template_id, sequence, subject, body,
                scheduled_for, sent_at, status, adjusted_for_working_hours,
                failure_reason, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                attempt.id.0,
                attempt.email_id.0,
                attempt.template_id.0,
                attempt.sequence,
                attempt.subject,
                attempt.body,
                encode_ts(attempt.scheduled_for),
                attempt.sent_at.map(encode_ts),
                attempt.status.as_str(),
                attempt.adjusted_for_working_hours as i32,
                attempt.failure_reason,
                now,
                now,
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Ok(InsertOutcome::DuplicateSequence)
            }
            Err(e) => Err(e.into()),
        }
    })
    .await
}

/// All delivered attempts for an email.
pub async fn list_sent(db: &Database, email_id: &EmailId) -> Result<Vec<FollowupAttempt>> {
    let email_id = email_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, email_id, template_id, sequence, subject, body,
                   scheduled_for, sent_at, status, adjusted_for_working_hours,
                   failure_reason
            FROM followup_attempts
            WHERE email_id = ?1 AND status = 'sent'
            ORDER BY sequence ASC
            "#,
        )?;

        let rows = stmt.query_map([&email_id.0], row_to_attempt)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Whether a non-cancelled attempt occupies (email, sequence).
pub async fn has_active_at_sequence(
    db: &Database,
    email_id: &EmailId,
    sequence: u32,
) -> Result<bool> {
    let email_id = email_id.clone();

    db.with_conn(move |conn| {
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM followup_attempts
            WHERE email_id = ?1 AND sequence = ?2 AND status != 'cancelled'
            "#,
            params![email_id.0, sequence],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    })
    .await
}

/// Exact total follow-up count for an email: delivered automatic attempts
/// plus manual follow-ups, in one aggregate statement. This number gates
/// the maximum-followups check and must not drift from the source tables.
pub async fn total_followup_count(db: &Database, email_id: &EmailId) -> Result<u32> {
    let email_id = email_id.clone();

    db.with_conn(move |conn| {
        let count: i64 = conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM followup_attempts
                 WHERE email_id = ?1 AND status = 'sent')
                +
                (SELECT COUNT(*) FROM manual_followups
                 WHERE email_id = ?1)
            "#,
            params![email_id.0],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    })
    .await
}

/// Scheduled attempts whose target time is at or before `now`.
pub async fn list_due(db: &Database, now: DateTime<Utc>) -> Result<Vec<FollowupAttempt>> {
    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, email_id, template_id, sequence, subject, body,
                   scheduled_for, sent_at, status, adjusted_for_working_hours,
                   failure_reason
            FROM followup_attempts
            WHERE status = 'scheduled' AND scheduled_for <= ?1
            ORDER BY scheduled_for ASC
            "#,
        )?;

        let rows = stmt.query_map([encode_ts(now)], row_to_attempt)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Marks a scheduled attempt as delivered.
pub async fn mark_sent(db: &Database, id: &AttemptId, sent_at: DateTime<Utc>) -> Result<()> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let now = encode_ts(Utc::now());
        conn.execute(
            r#"
            UPDATE followup_attempts
            SET status = 'sent', sent_at = ?1, updated_at = ?2
            WHERE id = ?3 AND status = 'scheduled'
            "#,
            params![encode_ts(sent_at), now, id.0],
        )?;
        Ok(())
    })
    .await
}

/// Marks an attempt as failed, preserving the reason text.
pub async fn mark_failed(db: &Database, id: &AttemptId, reason: String) -> Result<()> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let now = encode_ts(Utc::now());
        conn.execute(
            r#"
            UPDATE followup_attempts
            SET status = 'failed', failure_reason = ?1, updated_at = ?2
            WHERE id = ?3
            "#,
            params![reason, now, id.0],
        )?;
        Ok(())
    })
    .await
}

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<FollowupAttempt> {
    let id: String = row.get(0)?;
    let email_id: String = row.get(1)?;
    let template_id: String = row.get(2)?;
    let sequence: u32 = row.get(3)?;
    let subject: String = row.get(4)?;
    let body: String = row.get(5)?;
    let scheduled_for_raw: String = row.get(6)?;
    let sent_at_raw: Option<String> = row.get(7)?;
    let status_raw: String = row.get(8)?;
    let adjusted: i32 = row.get(9)?;
    let failure_reason: Option<String> = row.get(10)?;

    let scheduled_for = decode_ts(&scheduled_for_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let sent_at = sent_at_raw
        .map(|raw| decode_ts(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let status = AttemptStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(DatabaseError::CorruptRow(format!(
            "attempt status {status_raw:?}"
        ))))
    })?;

    Ok(FollowupAttempt {
        id: AttemptId(id),
        email_id: EmailId(email_id),
        template_id: TemplateId(template_id),
        sequence,
        subject,
        body,
        scheduled_for,
        sent_at,
        status,
        adjusted_for_working_hours: adjusted != 0,
        failure_reason,
    })
}
