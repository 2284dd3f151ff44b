//! Tracked email database operations.

use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Address, BounceType, EmailId, EmailStatus, TrackedEmail};
use crate::storage::database::{Database, DatabaseError, Result};

use super::{decode_ts, encode_ts};

/// Inserts a new tracked email.
pub async fn insert(db: &Database, email: &TrackedEmail) -> Result<()> {
    let email = email.clone();

    db.with_conn(move |conn| {
        let now = encode_ts(chrono::Utc::now());
        let recipients_json = serde_json::to_string(&email.recipients).unwrap_or_default();

        conn.execute(
            r#"
            INSERT INTO tracked_emails (
                id, sender_address, sender_name, recipients, subject,
                sent_at, status, bounce_type, conversation_id,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                email.id.0,
                email.sender.email,
                email.sender.name,
                recipients_json,
                email.subject,
                encode_ts(email.sent_at),
                email.status.as_str(),
                email.bounce_type.map(|b| b.as_str()),
                email.conversation_id,
                now,
                now,
            ],
        )?;

        Ok(())
    })
    .await
}

/// Retrieves a tracked email by its ID.
pub async fn get_by_id(db: &Database, email_id: &EmailId) -> Result<Option<TrackedEmail>> {
    let email_id = email_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, sender_address, sender_name, recipients, subject,
                   sent_at, status, bounce_type, conversation_id
            FROM tracked_emails
            WHERE id = ?1
            "#,
        )?;

        let result = stmt.query_row([&email_id.0], row_to_email).optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all pending tracked emails, oldest first, optionally narrowed
/// to one recipient address.
pub async fn list_pending(db: &Database, recipient: Option<String>) -> Result<Vec<TrackedEmail>> {
    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, sender_address, sender_name, recipients, subject,
                   sent_at, status, bounce_type, conversation_id
            FROM tracked_emails
            WHERE status = 'pending'
            ORDER BY sent_at ASC
            "#,
        )?;

        let rows = stmt.query_map([], row_to_email)?;
        let mut emails = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        if let Some(recipient) = recipient {
            emails.retain(|e| e.recipients.iter().any(|a| a.email == recipient));
        }

        Ok(emails)
    })
    .await
}

/// Applies a status transition.
///
/// The `status = 'pending'` guard keeps transitions forward-only at the
/// storage layer: terminal statuses never move again.
pub async fn set_status(db: &Database, email_id: &EmailId, status: EmailStatus) -> Result<()> {
    let email_id = email_id.clone();

    db.with_conn(move |conn| {
        let now = encode_ts(chrono::Utc::now());
        conn.execute(
            r#"
            UPDATE tracked_emails
            SET status = ?1, updated_at = ?2
            WHERE id = ?3 AND status = 'pending'
            "#,
            params![status.as_str(), now, email_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Records a bounce for the original email.
pub async fn set_bounce(db: &Database, email_id: &EmailId, bounce: BounceType) -> Result<()> {
    let email_id = email_id.clone();

    db.with_conn(move |conn| {
        let now = encode_ts(chrono::Utc::now());
        conn.execute(
            "UPDATE tracked_emails SET bounce_type = ?1, updated_at = ?2 WHERE id = ?3",
            params![bounce.as_str(), now, email_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Reads the recorded bounce type for an email.
pub async fn get_bounce(db: &Database, email_id: &EmailId) -> Result<Option<BounceType>> {
    let email_id = email_id.clone();

    db.with_conn(move |conn| {
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT bounce_type FROM tracked_emails WHERE id = ?1",
                [&email_id.0],
                |row| row.get(0),
            )
            .optional()?;

        Ok(raw.flatten().and_then(|s| BounceType::parse(&s)))
    })
    .await
}

fn row_to_email(row: &Row<'_>) -> rusqlite::Result<TrackedEmail> {
    let id: String = row.get(0)?;
    let sender_address: String = row.get(1)?;
    let sender_name: Option<String> = row.get(2)?;
    let recipients_json: String = row.get(3)?;
    let subject: String = row.get(4)?;
    let sent_at_raw: String = row.get(5)?;
    let status_raw: String = row.get(6)?;
    let bounce_raw: Option<String> = row.get(7)?;
    let conversation_id: Option<String> = row.get(8)?;

    let recipients: Vec<Address> = serde_json::from_str(&recipients_json).unwrap_or_default();
    let sent_at = decode_ts(&sent_at_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let status = EmailStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(DatabaseError::CorruptRow(format!(
            "email status {status_raw:?}"
        ))))
    })?;

    Ok(TrackedEmail {
        id: EmailId(id),
        sender: Address {
            email: sender_address,
            name: sender_name,
        },
        recipients,
        subject,
        sent_at,
        status,
        bounce_type: bounce_raw.and_then(|s| BounceType::parse(&s)),
        conversation_id,
    })
}
