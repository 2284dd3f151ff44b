//! Manual follow-up database operations.
//!
//! Manual follow-ups are detected upstream and recorded here; the engine
//! only ever reads them back when building activity summaries.

use rusqlite::{params, Row};

use crate::domain::{EmailId, ManualFollowup};
use crate::storage::database::{Database, Result};

use super::{decode_ts, encode_ts};

/// Records a detected manual follow-up.
pub async fn insert(db: &Database, followup: &ManualFollowup) -> Result<()> {
    let followup = followup.clone();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO manual_followups (id, email_id, sequence, detected_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                followup.id,
                followup.email_id.0,
                followup.sequence,
                encode_ts(followup.detected_at),
                encode_ts(chrono::Utc::now()),
            ],
        )?;
        Ok(())
    })
    .await
}

/// All manual follow-ups for an email.
pub async fn list_for_email(db: &Database, email_id: &EmailId) -> Result<Vec<ManualFollowup>> {
    let email_id = email_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, email_id, sequence, detected_at
            FROM manual_followups
            WHERE email_id = ?1
            ORDER BY detected_at ASC
            "#,
        )?;

        let rows = stmt.query_map([&email_id.0], row_to_manual)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

fn row_to_manual(row: &Row<'_>) -> rusqlite::Result<ManualFollowup> {
    let id: String = row.get(0)?;
    let email_id: String = row.get(1)?;
    let sequence: u32 = row.get(2)?;
    let detected_at_raw: String = row.get(3)?;

    let detected_at = decode_ts(&detected_at_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(ManualFollowup {
        id,
        email_id: EmailId(email_id),
        sequence,
        detected_at,
    })
}
