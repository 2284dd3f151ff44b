//! Follow-up template database operations.

use rusqlite::{params, Row};

use crate::domain::{FollowupTemplate, TemplateId};
use crate::storage::database::{Database, Result};

use super::encode_ts;

/// Inserts a template.
pub async fn insert(db: &Database, template: &FollowupTemplate) -> Result<()> {
    let template = template.clone();

    db.with_conn(move |conn| {
        let now = encode_ts(chrono::Utc::now());
        conn.execute(
            r#"
            INSERT INTO followup_templates (
                id, sequence, subject, body, delay_hours, active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                template.id.0,
                template.sequence,
                template.subject,
                template.body,
                template.delay_hours,
                template.active as i32,
                now,
                now,
            ],
        )?;
        Ok(())
    })
    .await
}

/// All active templates, sorted by (sequence, id).
///
/// The sort keeps template selection deterministic when more than one
/// active template shares a level.
pub async fn list_active(db: &Database) -> Result<Vec<FollowupTemplate>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, sequence, subject, body, delay_hours, active
            FROM followup_templates
            WHERE active = 1
            ORDER BY sequence ASC, id ASC
            "#,
        )?;

        let rows = stmt.query_map([], row_to_template)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

fn row_to_template(row: &Row<'_>) -> rusqlite::Result<FollowupTemplate> {
    let id: String = row.get(0)?;
    let sequence: u32 = row.get(1)?;
    let subject: String = row.get(2)?;
    let body: String = row.get(3)?;
    let delay_hours: Option<i64> = row.get(4)?;
    let active: i32 = row.get(5)?;

    Ok(FollowupTemplate {
        id: TemplateId(id),
        sequence,
        subject,
        body,
        delay_hours,
        active: active != 0,
    })
}
