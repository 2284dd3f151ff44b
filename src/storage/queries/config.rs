//! Configuration key/value database operations.
//!
//! Policy and calendar configuration live as JSON blobs under well-known
//! keys. Deserialization and validation happen in the services layer; this
//! module only moves raw values.

use rusqlite::{params, OptionalExtension};

use crate::storage::database::{Database, DatabaseError, Result};

use super::encode_ts;

/// Key under which the follow-up policy is stored.
pub const KEY_FOLLOWUP_POLICY: &str = "followup_policy";

/// Key under which the working-hours calendar is stored.
pub const KEY_WORKING_HOURS: &str = "working_hours";

/// Reads a raw JSON value by key.
pub async fn get(db: &Database, key: &str) -> Result<Option<serde_json::Value>> {
    let key = key.to_owned();

    db.with_conn(move |conn| {
        let raw: Option<String> = conn
            .query_row("SELECT value FROM app_config WHERE key = ?1", [&key], |row| {
                row.get(0)
            })
            .optional()?;

        raw.map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| DatabaseError::CorruptRow(format!("config {key:?}: {e}")))
        })
        .transpose()
    })
    .await
}

/// Writes a raw JSON value under a key, replacing any previous value.
pub async fn set(db: &Database, key: &str, value: &serde_json::Value) -> Result<()> {
    let key = key.to_owned();
    let raw = value.to_string();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO app_config (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3
            "#,
            params![key, raw, encode_ts(chrono::Utc::now())],
        )?;
        Ok(())
    })
    .await
}
