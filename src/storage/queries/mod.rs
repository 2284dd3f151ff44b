//! Database operations, one module per entity.

pub mod attempts;
pub mod config;
pub mod manual_followups;
pub mod templates;
pub mod tracked_emails;

use chrono::{DateTime, SecondsFormat, Utc};

use super::database::DatabaseError;

/// Encodes a timestamp for storage.
///
/// UTC, second precision, `Z` suffix: a fixed shape so lexicographic SQL
/// comparisons on timestamp columns agree with chronological order.
pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Decodes a stored timestamp.
pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow(format!("timestamp {raw:?}: {e}")))
}
