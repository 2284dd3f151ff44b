//! Follow-up template domain type.

use serde::{Deserialize, Serialize};

use super::TemplateId;

/// A reusable message template keyed by follow-up level.
///
/// Subject and body carry `{{variable}}` placeholders that are substituted
/// against the tracked email at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupTemplate {
    /// Unique identifier for this template.
    pub id: TemplateId,
    /// 1-based follow-up level this template serves.
    pub sequence: u32,
    /// Subject pattern with placeholders.
    pub subject: String,
    /// Body pattern with placeholders.
    pub body: String,
    /// Minimum hours since the last activity before this level may fire.
    /// Policy-level overrides take precedence; absent both, 24h applies.
    pub delay_hours: Option<i64>,
    /// Whether this template is considered for scheduling.
    pub active: bool,
}
