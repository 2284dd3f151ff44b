//! Follow-up policy and working-hours configuration types.
//!
//! Both structs are read from the configuration store once per scheduling
//! pass. Absent configuration falls back to the defaults below; configuration
//! that is present but malformed is rejected at load time rather than
//! propagated through the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fallback minimum delay when neither the policy nor the template
/// configures one for a level.
pub const DEFAULT_LEVEL_DELAY_HOURS: i64 = 24;

/// Process-wide follow-up policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowupPolicy {
    /// Maximum total follow-ups (automatic + manual) permitted per email.
    pub max_followups: u32,
    /// Maximum follow-ups permitted per calendar day per email.
    pub max_per_day: u32,
    /// Elapsed-time ceiling in hours from the original send. Once exceeded,
    /// no further follow-ups are scheduled regardless of other conditions.
    pub total_timeframe_hours: i64,
    /// Per-level minimum delay overrides, keyed by 1-based sequence level.
    pub level_delays: HashMap<u32, i64>,
}

impl Default for FollowupPolicy {
    fn default() -> Self {
        Self {
            max_followups: 3,
            max_per_day: 2,
            total_timeframe_hours: 720,
            level_delays: HashMap::new(),
        }
    }
}

impl FollowupPolicy {
    /// Resolves the minimum delay for a sequence level.
    ///
    /// Precedence: policy override, then the template's own delay, then
    /// [`DEFAULT_LEVEL_DELAY_HOURS`].
    pub fn effective_delay_hours(&self, level: u32, template_delay: Option<i64>) -> i64 {
        self.level_delays
            .get(&level)
            .copied()
            .or(template_delay)
            .unwrap_or(DEFAULT_LEVEL_DELAY_HOURS)
    }
}

/// Working-hours calendar configuration, as stored.
///
/// Times are `HH:MM` strings, weekdays are English day names, and holidays
/// are ISO dates without a time component, interpreted in `timezone`. The
/// raw form is compiled and validated by the calendar service before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingHoursConfig {
    /// IANA timezone identifier, e.g. "Europe/Berlin".
    pub timezone: String,
    /// Daily window start, inclusive.
    pub start: String,
    /// Daily window end, exclusive.
    pub end: String,
    /// Names of weekdays on which sends may be scheduled.
    pub working_days: Vec<String>,
    /// ISO dates excluded from scheduling.
    pub holidays: Vec<String>,
}

impl Default for WorkingHoursConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            start: "07:00".to_string(),
            end: "18:00".to_string(),
            working_days: vec![
                "Monday".to_string(),
                "Tuesday".to_string(),
                "Wednesday".to_string(),
                "Thursday".to_string(),
                "Friday".to_string(),
            ],
            holidays: Vec::new(),
        }
    }
}
