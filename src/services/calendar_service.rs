//! Working-hours calendar computations.
//!
//! Answers "is this instant inside working hours?" and "what is the next
//! valid working instant at or after this one?" for a configured calendar
//! (timezone, daily window, working weekdays, holiday dates). Every
//! operation is a pure function of its inputs; there is no I/O and no
//! hidden state.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use thiserror::Error;

use crate::config::WorkingHoursConfig;

/// How many calendar days `next_working_instant` scans forward before
/// giving up and falling back to +24 hours.
const MAX_DAY_ADVANCE: u32 = 14;

/// A single problem found while validating a [`WorkingHoursConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigViolation {
    #[error("{field} is not a valid HH:MM time: {value}")]
    InvalidTime { field: &'static str, value: String },

    #[error("start time {start} is not before end time {end}")]
    StartNotBeforeEnd { start: String, end: String },

    #[error("at least one working day is required")]
    NoWorkingDays,

    #[error("unknown day name: {0}")]
    UnknownDay(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("holiday is not a valid ISO date: {0}")]
    InvalidHoliday(String),
}

/// Errors from compiling a configuration into a calendar.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("invalid working-hours configuration: {}", format_violations(.0))]
    Invalid(Vec<ConfigViolation>),
}

fn format_violations(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates a raw configuration, returning every violation found.
///
/// An empty list means the configuration compiles cleanly.
pub fn validate_config(config: &WorkingHoursConfig) -> Vec<ConfigViolation> {
    let mut violations = Vec::new();

    let start = parse_time(&config.start);
    let end = parse_time(&config.end);

    if start.is_none() {
        violations.push(ConfigViolation::InvalidTime {
            field: "start",
            value: config.start.clone(),
        });
    }
    if end.is_none() {
        violations.push(ConfigViolation::InvalidTime {
            field: "end",
            value: config.end.clone(),
        });
    }
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            violations.push(ConfigViolation::StartNotBeforeEnd {
                start: config.start.clone(),
                end: config.end.clone(),
            });
        }
    }

    if config.working_days.is_empty() {
        violations.push(ConfigViolation::NoWorkingDays);
    }
    for name in &config.working_days {
        if parse_weekday(name).is_none() {
            violations.push(ConfigViolation::UnknownDay(name.clone()));
        }
    }

    if config.timezone.parse::<Tz>().is_err() {
        violations.push(ConfigViolation::UnknownTimezone(config.timezone.clone()));
    }

    for holiday in &config.holidays {
        if NaiveDate::parse_from_str(holiday, "%Y-%m-%d").is_err() {
            violations.push(ConfigViolation::InvalidHoliday(holiday.clone()));
        }
    }

    violations
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Compiled, validated form of a [`WorkingHoursConfig`].
#[derive(Debug, Clone)]
pub struct WorkingHoursCalendar {
    tz: Tz,
    start: NaiveTime,
    end: NaiveTime,
    working_days: HashSet<Weekday>,
    holidays: HashSet<NaiveDate>,
}

impl WorkingHoursCalendar {
    /// Compiles a raw configuration, rejecting it if validation fails.
    pub fn compile(config: &WorkingHoursConfig) -> Result<Self, CalendarError> {
        let violations = validate_config(config);
        if !violations.is_empty() {
            return Err(CalendarError::Invalid(violations));
        }

        Ok(Self {
            tz: config.timezone.parse().expect("validated timezone"),
            start: parse_time(&config.start).expect("validated start time"),
            end: parse_time(&config.end).expect("validated end time"),
            working_days: config
                .working_days
                .iter()
                .filter_map(|d| parse_weekday(d))
                .collect(),
            holidays: config
                .holidays
                .iter()
                .filter_map(|h| NaiveDate::parse_from_str(h, "%Y-%m-%d").ok())
                .collect(),
        })
    }

    /// The configured timezone.
    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    /// Returns true iff the instant falls on a working, non-holiday day
    /// with a local time-of-day inside `[start, end)`.
    pub fn is_working_instant(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.tz);
        self.is_working_day(local.date_naive())
            && local.time() >= self.start
            && local.time() < self.end
    }

    /// Returns the next valid working instant at or after `instant`, and
    /// whether an adjustment was made.
    ///
    /// Inside working hours the instant is returned unchanged. Before the
    /// window on a working day, it snaps forward to that day's start. In
    /// every other case the search advances one calendar day at a time
    /// (resetting the time-of-day to the window start), capped at 14 days;
    /// past the cap it falls back to exactly +24 hours from the original
    /// instant. The fallback is a permissive escape valve rather than a
    /// precise working-hours computation.
    pub fn next_working_instant(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, bool) {
        if self.is_working_instant(instant) {
            return (instant, false);
        }

        let local = instant.with_timezone(&self.tz);
        let date = local.date_naive();

        if self.is_working_day(date) && local.time() < self.start {
            if let Some(snapped) = self.instant_at(date, self.start) {
                return (snapped, true);
            }
        }

        let mut candidate = date;
        for _ in 0..MAX_DAY_ADVANCE {
            match candidate.succ_opt() {
                Some(next) => candidate = next,
                None => break,
            }
            if self.is_working_day(candidate) {
                if let Some(snapped) = self.instant_at(candidate, self.start) {
                    return (snapped, true);
                }
            }
        }

        (instant + Duration::hours(24), true)
    }

    /// Sums the working-window overlap in hours across all days spanned by
    /// `[start, end)`. Returns 0 when `start >= end`. Diagnostics only; not
    /// used for scheduling decisions.
    pub fn working_hours_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        if start >= end {
            return 0.0;
        }

        let local_start = start.with_timezone(&self.tz);
        let local_end = end.with_timezone(&self.tz);

        let mut total_seconds = 0i64;
        let mut date = local_start.date_naive();
        let last = local_end.date_naive();

        while date <= last {
            if self.is_working_day(date) {
                let window_start = date.and_time(self.start);
                let window_end = date.and_time(self.end);

                let overlap_start = window_start.max(local_start.naive_local());
                let overlap_end = window_end.min(local_end.naive_local());

                if overlap_end > overlap_start {
                    total_seconds += (overlap_end - overlap_start).num_seconds();
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        total_seconds as f64 / 3600.0
    }

    fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// Resolves a local date+time to a UTC instant, stepping forward by one
    /// hour when the wall time does not exist (DST spring-forward gap).
    fn instant_at(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        let mut naive = date.and_time(time);
        for _ in 0..3 {
            match self.tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
                LocalResult::None => naive += Duration::hours(1),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn default_calendar() -> WorkingHoursCalendar {
        WorkingHoursCalendar::compile(&WorkingHoursConfig::default()).unwrap()
    }

    #[test]
    fn validates_clean_default_config() {
        assert!(validate_config(&WorkingHoursConfig::default()).is_empty());
    }

    #[test]
    fn rejects_malformed_times() {
        let config = WorkingHoursConfig {
            start: "7am".to_string(),
            end: "25:00".to_string(),
            ..WorkingHoursConfig::default()
        };
        let violations = validate_config(&config);
        assert_eq!(violations.len(), 2);
        assert!(matches!(
            violations[0],
            ConfigViolation::InvalidTime { field: "start", .. }
        ));
    }

    #[test]
    fn rejects_inverted_window() {
        let config = WorkingHoursConfig {
            start: "18:00".to_string(),
            end: "07:00".to_string(),
            ..WorkingHoursConfig::default()
        };
        assert!(validate_config(&config)
            .iter()
            .any(|v| matches!(v, ConfigViolation::StartNotBeforeEnd { .. })));
    }

    #[test]
    fn rejects_empty_working_days_and_unknown_names() {
        let empty = WorkingHoursConfig {
            working_days: vec![],
            ..WorkingHoursConfig::default()
        };
        assert!(validate_config(&empty).contains(&ConfigViolation::NoWorkingDays));

        let unknown = WorkingHoursConfig {
            working_days: vec!["Funday".to_string()],
            ..WorkingHoursConfig::default()
        };
        assert!(validate_config(&unknown)
            .contains(&ConfigViolation::UnknownDay("Funday".to_string())));
    }

    #[test]
    fn rejects_unknown_timezone_and_bad_holidays() {
        let config = WorkingHoursConfig {
            timezone: "Mars/Olympus".to_string(),
            holidays: vec!["not-a-date".to_string()],
            ..WorkingHoursConfig::default()
        };
        let violations = validate_config(&config);
        assert!(violations.contains(&ConfigViolation::UnknownTimezone("Mars/Olympus".to_string())));
        assert!(violations.contains(&ConfigViolation::InvalidHoliday("not-a-date".to_string())));
    }

    #[test]
    fn working_instant_inside_window() {
        let calendar = default_calendar();
        // Monday 2026-08-03 08:00 UTC
        assert!(calendar.is_working_instant(utc(2026, 8, 3, 8, 0)));
    }

    #[test]
    fn window_bounds_are_start_inclusive_end_exclusive() {
        let calendar = default_calendar();
        assert!(calendar.is_working_instant(utc(2026, 8, 3, 7, 0)));
        assert!(!calendar.is_working_instant(utc(2026, 8, 3, 18, 0)));
    }

    #[test]
    fn weekend_is_not_working() {
        let calendar = default_calendar();
        // Saturday 2026-08-01
        assert!(!calendar.is_working_instant(utc(2026, 8, 1, 10, 0)));
    }

    #[test]
    fn holiday_is_not_working() {
        let config = WorkingHoursConfig {
            holidays: vec!["2026-08-03".to_string()],
            ..WorkingHoursConfig::default()
        };
        let calendar = WorkingHoursCalendar::compile(&config).unwrap();
        assert!(!calendar.is_working_instant(utc(2026, 8, 3, 10, 0)));
    }

    #[test]
    fn next_working_instant_is_identity_inside_window() {
        let calendar = default_calendar();
        let instant = utc(2026, 8, 4, 8, 0);
        let (next, adjusted) = calendar.next_working_instant(instant);
        assert_eq!(next, instant);
        assert!(!adjusted);
    }

    #[test]
    fn early_morning_snaps_to_window_start() {
        let calendar = default_calendar();
        // Tuesday 05:30 snaps to Tuesday 07:00
        let (next, adjusted) = calendar.next_working_instant(utc(2026, 8, 4, 5, 30));
        assert_eq!(next, utc(2026, 8, 4, 7, 0));
        assert!(adjusted);
    }

    #[test]
    fn friday_evening_rolls_to_monday_morning() {
        let calendar = default_calendar();
        // Friday 2026-08-07 18:30 is after the window; Saturday and Sunday
        // are not working days, so the next valid instant is Monday 07:00.
        let (next, adjusted) = calendar.next_working_instant(utc(2026, 8, 7, 18, 30));
        assert_eq!(next, utc(2026, 8, 10, 7, 0));
        assert!(adjusted);
    }

    #[test]
    fn holiday_run_skips_to_first_open_day() {
        let config = WorkingHoursConfig {
            holidays: vec!["2026-08-04".to_string(), "2026-08-05".to_string()],
            ..WorkingHoursConfig::default()
        };
        let calendar = WorkingHoursCalendar::compile(&config).unwrap();
        // Monday 19:00 → Tuesday and Wednesday are holidays → Thursday 07:00
        let (next, adjusted) = calendar.next_working_instant(utc(2026, 8, 3, 19, 0));
        assert_eq!(next, utc(2026, 8, 6, 7, 0));
        assert!(adjusted);
    }

    #[test]
    fn result_is_always_working_when_within_the_scan_cap() {
        let calendar = default_calendar();
        let samples = [
            utc(2026, 8, 1, 3, 0),
            utc(2026, 8, 2, 23, 59),
            utc(2026, 8, 3, 6, 59),
            utc(2026, 8, 7, 18, 0),
        ];
        for instant in samples {
            let (next, _) = calendar.next_working_instant(instant);
            assert!(calendar.is_working_instant(next), "from {instant}");
            assert!(next >= instant);
        }
    }

    #[test]
    fn fourteen_day_cap_falls_back_to_plus_24_hours() {
        // Every day for the next two weeks is a holiday, so the scan finds
        // nothing and the escape valve fires. The fallback is knowingly
        // permissive: the returned instant is not a working instant.
        let holidays = (1..=15)
            .map(|d| format!("2026-08-{d:02}"))
            .collect::<Vec<_>>();
        let config = WorkingHoursConfig {
            working_days: (["Monday", "Tuesday", "Wednesday", "Thursday", "Friday",
                "Saturday", "Sunday"])
                .iter()
                .map(|s| s.to_string())
                .collect(),
            holidays,
            ..WorkingHoursConfig::default()
        };
        let calendar = WorkingHoursCalendar::compile(&config).unwrap();

        let instant = utc(2026, 8, 1, 10, 0);
        let (next, adjusted) = calendar.next_working_instant(instant);
        assert_eq!(next, instant + Duration::hours(24));
        assert!(adjusted);
        assert!(!calendar.is_working_instant(next));
    }

    #[test]
    fn timezone_is_respected() {
        let config = WorkingHoursConfig {
            timezone: "America/New_York".to_string(),
            ..WorkingHoursConfig::default()
        };
        let calendar = WorkingHoursCalendar::compile(&config).unwrap();
        // 2026-08-03 12:00 UTC is 08:00 in New York (EDT): inside the window.
        assert!(calendar.is_working_instant(utc(2026, 8, 3, 12, 0)));
        // 2026-08-03 09:00 UTC is 05:00 in New York: before the window.
        assert!(!calendar.is_working_instant(utc(2026, 8, 3, 9, 0)));
    }

    #[test]
    fn hours_between_zero_for_inverted_range() {
        let calendar = default_calendar();
        let start = utc(2026, 8, 4, 10, 0);
        assert_eq!(calendar.working_hours_between(start, start), 0.0);
        assert_eq!(
            calendar.working_hours_between(start, start - Duration::hours(1)),
            0.0
        );
    }

    #[test]
    fn hours_between_single_day_overlap() {
        let calendar = default_calendar();
        // Tuesday 10:00 to 15:00: 5 working hours.
        let hours = calendar.working_hours_between(utc(2026, 8, 4, 10, 0), utc(2026, 8, 4, 15, 0));
        assert_eq!(hours, 5.0);
    }

    #[test]
    fn hours_between_spans_a_weekend() {
        let calendar = default_calendar();
        // Friday 17:00 to Monday 08:00: 1h Friday + 1h Monday.
        let hours = calendar.working_hours_between(utc(2026, 8, 7, 17, 0), utc(2026, 8, 10, 8, 0));
        assert_eq!(hours, 2.0);
    }

    #[test]
    fn hours_between_clips_to_the_window() {
        let calendar = default_calendar();
        // Full Tuesday, midnight to midnight: exactly the 11-hour window.
        let hours = calendar.working_hours_between(utc(2026, 8, 4, 0, 0), utc(2026, 8, 5, 0, 0));
        assert_eq!(hours, 11.0);
    }
}
