//! SQL schema definitions as const strings.
//!
//! Contains the complete SQLite schema for the follow-up engine.

/// SQL to create the tracked emails table.
pub const CREATE_TRACKED_EMAILS: &str = r#"
CREATE TABLE IF NOT EXISTS tracked_emails (
    id TEXT PRIMARY KEY,
    sender_address TEXT NOT NULL,
    sender_name TEXT,
    recipients TEXT NOT NULL,
    subject TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    bounce_type TEXT,
    conversation_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create tracked email indexes.
pub const CREATE_TRACKED_EMAIL_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tracked_emails_status ON tracked_emails(status);
CREATE INDEX IF NOT EXISTS idx_tracked_emails_sent_at ON tracked_emails(sent_at)
"#;

/// SQL to create the follow-up attempts table.
pub const CREATE_FOLLOWUP_ATTEMPTS: &str = r#"
CREATE TABLE IF NOT EXISTS followup_attempts (
    id TEXT PRIMARY KEY,
    email_id TEXT NOT NULL REFERENCES tracked_emails(id),
    template_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    scheduled_for TEXT NOT NULL,
    sent_at TEXT,
    status TEXT NOT NULL DEFAULT 'scheduled',
    adjusted_for_working_hours INTEGER NOT NULL DEFAULT 0,
    failure_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create follow-up attempt indexes.
///
/// The partial unique index is the authoritative idempotence guard: at most
/// one non-cancelled attempt may occupy an (email, sequence) slot, even
/// across concurrent scheduling passes.
pub const CREATE_FOLLOWUP_ATTEMPT_INDEXES: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_attempts_email_sequence
    ON followup_attempts(email_id, sequence)
    WHERE status != 'cancelled';
CREATE INDEX IF NOT EXISTS idx_attempts_due
    ON followup_attempts(status, scheduled_for)
"#;

/// SQL to create the manual follow-ups table.
pub const CREATE_MANUAL_FOLLOWUPS: &str = r#"
CREATE TABLE IF NOT EXISTS manual_followups (
    id TEXT PRIMARY KEY,
    email_id TEXT NOT NULL REFERENCES tracked_emails(id),
    sequence INTEGER NOT NULL,
    detected_at TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// SQL to create manual follow-up indexes.
pub const CREATE_MANUAL_FOLLOWUP_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_manual_followups_email ON manual_followups(email_id)
"#;

/// SQL to create the follow-up templates table.
pub const CREATE_FOLLOWUP_TEMPLATES: &str = r#"
CREATE TABLE IF NOT EXISTS followup_templates (
    id TEXT PRIMARY KEY,
    sequence INTEGER NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    delay_hours INTEGER,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the configuration key/value table.
pub const CREATE_APP_CONFIG: &str = r#"
CREATE TABLE IF NOT EXISTS app_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// Returns all migrations in execution order.
pub fn all_migrations() -> Vec<&'static str> {
    vec![
        CREATE_TRACKED_EMAILS,
        CREATE_TRACKED_EMAIL_INDEXES,
        CREATE_FOLLOWUP_ATTEMPTS,
        CREATE_FOLLOWUP_ATTEMPT_INDEXES,
        CREATE_MANUAL_FOLLOWUPS,
        CREATE_MANUAL_FOLLOWUP_INDEXES,
        CREATE_FOLLOWUP_TEMPLATES,
        CREATE_APP_CONFIG,
    ]
}
