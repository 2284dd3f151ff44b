//! Domain layer types for the cadence follow-up engine.
//!
//! This module contains the core domain types used throughout the crate:
//! tracked emails, follow-up attempts, manual follow-up records, and
//! follow-up templates.

mod followup;
mod template;
mod tracked_email;
mod types;

pub use followup::{AttemptStatus, FollowupAttempt, ManualFollowup};
pub use template::FollowupTemplate;
pub use tracked_email::{BounceStatus, BounceType, EmailStatus, TrackedEmail, TransitionError};
pub use types::{Address, AttemptId, EmailId, TemplateId};
