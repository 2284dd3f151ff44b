//! Configuration types for the follow-up engine.
//!
//! Policy and calendar configuration are stored as JSON blobs in a generic
//! key/value store and deserialized into the strongly-typed structs here.

mod settings;

pub use settings::{FollowupPolicy, WorkingHoursConfig, DEFAULT_LEVEL_DELAY_HOURS};
