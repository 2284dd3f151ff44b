//! Business services layer.
//!
//! This module contains the core services of the follow-up engine,
//! coordinating between providers, storage, and domain types.
//!
//! # Architecture
//!
//! Services sit between the trigger surface and the infrastructure layer:
//!
//! ```text
//! Trigger Surface (CLI command, timer)
//!          |
//!          v
//!    Services Layer  <-- You are here
//!          |
//!          v
//! Infrastructure (Providers, Storage)
//! ```
//!
//! # Services Overview
//!
//! - [`calendar_service`]: working-hours calendar computations
//! - [`activity_service`]: read-only aggregation of an email's follow-up history
//! - [`eligibility_service`]: the decision gate for the next follow-up
//! - [`scheduler_service`]: continuous-mode scheduling and due-attempt delivery
//! - [`dispatch_service`]: fixed-slot immediate dispatch

pub mod activity_service;
pub mod calendar_service;
pub mod dispatch_service;
pub mod eligibility_service;
pub mod scheduler_service;

pub use activity_service::{ActivityKind, ActivityStore, ActivitySummary, LastAutomatic};
pub use calendar_service::{
    validate_config, CalendarError, ConfigViolation, WorkingHoursCalendar,
};
pub use dispatch_service::{DispatchOptions, DispatchService, TimeSlot};
pub use eligibility_service::{evaluate, Eligibility, EligibilityInput, SkipReason};
pub use scheduler_service::{
    load_batch_config, BatchConfig, BatchSummary, BounceGuard, ConfigStore, InsertOutcome,
    PassOptions, SchedulerError, SchedulerService, SchedulerStore, TemplateStore,
};
