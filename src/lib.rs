//! cadence - An email-tracking and automated follow-up scheduling engine
//!
//! This crate provides the core functionality for cadence: deciding, for every
//! outbound tracked email that has not received a reply, whether and when the
//! next automated follow-up goes out, subject to working-hours constraints,
//! per-day caps, total-attempt caps, and a fixed-timeframe deadline.

pub mod config;
pub mod domain;
pub mod providers;
pub mod services;
pub mod storage;
