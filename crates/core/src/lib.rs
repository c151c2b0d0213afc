//! Shared domain types for the design-automation job pipeline.
//!
//! Holds the pieces every other crate agrees on: the work-item status
//! machine, the engine-kind lookup table, notification event names and
//! the common [`CoreError`](error::CoreError).

pub mod engine_kind;
pub mod error;
pub mod job_events;
pub mod status;
pub mod types;
