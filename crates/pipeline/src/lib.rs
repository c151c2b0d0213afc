//! Job orchestration pipeline for the design-automation engine.
//!
//! Provisions versioned bundles and activities ([`registry`]), stages
//! artifacts in object storage ([`stager`]), submits work items
//! ([`submitter`]), then follows each job to completion either by
//! polling ([`poller`]) or by webhook ([`callback`]). Progress is relayed
//! to the originating client connection through a bounded channel and
//! a dedicated delivery task ([`notify`]).

pub mod callback;
pub mod completion;
pub mod config;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod services;
pub mod stager;
pub mod submitter;
pub mod workitem;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use services::AutomationServices;
