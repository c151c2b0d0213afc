//! REST clients for the remote design-automation engine, its object
//! storage service and the OAuth token endpoint they share.
//!
//! Each remote collaborator sits behind a trait ([`api::EngineApi`],
//! [`storage::ObjectStore`], [`auth::TokenProvider`]) so the pipeline can
//! be driven by in-memory fakes in tests. Responses are decoded into
//! typed structs and validated at this boundary; callers never poke at
//! raw JSON.

pub mod api;
pub mod auth;
pub mod models;
pub mod storage;
