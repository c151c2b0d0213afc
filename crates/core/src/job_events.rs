//! Event names and kinds used when relaying job progress to a client
//! connection.
//!
//! Status text, reports and terminal errors share the `onComplete`
//! event and are told apart by their kind. The download URL travels on
//! its own event so a client can distinguish "job finished" from
//! "result is ready to fetch".

/// Event carrying status, report or error text.
pub const EVENT_ON_COMPLETE: &str = "onComplete";

/// Event carrying the time-bounded download URL of the job output.
pub const EVENT_DOWNLOAD_RESULT: &str = "downloadResult";

/// Event sent once when a client connection is registered.
pub const EVENT_CONNECTED: &str = "connected";

/// A work-item status observation, relayed verbatim.
pub const KIND_STATUS: &str = "status";

/// The human-readable report produced by the engine.
pub const KIND_REPORT: &str = "report";

/// A terminal error that ended the notification stream for a job.
pub const KIND_ERROR: &str = "error";

/// The output download URL.
pub const KIND_DOWNLOAD: &str = "download";
