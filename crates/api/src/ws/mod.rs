//! WebSocket infrastructure for job notifications.
//!
//! Provides connection management, heartbeat monitoring, and the HTTP
//! upgrade handler used by Axum routes. [`WsManager`] is also the
//! pipeline's notification sink.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{connected_frame, ws_handler};
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
