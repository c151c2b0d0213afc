/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a client notification connection (one WebSocket).
pub type ConnectionId = String;

/// Identifier the remote engine assigns to a submitted work item.
pub type WorkItemId = String;
