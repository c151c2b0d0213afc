use std::time::Duration;

/// Fixed delay between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Ceiling on how long one work item is polled before giving up.
pub const DEFAULT_POLL_MAX_DURATION: Duration = Duration::from_secs(60 * 60);

/// Lifetime of output download URLs, in minutes.
pub const DEFAULT_DOWNLOAD_URL_MINUTES: u32 = 15;

/// Capacity of the notification channel feeding the delivery task.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 256;

/// Alias every bundle and activity version is published under.
pub const DEFAULT_ALIAS: &str = "dev";

/// Cadence and ceiling of the status poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_duration: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_duration: DEFAULT_POLL_MAX_DURATION,
        }
    }
}

/// Settings shared by every pipeline component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// App nickname that owns bundles and activities (the client id).
    pub nickname: String,
    /// Alias bundles and activities are published under.
    pub alias: String,
    pub poll: PollConfig,
    pub download_url_minutes: u32,
    pub download_use_cdn: bool,
    /// When set, work items report completion to this URL instead of
    /// being polled.
    pub callback_url: Option<String>,
    pub notify_capacity: usize,
}

impl PipelineConfig {
    /// Configuration with defaults for everything but the nickname.
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            alias: DEFAULT_ALIAS.to_string(),
            poll: PollConfig::default(),
            download_url_minutes: DEFAULT_DOWNLOAD_URL_MINUTES,
            download_use_cdn: true,
            callback_url: None,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
        }
    }

    /// Bucket that holds staged inputs and engine outputs.
    pub fn bucket_key(&self) -> String {
        format!("{}-designautomation", self.nickname.to_lowercase())
    }

    /// `nickname.name+alias`, the id the engine lists for an aliased item.
    pub fn qualified_id(&self, name: &str) -> String {
        format!("{}.{}+{}", self.nickname, name, self.alias)
    }

    /// Prefix a caller-supplied `name+alias` activity with the nickname.
    pub fn owned_activity_id(&self, activity: &str) -> String {
        format!("{}.{}", self.nickname, activity)
    }
}
