use std::path::PathBuf;
use std::time::Duration;

use daflow_pipeline::config::{
    PipelineConfig, PollConfig, DEFAULT_ALIAS, DEFAULT_DOWNLOAD_URL_MINUTES,
    DEFAULT_NOTIFY_CAPACITY,
};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_parse("REQUEST_TIMEOUT_SECS", 30u64);
        let shutdown_timeout_secs = env_parse("SHUTDOWN_TIMEOUT_SECS", 30u64);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
        }
    }
}

/// Engine, storage and pipeline settings.
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// OAuth client id; doubles as the app nickname.
    pub client_id: String,
    pub client_secret: String,
    /// API host root (default: `https://developer.api.autodesk.com`).
    pub base_url: String,
    /// Engine region segment (default: `us-east`).
    pub region: String,
    /// Storage region for new buckets (default: `US`).
    pub storage_region: String,
    /// Space-separated OAuth scopes.
    pub scopes: String,
    pub bundle_alias: String,
    /// Directory holding `*.zip` bundle packages (default: `bundles`).
    pub bundles_dir: PathBuf,
    /// Directory uploaded inputs are saved to before staging (default: `staging`).
    pub staging_dir: PathBuf,
    pub poll_interval: Duration,
    pub poll_max_duration: Duration,
    pub download_url_minutes: u32,
    pub download_use_cdn: bool,
    /// Public webhook URL; when set, jobs are not polled.
    pub callback_url: Option<String>,
    pub http_timeout: Duration,
    pub notify_capacity: usize,
}

impl AutomationConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default                              |
    /// |---------------------------|--------------------------------------|
    /// | `APS_CLIENT_ID`           | required                             |
    /// | `APS_CLIENT_SECRET`       | required                             |
    /// | `APS_BASE_URL`            | `https://developer.api.autodesk.com` |
    /// | `DA_REGION`               | `us-east`                            |
    /// | `OSS_REGION`              | `US`                                 |
    /// | `APS_SCOPES`              | `code:all data:write data:read bucket:create bucket:delete bucket:read` |
    /// | `BUNDLE_ALIAS`            | `dev`                                |
    /// | `BUNDLES_DIR`             | `bundles`                            |
    /// | `STAGING_DIR`             | `staging`                            |
    /// | `POLL_INTERVAL_SECS`      | `2`                                  |
    /// | `POLL_MAX_DURATION_SECS`  | `3600`                               |
    /// | `DOWNLOAD_URL_MINUTES`    | `15`                                 |
    /// | `DOWNLOAD_USE_CDN`        | `true`                               |
    /// | `CALLBACK_URL`            | unset (poll)                         |
    /// | `HTTP_TIMEOUT_SECS`       | `30`                                 |
    /// | `NOTIFY_CHANNEL_CAPACITY` | `256`                                |
    pub fn from_env() -> Self {
        let client_id = std::env::var("APS_CLIENT_ID").expect("APS_CLIENT_ID must be set");
        let client_secret =
            std::env::var("APS_CLIENT_SECRET").expect("APS_CLIENT_SECRET must be set");

        let poll = PollConfig::default();

        Self {
            client_id,
            client_secret,
            base_url: env_or("APS_BASE_URL", "https://developer.api.autodesk.com")
                .trim_end_matches('/')
                .to_string(),
            region: env_or("DA_REGION", "us-east"),
            storage_region: env_or("OSS_REGION", "US"),
            scopes: env_or(
                "APS_SCOPES",
                "code:all data:write data:read bucket:create bucket:delete bucket:read",
            ),
            bundle_alias: env_or("BUNDLE_ALIAS", DEFAULT_ALIAS),
            bundles_dir: PathBuf::from(env_or("BUNDLES_DIR", "bundles")),
            staging_dir: PathBuf::from(env_or("STAGING_DIR", "staging")),
            poll_interval: Duration::from_secs(env_parse(
                "POLL_INTERVAL_SECS",
                poll.interval.as_secs(),
            )),
            poll_max_duration: Duration::from_secs(env_parse(
                "POLL_MAX_DURATION_SECS",
                poll.max_duration.as_secs(),
            )),
            download_url_minutes: env_parse("DOWNLOAD_URL_MINUTES", DEFAULT_DOWNLOAD_URL_MINUTES),
            download_use_cdn: env_parse("DOWNLOAD_USE_CDN", true),
            callback_url: std::env::var("CALLBACK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30u64)),
            notify_capacity: env_parse("NOTIFY_CHANNEL_CAPACITY", DEFAULT_NOTIFY_CAPACITY),
        }
    }

    /// Engine API root, e.g. `https://developer.api.autodesk.com/da/us-east/v3`.
    pub fn engine_url(&self) -> String {
        format!("{}/da/{}/v3", self.base_url, self.region)
    }

    /// Object storage API root.
    pub fn storage_url(&self) -> String {
        format!("{}/oss/v2", self.base_url)
    }

    /// Two-legged OAuth token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/authentication/v2/token", self.base_url)
    }

    /// Settings handed to the pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.client_id.clone());
        config.alias = self.bundle_alias.clone();
        config.poll = PollConfig {
            interval: self.poll_interval,
            max_duration: self.poll_max_duration,
        };
        config.download_url_minutes = self.download_url_minutes;
        config.download_use_cdn = self.download_use_cdn;
        config.callback_url = self.callback_url.clone();
        config.notify_capacity = self.notify_capacity;
        config
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse `key` or fall back to `default`. Panics on an unparsable value.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} has an invalid value '{raw}'")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AutomationConfig {
        AutomationConfig {
            client_id: "Nick".into(),
            client_secret: "s".into(),
            base_url: "https://aps.example".into(),
            region: "us-east".into(),
            storage_region: "US".into(),
            scopes: "code:all".into(),
            bundle_alias: "prod".into(),
            bundles_dir: "bundles".into(),
            staging_dir: "staging".into(),
            poll_interval: Duration::from_secs(3),
            poll_max_duration: Duration::from_secs(60),
            download_url_minutes: 5,
            download_use_cdn: false,
            callback_url: None,
            http_timeout: Duration::from_secs(30),
            notify_capacity: 8,
        }
    }

    #[test]
    fn urls_are_built_from_base() {
        let c = sample();
        assert_eq!(c.engine_url(), "https://aps.example/da/us-east/v3");
        assert_eq!(c.storage_url(), "https://aps.example/oss/v2");
        assert_eq!(c.token_url(), "https://aps.example/authentication/v2/token");
    }

    #[test]
    fn pipeline_config_carries_settings() {
        let p = sample().pipeline_config();
        assert_eq!(p.nickname, "Nick");
        assert_eq!(p.alias, "prod");
        assert_eq!(p.poll.interval, Duration::from_secs(3));
        assert_eq!(p.download_url_minutes, 5);
        assert!(!p.download_use_cdn);
        assert_eq!(p.bucket_key(), "nick-designautomation");
    }
}
