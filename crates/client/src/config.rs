use std::str::FromStr;
use std::time::Duration;

use lumo_core::assets::AssetUrls;

/// Default backend API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Default delay between two status polls of the same job.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default cap on the in-memory job list.
pub const DEFAULT_MAX_JOBS: usize = 50;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend API base URL, without a trailing slash.
    pub api_url: String,
    /// Base URL that relative asset paths are resolved against. `None`
    /// keeps them same-origin.
    pub asset_base_url: Option<String>,
    /// Bearer token to start the session with.
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Maximum number of jobs kept in the job list.
    pub max_jobs: usize,
    /// Refetch history after every successful completion.
    pub refresh_history_on_complete: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            asset_base_url: None,
            access_token: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_jobs: DEFAULT_MAX_JOBS,
            refresh_history_on_complete: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                      |
    /// |-----------------------------|------------------------------|
    /// | `LUMO_API_URL`              | `http://localhost:8000/api`  |
    /// | `LUMO_ASSET_BASE_URL`       | unset (same-origin)          |
    /// | `LUMO_ACCESS_TOKEN`         | unset                        |
    /// | `LUMO_POLL_INTERVAL_MS`     | `3000`                       |
    /// | `LUMO_REQUEST_TIMEOUT_SECS` | `30`                         |
    /// | `LUMO_MAX_JOBS`             | `50`                         |
    /// | `LUMO_REFRESH_HISTORY`      | `true`                       |
    ///
    /// Unparseable values fall back to their default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parsed = |key: &str, default| parse_or(key, non_empty(key), default);

        let api_url = non_empty("LUMO_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.into())
            .trim_end_matches('/')
            .to_string();

        let poll_interval_ms: u64 = parsed("LUMO_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        let request_timeout_secs: u64 =
            parsed("LUMO_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);
        let max_jobs = parse_or("LUMO_MAX_JOBS", non_empty("LUMO_MAX_JOBS"), DEFAULT_MAX_JOBS);
        let refresh_history_on_complete =
            parse_or("LUMO_REFRESH_HISTORY", non_empty("LUMO_REFRESH_HISTORY"), true);

        Self {
            api_url,
            asset_base_url: non_empty("LUMO_ASSET_BASE_URL").filter(|base| usable_asset_base(base)),
            access_token: non_empty("LUMO_ACCESS_TOKEN"),
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
            max_jobs: max_jobs.max(1),
            refresh_history_on_complete,
        }
    }

    /// Asset normalizer for this configuration.
    pub fn asset_urls(&self) -> AssetUrls {
        AssetUrls::new(self.asset_base_url.as_deref())
    }
}

/// An asset base must be an `http(s)` URL or a root-relative path.
fn usable_asset_base(base: &str) -> bool {
    let lower = base.to_ascii_lowercase();
    let usable =
        lower.starts_with("http://") || lower.starts_with("https://") || base.starts_with('/');
    if !usable {
        tracing::warn!(value = %base, "Ignoring LUMO_ASSET_BASE_URL, not a URL or absolute path");
    }
    usable
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "Invalid config value, using default");
            default
        }),
    }
}
