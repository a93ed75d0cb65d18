//! Runtime configuration for the invoice data layer.
//!
//! Values come from an optional JSON file and are then overridden by
//! `BILLFOLD_*` environment variables. Every knob has a documented default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_FRESHNESS_MS: u64 = 5 * 60 * 1000;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Freshness, retry and timeout policy for the sync coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Cached entries older than this are refetched (default: 5 minutes)
    pub freshness_ms: u64,
    /// Total attempts per remote operation, first try included (default: 3)
    pub max_attempts: u32,
    /// First backoff delay, doubled after each failure (default: 1 second)
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff delay (default: 30 seconds)
    pub backoff_max_ms: u64,
    /// Bound on each remote call (default: 10 seconds)
    pub request_timeout_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            freshness_ms: DEFAULT_FRESHNESS_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl SyncSettings {
    pub const fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }

    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub const fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Set the freshness threshold
    #[must_use]
    pub const fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness_ms = duration_ms(freshness);
        self
    }

    /// Set the attempt bound
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff schedule
    #[must_use]
    pub const fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base_ms = duration_ms(base);
        self.backoff_max_ms = duration_ms(max);
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(Error::Config(format!(
                "backoff_max_ms ({}) is below backoff_base_ms ({})",
                self.backoff_max_ms, self.backoff_base_ms
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Where the remote invoice API lives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self {
            base_url: base_url.into(),
            auth_token: None,
        }
        .normalized()
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = normalize_text_option(Some(token.into()));
        self
    }

    /// Trim values, require an http(s) URL and drop any trailing slash.
    pub fn normalized(self) -> Result<Self> {
        let base_url = normalize_text_option(Some(self.base_url))
            .ok_or_else(|| Error::Config("remote base_url must not be empty".into()))?;
        if !is_http_url(&base_url) {
            return Err(Error::Config(
                "remote base_url must include http:// or https://".into(),
            ));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: normalize_text_option(self.auth_token),
        })
    }
}

/// Complete configuration for an invoice repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillfoldConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl BillfoldConfig {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("failed to read config at {}: {error}", path.display()))
        })?;
        let config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!("failed to parse config at {}: {error}", path.display()))
        })?;
        config.normalized()
    }

    /// Apply `BILLFOLD_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| normalize_text_option(lookup(key));

        if let Some(path) = get("BILLFOLD_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = get("BILLFOLD_API_URL") {
            let token = self.remote.take().and_then(|remote| remote.auth_token);
            self.remote = Some(RemoteConfig {
                base_url: url,
                auth_token: token,
            });
        }
        if let Some(token) = get("BILLFOLD_API_TOKEN") {
            if let Some(remote) = self.remote.as_mut() {
                remote.auth_token = Some(token);
            }
        }
        if let Some(secs) = get("BILLFOLD_FRESHNESS_SECS") {
            self.sync.freshness_ms = parse_number::<u64>("BILLFOLD_FRESHNESS_SECS", &secs)?
                .saturating_mul(1_000);
        }
        if let Some(attempts) = get("BILLFOLD_MAX_ATTEMPTS") {
            self.sync.max_attempts = parse_number("BILLFOLD_MAX_ATTEMPTS", &attempts)?;
        }
        if let Some(ms) = get("BILLFOLD_BACKOFF_MS") {
            self.sync.backoff_base_ms = parse_number("BILLFOLD_BACKOFF_MS", &ms)?;
            self.sync.backoff_max_ms = self.sync.backoff_max_ms.max(self.sync.backoff_base_ms);
        }
        if let Some(secs) = get("BILLFOLD_TIMEOUT_SECS") {
            self.sync.request_timeout_ms = parse_number::<u64>("BILLFOLD_TIMEOUT_SECS", &secs)?
                .saturating_mul(1_000);
        }

        self.normalized()
    }

    fn normalized(mut self) -> Result<Self> {
        self.remote = self.remote.map(RemoteConfig::normalized).transpose()?;
        self.sync.validate()?;
        Ok(self)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}
