//! Environment-derived configuration.
//!
//! The render service base URL is the only required setting; timeouts and
//! poll tuning have defaults that suit a renderer answering each poll
//! within a few seconds.

use std::time::Duration;

use thiserror::Error;

/// Render service base URL, e.g. `http://127.0.0.1:8000`. Required.
pub const ENV_RENDERER_URL: &str = "SCENEFORGE_RENDERER_URL";
/// HTTP connect timeout in seconds. Optional.
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "SCENEFORGE_CONNECT_TIMEOUT_SECS";
/// HTTP request timeout in seconds. Optional.
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "SCENEFORGE_REQUEST_TIMEOUT_SECS";
/// Fixed delay between job polls in seconds. Optional.
pub const ENV_POLL_INTERVAL_SECS: &str = "SCENEFORGE_POLL_INTERVAL_SECS";
/// Cap on total polling duration in seconds. Optional.
pub const ENV_POLL_TIMEOUT_SECS: &str = "SCENEFORGE_POLL_TIMEOUT_SECS";
/// Consecutive transient poll failures tolerated before giving up. Optional.
pub const ENV_MAX_TRANSIENT_FAILURES: &str = "SCENEFORGE_MAX_TRANSIENT_FAILURES";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// HTTP settings for the render service client.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Polling behavior for the render job tracker.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Fixed delay between polls. No backoff: the renderer answers each
    /// poll quickly.
    pub poll_interval: Duration,
    /// Cap on total polling duration; exceeding it fails the job with a
    /// timeout detail.
    pub max_duration: Duration,
    /// Consecutive transient poll failures tolerated before escalating.
    pub max_transient_failures: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_duration: Duration::from_secs(600),
            max_transient_failures: 5,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub render: RenderSettings,
    pub tracker: TrackerSettings,
}

impl Config {
    /// Builds a configuration from the environment. The renderer base URL
    /// is required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var(ENV_RENDERER_URL)
            .map_err(|_| ConfigError::MissingEnv(ENV_RENDERER_URL))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: ENV_RENDERER_URL,
                reason: "must not be empty".to_string(),
            });
        }

        let mut config = Self {
            render: RenderSettings {
                base_url,
                ..RenderSettings::default()
            },
            tracker: TrackerSettings::default(),
        };

        if let Some(d) = env_duration_secs(ENV_CONNECT_TIMEOUT_SECS)? {
            config.render.connect_timeout = d;
        }
        if let Some(d) = env_duration_secs(ENV_REQUEST_TIMEOUT_SECS)? {
            config.render.request_timeout = d;
        }
        if let Some(d) = env_duration_secs(ENV_POLL_INTERVAL_SECS)? {
            config.tracker.poll_interval = d;
        }
        if let Some(d) = env_duration_secs(ENV_POLL_TIMEOUT_SECS)? {
            config.tracker.max_duration = d;
        }
        if let Some(n) = env_u32(ENV_MAX_TRANSIENT_FAILURES)? {
            config.tracker.max_transient_failures = n;
        }

        Ok(config)
    }
}

fn env_duration_secs(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_u32(name)?.map(|secs| Duration::from_secs(u64::from(secs))))
}

fn env_u32(name: &'static str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name,
                reason: e.to_string(),
            }),
    }
}
