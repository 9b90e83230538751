//! Application-level configuration loading, including the match rules set.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::session::scoring::ScoringRules;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_DUEL_BACK_CONFIG_PATH";

const DEFAULT_BASE_POINTS: u32 = 100;
const DEFAULT_BONUS_RATE: f64 = 2.0;
const DEFAULT_GRACE_WINDOW_SECS: f64 = 2.0;
const DEFAULT_AUTO_START_DELAY_MS: u64 = 3_000;
const DEFAULT_COMPLETION_GRACE_SECS: u64 = 30;
const DEFAULT_SESSION_TTL_SECS: u64 = 3_600;
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_WORKER_CAPACITY: usize = 256;
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    scoring: ScoringRules,
    auto_start_delay: Duration,
    completion_grace: Duration,
    session_ttl: Duration,
    worker_count: usize,
    worker_capacity: usize,
    handshake_timeout: Duration,
    auth_secret: Option<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Scoring rules applied when grading a submission.
    pub fn scoring(&self) -> &ScoringRules {
        &self.scoring
    }

    /// Delay between "all players ready" and the actual match start.
    pub fn auto_start_delay(&self) -> Duration {
        self.auto_start_delay
    }

    /// How long a completed session lingers before being purged.
    pub fn completion_grace(&self) -> Duration {
        self.completion_grace
    }

    /// Time-to-live applied to every durable session write.
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Number of execution units spawned by the routing layer.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Maximum number of sessions a single execution unit may own.
    pub fn worker_capacity(&self) -> usize {
        self.worker_capacity
    }

    /// How long a fresh WebSocket connection may take to authenticate.
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Shared secret used to verify client tokens, if configured.
    pub fn auth_secret(&self) -> Option<&str> {
        self.auth_secret.as_deref()
    }

    /// Override the number of execution units.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Override the per-unit session capacity.
    pub fn with_worker_capacity(mut self, capacity: usize) -> Self {
        self.worker_capacity = capacity.max(1);
        self
    }

    /// Override the auto-start delay.
    pub fn with_auto_start_delay(mut self, delay: Duration) -> Self {
        self.auto_start_delay = delay;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringRules {
                base_points: DEFAULT_BASE_POINTS,
                bonus_rate: DEFAULT_BONUS_RATE,
                grace_window_secs: DEFAULT_GRACE_WINDOW_SECS,
            },
            auto_start_delay: Duration::from_millis(DEFAULT_AUTO_START_DELAY_MS),
            completion_grace: Duration::from_secs(DEFAULT_COMPLETION_GRACE_SECS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            worker_count: DEFAULT_WORKER_COUNT,
            worker_capacity: DEFAULT_WORKER_CAPACITY,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            auth_secret: None,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    base_points: Option<u32>,
    bonus_rate: Option<f64>,
    grace_window_secs: Option<f64>,
    auto_start_delay_ms: Option<u64>,
    completion_grace_secs: Option<u64>,
    session_ttl_secs: Option<u64>,
    worker_count: Option<usize>,
    worker_capacity: Option<usize>,
    handshake_timeout_secs: Option<u64>,
    auth_secret: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            scoring: ScoringRules {
                base_points: raw.base_points.unwrap_or(DEFAULT_BASE_POINTS),
                bonus_rate: raw.bonus_rate.unwrap_or(DEFAULT_BONUS_RATE),
                grace_window_secs: raw.grace_window_secs.unwrap_or(DEFAULT_GRACE_WINDOW_SECS),
            },
            auto_start_delay: raw
                .auto_start_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.auto_start_delay),
            completion_grace: raw
                .completion_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.completion_grace),
            session_ttl: raw
                .session_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            worker_count: raw.worker_count.unwrap_or(DEFAULT_WORKER_COUNT).max(1),
            worker_capacity: raw
                .worker_capacity
                .unwrap_or(DEFAULT_WORKER_CAPACITY)
                .max(1),
            handshake_timeout: raw
                .handshake_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.handshake_timeout),
            auth_secret: raw.auth_secret.filter(|secret| !secret.is_empty()),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_config_fills_missing_fields_with_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{"base_points": 250}"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.scoring().base_points, 250);
        assert_eq!(config.scoring().bonus_rate, DEFAULT_BONUS_RATE);
        assert_eq!(config.worker_count(), DEFAULT_WORKER_COUNT);
    }

    #[test]
    fn worker_counts_are_clamped_to_at_least_one() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"worker_count": 0, "worker_capacity": 0}"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.worker_count(), 1);
        assert_eq!(config.worker_capacity(), 1);
    }

    #[test]
    fn empty_auth_secret_is_treated_as_absent() {
        let raw: RawConfig = serde_json::from_str(r#"{"auth_secret": ""}"#).unwrap();
        let config: AppConfig = raw.into();

        assert!(config.auth_secret().is_none());
    }
}
