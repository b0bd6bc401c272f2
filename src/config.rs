//! Engine configuration.
//!
//! Settings are resolved in three layers, later layers winning:
//! 1. Built-in defaults
//! 2. TOML file — an explicit path, or `~/.muninn/config.toml` if present
//! 3. Environment overrides, recognised keys only:
//!    `CACHE_TTL_SECONDS`, `MEMORY_PRESSURE_THRESHOLD_PCT`,
//!    `MONITORING_INTERVAL_FLOOR_SECONDS`, `MONITORING_INTERVAL_CEILING_SECONDS`,
//!    `DEEP_CLEANUP_TICK_MULTIPLIER`, `ENABLE_CACHING`, `ENABLE_CONTEXT_TRUNCATION`
//!
//! No on-disk state is ever written; settings are read once at engine
//! construction and shared immutably afterwards.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{MuninnError, Result};

/// Tunables for caching, truncation, and the maintenance scheduler.
///
/// The numeric defaults are deliberately configuration, not contract:
/// only relative behavior (floor ≤ interval ≤ ceiling, threshold in
/// 0–100) is enforced.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizationSettings {
    /// Keep warm backend handles between requests (default: true).
    /// When false every request bypasses the cache and loads fresh.
    #[serde(default = "default_true")]
    pub enable_caching: bool,

    /// Shrink oversized prompts to the chosen backend's limit
    /// (default: true). Disable to exercise raw backend limits.
    #[serde(default = "default_true")]
    pub enable_context_truncation: bool,

    /// Age after which an unused warm handle is evicted even without
    /// memory pressure (default: 600).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Used-memory percentage above which pressure eviction sweeps run
    /// (default: 75.0).
    #[serde(default = "default_pressure_threshold")]
    pub memory_pressure_threshold_pct: f64,

    /// Fraction of available memory the cache may claim for warm handles
    /// (default: 80.0).
    #[serde(default = "default_headroom")]
    pub cache_headroom_pct: f64,

    /// Shortest maintenance tick interval, used while a session is young
    /// (default: 30).
    #[serde(default = "default_interval_floor")]
    pub monitoring_interval_floor_seconds: u64,

    /// Longest maintenance tick interval, used once a session is
    /// long-running (default: 300).
    #[serde(default = "default_interval_ceiling")]
    pub monitoring_interval_ceiling_seconds: u64,

    /// Run the deep cleanup (pressure sweep + reclaim hint) every Nth
    /// tick (default: 4).
    #[serde(default = "default_deep_cleanup_multiplier")]
    pub deep_cleanup_tick_multiplier: u64,

    /// Session age after which a one-time reset advisory is emitted
    /// (default: 14400 = 4 h).
    #[serde(default = "default_long_session_warning")]
    pub long_session_warning_seconds: u64,

    /// Per-invocation deadline; a timeout advances the fallback chain
    /// (default: 30).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            enable_caching: default_true(),
            enable_context_truncation: default_true(),
            cache_ttl_seconds: default_cache_ttl(),
            memory_pressure_threshold_pct: default_pressure_threshold(),
            cache_headroom_pct: default_headroom(),
            monitoring_interval_floor_seconds: default_interval_floor(),
            monitoring_interval_ceiling_seconds: default_interval_ceiling(),
            deep_cleanup_tick_multiplier: default_deep_cleanup_multiplier(),
            long_session_warning_seconds: default_long_session_warning(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    600
}

fn default_pressure_threshold() -> f64 {
    75.0
}

fn default_headroom() -> f64 {
    80.0
}

fn default_interval_floor() -> u64 {
    30
}

fn default_interval_ceiling() -> u64 {
    300
}

fn default_deep_cleanup_multiplier() -> u64 {
    4
}

fn default_long_session_warning() -> u64 {
    4 * 60 * 60
}

fn default_request_timeout() -> u64 {
    30
}

/// Recognised environment keys, paired with the field they override.
const ENV_KEYS: &[&str] = &[
    "CACHE_TTL_SECONDS",
    "MEMORY_PRESSURE_THRESHOLD_PCT",
    "MONITORING_INTERVAL_FLOOR_SECONDS",
    "MONITORING_INTERVAL_CEILING_SECONDS",
    "DEEP_CLEANUP_TICK_MULTIPLIER",
    "ENABLE_CACHING",
    "ENABLE_CONTEXT_TRUNCATION",
];

impl OptimizationSettings {
    /// Load settings from the standard locations and apply env overrides.
    ///
    /// Resolution order:
    /// 1. Explicit path (must exist if provided)
    /// 2. `~/.muninn/config.toml` (if present)
    /// 3. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut settings = match Self::resolve_config_path(explicit_path)? {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    MuninnError::Configuration(format!("failed to read config file {path:?}: {e}"))
                })?;
                toml::from_str(&content).map_err(|e| {
                    MuninnError::Configuration(format!("failed to parse config file {path:?}: {e}"))
                })?
            }
            None => Self::default(),
        };
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MuninnError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".muninn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // No file is fine — defaults apply
        Ok(None)
    }

    /// Apply overrides from the recognised environment keys.
    ///
    /// Unset keys leave the current value untouched; a set-but-unparseable
    /// value is a configuration error rather than a silent fallback.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        for key in ENV_KEYS {
            let Ok(raw) = std::env::var(key) else {
                continue;
            };
            match *key {
                "CACHE_TTL_SECONDS" => self.cache_ttl_seconds = parse_env(key, &raw)?,
                "MEMORY_PRESSURE_THRESHOLD_PCT" => {
                    self.memory_pressure_threshold_pct = parse_env(key, &raw)?;
                }
                "MONITORING_INTERVAL_FLOOR_SECONDS" => {
                    self.monitoring_interval_floor_seconds = parse_env(key, &raw)?;
                }
                "MONITORING_INTERVAL_CEILING_SECONDS" => {
                    self.monitoring_interval_ceiling_seconds = parse_env(key, &raw)?;
                }
                "DEEP_CLEANUP_TICK_MULTIPLIER" => {
                    self.deep_cleanup_tick_multiplier = parse_env(key, &raw)?;
                }
                "ENABLE_CACHING" => self.enable_caching = parse_env(key, &raw)?,
                "ENABLE_CONTEXT_TRUNCATION" => {
                    self.enable_context_truncation = parse_env(key, &raw)?;
                }
                _ => unreachable!("key list and match arms are maintained together"),
            }
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.memory_pressure_threshold_pct) {
            return Err(MuninnError::Configuration(format!(
                "memory_pressure_threshold_pct must be within 0–100, got {}",
                self.memory_pressure_threshold_pct
            )));
        }
        if !(0.0..=100.0).contains(&self.cache_headroom_pct) {
            return Err(MuninnError::Configuration(format!(
                "cache_headroom_pct must be within 0–100, got {}",
                self.cache_headroom_pct
            )));
        }
        if self.monitoring_interval_floor_seconds > self.monitoring_interval_ceiling_seconds {
            return Err(MuninnError::Configuration(format!(
                "monitoring interval floor ({}) exceeds ceiling ({})",
                self.monitoring_interval_floor_seconds, self.monitoring_interval_ceiling_seconds
            )));
        }
        if self.deep_cleanup_tick_multiplier == 0 {
            return Err(MuninnError::Configuration(
                "deep_cleanup_tick_multiplier must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// TTL for warm handles.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Scheduler interval floor.
    pub fn interval_floor(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_floor_seconds)
    }

    /// Scheduler interval ceiling.
    pub fn interval_ceiling(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_ceiling_seconds)
    }

    /// Session age that triggers the one-time reset advisory.
    pub fn long_session_warning(&self) -> Duration {
        Duration::from_secs(self.long_session_warning_seconds)
    }

    /// Per-invocation deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        MuninnError::Configuration(format!("invalid value for {key}: {raw:?}"))
    })
}
