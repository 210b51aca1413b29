//! Configuration
//!
//! One TOML file covers both processes. Every field has a default so a partial
//! (or absent) file is valid; environment overrides are applied last.

use crate::error::FluxError;
use crate::smoothing::{DEFAULT_PRECISION, DEFAULT_WINDOW, MAX_PRECISION};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up by the CLI
pub const DEFAULT_CONFIG_PATH: &str = "flux.toml";

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FluxConfig {
    pub log: LogConfig,
    pub capture: CaptureConfig,
    pub sync: SyncConfig,
    pub biometric: BiometricConfig,
}

impl FluxConfig {
    /// Load config from a TOML file, then apply env overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FluxError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FluxError::Config(format!(
                "cannot read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse config from TOML text without env overrides
    pub fn from_toml(content: &str) -> Result<Self, FluxError> {
        let config: FluxConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load from path; fall back to defaults (with env overrides) on failure
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config not loaded ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn validate(&self) -> Result<(), FluxError> {
        if !self.capture.window.is_finite() || self.capture.window <= 0.0 {
            return Err(FluxError::InvalidWindow(self.capture.window));
        }
        if self.capture.precision > MAX_PRECISION {
            return Err(FluxError::Config(format!(
                "capture.precision must be at most {}",
                MAX_PRECISION
            )));
        }
        if self.capture.heart_rate_every == 0 {
            return Err(FluxError::Config(
                "capture.heart_rate_every must be at least 1".to_string(),
            ));
        }
        if !self.sync.poll_interval_secs.is_finite() || self.sync.poll_interval_secs <= 0.0 {
            return Err(FluxError::Config(
                "sync.poll_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FLUX_LOG_PATH") {
            self.log.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FLUX_SYNC_ENDPOINT") {
            self.sync.endpoint = v;
        }
        if let Ok(v) = std::env::var("FLUX_CLIENT_ID") {
            self.biometric.client_id = v;
        }
        if let Ok(v) = std::env::var("FLUX_CLIENT_SECRET") {
            self.biometric.client_secret = v;
        }
        if let Ok(v) = std::env::var("FLUX_TOKEN_STORE") {
            self.biometric.token_store = PathBuf::from(v);
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Append-only CSV shared by the capture and sync processes
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("valence_data.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// EWMA window (span)
    pub window: f64,
    /// Sampling ticks between heart-rate polls
    pub heart_rate_every: u64,
    /// Decimal digits persisted for smoothed valence
    pub precision: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            heart_rate_every: 10,
            precision: DEFAULT_PRECISION,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub endpoint: String,
    pub poll_interval_secs: f64,
    pub csrf_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Cookie carrying the anti-forgery token on the bootstrap GET
    pub csrf_cookie: String,
    /// Header that echoes the anti-forgery token on POSTs
    pub csrf_header: String,
    /// Extra static headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs.max(0.0))
    }

    pub fn csrf_timeout(&self) -> Duration {
        Duration::from_secs(self.csrf_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/api/external-api".to_string(),
            poll_interval_secs: 1.0,
            csrf_timeout_secs: 5,
            request_timeout_secs: 5,
            csrf_cookie: "XSRF-TOKEN".to_string(),
            csrf_header: "X-XSRF-TOKEN".to_string(),
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BiometricConfig {
    pub enabled: bool,
    pub api_base: String,
    pub heart_rate_path: String,
    pub token_path: String,
    pub client_id: String,
    pub client_secret: String,
    /// Two-line text file holding the current access/refresh tokens
    pub token_store: PathBuf,
    pub timeout_secs: u64,
    /// Upper bound on ticks skipped after repeated refresh failures
    pub max_backoff_ticks: u32,
}

impl BiometricConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BiometricConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.fitbit.com".to_string(),
            heart_rate_path: "/1/user/-/activities/heart/date/today/1d/1min.json".to_string(),
            token_path: "/oauth2/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            token_store: PathBuf::from("tokens.txt"),
            timeout_secs: 5,
            max_backoff_ticks: 32,
        }
    }
}
