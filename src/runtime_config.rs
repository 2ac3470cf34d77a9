// =============================================================================
// Engine Configuration: JSON settings with env overrides and atomic save
// =============================================================================
//
// Every field carries `#[serde(default)]` so an older or partial config file
// still loads. Credentials are never stored here; they come from the
// environment only (FUSION_API_KEY / FUSION_API_SECRET).
//
// `validate()` must pass before the engine is built.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::EngineSettings;
use crate::error::EngineError;
use crate::exchange::client::{DEFAULT_PRIVATE_URL, DEFAULT_PUBLIC_URL};
use crate::reoptimize::RetryPolicy;
use crate::signals::confidence_gate::DEFAULT_MIN_CORROBORATION;
use crate::signals::FusionPolicy;
use crate::types::{duration_seconds, CandleDuration, ExecutionMode};

pub const DEFAULT_CONFIG_PATH: &str = "engine_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_product_code() -> String {
    "BTC_JPY".to_string()
}

fn default_market_symbol() -> String {
    "BTC".to_string()
}

fn default_duration() -> String {
    "1m".to_string()
}

fn default_use_percent() -> f64 {
    0.9
}

fn default_past_period() -> usize {
    365
}

fn default_stop_limit_percent() -> f64 {
    0.9
}

fn default_min_corroboration() -> u32 {
    DEFAULT_MIN_CORROBORATION
}

fn default_public_url() -> String {
    DEFAULT_PUBLIC_URL.to_string()
}

fn default_private_url() -> String {
    DEFAULT_PRIVATE_URL.to_string()
}

fn default_size_step() -> f64 {
    0.01
}

fn default_trade_log_path() -> String {
    "trades.jsonl".to_string()
}

fn default_backtest_cash() -> f64 {
    1_000_000.0
}

// =============================================================================
// EngineConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Instrument ---------------------------------------------------------

    /// Symbol orders and positions are placed on.
    #[serde(default = "default_product_code")]
    pub product_code: String,

    /// Symbol the kline endpoint is queried with.
    #[serde(default = "default_market_symbol")]
    pub market_symbol: String,

    /// Candle width label: "1m", "5m" or "1h".
    #[serde(default = "default_duration")]
    pub duration: String,

    // --- Trading ------------------------------------------------------------

    /// Fraction of available balance committed per entry (0 < f <= 1).
    #[serde(default = "default_use_percent")]
    pub use_percent: f64,

    /// Candles fetched per cycle and per optimization.
    #[serde(default = "default_past_period")]
    pub past_period: usize,

    /// Stop = entry * this (0 < m < 1).
    #[serde(default = "default_stop_limit_percent")]
    pub stop_limit_percent: f64,

    /// Simulate fills instead of trading.
    #[serde(default = "default_true")]
    pub back_test: bool,

    /// Simulator starting cash.
    #[serde(default = "default_backtest_cash")]
    pub backtest_cash: f64,

    // --- Signal fusion ------------------------------------------------------

    #[serde(default)]
    pub fusion_policy: FusionPolicy,

    /// Families that must fire together under the confidence gate.
    #[serde(default = "default_min_corroboration")]
    pub min_corroboration: u32,

    #[serde(default)]
    pub reoptimize: RetryPolicy,

    // --- Exchange -----------------------------------------------------------

    #[serde(default = "default_public_url")]
    pub public_url: String,

    #[serde(default = "default_private_url")]
    pub private_url: String,

    /// Order size granularity.
    #[serde(default = "default_size_step")]
    pub size_step: f64,

    // --- Persistence --------------------------------------------------------

    #[serde(default = "default_trade_log_path")]
    pub trade_log_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            product_code: default_product_code(),
            market_symbol: default_market_symbol(),
            duration: default_duration(),
            use_percent: default_use_percent(),
            past_period: default_past_period(),
            stop_limit_percent: default_stop_limit_percent(),
            back_test: true,
            backtest_cash: default_backtest_cash(),
            fusion_policy: FusionPolicy::default(),
            min_corroboration: default_min_corroboration(),
            reoptimize: RetryPolicy::default(),
            public_url: default_public_url(),
            private_url: default_private_url(),
            size_step: default_size_step(),
            trade_log_path: default_trade_log_path(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            product_code = %config.product_code,
            duration = %config.duration,
            back_test = config.back_test,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "engine config not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Persist using an atomic write (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Apply FUSION_* overrides through `lookup` (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(code) = lookup("FUSION_PRODUCT_CODE") {
            self.product_code = code;
        }
        if let Some(duration) = lookup("FUSION_DURATION") {
            self.duration = duration;
        }
        if let Some(raw) = lookup("FUSION_BACK_TEST") {
            self.back_test = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(EngineError::invalid(
                        "back_test",
                        format!("FUSION_BACK_TEST must be true or false, got '{other}'"),
                    ))
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if duration_seconds(&self.duration) == 0 {
            return Err(EngineError::invalid(
                "duration",
                format!("'{}' is not one of 1m, 5m, 1h", self.duration),
            ));
        }
        if !(self.use_percent > 0.0 && self.use_percent <= 1.0) {
            return Err(EngineError::invalid(
                "use_percent",
                format!("{} is outside (0, 1]", self.use_percent),
            ));
        }
        if !(self.stop_limit_percent > 0.0 && self.stop_limit_percent < 1.0) {
            return Err(EngineError::invalid(
                "stop_limit_percent",
                format!("{} is outside (0, 1)", self.stop_limit_percent),
            ));
        }
        if self.past_period < 2 {
            return Err(EngineError::invalid("past_period", "need at least 2 candles"));
        }
        if self.product_code.trim().is_empty() {
            return Err(EngineError::invalid("product_code", "must not be empty"));
        }
        if self.size_step <= 0.0 {
            return Err(EngineError::invalid("size_step", "must be positive"));
        }
        if self.reoptimize.max_attempts == Some(0) {
            return Err(EngineError::invalid("reoptimize.max_attempts", "must be at least 1"));
        }
        if self.reoptimize.backoff_multiplier == 0 {
            return Err(EngineError::invalid(
                "reoptimize.backoff_multiplier",
                "must be at least 1 candle duration",
            ));
        }
        Ok(())
    }

    pub fn candle_duration(&self) -> Result<CandleDuration, EngineError> {
        CandleDuration::parse(&self.duration)
            .ok_or_else(|| EngineError::invalid("duration", format!("unknown label '{}'", self.duration)))
    }

    pub fn engine_settings(&self) -> Result<EngineSettings, EngineError> {
        Ok(EngineSettings {
            instrument: self.product_code.clone(),
            duration: self.candle_duration()?,
            past_period: self.past_period,
            use_percent: self.use_percent,
            stop_limit_percent: self.stop_limit_percent,
            mode: ExecutionMode::from_back_test(self.back_test),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.product_code, "BTC_JPY");
        assert_eq!(cfg.duration, "1m");
        assert!(cfg.back_test);
        assert_eq!(cfg.fusion_policy, FusionPolicy::VoteCount);
        assert_eq!(cfg.min_corroboration, 2);
        assert_eq!(cfg.reoptimize.backoff_multiplier, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.past_period, 365);
        assert!((cfg.use_percent - 0.9).abs() < f64::EPSILON);
        assert!((cfg.stop_limit_percent - 0.9).abs() < f64::EPSILON);
        assert_eq!(cfg.trade_log_path, "trades.jsonl");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "duration": "5m", "fusion_policy": "confidence_gate", "reoptimize": { "max_attempts": null } }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.candle_duration().unwrap(), CandleDuration::FiveMinutes);
        assert_eq!(cfg.fusion_policy, FusionPolicy::ConfidenceGate);
        assert_eq!(cfg.reoptimize.max_attempts, None);
        assert_eq!(cfg.reoptimize.backoff_multiplier, 10);
    }

    #[test]
    fn unknown_duration_is_rejected() {
        let cfg = EngineConfig {
            duration: "15m".into(),
            ..EngineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, EngineError::ConfigurationInvalid { field: "duration", .. }));
    }

    #[test]
    fn percentages_are_bounded() {
        let mut cfg = EngineConfig::default();
        cfg.use_percent = 1.0;
        assert!(cfg.validate().is_ok());
        cfg.use_percent = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.stop_limit_percent = 1.0;
        assert!(matches!(
            cfg.validate(),
            Err(EngineError::ConfigurationInvalid { field: "stop_limit_percent", .. })
        ));
    }

    #[test]
    fn zero_backoff_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.reoptimize.max_attempts = None;
        assert!(cfg.validate().is_ok());

        cfg.reoptimize.backoff_multiplier = 0;
        assert!(matches!(
            cfg.validate(),
            Err(EngineError::ConfigurationInvalid { field: "reoptimize.backoff_multiplier", .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(env(&[
            ("FUSION_PRODUCT_CODE", "ETH_JPY"),
            ("FUSION_DURATION", "1h"),
            ("FUSION_BACK_TEST", "false"),
        ]))
        .unwrap();
        assert_eq!(cfg.product_code, "ETH_JPY");
        assert_eq!(cfg.duration, "1h");
        assert!(!cfg.back_test);

        let settings = cfg.engine_settings().unwrap();
        assert_eq!(settings.mode, ExecutionMode::Live);
        assert_eq!(settings.duration, CandleDuration::OneHour);
    }

    #[test]
    fn bad_back_test_override_is_invalid() {
        let mut cfg = EngineConfig::default();
        let err = cfg
            .apply_overrides(env(&[("FUSION_BACK_TEST", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, EngineError::ConfigurationInvalid { field: "back_test", .. }));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine_config.json");
        let mut cfg = EngineConfig::default();
        cfg.past_period = 120;
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.past_period, 120);
        assert!(!dir.path().join("engine_config.json.tmp").exists());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg.product_code, "BTC_JPY");
    }
}
