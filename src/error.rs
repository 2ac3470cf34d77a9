// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Only `ConfigurationInvalid` (and `ParameterUnavailable` during start-up) is
// allowed to stop the process. Everything else is logged by the engine and the
// poll loop moves on to the next bar or cycle.
// =============================================================================

use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Candle source returned nothing usable.
    #[error("candle data unavailable: {reason}")]
    DataUnavailable { reason: String },

    /// Optimizer produced no parameter set.
    #[error("no viable parameter set after {attempts} attempt(s)")]
    ParameterUnavailable { attempts: u32 },

    /// Adapter failure, non-2xx response, or a duplicate signal.
    #[error("{action} rejected: {reason}")]
    OrderRejected { action: &'static str, reason: String },

    /// Candle predates the moment the engine started trading.
    #[error("stale {action} signal at {candle_time}: trading started at {trading_start}")]
    StaleSignal {
        action: &'static str,
        candle_time: DateTime<Utc>,
        trading_start: DateTime<Utc>,
    },

    #[error("invalid configuration for {field}: {reason}")]
    ConfigurationInvalid { field: &'static str, reason: String },

    /// Shutdown was requested while waiting.
    #[error("engine shutdown requested")]
    Cancelled,
}

impl EngineError {
    pub fn rejected(action: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::OrderRejected {
            action,
            reason: reason.to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ConfigurationInvalid {
            field,
            reason: reason.into(),
        }
    }

    /// Errors that must stop the engine before (or instead of) trading.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationInvalid { .. } | Self::ParameterUnavailable { .. } | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_names_action() {
        let err = EngineError::rejected("buy", "HTTP 503");
        assert_eq!(err.to_string(), "buy rejected: HTTP 503");
        assert!(!err.is_fatal());
    }

    #[test]
    fn configuration_errors_are_fatal() {
        assert!(EngineError::invalid("duration", "unknown label").is_fatal());
        assert!(!EngineError::DataUnavailable { reason: "empty".into() }.is_fatal());
    }
}
