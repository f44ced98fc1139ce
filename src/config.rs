//! Session configuration.
//!
//! All fields have defaults; a partial JSON document overrides only what it
//! names:
//!
//! ```
//! use lremote_client::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::from_json(r#"{ "read_retry_limit": 5, "retry_interval_ms": 100 }"#).unwrap();
//! assert_eq!(config.read_retry_limit, 5);
//! assert_eq!(config.retry_interval, Duration::from_millis(100));
//! assert_eq!(config.label_placeholder, "No Name");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assembler::DEFAULT_LABEL_PLACEHOLDER;
use crate::fanout::DEFAULT_READ_RETRY_LIMIT;
use crate::writer::DEFAULT_WRITE_RETRY_LIMIT;

/// Default interval between retries of deferred reads and writes.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Default cap on interactions accepted but not yet written.
pub const DEFAULT_MAX_PENDING_INTERACTIONS: usize = 64;

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Times a failed descriptor read is retried before the session gives up.
    pub read_retry_limit: u32,
    /// Times a failed event write is resent before the event is dropped.
    pub write_retry_limit: u32,
    /// How often deferred reads and writes are retried.
    #[serde(rename = "retry_interval_ms", with = "millis")]
    pub retry_interval: Duration,
    /// Interactions accepted but not yet delivered before `report_interaction` returns `Busy`.
    pub max_pending_interactions: usize,
    /// Label used when the names blob has no entry for a control.
    pub label_placeholder: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_retry_limit: DEFAULT_READ_RETRY_LIMIT,
            write_retry_limit: DEFAULT_WRITE_RETRY_LIMIT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_pending_interactions: DEFAULT_MAX_PENDING_INTERACTIONS,
            label_placeholder: DEFAULT_LABEL_PLACEHOLDER.to_string(),
        }
    }
}

impl SessionConfig {
    /// Parse a (possibly partial) JSON document.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Retry interval clamped to at least one millisecond.
    pub(crate) fn effective_retry_interval(&self) -> Duration {
        self.retry_interval.max(Duration::from_millis(1))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.read_retry_limit, 3);
        assert_eq!(config.write_retry_limit, 2);
        assert_eq!(config.retry_interval, Duration::from_millis(250));
        assert_eq!(config.max_pending_interactions, 64);
        assert_eq!(config.label_placeholder, "No Name");
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(SessionConfig::from_json("{}").unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let config = SessionConfig {
            label_placeholder: "?".into(),
            retry_interval: Duration::from_millis(40),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"retry_interval_ms\":40"));
        assert_eq!(SessionConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_json() {
        assert!(SessionConfig::from_json(r#"{ "read_retry_limit": -1 }"#).is_err());
    }

    #[test]
    fn test_zero_interval_clamped() {
        let config = SessionConfig {
            retry_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.effective_retry_interval(), Duration::from_millis(1));
    }
}
