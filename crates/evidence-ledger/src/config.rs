//! Writer configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Start of the logical clock when none is configured: 2026-02-07T08:00:00Z.
pub const DEFAULT_START_SECS: i64 = 1_770_451_200;

/// Configuration for an [`crate::EvidenceWriter`].
///
/// Every value that influences a hash lives here, so two writers with the
/// same configuration and the same actions produce byte-identical bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Run identifier copied into every receipt.
    pub run_id: String,
    /// First instant of the logical clock.
    pub start_time: DateTime<Utc>,
    /// Fixed gap added after every action, on top of its duration.
    pub step_gap_ms: u64,
    /// Duration recorded when an action does not report one.
    pub default_duration_ms: u64,
    /// Actor recorded as creator of receipts and policy records.
    pub issuer_id: String,
}

impl WriterConfig {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Self::default()
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            run_id: "run-0001".to_string(),
            start_time: DateTime::<Utc>::from_timestamp(DEFAULT_START_SECS, 0).unwrap_or_default(),
            step_gap_ms: 50,
            default_duration_ms: 100,
            issuer_id: "service:ledger".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_start_time() {
        let config = WriterConfig::default();
        assert_eq!(config.start_time.to_rfc3339(), "2026-02-07T08:00:00+00:00");
        assert_eq!(config.step_gap_ms, 50);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: WriterConfig = serde_json::from_str(r#"{"run_id":"run-42"}"#).unwrap();
        assert_eq!(config, WriterConfig::new("run-42"));
    }
}
