//! Small value types shared by ledger entries, receipts, and the manifest.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity performing an action. Reference data; the ledger only copies
/// its id and type into each entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(rename = "type")]
    pub actor_type: String,
    pub name: String,
}

impl Actor {
    pub fn new(
        id: impl Into<String>,
        actor_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            actor_type: actor_type.into(),
            name: name.into(),
        }
    }
}

/// Outcome of a policy gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDecision {
    Allow,
    Flag,
    Deny,
}

impl PolicyDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyDecision::Allow => "allow",
            PolicyDecision::Flag => "flag",
            PolicyDecision::Deny => "deny",
        }
    }
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RFC 3339 timestamp kept as the exact text that was stored.
///
/// Hashes are computed over the stored text, so the value is never
/// re-rendered after parsing. Well-formedness is checked during structural
/// validation, not at deserialization, so that a malformed value surfaces as
/// a structural violation with its location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Render a UTC instant with millisecond precision and a `Z` suffix.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Wrap stored text without validating it.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the stored text, if it is valid RFC 3339.
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn is_well_formed(&self) -> bool {
        self.parse().is_some()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_millis_format() {
        let dt = DateTime::<Utc>::from_timestamp(1_770_451_200, 50_000_000).unwrap();
        let ts = Timestamp::from_datetime(dt);
        assert_eq!(ts.as_str(), "2026-02-07T08:00:00.050Z");
        assert_eq!(ts.parse(), Some(dt));
    }

    #[test]
    fn test_timestamp_malformed() {
        assert!(!Timestamp::from_raw("yesterday").is_well_formed());
        assert!(Timestamp::from_raw("2026-02-07T08:00:00+01:00").is_well_formed());
    }

    #[test]
    fn test_actor_type_field_name() {
        let actor = Actor::new("tool:executor", "tool", "CodeExecutor");
        let json = serde_json::to_value(&actor).unwrap();
        assert_eq!(json["type"], "tool");
    }

    #[test]
    fn test_policy_decision_lowercase() {
        let json = serde_json::to_string(&PolicyDecision::Deny).unwrap();
        assert_eq!(json, "\"deny\"");
    }
}
