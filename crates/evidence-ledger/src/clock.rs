//! The logical clock.
//!
//! Timestamps are derived, not read from the wall clock: each action
//! advances time by its duration plus a fixed gap. Reruns of the same
//! actions therefore reproduce every timestamp, seed, and hash.

use chrono::{DateTime, Duration, Utc};

use evidence_ledger_core::{LedgerEntry, StructuralViolation, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalClock {
    now: DateTime<Utc>,
    step_gap_ms: u64,
}

impl LogicalClock {
    pub fn new(start: DateTime<Utc>, step_gap_ms: u64) -> Self {
        Self {
            now: start,
            step_gap_ms,
        }
    }

    /// Continue after the last persisted entry.
    pub fn after(
        entry: &LedgerEntry,
        step_gap_ms: u64,
    ) -> Result<Self, StructuralViolation> {
        let start = entry
            .timestamp
            .parse()
            .ok_or_else(|| StructuralViolation::MalformedTimestamp {
                location: format!("ledger entry {}", entry.seq),
                value: entry.timestamp.to_string(),
            })?;
        let mut clock = Self::new(start, step_gap_ms);
        clock.advance(entry.duration_ms);
        Ok(clock)
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::from_datetime(self.now)
    }

    /// Move past an action of the given duration.
    pub fn advance(&mut self, duration_ms: u64) {
        let step = duration_ms.saturating_add(self.step_gap_ms);
        let step = Duration::milliseconds(i64::try_from(step).unwrap_or(i64::MAX));
        self.now = self
            .now
            .checked_add_signed(step)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}
