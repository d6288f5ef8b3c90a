//! Per-machine transition history.
//!
//! Each machine keeps an ordered log of the states it entered: one record for
//! the initial entry on `Start`, then one per state-to-state transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Record of a single entry into a state.
///
/// # Example
///
/// ```rust
/// use nestmachine::core::TransitionRecord;
/// use chrono::Utc;
/// use uuid::Uuid;
///
/// let record = TransitionRecord {
///     from: "Countdown".to_string(),
///     to: "Ignition".to_string(),
///     event: "Zero".to_string(),
///     activation: Uuid::new_v4(),
///     timestamp: Utc::now(),
/// };
/// assert_eq!(record.to, "Ignition");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state being left, or the machine itself for the initial entry
    pub from: String,
    /// The state being entered
    pub to: String,
    /// Name of the triggering event
    pub event: String,
    /// Identifies one activation of the owning machine
    pub activation: Uuid,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

/// Ordered log of a machine's transitions, across all of its activations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransitionLog {
    records: Vec<TransitionRecord>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn record(&mut self, record: TransitionRecord) {
        self.records.push(record);
    }

    /// Names of the states traversed: the first record's `from`, then the
    /// `to` of every record.
    ///
    /// # Example
    ///
    /// ```rust
    /// use nestmachine::core::{TransitionLog, TransitionRecord};
    /// use chrono::Utc;
    /// use uuid::Uuid;
    ///
    /// let activation = Uuid::new_v4();
    /// let mut log = TransitionLog::new();
    /// for (from, to) in [("Pad", "Countdown"), ("Countdown", "Ignition")] {
    ///     log.record(TransitionRecord {
    ///         from: from.to_string(),
    ///         to: to.to_string(),
    ///         event: "Next".to_string(),
    ///         activation,
    ///         timestamp: Utc::now(),
    ///     });
    /// }
    ///
    /// assert_eq!(log.get_path(), vec!["Pad", "Countdown", "Ignition"]);
    /// ```
    pub fn get_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        if let Some(first) = self.records.first() {
            path.push(first.from.as_str());
        }
        for record in &self.records {
            path.push(record.to.as_str());
        }
        path
    }

    /// Time between the first and the last record, `None` when empty.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.first()?, self.records.last()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    /// Records belonging to one activation of the machine.
    pub fn activation(&self, activation: Uuid) -> impl Iterator<Item = &TransitionRecord> {
        self.records
            .iter()
            .filter(move |record| record.activation == activation)
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: &str, to: &str, activation: Uuid) -> TransitionRecord {
        TransitionRecord {
            from: from.to_string(),
            to: to.to_string(),
            event: "Next".to_string(),
            activation,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_log_is_empty() {
        let log = TransitionLog::new();
        assert!(log.is_empty());
        assert!(log.get_path().is_empty());
        assert!(log.duration().is_none());
    }

    #[test]
    fn get_path_returns_state_sequence() {
        let run = Uuid::new_v4();
        let mut log = TransitionLog::new();
        log.record(record("Machine", "Idle", run));
        log.record(record("Idle", "Busy", run));

        assert_eq!(log.get_path(), vec!["Machine", "Idle", "Busy"]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn duration_spans_first_to_last() {
        let run = Uuid::new_v4();
        let mut log = TransitionLog::new();
        log.record(record("Machine", "Idle", run));
        std::thread::sleep(Duration::from_millis(10));
        log.record(record("Idle", "Busy", run));

        let duration = log.duration().unwrap();
        assert!(duration >= Duration::from_millis(10));
    }

    #[test]
    fn single_record_has_zero_duration() {
        let mut log = TransitionLog::new();
        log.record(record("Machine", "Idle", Uuid::new_v4()));

        assert_eq!(log.duration(), Some(Duration::from_secs(0)));
    }

    #[test]
    fn activation_filters_records() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut log = TransitionLog::new();
        log.record(record("Machine", "Idle", first));
        log.record(record("Machine", "Idle", second));
        log.record(record("Idle", "Busy", second));

        assert_eq!(log.activation(first).count(), 1);
        assert_eq!(log.activation(second).count(), 2);
    }

    #[test]
    fn log_serializes_correctly() {
        let mut log = TransitionLog::new();
        log.record(record("Machine", "Idle", Uuid::new_v4()));

        let json = serde_json::to_string(&log).unwrap();
        let restored: TransitionLog = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.records(), log.records());
    }
}
