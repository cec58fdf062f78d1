//! Reconciler configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ObservaError, ObservaResult};

/// Action stamped on observations produced from entity snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotAction {
    /// No explicit action: snapshot values accumulate as ranked evidence.
    #[default]
    Implicit,
    /// Explicit `set`: a higher-ranked snapshot supersedes lower ones per
    /// property.
    Set,
}

/// Configuration for a [`crate::Reconciler`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub snapshot_action: SnapshotAction,
    /// Used in place of a malformed date instead of failing.
    pub date_fallback: Option<DateTime<Utc>>,
    /// Seed for a private position counter. `None` shares the process-wide
    /// counter.
    pub start_position: Option<u64>,
}

impl ReconcilerConfig {
    /// Parses a JSON configuration document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ObservaError::InvalidConfig` if the document does not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use observa::{ReconcilerConfig, SnapshotAction};
    ///
    /// let config = ReconcilerConfig::from_json_str(r#"{"snapshot_action": "set"}"#).unwrap();
    /// assert_eq!(config.snapshot_action, SnapshotAction::Set);
    /// assert!(config.date_fallback.is_none());
    /// ```
    pub fn from_json_str(raw: &str) -> ObservaResult<Self> {
        serde_json::from_str(raw).map_err(|e| ObservaError::InvalidConfig {
            message: e.to_string(),
        })
    }

    #[must_use]
    pub fn with_snapshot_action(mut self, action: SnapshotAction) -> Self {
        self.snapshot_action = action;
        self
    }

    #[must_use]
    pub fn with_date_fallback(mut self, fallback: DateTime<Utc>) -> Self {
        self.date_fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn with_start_position(mut self, start: u64) -> Self {
        self.start_position = Some(start);
        self
    }
}
