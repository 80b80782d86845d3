// # Settings Store Trait
//
// Defines the interface for the component that exclusively owns the user
// configuration and the update record.
//
// ## Purpose
//
// The update record makes cycles idempotent by tracking:
// - The last successfully published address
// - Timestamps of the last success and the last attempt
// - The outcome of the last cycle, and any rejection waiting for the user
//
// Every other component works on a read-only [`SettingsSnapshot`] taken at
// the start of a cycle.
//
// ## Implementations
//
// - File-based: single JSON document with atomic replace
// - In-memory: tests and ephemeral deployments

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::config::Configuration;

/// Outcome of the last cycle that reached the change detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The provider accepted the new address
    Success,
    /// The provider call failed or was refused
    Failure,
    /// The address matched the published one; nothing was sent
    Unchanged,
}

/// A provider refusal waiting for the user's attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// What the provider said
    pub reason: String,
    /// When the refusal happened
    pub at: DateTime<Utc>,
    /// Configuration revision the refusal applies to
    pub config_revision: u64,
}

/// Update record
///
/// Created empty on first run, overwritten after cycles, never deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    /// The last address the provider accepted
    #[serde(default)]
    pub last_address: Option<IpAddr>,

    /// Timestamp of the last successful publish
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,

    /// Timestamp of the last provider call, successful or not
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,

    /// Outcome of the last completed cycle
    #[serde(default)]
    pub last_outcome: Option<Outcome>,

    /// Pending rejection (cleared by the next successful publish)
    #[serde(default)]
    pub rejection: Option<Rejection>,
}

impl UpdateRecord {
    /// Whether nothing has ever been published
    pub fn is_first_run(&self) -> bool {
        self.last_address.is_none()
    }

    /// Whether a rejection is held against the given configuration revision
    pub fn is_held(&self, revision: u64) -> bool {
        self.rejection
            .as_ref()
            .is_some_and(|rejection| rejection.config_revision == revision)
    }
}

/// Consistent view of everything the settings store owns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Current configuration, if one was ever saved
    #[serde(default)]
    pub configuration: Option<Configuration>,

    /// Incremented on every configuration save
    #[serde(default)]
    pub revision: u64,

    /// Update record
    #[serde(default)]
    pub record: UpdateRecord,
}

/// Trait for settings store implementations
///
/// # Thread Safety
///
/// Reads and writes are serialized: a running cycle and a concurrent user edit
/// never observe or produce a half-applied state. Each write replaces either
/// the configuration or the record, never both.
///
/// # Durability
///
/// Persistent implementations must make writes atomic: a crash in the middle
/// of a write leaves either the old or the new document, never a partial one.
///
/// # Errors
///
/// Failures are reported as [`crate::Error::Settings`], which the engine
/// treats as fatal.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Atomically read configuration, revision and update record
    async fn snapshot(&self) -> Result<SettingsSnapshot, crate::Error>;

    /// Validate and store a configuration
    ///
    /// # Returns
    ///
    /// The new configuration revision.
    async fn save_configuration(&self, configuration: &Configuration) -> Result<u64, crate::Error>;

    /// Replace the update record
    async fn save_record(&self, record: &UpdateRecord) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_is_first_run() {
        let record = UpdateRecord::default();
        assert!(record.is_first_run());
        assert!(!record.is_held(0));
    }

    #[test]
    fn test_hold_is_tied_to_revision() {
        let record = UpdateRecord {
            rejection: Some(Rejection {
                reason: "badauth".to_string(),
                at: Utc::now(),
                config_revision: 3,
            }),
            ..UpdateRecord::default()
        };

        assert!(record.is_held(3));
        assert!(!record.is_held(4));
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let record = UpdateRecord {
            last_address: Some("1.2.3.4".parse().unwrap()),
            last_success: Some(Utc::now()),
            last_attempt: Some(Utc::now()),
            last_outcome: Some(Outcome::Success),
            rejection: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"success\""));
        let parsed: UpdateRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
