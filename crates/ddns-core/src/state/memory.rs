// # Memory Settings Store
//
// In-memory implementation of SettingsStore.
//
// ## Purpose
//
// Holds configuration and update record for the lifetime of the process.
// Useful for testing and for deployments that pass the configuration in on
// every start.
//
// ## Crash Behavior
//
// - Everything is lost on restart
// - The first cycle after a restart is a FirstRun and calls the provider

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::Error;
use crate::config::Configuration;
use crate::traits::settings_store::{SettingsSnapshot, SettingsStore, UpdateRecord};

/// In-memory settings store
///
/// Clones share the same underlying state.
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::state::MemorySettingsStore;
/// use ddns_core::traits::SettingsStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySettingsStore::new();
///
///     let snapshot = store.snapshot().await?;
///     assert!(snapshot.configuration.is_none());
///     assert!(snapshot.record.is_first_run());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<Mutex<SettingsSnapshot>>,
}

impl MemorySettingsStore {
    /// Create an empty store (no configuration, first-run record)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given configuration at revision 1
    ///
    /// The configuration is stored as-is; the engine validates it per cycle.
    pub fn with_configuration(configuration: Configuration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SettingsSnapshot {
                configuration: Some(configuration),
                revision: 1,
                record: UpdateRecord::default(),
            })),
        }
    }

    /// Current update record
    pub async fn record(&self) -> UpdateRecord {
        self.inner.lock().await.record.clone()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn snapshot(&self) -> Result<SettingsSnapshot, Error> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save_configuration(&self, configuration: &Configuration) -> Result<u64, Error> {
        configuration.validate()?;

        let mut guard = self.inner.lock().await;
        guard.configuration = Some(configuration.clone());
        guard.revision += 1;
        Ok(guard.revision)
    }

    async fn save_record(&self, record: &UpdateRecord) -> Result<(), Error> {
        self.inner.lock().await.record = record.clone();
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing to persist
        Ok(())
    }
}
