// # File Settings Store
//
// File-based implementation of SettingsStore with crash recovery.
//
// ## Purpose
//
// Keeps the user's configuration and the update record across restarts, so
// an unchanged address is not re-published after a reboot.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename, the document is never half-written
// - Backup: the previous document is kept as `.backup`
// - Recovery: a corrupted document is replaced by the backup on open
// - If neither is readable the store refuses to open (fatal)
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "configuration": {
//     "provider": {
//       "endpoint_template": "https://api2.sitelutions.com/dnsup?user={username}&pass={credential}&id={record_id}&ip={address}&ttl={ttl}",
//       "username": "me@example.net",
//       "credential": "...",
//       "record_id": "12345",
//       "ttl": 60
//     },
//     "hostname": "home.example.net",
//     "interval_secs": 3600,
//     "enabled": true
//   },
//   "revision": 3,
//   "record": {
//     "last_address": "1.2.3.4",
//     "last_success": "2025-01-09T12:00:00Z",
//     "last_attempt": "2025-01-09T12:00:00Z",
//     "last_outcome": "success",
//     "rejection": null
//   }
// }
// ```
//
// The credential is stored in clear; on Unix the file is created with mode 0600.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::config::Configuration;
use crate::traits::settings_store::{SettingsSnapshot, SettingsStore, UpdateRecord};

/// Settings file format version
const SETTINGS_FILE_VERSION: &str = "1.0";

/// File-based settings store with crash recovery
///
/// Every write replaces the whole document. Writers are serialized by a
/// single mutex, which also guards the in-memory copy served by `snapshot()`.
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::state::FileSettingsStore;
/// use ddns_core::traits::SettingsStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSettingsStore::open("/var/lib/ddns/settings.json").await?;
///
///     let snapshot = store.snapshot().await?;
///     println!("last published: {:?}", snapshot.record.last_address);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    /// Last state known to be on disk
    snapshot: SettingsSnapshot,
    /// A write started but did not complete; the file may not match `snapshot`
    dirty: bool,
}

/// Serializable settings file format
#[derive(Debug, Serialize, Deserialize)]
struct SettingsDocument {
    version: String,
    #[serde(flatten)]
    snapshot: SettingsSnapshot,
}

impl FileSettingsStore {
    /// Open or create a settings store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the settings file (a missing file means first run)
    /// 3. If it is corrupted, load and restore the backup
    ///
    /// # Errors
    ///
    /// `Error::Settings` if the directory cannot be created, the file cannot be
    /// read, or both the file and its backup are unusable.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::settings(format!(
                        "Failed to create settings directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let snapshot = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                snapshot,
                dirty: false,
            }),
        })
    }

    /// Path of the settings document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, falling back to the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<SettingsSnapshot, Error> {
        let parse_error = match Self::load(path).await {
            Ok(snapshot) => {
                tracing::debug!(
                    "Loaded settings from {} (revision {})",
                    path.display(),
                    snapshot.revision
                );
                return Ok(snapshot);
            }
            Err(Error::Json(e)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "Settings file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            parse_error
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            return Err(Error::settings(format!(
                "Settings file {} is corrupted ({}) and no backup exists",
                path.display(),
                parse_error
            )));
        }

        match Self::load(&backup_path).await {
            Ok(snapshot) => {
                tracing::info!("Recovered settings from backup (revision {})", snapshot.revision);

                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore settings file from backup: {}", e);
                }

                Ok(snapshot)
            }
            Err(backup_error) => Err(Error::settings(format!(
                "Settings file {} is corrupted ({}) and its backup is unusable ({})",
                path.display(),
                parse_error,
                backup_error
            ))),
        }
    }

    /// Load one document; a missing file is an empty snapshot
    async fn load(path: &Path) -> Result<SettingsSnapshot, Error> {
        if !path.exists() {
            tracing::debug!("Settings file does not exist: {}", path.display());
            return Ok(SettingsSnapshot::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::settings(format!("Failed to read settings file {}: {}", path.display(), e))
        })?;

        let document: SettingsDocument = serde_json::from_str(&content)?;

        if document.version != SETTINGS_FILE_VERSION {
            tracing::warn!(
                "Settings file version mismatch: expected {}, got {}. Attempting to load anyway.",
                SETTINGS_FILE_VERSION,
                document.version
            );
        }

        Ok(document.snapshot)
    }

    /// Write the snapshot atomically
    ///
    /// Called with the state lock held.
    async fn write(&self, snapshot: &SettingsSnapshot) -> Result<(), Error> {
        let document = SettingsDocument {
            version: SETTINGS_FILE_VERSION.to_string(),
            snapshot: snapshot.clone(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| Error::settings(format!("Failed to serialize settings: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            options.mode(0o600);

            let mut file = options.open(&temp_path).await.map_err(|e| {
                Error::settings(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::settings(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::settings(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create settings backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::settings(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Settings written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Write `next` and adopt it as the served snapshot once it is on disk
    async fn commit(&self, state: &mut FileState, next: SettingsSnapshot) -> Result<(), Error> {
        state.dirty = true;
        self.write(&next).await?;
        state.snapshot = next;
        state.dirty = false;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn snapshot(&self) -> Result<SettingsSnapshot, Error> {
        Ok(self.state.lock().await.snapshot.clone())
    }

    async fn save_configuration(&self, configuration: &Configuration) -> Result<u64, Error> {
        configuration.validate()?;

        let mut state = self.state.lock().await;
        let mut next = state.snapshot.clone();
        next.configuration = Some(configuration.clone());
        next.revision += 1;
        self.commit(&mut state, next).await?;

        tracing::info!("Configuration saved (revision {})", state.snapshot.revision);
        Ok(state.snapshot.revision)
    }

    async fn save_record(&self, record: &UpdateRecord) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let next = SettingsSnapshot {
            record: record.clone(),
            ..state.snapshot.clone()
        };
        self.commit(&mut state, next).await
    }

    async fn flush(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.dirty {
            // Put the file back in line with the last confirmed state
            let current = state.snapshot.clone();
            self.commit(&mut state, current).await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::traits::settings_store::Outcome;
    use std::net::IpAddr;
    use std::time::Duration;
    use tempfile::tempdir;

    fn configuration() -> Configuration {
        Configuration::new(
            ProviderConfig::new("https://dns.example.net/update?ip={address}", "secret-key")
                .with_username("me@example.net")
                .with_record_id("42"),
            "home.example.net",
            Duration::from_secs(3600),
        )
    }

    fn record(address: &str) -> UpdateRecord {
        UpdateRecord {
            last_address: Some(address.parse::<IpAddr>().unwrap()),
            last_outcome: Some(Outcome::Success),
            ..UpdateRecord::default()
        }
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::open(&path).await.unwrap();
        assert_eq!(store.snapshot().await.unwrap(), SettingsSnapshot::default());

        store.save_configuration(&configuration()).await.unwrap();
        store.save_record(&record("1.2.3.4")).await.unwrap();
        assert!(path.exists());

        let reopened = FileSettingsStore::open(&path).await.unwrap();
        let snapshot = reopened.snapshot().await.unwrap();
        assert_eq!(snapshot.configuration, Some(configuration()));
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.record, record("1.2.3.4"));
    }

    #[tokio::test]
    async fn test_file_store_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ddns").join("settings.json");

        let store = FileSettingsStore::open(&path).await.unwrap();
        store.save_record(&record("1.2.3.4")).await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::open(&path).await.unwrap();
        store.save_record(&record("1.2.3.4")).await.unwrap();
        // Second write moves the first document into the backup
        store.save_record(&record("1.2.3.5")).await.unwrap();

        let backup_path = FileSettingsStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileSettingsStore::open(&path).await.unwrap();
        assert_eq!(
            recovered.snapshot().await.unwrap().record,
            record("1.2.3.4"),
            "Backup should contain previous document, not latest"
        );

        // Main file was restored from the backup
        let restored = fs::read_to_string(&path).await.unwrap();
        assert!(restored.contains("1.2.3.4"));
    }

    #[tokio::test]
    async fn test_file_store_unrecoverable_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        fs::write(&path, b"{ not json").await.unwrap();
        fs::write(FileSettingsStore::backup_path(&path), b"also not json")
            .await
            .unwrap();

        let err = FileSettingsStore::open(&path).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_file_store_corrupted_without_backup_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        fs::write(&path, b"garbage").await.unwrap();

        let err = FileSettingsStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }

    #[tokio::test]
    async fn test_file_store_rapid_writes_stay_consistent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::open(&path).await.unwrap();
        for i in 0..10 {
            store.save_record(&record(&format!("1.2.3.{}", i))).await.unwrap();
        }

        let reopened = FileSettingsStore::open(&path).await.unwrap();
        assert_eq!(reopened.snapshot().await.unwrap().record, record("1.2.3.9"));
        assert!(!dir.path().join("settings.tmp").exists());
    }

    #[tokio::test]
    async fn test_invalid_configuration_is_not_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::open(&path).await.unwrap();
        let mut invalid = configuration();
        invalid.hostname = String::new();

        assert!(store.save_configuration(&invalid).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_state() {
        let dir = tempdir().unwrap();
        let parent = dir.path().join("ddns");
        let path = parent.join("settings.json");

        let store = FileSettingsStore::open(&path).await.unwrap();
        store.save_configuration(&configuration()).await.unwrap();
        store.save_record(&record("1.2.3.4")).await.unwrap();
        let before = store.snapshot().await.unwrap();

        fs::remove_dir_all(&parent).await.unwrap();

        let mut edited = configuration();
        edited.hostname = "other.example.net".to_string();
        assert!(store.save_configuration(&edited).await.is_err());
        assert!(store.save_record(&record("5.6.7.8")).await.is_err());

        let after = store.snapshot().await.unwrap();
        assert_eq!(after, before, "Unwritten changes must not be served");
        assert_eq!(after.revision, 1);

        // Directory back: flush rewrites the last confirmed state
        fs::create_dir_all(&parent).await.unwrap();
        store.flush().await.unwrap();

        let reopened = FileSettingsStore::open(&path).await.unwrap();
        assert_eq!(reopened.snapshot().await.unwrap(), before);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::open(&path).await.unwrap();
        store.save_configuration(&configuration()).await.unwrap();

        let mode = fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
