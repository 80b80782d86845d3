//! Update cycle engine
//!
//! The UpdateEngine runs one cycle at a time:
//! - Snapshot the settings store
//! - Resolve the public address
//! - Compare it with the last published address
//! - Call the provider when needed
//! - Record the outcome
//!
//! ## Cycle state machine
//!
//! ```text
//! Idle ──▶ Resolving ──▶ Detecting ──┬─ Unchanged ─────────────────────▶ Idle
//!             │                      │
//!             │ ResolutionError      └─ Changed / FirstRun / forced
//!             ▼                                   │
//!           Idle (record untouched)               ▼
//!                                            Dispatching ──┬─ Success ──────────▶ Idle (address published)
//!                                                          ├─ Rejected ─────────▶ Idle (flagged for the user)
//!                                                          └─ TransientFailure ─▶ Idle (address untouched)
//! ```
//!
//! Scheduling, overlap prevention and cancellation are owned by
//! [`crate::scheduler::Scheduler`]; the engine itself is a plain async
//! function of the current settings.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::detector::{Change, detect};
use crate::dispatcher::{DispatchOutcome, UpdateDispatcher};
use crate::error::{Error, Result};
use crate::traits::{AddressResolver, DnsProvider, Outcome, Rejection, SettingsStore, UpdateRequest};

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Interval tick (including the one at startup)
    Scheduled,
    /// "Update now" request: runs even when disabled or held after a rejection
    Manual,
    /// Manual request that also dispatches when the address is unchanged
    Forced,
}

impl Trigger {
    /// Whether the user asked for this cycle
    pub fn is_manual(&self) -> bool {
        !matches!(self, Trigger::Scheduled)
    }

    /// Whether the provider must be called regardless of change state
    pub fn is_forced(&self) -> bool {
        matches!(self, Trigger::Forced)
    }
}

/// Why a cycle did not reach the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Scheduled cycles are disabled in the configuration
    Disabled,
    /// No configuration stored, or the stored one is invalid
    InvalidConfiguration(String),
    /// The provider rejected the current configuration; waiting for the user
    HeldAfterRejection,
}

/// Result of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The resolved address is already published
    Unchanged { address: IpAddr },
    /// The provider accepted the address
    Published {
        address: IpAddr,
        previous: Option<IpAddr>,
    },
    /// The provider refused the update; surfaced to the user
    Rejected { address: IpAddr, reason: String },
    /// The provider call failed; retried on the next cycle
    TransientFailure { address: IpAddr, reason: String },
    /// The public address could not be determined
    ResolutionFailed { reason: String },
    /// The cycle stopped before resolving
    Skipped(SkipReason),
}

impl CycleOutcome {
    /// Whether the user has to act (fix credentials, record id, ...)
    pub fn requires_attention(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Rejected { .. }
                | CycleOutcome::Skipped(SkipReason::InvalidConfiguration(_))
        )
    }
}

/// Summary of one cycle, returned to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// What started the cycle
    pub trigger: Trigger,
    /// How the cycle ended
    pub outcome: CycleOutcome,
    /// Interval configured in the snapshot this cycle used
    pub interval: Option<Duration>,
}

/// Events emitted by the UpdateEngine and the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Scheduler started
    Started { interval: Duration },

    /// A cycle began
    CycleStarted { trigger: Trigger },

    /// A cycle stopped before resolving
    CycleSkipped { reason: SkipReason },

    /// A trigger arrived while a cycle was running and was dropped
    TriggerSkipped { trigger: Trigger },

    /// Public address determined
    AddressResolved { address: IpAddr },

    /// Public address could not be determined
    ResolutionFailed { error: String },

    /// Address already published, nothing sent
    UpdateSkipped { hostname: String, address: IpAddr },

    /// Provider call started
    UpdateStarted { hostname: String, address: IpAddr },

    /// Provider accepted the address
    UpdateSucceeded {
        hostname: String,
        address: IpAddr,
        previous: Option<IpAddr>,
    },

    /// Provider refused the update (needs the user's attention)
    UpdateRejected { hostname: String, reason: String },

    /// Provider call failed transiently
    UpdateFailed { hostname: String, error: String },

    /// Scheduler stopped
    Stopped { reason: String },
}

/// Core update engine
///
/// ## Lifecycle
///
/// 1. Create with [`UpdateEngine::new()`]
/// 2. Hand it to [`crate::scheduler::Scheduler::start()`], or call
///    [`UpdateEngine::run_cycle()`] directly
///
/// ## Ownership
///
/// The settings store is the only owner of configuration and update record.
/// Each cycle works on a snapshot, so a configuration edit made while a cycle
/// is running takes effect on the next cycle.
pub struct UpdateEngine {
    /// Public address discovery
    resolver: Box<dyn AddressResolver>,

    /// Provider call with retry policy
    dispatcher: UpdateDispatcher,

    /// Configuration and update record owner
    settings: Arc<dyn SettingsStore>,

    /// Upper bound for address resolution
    resolve_timeout: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl UpdateEngine {
    /// Create a new update engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        resolver: Box<dyn AddressResolver>,
        provider: Box<dyn DnsProvider>,
        settings: Arc<dyn SettingsStore>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            resolver,
            dispatcher: UpdateDispatcher::new(provider, &config),
            settings,
            resolve_timeout: config.resolve_timeout(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The settings store this engine reads from and records into
    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    /// Run one resolve → detect → dispatch cycle
    ///
    /// # Returns
    ///
    /// - `Ok(CycleReport)`: The cycle ended (whatever its outcome)
    /// - `Err(Error)`: The settings store failed; no further cycle can run
    pub async fn run_cycle(&self, trigger: Trigger) -> Result<CycleReport> {
        let snapshot = self.settings.snapshot().await?;
        self.emit_event(EngineEvent::CycleStarted { trigger });

        let Some(configuration) = snapshot.configuration else {
            return Ok(self.skip(
                trigger,
                SkipReason::InvalidConfiguration("no configuration stored".to_string()),
                None,
            ));
        };
        let interval = Some(configuration.interval);

        if let Err(e) = configuration.validate() {
            return Ok(self.skip(trigger, SkipReason::InvalidConfiguration(e.to_string()), interval));
        }

        if !trigger.is_manual() {
            if !configuration.enabled {
                return Ok(self.skip(trigger, SkipReason::Disabled, interval));
            }

            if snapshot.record.is_held(snapshot.revision) {
                return Ok(self.skip(trigger, SkipReason::HeldAfterRejection, interval));
            }
        } else if !configuration.enabled {
            // Manual runs of a disabled configuration still need a usable endpoint
            if let Err(e) = configuration.validate_runnable() {
                return Ok(self.skip(trigger, SkipReason::InvalidConfiguration(e.to_string()), interval));
            }
        }

        let mut record = snapshot.record;

        // A manual request releases the hold; a new rejection sets it again
        if trigger.is_manual() && record.rejection.is_some() {
            info!("Manual update requested, releasing the rejection hold");
            record.rejection = None;
            self.settings.save_record(&record).await?;
        }

        // Resolving
        let address = match self.resolve().await {
            Ok(address) => address,
            Err(e) => {
                warn!("Could not determine public address: {}", e);
                self.emit_event(EngineEvent::ResolutionFailed {
                    error: e.to_string(),
                });
                return Ok(CycleReport {
                    trigger,
                    outcome: CycleOutcome::ResolutionFailed {
                        reason: e.to_string(),
                    },
                    interval,
                });
            }
        };
        debug!("Public address: {}", address);
        self.emit_event(EngineEvent::AddressResolved { address });

        // Detecting
        let previous = record.last_address;
        let change = detect(address, previous);

        if !change.requires_update() && !trigger.is_forced() {
            debug!(
                "{} already points to {}, skipping update",
                configuration.hostname, address
            );
            if record.last_outcome != Some(Outcome::Unchanged) {
                record.last_outcome = Some(Outcome::Unchanged);
                self.settings.save_record(&record).await?;
            }
            self.emit_event(EngineEvent::UpdateSkipped {
                hostname: configuration.hostname.clone(),
                address,
            });
            return Ok(CycleReport {
                trigger,
                outcome: CycleOutcome::Unchanged { address },
                interval,
            });
        }

        match change {
            Change::FirstRun(_) => info!("First update for {}: {}", configuration.hostname, address),
            Change::Changed { previous, new } => {
                info!("Address changed: {} -> {}", previous, new)
            }
            Change::Unchanged => info!("Forced update of {} to {}", configuration.hostname, address),
        }

        // Dispatching
        self.emit_event(EngineEvent::UpdateStarted {
            hostname: configuration.hostname.clone(),
            address,
        });

        let request = UpdateRequest::new(
            configuration.hostname.clone(),
            address,
            configuration.provider.clone(),
        );
        let dispatched = self.dispatcher.dispatch(&request).await;
        let now = Utc::now();
        record.last_attempt = Some(now);

        let outcome = match dispatched {
            DispatchOutcome::Success(response) => {
                info!(
                    "Updated {} -> {} (previous: {:?}). Server response: {}",
                    configuration.hostname, address, previous, response.message
                );
                record.last_address = Some(address);
                record.last_success = Some(now);
                record.last_outcome = Some(Outcome::Success);
                record.rejection = None;
                self.settings.save_record(&record).await?;

                self.emit_event(EngineEvent::UpdateSucceeded {
                    hostname: configuration.hostname.clone(),
                    address,
                    previous,
                });
                CycleOutcome::Published { address, previous }
            }
            DispatchOutcome::Rejected(reason) => {
                error!(
                    "Provider {} rejected the update of {}: {}. \
                    Automatic updates are paused until the settings change or an update is requested.",
                    self.dispatcher.provider_name(),
                    configuration.hostname,
                    reason
                );
                record.last_outcome = Some(Outcome::Failure);
                record.rejection = Some(Rejection {
                    reason: reason.clone(),
                    at: now,
                    config_revision: snapshot.revision,
                });
                self.settings.save_record(&record).await?;

                self.emit_event(EngineEvent::UpdateRejected {
                    hostname: configuration.hostname.clone(),
                    reason: reason.clone(),
                });
                CycleOutcome::Rejected { address, reason }
            }
            DispatchOutcome::TransientFailure(reason) => {
                warn!(
                    "Failed to update {}: {}. Retrying on the next cycle.",
                    configuration.hostname, reason
                );
                record.last_outcome = Some(Outcome::Failure);
                self.settings.save_record(&record).await?;

                self.emit_event(EngineEvent::UpdateFailed {
                    hostname: configuration.hostname.clone(),
                    error: reason.clone(),
                });
                CycleOutcome::TransientFailure { address, reason }
            }
        };

        Ok(CycleReport {
            trigger,
            outcome,
            interval,
        })
    }

    /// Resolve the public address within the configured bound
    async fn resolve(&self) -> Result<IpAddr> {
        match tokio::time::timeout(self.resolve_timeout, self.resolver.resolve()).await {
            Ok(Ok(address)) => Ok(address),
            Ok(Err(Error::Resolution(msg))) => Err(Error::Resolution(msg)),
            Ok(Err(e)) => Err(Error::resolution(e.to_string())),
            Err(_) => Err(Error::resolution(format!(
                "{} did not answer within {:?}",
                self.resolver.name(),
                self.resolve_timeout
            ))),
        }
    }

    fn skip(&self, trigger: Trigger, reason: SkipReason, interval: Option<Duration>) -> CycleReport {
        match &reason {
            SkipReason::Disabled => debug!("Automatic updates are disabled, skipping cycle"),
            SkipReason::HeldAfterRejection => {
                warn!("Last update was rejected by the provider; waiting for new settings or a manual update")
            }
            SkipReason::InvalidConfiguration(msg) => error!("Cannot run update cycle: {}", msg),
        }

        self.emit_event(EngineEvent::CycleSkipped {
            reason: reason.clone(),
        });

        CycleReport {
            trigger,
            outcome: CycleOutcome::Skipped(reason),
            interval,
        }
    }

    /// Emit an engine event
    ///
    /// Events are dropped (with a log) when the channel is full or nobody listens.
    pub(crate) fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // No listener attached
            }
        }
    }
}
