// # ddns-core
//
// Core library for the periodic DDNS update client.
//
// ## Architecture Overview
//
// One update cycle is resolve → detect → dispatch:
// - **AddressResolver**: Trait for discovering the host's public address
// - **Change detector**: Pure comparison with the last published address
// - **DnsProvider**: Trait for calling a provider's update endpoint
// - **UpdateDispatcher**: Timeout, retry policy and outcome classification
// - **SettingsStore**: Trait for the exclusive owner of configuration and update record
// - **UpdateEngine**: Runs one cycle and records its outcome
// - **Scheduler**: Timer, manual triggers, no overlapping cycles, cancellation
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from HTTP implementations
// 2. **Single Writer**: Only the engine (record) and the user (configuration) write settings
// 3. **Idempotency**: An unchanged address never reaches the provider
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{Configuration, EngineConfig, IpVersion, ProviderConfig, ResolverConfig};
pub use engine::{CycleOutcome, CycleReport, EngineEvent, SkipReason, Trigger, UpdateEngine};
pub use error::{Error, Result};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use state::{FileSettingsStore, MemorySettingsStore};
pub use traits::{AddressResolver, DnsProvider, SettingsStore};
