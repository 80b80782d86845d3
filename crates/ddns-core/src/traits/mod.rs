//! Core traits for the DDNS client
//!
//! This module defines the abstract interfaces the engine is built on.
//!
//! - [`AddressResolver`]: Determine the host's public address
//! - [`DnsProvider`]: Call the provider's update endpoint
//! - [`SettingsStore`]: Exclusive owner of configuration and update record

pub mod address_resolver;
pub mod dns_provider;
pub mod settings_store;

pub use address_resolver::AddressResolver;
pub use dns_provider::{DnsProvider, ProviderResponse, UpdateRequest};
pub use settings_store::{Outcome, Rejection, SettingsSnapshot, SettingsStore, UpdateRecord};
