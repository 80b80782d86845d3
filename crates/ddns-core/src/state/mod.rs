// # Settings Store Implementations
//
// This module provides implementations of the SettingsStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use crate::traits::settings_store::{Outcome, Rejection, SettingsSnapshot, UpdateRecord};
pub use file::FileSettingsStore;
pub use memory::MemorySettingsStore;
