//! Change detection
//!
//! Pure comparison between the freshly resolved address and the last address
//! the provider accepted. No I/O.

use std::net::IpAddr;

/// Result of comparing a resolved address with the published one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// The resolved address is already published
    Unchanged,
    /// The resolved address differs from the published one
    Changed {
        previous: IpAddr,
        new: IpAddr,
    },
    /// Nothing has ever been published
    FirstRun(IpAddr),
}

impl Change {
    /// Whether the provider needs to be called
    pub fn requires_update(&self) -> bool {
        !matches!(self, Change::Unchanged)
    }
}

/// Compare `resolved` against `last_published`
pub fn detect(resolved: IpAddr, last_published: Option<IpAddr>) -> Change {
    match last_published {
        None => Change::FirstRun(resolved),
        Some(previous) if previous == resolved => Change::Unchanged,
        Some(previous) => Change::Changed {
            previous,
            new: resolved,
        },
    }
}
