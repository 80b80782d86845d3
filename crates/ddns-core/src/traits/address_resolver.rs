// # Address Resolver Trait
//
// Defines the interface for discovering the host's current public address.
//
// ## Implementations
//
// - HTTP discovery services: `ddns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::AddressResolver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* AddressResolver implementation */;
//
//     let address = resolver.resolve().await?;
//     println!("Public address: {}", address);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for address resolver implementations
///
/// A resolver answers one question: what is the host's public address right
/// now. It is called once per cycle by the engine.
///
/// ## Rules
///
/// - No side effects: resolvers never touch the settings store or the provider
/// - Bounded: every network call carries a timeout; the engine also applies
///   its own upper bound around [`AddressResolver::resolve`]
/// - No retries: a failure ends the cycle and the next tick tries again
///
/// Every failure (unreachable service, non-2xx answer, malformed body,
/// wrong address family) is reported as [`crate::Error::Resolution`].
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve the current public address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The current public address
    /// - `Err(Error::Resolution)`: If the address could not be determined
    async fn resolve(&self) -> Result<IpAddr, crate::Error>;

    /// Resolver name (for logging)
    fn name(&self) -> &'static str;
}
