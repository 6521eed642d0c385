// # DNS Provider Contract
//
// A provider is the thin adapter between the generic endpoint model and one
// DNS back-end. The engine only ever needs two capabilities from it: list
// the records it hosts, and apply a change set.
//
// ## Implementations
//
// - In-memory reference provider: [`InMemoryProvider`]
// - Back-end adapters live outside this crate and implement [`Provider`]
//
// ## Usage
//
// ```rust,ignore
// use dnsreconcile_core::provider::Provider;
//
// let records = provider.records().await?;
// provider.apply_changes(changes).await?;
// ```

pub mod domain_filter;
pub mod inmemory;
pub mod zone;

pub use domain_filter::DomainFilter;
pub use inmemory::InMemoryProvider;
pub use zone::{Zone, ZoneRouting, filter_zones, find_zone};

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::plan::Changes;

/// Trait for DNS provider implementations
///
/// # Thread Safety
///
/// Implementations must be usable across async tasks.
///
/// # Write Serialization
///
/// Most back-ends are unsafe for concurrent structural writes to one zone.
/// An implementation must never run two `apply_changes` batches against the
/// same zone at the same time; holding a lock for the whole batch is enough.
///
/// # Failure Semantics
///
/// A failed call returns `Error::Provider`. Operations applied before the
/// failure stay applied; the next cycle recomputes a corrective plan from
/// live state, so a partially applied batch must be safe to re-derive.
/// Providers do not retry.
#[async_trait]
pub trait Provider: Send + Sync {
    /// List every record hosted in the zones this provider manages
    async fn records(&self) -> Result<Vec<Endpoint>>;

    /// Apply a change set
    ///
    /// `changes.update_old[i]` and `changes.update_new[i]` describe the same
    /// record before and after the update. Endpoints that no hosted zone can
    /// take are skipped with a warning, not treated as failures.
    async fn apply_changes(&self, changes: Changes) -> Result<()>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
