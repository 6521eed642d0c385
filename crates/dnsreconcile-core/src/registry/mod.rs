//! Ownership layer between the plan and a provider
//!
//! A [`Registry`] wraps a [`Provider`](crate::provider::Provider) and decides
//! which of its records this instance may touch.
//!
//! - [`TxtRegistry`]: proves ownership with a companion TXT record per name
//! - [`NoopRegistry`]: no ownership, every record is managed
//!
//! The provider stays the only source of truth. A registry keeps no state of
//! its own between calls; every `apply_changes` re-reads the provider before
//! validating the batch.

pub mod heritage;
mod noop;
mod txt;

pub use heritage::{DEFAULT_HERITAGE, OwnershipFormat};
pub use noop::NoopRegistry;
pub use txt::TxtRegistry;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::plan::Changes;
use crate::provider::Provider;

/// Ownership-aware view of a provider
#[async_trait]
pub trait Registry: Send + Sync {
    /// Records this instance manages, with their ownership labels
    async fn records(&self) -> Result<Vec<Endpoint>>;

    /// Validate and apply a change set
    ///
    /// Changes failing ownership checks are dropped and listed in the
    /// report. A provider failure aborts the batch and is returned as is.
    async fn apply_changes(&self, changes: Changes) -> Result<ApplyReport>;

    /// Owner ID this registry claims records for, if it tracks ownership
    fn owner_id(&self) -> Option<&str>;

    fn registry_name(&self) -> &'static str;
}

/// Kind of a planned change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// Why a planned change was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The record exists already or its name is owned by someone else
    OwnershipConflict { owner: Option<String> },
    /// The record is no longer owned by this instance
    OwnershipLost,
}

impl SkipReason {
    /// A conflict repeats every cycle until the other owner lets go
    pub fn is_conflict(&self) -> bool {
        matches!(self, SkipReason::OwnershipConflict { .. })
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OwnershipConflict { owner: Some(owner) } => {
                write!(f, "owned by '{}'", owner)
            }
            SkipReason::OwnershipConflict { owner: None } => {
                write!(f, "record exists without ownership")
            }
            SkipReason::OwnershipLost => write!(f, "ownership lost"),
        }
    }
}

/// A change dropped by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChange {
    pub kind: ChangeKind,
    pub endpoint: Endpoint,
    pub reason: SkipReason,
}

/// Outcome of [`Registry::apply_changes`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Everything sent to the provider, ownership records included
    pub applied: Changes,
    pub skipped: Vec<SkippedChange>,
}

impl ApplyReport {
    /// Nothing written and nothing lost; standing conflicts do not count
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.skipped.iter().all(|s| s.reason.is_conflict())
    }
}

/// Build the registry described by `config` on top of `provider`
pub fn from_config(
    config: &RegistryConfig,
    provider: Arc<dyn Provider>,
) -> Result<Box<dyn Registry>> {
    config.validate()?;
    match config {
        RegistryConfig::Txt {
            owner_id,
            prefix,
            heritage,
        } => {
            let format = OwnershipFormat::new(heritage.clone());
            let registry =
                TxtRegistry::new(provider, owner_id.clone(), format)?.with_prefix(prefix.clone());
            Ok(Box::new(registry))
        }
        RegistryConfig::Noop => Ok(Box::new(NoopRegistry::new(provider))),
    }
}
