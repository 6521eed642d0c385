// # dnsreconcile-core
//
// Core library of the DNS record reconciliation engine.
//
// ## Architecture Overview
//
// Each cycle compares a desired endpoint set with what a DNS provider hosts
// and converges the provider towards it:
// - **EndpointSource**: Where desired endpoints come from
// - **Provider**: Lists and changes records in one DNS back-end
// - **Registry**: Restricts a provider to the records this instance owns,
//   proving ownership with companion TXT records
// - **Plan**: Diff engine producing create/update/delete change sets
// - **Controller**: Control loop driving source → registry → plan → registry
//
// ## Design Principles
//
// 1. **Provider is the source of truth**: nothing is persisted between cycles
// 2. **Ownership first**: records without our ownership record are never touched
// 3. **Idempotency**: a converged zone yields an empty plan
// 4. **Library-First**: the daemon is a thin wrapper around this crate

pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod plan;
pub mod provider;
pub mod registry;
pub mod source;

// Re-export core types for convenience
pub use config::{ControllerConfig, ReconcileConfig, RegistryConfig};
pub use controller::{CancelHandle, Controller, ControllerEvent, CycleReport};
pub use endpoint::{Endpoint, EndpointKey, Labels, RecordType, Targets};
pub use error::{Error, Result};
pub use plan::{Changes, Plan, Policy};
pub use provider::{DomainFilter, InMemoryProvider, Provider, Zone};
pub use registry::{ApplyReport, NoopRegistry, OwnershipFormat, Registry, TxtRegistry};
pub use source::{EndpointSource, FileSource, StaticSource};
