// # In-Memory Provider
//
// Reference implementation of the Provider contract that keeps every zone in
// memory.
//
// ## Purpose
//
// - Test double for the engine's own test suite
// - Dry-run and simulation target for the daemon
// - Template for new back-end adapters: zone lookup, routing through
//   `find_zone`, per-record references and write serialization all work the
//   way a real adapter should do them
//
// ## Record References
//
// Real back-ends address records by opaque ids. This provider synthesizes
// one per record from its name and type:
//
// ```text
// record:<type>/<base64(name)>:<name>/default
// ```
//
// ## Crash Behavior
//
// All zones are lost when the process exits.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::endpoint::{Endpoint, EndpointKey};
use crate::error::{Error, Result};
use crate::plan::Changes;
use crate::provider::domain_filter::DomainFilter;
use crate::provider::zone::{Zone, ZoneRouting, filter_zones};
use crate::provider::Provider;

const PROVIDER_NAME: &str = "inmemory";

/// Build the synthetic reference for a record key
pub fn encode_reference(key: &EndpointKey) -> String {
    format!(
        "record:{}/{}:{}/default",
        key.record_type.as_str().to_ascii_lowercase(),
        STANDARD.encode(key.name.as_bytes()),
        key.name
    )
}

/// Recover the record key from a synthetic reference
pub fn decode_reference(reference: &str) -> Result<EndpointKey> {
    let invalid = || Error::invalid_endpoint(format!("Malformed record reference: {}", reference));

    let rest = reference.strip_prefix("record:").ok_or_else(invalid)?;
    let rest = rest.strip_suffix("/default").ok_or_else(invalid)?;
    let (record_type, rest) = rest.split_once('/').ok_or_else(invalid)?;
    let (encoded, name) = rest.split_once(':').ok_or_else(invalid)?;

    let decoded = STANDARD.decode(encoded).map_err(|_| invalid())?;
    if decoded != name.as_bytes() {
        return Err(invalid());
    }

    Ok(EndpointKey {
        name: name.to_string(),
        record_type: record_type.parse()?,
    })
}

/// Endpoints touched by applied batches, in application order
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub created: Vec<Endpoint>,
    pub updated: Vec<Endpoint>,
    /// Deleted records, reported by name and type only
    pub deleted: Vec<Endpoint>,
}

#[derive(Debug, Default)]
struct HostedZone {
    zone: Option<Zone>,
    /// Records by reference
    records: BTreeMap<String, Endpoint>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    zones: BTreeMap<String, HostedZone>,
    journal: Journal,
    /// Number of operations allowed before injected failure
    fail_after: Option<usize>,
    operations: usize,
    apply_calls: usize,
}

/// In-memory provider implementation
///
/// Clones share the same zones, so a test can keep one handle for
/// inspection while the registry owns another.
///
/// # Example
///
/// ```rust,no_run
/// use dnsreconcile_core::endpoint::{Endpoint, RecordType};
/// use dnsreconcile_core::plan::Changes;
/// use dnsreconcile_core::provider::{InMemoryProvider, Provider};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let provider = InMemoryProvider::new();
///     provider.create_zone("zone-1", "example.com").await;
///
///     let mut changes = Changes::default();
///     changes.create.push(Endpoint::new("www.example.com", "1.2.3.4", RecordType::A));
///     provider.apply_changes(changes).await?;
///
///     assert_eq!(provider.records().await?.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    inner: Arc<RwLock<InMemoryState>>,
    domain_filter: DomainFilter,
    dry_run: bool,
}

impl InMemoryProvider {
    /// Create a provider hosting no zones
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(InMemoryState::default())),
            domain_filter: DomainFilter::allow_all(),
            dry_run: false,
        }
    }

    /// Restrict the zones this provider lists and writes to
    pub fn with_domain_filter(mut self, filter: DomainFilter) -> Self {
        self.domain_filter = filter;
        self
    }

    /// In dry-run mode batches are logged but nothing changes
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Host a new zone
    pub async fn create_zone(&self, id: impl Into<String>, fqdn: &str) {
        let zone = Zone::new(id, fqdn);
        let key = zone.fqdn.clone();
        let mut guard = self.inner.write().await;
        guard.zones.entry(key).or_default().zone = Some(zone);
    }

    /// All hosted zones, ignoring the domain filter
    pub async fn zones(&self) -> Vec<Zone> {
        let guard = self.inner.read().await;
        guard.zones.values().filter_map(|h| h.zone.clone()).collect()
    }

    /// Seed records directly, bypassing the journal and failure injection
    pub async fn insert_records(&self, endpoints: Vec<Endpoint>) -> Result<()> {
        let mut guard = self.inner.write().await;
        let zones: Vec<Zone> = guard.zones.values().filter_map(|h| h.zone.clone()).collect();
        for ep in endpoints {
            let zone = crate::provider::find_zone(&zones, &ep.dns_name).ok_or_else(|| {
                Error::provider(PROVIDER_NAME, format!("No zone hosts {}", ep.dns_name))
            })?;
            let hosted = guard.zones.entry(zone.fqdn.clone()).or_default();
            let stored = stored_form(&ep);
            hosted
                .records
                .entry(encode_reference(&ep.key()))
                .and_modify(|existing| existing.merge(&stored))
                .or_insert(stored);
        }
        Ok(())
    }

    /// Reference of the record stored under `key`, if any
    pub async fn reference(&self, key: &EndpointKey) -> Option<String> {
        let guard = self.inner.read().await;
        let reference = encode_reference(key);
        guard
            .zones
            .values()
            .any(|h| h.records.contains_key(&reference))
            .then_some(reference)
    }

    /// Snapshot of the journal
    pub async fn journal(&self) -> Journal {
        self.inner.read().await.journal.clone()
    }

    pub async fn clear_journal(&self) {
        self.inner.write().await.journal = Journal::default();
    }

    /// Fail every operation after the first `n` ones, across batches
    pub async fn fail_after(&self, n: Option<usize>) {
        let mut guard = self.inner.write().await;
        guard.fail_after = n;
        guard.operations = 0;
    }

    /// Number of `apply_changes` calls received
    pub async fn apply_calls(&self) -> usize {
        self.inner.read().await.apply_calls
    }

    fn visible_zones(&self, state: &InMemoryState) -> Vec<Zone> {
        let all = state.zones.values().filter_map(|h| h.zone.clone()).collect();
        filter_zones(all, &self.domain_filter)
    }
}

/// Providers do not store labels; ownership lives in TXT records
fn stored_form(ep: &Endpoint) -> Endpoint {
    Endpoint::with_targets(&ep.dns_name, ep.record_type, ep.targets.clone())
}

impl InMemoryState {
    fn step(&mut self) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.operations >= limit {
                return Err(Error::provider(
                    PROVIDER_NAME,
                    format!("Injected failure after {} operation(s)", limit),
                ));
            }
        }
        self.operations += 1;
        Ok(())
    }

    fn hosted(&mut self, zone: &str) -> Result<&mut HostedZone> {
        self.zones
            .get_mut(zone)
            .ok_or_else(|| Error::provider(PROVIDER_NAME, format!("Zone not found: {}", zone)))
    }

    fn create(&mut self, zone: &str, ep: &Endpoint) -> Result<()> {
        self.step()?;
        let reference = encode_reference(&ep.key());
        let hosted = self.hosted(zone)?;
        if hosted.records.contains_key(&reference) {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("Record already exists: {}", ep.key()),
            ));
        }
        let stored = stored_form(ep);
        hosted.records.insert(reference, stored.clone());
        self.journal.created.push(stored);
        Ok(())
    }

    fn update(&mut self, zone: &str, old: &Endpoint, new: &Endpoint) -> Result<()> {
        self.step()?;
        let old_reference = encode_reference(&old.key());
        let hosted = self.hosted(zone)?;
        if hosted.records.remove(&old_reference).is_none() {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("Record not found: {}", old.key()),
            ));
        }
        let stored = stored_form(new);
        hosted.records.insert(encode_reference(&new.key()), stored.clone());
        self.journal.updated.push(stored);
        Ok(())
    }

    fn delete(&mut self, zone: &str, ep: &Endpoint) -> Result<()> {
        self.step()?;
        self.remove_by_reference(zone, &encode_reference(&ep.key()))
    }

    fn remove_by_reference(&mut self, zone: &str, reference: &str) -> Result<()> {
        let key = decode_reference(reference)?;
        let hosted = self.hosted(zone)?;
        if hosted.records.remove(reference).is_none() {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("Record not found: {}", key),
            ));
        }
        self.journal
            .deleted
            .push(Endpoint::new(&key.name, "", key.record_type));
        Ok(())
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn records(&self) -> Result<Vec<Endpoint>> {
        let guard = self.inner.read().await;
        let visible = self.visible_zones(&guard);
        Ok(visible
            .iter()
            .filter_map(|z| guard.zones.get(&z.fqdn))
            .flat_map(|h| h.records.values().cloned())
            .collect())
    }

    async fn apply_changes(&self, changes: Changes) -> Result<()> {
        // Held for the whole batch so batches never interleave
        let mut guard = self.inner.write().await;
        guard.apply_calls += 1;

        let zones = self.visible_zones(&guard);
        let routing = ZoneRouting::route(&zones, changes);
        if !routing.unroutable.is_empty() {
            tracing::debug!("{} endpoint(s) skipped without a zone", routing.unroutable.len());
        }

        for (zone, batch) in &routing.per_zone {
            if self.dry_run {
                for ep in &batch.create {
                    tracing::info!("[DRY-RUN] Would create {} in zone {}", ep, zone);
                }
                for ep in &batch.update_new {
                    tracing::info!("[DRY-RUN] Would update {} in zone {}", ep, zone);
                }
                for ep in &batch.delete {
                    tracing::info!("[DRY-RUN] Would delete {} in zone {}", ep, zone);
                }
                continue;
            }

            for ep in &batch.create {
                guard.create(zone, ep)?;
                tracing::debug!("Created {} in zone {}", ep, zone);
            }
            for (old, new) in batch.update_old.iter().zip(&batch.update_new) {
                guard.update(zone, old, new)?;
                tracing::debug!("Updated {} -> {} in zone {}", old, new, zone);
            }
            for ep in &batch.delete {
                guard.delete(zone, ep)?;
                tracing::debug!("Deleted {} from zone {}", ep.key(), zone);
            }
        }

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}
