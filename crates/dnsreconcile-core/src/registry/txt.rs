// # TXT ownership registry
//
// Every managed name gets a companion TXT record holding an ownership
// payload (see `heritage`). A data record is managed by this instance iff
// the ownership record of its name decodes to our owner ID.
//
// ## Batch layout sent to the provider
//
// ```text
// create: [ownership TXT for newly claimed names..., data records...]
// update: [data records...]
// delete: [data records..., ownership TXT of fully released names...]
// ```
//
// Ownership is claimed before data is written and released after data is
// gone, so a batch aborted halfway never leaves an unowned record that the
// next cycle could not manage.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use super::heritage::OwnershipFormat;
use super::{ApplyReport, ChangeKind, Registry, SkipReason, SkippedChange};
use crate::endpoint::{
    Endpoint, EndpointKey, Labels, OWNER_LABEL_KEY, RESOURCE_LABEL_KEY, RecordType, Targets,
    normalize_name,
};
use crate::error::{Error, Result};
use crate::plan::{Changes, merge_by_key};
use crate::provider::Provider;

/// Registry backed by ownership TXT records
#[derive(Clone)]
pub struct TxtRegistry {
    provider: Arc<dyn Provider>,
    owner_id: String,
    format: OwnershipFormat,
    prefix: String,
}

/// Provider state split into data and ownership
#[derive(Debug, Default)]
struct Snapshot {
    data: Vec<Endpoint>,
    /// Ownership labels per data name
    owners: HashMap<String, Labels>,
    /// Ownership TXT records as stored, per data name
    ownership_records: HashMap<String, Endpoint>,
}

impl Snapshot {
    fn owner_of(&self, name: &str) -> Option<&str> {
        self.owners.get(name).and_then(|labels| labels.owner())
    }

    fn keys(&self) -> HashSet<EndpointKey> {
        self.data.iter().map(Endpoint::key).collect()
    }
}

impl TxtRegistry {
    /// Create a registry claiming records for `owner_id`
    pub fn new(
        provider: Arc<dyn Provider>,
        owner_id: impl Into<String>,
        format: OwnershipFormat,
    ) -> Result<Self> {
        let owner_id = owner_id.into();
        if owner_id.is_empty() {
            return Err(Error::config("TXT registry requires a non-empty owner ID"));
        }
        format.check_value(&owner_id)?;
        Ok(Self {
            provider,
            owner_id,
            format,
            prefix: String::new(),
        })
    }

    /// Store ownership records at `<prefix><name>` instead of `<name>`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim().to_ascii_lowercase();
        self
    }

    fn ownership_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Data name an ownership record at `txt_name` stands for
    fn owned_name<'a>(&self, txt_name: &'a str) -> Option<&'a str> {
        txt_name.strip_prefix(self.prefix.as_str()).filter(|n| !n.is_empty())
    }

    fn ownership_record(&self, name: &str, labels: &Labels) -> Endpoint {
        let mut payload = Labels::new();
        payload.set_owner(self.owner_id.clone());
        if let Some(resource) = labels.get(RESOURCE_LABEL_KEY) {
            match self.format.check_value(resource) {
                Ok(()) => payload.insert(RESOURCE_LABEL_KEY, resource),
                Err(e) => debug!("Leaving resource label out of ownership record: {}", e),
            }
        }
        Endpoint::new(
            &self.ownership_name(name),
            &self.format.encode_quoted(&payload),
            RecordType::TXT,
        )
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        let mut data = Vec::new();

        for ep in self.provider.records().await? {
            if ep.record_type != RecordType::TXT {
                data.push(ep);
                continue;
            }

            let mut plain = Targets::default();
            let mut ownership: Option<Labels> = None;
            for target in ep.targets.iter() {
                match self.format.decode(target) {
                    Some(labels) => {
                        // Several payloads on one name: ours wins
                        let ours = labels.owner() == Some(self.owner_id.as_str());
                        if ownership.is_none() || ours {
                            ownership = Some(labels);
                        }
                    }
                    None => plain.push(target.clone()),
                }
            }

            if let Some(labels) = ownership {
                match self.owned_name(&ep.dns_name) {
                    Some(name) => {
                        let name = normalize_name(name);
                        snapshot.ownership_records.insert(name.clone(), ep.clone());
                        snapshot.owners.insert(name, labels);
                    }
                    None => debug!(
                        "Ignoring ownership record {} outside prefix '{}'",
                        ep.dns_name, self.prefix
                    ),
                }
            }
            if !plain.is_empty() {
                let plain = Endpoint::with_targets(&ep.dns_name, ep.record_type, plain);
                data.push(plain.with_labels(ep.labels));
            }
        }

        snapshot.data = merge_by_key(data);
        Ok(snapshot)
    }

    fn stamped(&self, ep: Endpoint) -> Endpoint {
        ep.with_label(OWNER_LABEL_KEY, self.owner_id.clone())
    }
}

#[async_trait]
impl Registry for TxtRegistry {
    async fn records(&self) -> Result<Vec<Endpoint>> {
        let snapshot = self.snapshot().await?;
        let mut owned = Vec::new();
        for ep in snapshot.data {
            match snapshot.owners.get(&ep.dns_name) {
                Some(labels) if labels.owner() == Some(self.owner_id.as_str()) => {
                    let mut merged = ep.labels.clone();
                    merged.extend(labels);
                    owned.push(ep.with_labels(merged));
                }
                Some(labels) => debug!("{} is owned by {:?}, excluding", ep.key(), labels.owner()),
                None => debug!("{} has no ownership record, excluding", ep.key()),
            }
        }
        Ok(owned)
    }

    async fn apply_changes(&self, changes: Changes) -> Result<ApplyReport> {
        let snapshot = self.snapshot().await?;
        let existing = snapshot.keys();
        let ours = |name: &str| snapshot.owner_of(name) == Some(self.owner_id.as_str());

        let mut report = ApplyReport::default();
        let mut claims: Vec<Endpoint> = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();
        // Names that keep at least one record after this batch
        let mut written: HashSet<String> = HashSet::new();

        for ep in changes.create {
            let foreign = snapshot
                .owners
                .get(&ep.dns_name)
                .filter(|labels| labels.owner() != Some(self.owner_id.as_str()));
            if let Some(labels) = foreign {
                debug!("Skipping create of {}: name owned by {:?}", ep.key(), labels.owner());
                report.skipped.push(SkippedChange {
                    kind: ChangeKind::Create,
                    reason: SkipReason::OwnershipConflict {
                        owner: labels.owner().map(str::to_string),
                    },
                    endpoint: ep,
                });
                continue;
            }
            // Ownership covers the whole name: claiming it next to unowned
            // data would hand that data to this instance
            let unowned_neighbour = !snapshot.owners.contains_key(&ep.dns_name)
                && snapshot.data.iter().any(|d| d.dns_name == ep.dns_name);
            if existing.contains(&ep.key()) || unowned_neighbour {
                debug!("Skipping create of {}: name already holds records", ep.key());
                report.skipped.push(SkippedChange {
                    kind: ChangeKind::Create,
                    reason: SkipReason::OwnershipConflict {
                        owner: snapshot.owner_of(&ep.dns_name).map(str::to_string),
                    },
                    endpoint: ep,
                });
                continue;
            }
            if !ours(&ep.dns_name) && claimed.insert(ep.dns_name.clone()) {
                claims.push(self.ownership_record(&ep.dns_name, &ep.labels));
            }
            written.insert(ep.dns_name.clone());
            report.applied.create.push(self.stamped(ep));
        }

        for (old, new) in changes.update_old.into_iter().zip(changes.update_new) {
            if !ours(&old.dns_name) {
                warn!("Skipping update of {}: ownership no longer held", old.key());
                report.skipped.push(SkippedChange {
                    kind: ChangeKind::Update,
                    endpoint: new,
                    reason: SkipReason::OwnershipLost,
                });
                continue;
            }
            written.insert(new.dns_name.clone());
            report.applied.update_old.push(old);
            report.applied.update_new.push(self.stamped(new));
        }

        let mut deleted: HashSet<EndpointKey> = HashSet::new();
        for ep in changes.delete {
            if !ours(&ep.dns_name) {
                warn!("Skipping delete of {}: ownership no longer held", ep.key());
                report.skipped.push(SkippedChange {
                    kind: ChangeKind::Delete,
                    endpoint: ep,
                    reason: SkipReason::OwnershipLost,
                });
                continue;
            }
            deleted.insert(ep.key());
            report.applied.delete.push(ep);
        }

        let mut released: Vec<Endpoint> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for key in &deleted {
            let name = key.name.as_str();
            if written.contains(name) || !seen.insert(name) {
                continue;
            }
            let remaining = snapshot
                .data
                .iter()
                .any(|ep| ep.dns_name == name && !deleted.contains(&ep.key()));
            if remaining {
                continue;
            }
            if let Some(record) = snapshot.ownership_records.get(name) {
                released.push(record.clone());
            }
        }
        // Stable output regardless of hash order
        released.sort_by(|a, b| a.dns_name.cmp(&b.dns_name));

        claims.append(&mut report.applied.create);
        report.applied.create = claims;
        report.applied.delete.extend(released);

        if report.applied.is_empty() {
            debug!("Nothing left to apply after ownership checks");
            return Ok(report);
        }

        debug!(
            "Applying {} change(s) through {} ({} skipped)",
            report.applied.len(),
            self.provider.provider_name(),
            report.skipped.len()
        );
        self.provider.apply_changes(report.applied.clone()).await?;
        Ok(report)
    }

    fn owner_id(&self) -> Option<&str> {
        Some(self.owner_id.as_str())
    }

    fn registry_name(&self) -> &'static str {
        "txt"
    }
}
