//! Diff engine
//!
//! A [`Plan`] compares the desired endpoints with the current, owned ones and
//! produces a [`Changes`] set: one decision per record key, filtered by the
//! configured [`Policy`].
//!
//! ## Algorithm
//!
//! 1. Merge desired and current endpoints by key (several targets for one
//!    name and type form one record)
//! 2. For each desired record: no current match → create; match with the
//!    same state → nothing; match with a different state → update pair
//! 3. Every current record left unmatched → delete
//!
//! A key therefore lands in at most one of create, update or delete.

mod policy;

pub use policy::Policy;

use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

use crate::endpoint::{Endpoint, EndpointKey, RecordType};
use crate::provider::DomainFilter;

/// Record types a plan manages unless told otherwise
pub const DEFAULT_MANAGED_TYPES: [RecordType; 3] =
    [RecordType::A, RecordType::AAAA, RecordType::CNAME];

/// A change set
///
/// `update_old[i]` and `update_new[i]` are the previous and new state of the
/// same record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub create: Vec<Endpoint>,
    pub update_old: Vec<Endpoint>,
    pub update_new: Vec<Endpoint>,
    pub delete: Vec<Endpoint>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update_old.is_empty()
            && self.update_new.is_empty()
            && self.delete.is_empty()
    }

    /// Number of record-level operations (an update pair counts once)
    pub fn len(&self) -> usize {
        self.create.len() + self.update_new.len() + self.delete.len()
    }
}

/// Diff engine configuration
#[derive(Debug, Clone)]
pub struct Plan {
    policy: Policy,
    owner_id: Option<String>,
    domain_filter: DomainFilter,
    managed_types: Vec<RecordType>,
}

impl Plan {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            owner_id: None,
            domain_filter: DomainFilter::allow_all(),
            managed_types: DEFAULT_MANAGED_TYPES.to_vec(),
        }
    }

    /// Claim desired endpoints for `owner_id` before diffing
    pub fn with_owner(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn with_domain_filter(mut self, filter: DomainFilter) -> Self {
        self.domain_filter = filter;
        self
    }

    pub fn with_managed_types(mut self, types: Vec<RecordType>) -> Self {
        self.managed_types = types;
        self
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Compute the changes that turn `current` into `desired`
    pub fn calculate(&self, desired: Vec<Endpoint>, current: Vec<Endpoint>) -> Changes {
        let desired = merge_by_key(desired.into_iter().filter(|ep| self.accepts_desired(ep)));
        let current = merge_by_key(current.into_iter().filter(|ep| self.in_scope(ep)));

        let current_index: HashMap<EndpointKey, usize> = current
            .iter()
            .enumerate()
            .map(|(i, ep)| (ep.key(), i))
            .collect();
        let mut matched: HashSet<usize> = HashSet::new();
        let mut changes = Changes::default();

        for mut wanted in desired {
            if let Some(owner) = &self.owner_id {
                wanted.labels.set_owner(owner.clone());
            }

            match current_index.get(&wanted.key()) {
                None => {
                    if self.policy.allows_create() {
                        debug!("Planning create of {}", wanted);
                        changes.create.push(wanted);
                    } else {
                        debug!("Policy {} forbids create of {}, dropping", self.policy, wanted);
                    }
                }
                Some(&i) => {
                    matched.insert(i);
                    let existing = &current[i];
                    if existing.same_as(&wanted) {
                        trace!("{} is up to date", wanted);
                        continue;
                    }
                    if self.policy.allows_update() {
                        debug!("Planning update of {} -> {}", existing, wanted);
                        let mut labels = existing.labels.clone();
                        labels.extend(&wanted.labels);
                        changes.update_old.push(existing.clone());
                        changes.update_new.push(wanted.with_labels(labels));
                    } else {
                        debug!("Policy {} forbids update of {}, dropping", self.policy, existing);
                    }
                }
            }
        }

        for (i, stale) in current.into_iter().enumerate() {
            if matched.contains(&i) {
                continue;
            }
            if self.policy.allows_delete() {
                debug!("Planning delete of {}", stale);
                changes.delete.push(stale);
            } else {
                debug!("Policy {} forbids delete of {}, dropping", self.policy, stale);
            }
        }

        changes
    }

    fn in_scope(&self, ep: &Endpoint) -> bool {
        self.managed_types.contains(&ep.record_type) && self.domain_filter.matches(&ep.dns_name)
    }

    fn accepts_desired(&self, ep: &Endpoint) -> bool {
        if ep.dns_name.is_empty() {
            warn!("Ignoring desired {} endpoint with an empty name", ep.record_type);
            return false;
        }
        if ep.targets.is_empty() {
            warn!("Ignoring desired endpoint {} without targets", ep.key());
            return false;
        }
        self.in_scope(ep)
    }
}

/// Fold endpoints sharing a key into one multi-target endpoint, first-seen order
pub fn merge_by_key(endpoints: impl IntoIterator<Item = Endpoint>) -> Vec<Endpoint> {
    let mut merged: Vec<Endpoint> = Vec::new();
    let mut index: HashMap<EndpointKey, usize> = HashMap::new();
    for ep in endpoints {
        match index.get(&ep.key()) {
            Some(&i) => merged[i].merge(&ep),
            None => {
                index.insert(ep.key(), merged.len());
                merged.push(ep);
            }
        }
    }
    merged
}
