// # Zone Selection
//
// Multi-zone providers must route each record to exactly one hosted zone.
// Among the zones whose fqdn is a label-boundary suffix of the record name,
// the longest fqdn wins, so a record in a delegated child zone never lands
// in the parent. Records with no candidate zone are dropped from the cycle
// with a warning.

use std::collections::BTreeMap;

use crate::endpoint::{Endpoint, normalize_name};
use crate::plan::Changes;
use crate::provider::domain_filter::{DomainFilter, is_subdomain_of};

/// A provider-hosted namespace rooted at a domain suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zone {
    /// Provider-specific zone identifier
    pub id: String,
    /// Normalized zone apex
    pub fqdn: String,
}

impl Zone {
    pub fn new(id: impl Into<String>, fqdn: &str) -> Self {
        Self {
            id: id.into(),
            fqdn: normalize_name(fqdn),
        }
    }

    /// Whether `name` lies inside this zone
    pub fn contains(&self, name: &str) -> bool {
        is_subdomain_of(&normalize_name(name), &self.fqdn)
    }
}

/// Pick the most specific zone hosting `name`
pub fn find_zone<'a>(zones: &'a [Zone], name: &str) -> Option<&'a Zone> {
    let name = normalize_name(name);
    zones
        .iter()
        .filter(|z| is_subdomain_of(&name, &z.fqdn))
        .max_by_key(|z| z.fqdn.len())
}

/// Keep only the zones a domain filter allows
pub fn filter_zones(zones: Vec<Zone>, filter: &DomainFilter) -> Vec<Zone> {
    zones.into_iter().filter(|z| filter.matches(&z.fqdn)).collect()
}

/// Result of splitting a change set across zones
#[derive(Debug, Default)]
pub struct ZoneRouting {
    /// Changes per zone fqdn
    pub per_zone: BTreeMap<String, Changes>,
    /// Endpoints no zone could host
    pub unroutable: Vec<Endpoint>,
}

impl ZoneRouting {
    /// Split `changes` per zone
    ///
    /// An update pair is routed by its new endpoint; both halves go to the
    /// same zone so the pair stays aligned.
    pub fn route(zones: &[Zone], changes: Changes) -> Self {
        let mut routing = ZoneRouting::default();

        for ep in changes.create {
            if let Some(bucket) = routing.bucket(zones, &ep) {
                bucket.create.push(ep);
            }
        }

        for (old, new) in changes.update_old.into_iter().zip(changes.update_new) {
            if let Some(bucket) = routing.bucket(zones, &new) {
                bucket.update_old.push(old);
                bucket.update_new.push(new);
            }
        }

        for ep in changes.delete {
            if let Some(bucket) = routing.bucket(zones, &ep) {
                bucket.delete.push(ep);
            }
        }

        routing
    }

    fn bucket(&mut self, zones: &[Zone], ep: &Endpoint) -> Option<&mut Changes> {
        match find_zone(zones, &ep.dns_name) {
            Some(zone) => Some(self.per_zone.entry(zone.fqdn.clone()).or_default()),
            None => {
                tracing::warn!("No hosted zone found for {}, skipping it this cycle", ep);
                self.unroutable.push(ep.clone());
                None
            }
        }
    }
}
