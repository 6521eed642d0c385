//! Generic DNS record model
//!
//! An [`Endpoint`] is one DNS record independent of any provider: a name,
//! a record type, one or more targets and a set of labels. Endpoints are
//! rebuilt every cycle and never persisted by the engine.
//!
//! Names are normalized on construction (lower-case, trailing dot removed),
//! so two endpoints compare equal by key regardless of how the inventory or
//! the provider spelled them. Record types compare exactly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Label key naming the controller instance that owns a record
pub const OWNER_LABEL_KEY: &str = "owner";

/// Label key naming the inventory object that produced a record
pub const RESOURCE_LABEL_KEY: &str = "resource";

/// Closed set of record types the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
    MX,
    NS,
    SRV,
    PTR,
}

impl RecordType {
    /// All record types, in display order
    pub const ALL: [RecordType; 8] = [
        RecordType::A,
        RecordType::AAAA,
        RecordType::CNAME,
        RecordType::TXT,
        RecordType::MX,
        RecordType::NS,
        RecordType::SRV,
        RecordType::PTR,
    ];

    /// Upper-case wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::TXT => "TXT",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::SRV => "SRV",
            RecordType::PTR => "PTR",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| Error::invalid_endpoint(format!("Unknown record type: {}", s)))
    }
}

/// Normalize a DNS name for comparison: lower-case, one trailing dot removed
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

/// Identity of a record: normalized name plus type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    pub name: String,
    pub record_type: RecordType,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.record_type)
    }
}

/// Ordered, de-duplicated record targets
///
/// Order is kept as given (providers and logs read better that way) but
/// comparison with [`Targets::same`] ignores it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets(Vec<String>);

impl Targets {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Targets::default();
        for t in targets {
            out.push(t);
        }
        out
    }

    /// Append a target unless it is already present
    pub fn push(&mut self, target: impl Into<String>) {
        let target = target.into();
        if !self.0.contains(&target) {
            self.0.push(target);
        }
    }

    /// Set equality
    pub fn same(&self, other: &Targets) -> bool {
        let mut a: Vec<&String> = self.0.iter().collect();
        let mut b: Vec<&String> = other.0.iter().collect();
        a.sort();
        b.sort();
        a == b
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Targets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// String labels attached to an endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Owner label, if any
    pub fn owner(&self) -> Option<&str> {
        self.get(OWNER_LABEL_KEY)
    }

    pub fn set_owner(&mut self, owner_id: impl Into<String>) {
        self.insert(OWNER_LABEL_KEY, owner_id);
    }

    /// Overlay `other` on top of these labels
    pub fn extend(&mut self, other: &Labels) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for Labels {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One DNS record in the generic model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub dns_name: String,
    pub record_type: RecordType,
    pub targets: Targets,
    pub labels: Labels,
}

impl Endpoint {
    /// Create an endpoint with a single target
    ///
    /// An empty target yields an endpoint with no targets, which is how
    /// providers report deletions keyed by name and type only.
    pub fn new(dns_name: &str, target: &str, record_type: RecordType) -> Self {
        let targets = if target.is_empty() {
            Targets::default()
        } else {
            Targets::new([target])
        };
        Self::with_targets(dns_name, record_type, targets)
    }

    pub fn with_targets(dns_name: &str, record_type: RecordType, targets: Targets) -> Self {
        Self {
            dns_name: normalize_name(dns_name),
            record_type,
            targets,
            labels: Labels::new(),
        }
    }

    /// Builder-style label setter
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key, value);
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            name: self.dns_name.clone(),
            record_type: self.record_type,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.labels.owner()
    }

    /// Whether two endpoints describe the same record state
    ///
    /// Compares name, type, target set and owner label. Other labels are
    /// bookkeeping and do not make a record differ.
    pub fn same_as(&self, other: &Endpoint) -> bool {
        self.dns_name == other.dns_name
            && self.record_type == other.record_type
            && self.targets.same(&other.targets)
            && self.owner() == other.owner()
    }

    /// Fold another endpoint with the same key into this one
    pub fn merge(&mut self, other: &Endpoint) {
        debug_assert_eq!(self.key(), other.key());
        for t in other.targets.iter() {
            self.targets.push(t.clone());
        }
        for (k, v) in other.labels.iter() {
            if self.labels.get(k).is_none() {
                self.labels.insert(k.clone(), v.clone());
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.dns_name, self.record_type, self.targets)
    }
}
