// # Domain Filter
//
// Restricts which zones and records a provider or plan may touch.
//
// Matching is by label boundary: a filter entry `example.com` matches
// `example.com` and `www.example.com` but never `evilexample.com`.
// An empty filter, or any blank entry, allows everything.

use crate::endpoint::normalize_name;

/// Explicit set of allowed root domains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFilter {
    filters: Vec<String>,
    match_all: bool,
}

impl DomainFilter {
    /// Create a filter from a list of root domains
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filters = Vec::new();
        let mut match_all = false;
        for d in domains {
            let d = normalize_name(d.as_ref());
            if d.is_empty() {
                match_all = true;
            } else if !filters.contains(&d) {
                filters.push(d);
            }
        }
        if filters.is_empty() {
            match_all = true;
        }
        Self { filters, match_all }
    }

    /// A filter that allows every domain
    pub fn allow_all() -> Self {
        Self {
            filters: Vec::new(),
            match_all: true,
        }
    }

    /// Whether `name` lies under one of the allowed roots
    pub fn matches(&self, name: &str) -> bool {
        if self.match_all {
            return true;
        }
        let name = normalize_name(name);
        self.filters.iter().any(|root| is_subdomain_of(&name, root))
    }

    pub fn is_allow_all(&self) -> bool {
        self.match_all
    }

    pub fn domains(&self) -> &[String] {
        &self.filters
    }
}

impl Default for DomainFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// Label-boundary suffix test on normalized names
pub(crate) fn is_subdomain_of(name: &str, root: &str) -> bool {
    if root.is_empty() {
        return true;
    }
    name == root
        || (name.len() > root.len()
            && name.ends_with(root)
            && name.as_bytes()[name.len() - root.len() - 1] == b'.')
}
