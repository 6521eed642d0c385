use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Which change kinds may reach the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Create, update and delete
    #[default]
    Sync,
    /// Create and update, never delete
    UpsertOnly,
    /// Create only
    CreateOnly,
}

impl Policy {
    pub fn allows_create(&self) -> bool {
        true
    }

    pub fn allows_update(&self) -> bool {
        matches!(self, Policy::Sync | Policy::UpsertOnly)
    }

    pub fn allows_delete(&self) -> bool {
        matches!(self, Policy::Sync)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Sync => "sync",
            Policy::UpsertOnly => "upsert-only",
            Policy::CreateOnly => "create-only",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(Policy::Sync),
            "upsert-only" | "upsert" => Ok(Policy::UpsertOnly),
            "create-only" | "createonly" => Ok(Policy::CreateOnly),
            other => Err(Error::config(format!(
                "Unknown policy '{}'. Valid policies: sync, upsert-only, create-only",
                other
            ))),
        }
    }
}
