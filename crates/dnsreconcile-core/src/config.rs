//! Configuration types for the reconciliation engine
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::endpoint::RecordType;
use crate::plan::{DEFAULT_MANAGED_TYPES, Policy};
use crate::provider::DomainFilter;
use crate::registry::{DEFAULT_HERITAGE, OwnershipFormat};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Ownership registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Control loop settings
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl ReconcileConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.registry.validate()?;
        self.controller.validate()?;

        if let RegistryConfig::Txt { prefix, .. } = &self.registry {
            let manages_txt = self.controller.managed_record_types.contains(&RecordType::TXT);
            if prefix.is_empty() && manages_txt {
                return Err(crate::Error::config(
                    "Managing TXT records with the TXT registry requires a non-empty prefix",
                ));
            }
        }

        Ok(())
    }
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryConfig {
    /// Ownership tracked in companion TXT records
    Txt {
        /// Owner ID of this instance
        owner_id: String,
        /// Prepended to a record name to form its ownership record name
        #[serde(default)]
        prefix: String,
        /// Heritage string of the ownership payload
        #[serde(default = "default_heritage")]
        heritage: String,
    },

    /// No ownership tracking, every record is managed
    Noop,
}

impl RegistryConfig {
    /// TXT registry with default prefix and heritage
    pub fn txt(owner_id: impl Into<String>) -> Self {
        RegistryConfig::Txt {
            owner_id: owner_id.into(),
            prefix: String::new(),
            heritage: default_heritage(),
        }
    }

    /// Validate the registry configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RegistryConfig::Txt {
                owner_id,
                prefix,
                heritage,
            } => {
                if owner_id.is_empty() {
                    return Err(crate::Error::config("TXT registry owner ID cannot be empty"));
                }
                if heritage.is_empty() {
                    return Err(crate::Error::config("TXT registry heritage cannot be empty"));
                }
                let reserved = heritage.contains([',', '=', '/', '"']);
                if reserved || heritage.chars().any(char::is_whitespace) {
                    return Err(crate::Error::config(format!(
                        "TXT registry heritage '{}' must not contain separators or whitespace",
                        heritage
                    )));
                }
                if prefix.chars().any(char::is_whitespace) {
                    return Err(crate::Error::config(
                        "TXT registry prefix must not contain whitespace",
                    ));
                }
                OwnershipFormat::new(heritage.clone()).check_value(owner_id)?;
                Ok(())
            }
            RegistryConfig::Noop => Ok(()),
        }
    }

    pub fn owner_id(&self) -> Option<&str> {
        match self {
            RegistryConfig::Txt { owner_id, .. } => Some(owner_id.as_str()),
            RegistryConfig::Noop => None,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig::txt("default")
    }
}

fn default_heritage() -> String {
    DEFAULT_HERITAGE.to_string()
}

/// Control loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Which change kinds may reach the provider
    #[serde(default)]
    pub policy: Policy,

    /// Seconds between reconciliation cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Run a single cycle and stop
    #[serde(default)]
    pub once: bool,

    /// Allowed root domains; empty allows all
    #[serde(default)]
    pub domain_filter: Vec<String>,

    /// Record types the plan may touch
    #[serde(default = "default_managed_record_types")]
    pub managed_record_types: Vec<RecordType>,

    /// Capacity of the controller event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ControllerConfig {
    /// Validate the controller configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 && !self.once {
            return Err(crate::Error::config("Reconcile interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.managed_record_types.is_empty() {
            return Err(crate::Error::config("At least one managed record type is required"));
        }
        Ok(())
    }

    pub fn domain_filter(&self) -> DomainFilter {
        DomainFilter::new(&self.domain_filter)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            interval_secs: default_interval_secs(),
            once: false,
            domain_filter: Vec::new(),
            managed_record_types: default_managed_record_types(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_managed_record_types() -> Vec<RecordType> {
    DEFAULT_MANAGED_TYPES.to_vec()
}

fn default_event_channel_capacity() -> usize {
    1000
}
