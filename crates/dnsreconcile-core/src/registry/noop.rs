use async_trait::async_trait;
use std::sync::Arc;

use super::{ApplyReport, Registry};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::plan::Changes;
use crate::provider::Provider;

/// Registry without ownership tracking
///
/// Every provider record is treated as managed. Only safe when this instance
/// is the sole writer of its zones.
#[derive(Clone)]
pub struct NoopRegistry {
    provider: Arc<dyn Provider>,
}

impl NoopRegistry {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Registry for NoopRegistry {
    async fn records(&self) -> Result<Vec<Endpoint>> {
        self.provider.records().await
    }

    async fn apply_changes(&self, changes: Changes) -> Result<ApplyReport> {
        if !changes.is_empty() {
            self.provider.apply_changes(changes.clone()).await?;
        }
        Ok(ApplyReport {
            applied: changes,
            skipped: Vec::new(),
        })
    }

    fn owner_id(&self) -> Option<&str> {
        None
    }

    fn registry_name(&self) -> &'static str {
        "noop"
    }
}
