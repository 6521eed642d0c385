// # File Source
//
// Desired endpoints kept in a JSON document, re-read on every call so that
// external edits take effect on the next cycle.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "endpoints": [
//     {
//       "dns_name": "www.example.com",
//       "record_type": "A",
//       "targets": ["1.2.3.4"],
//       "labels": { "resource": "service/default/web" }
//     }
//   ]
// }
// ```
//
// ## Writes
//
// `store` writes to a temporary sibling and renames it into place, so a
// reader never sees a half-written document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::EndpointSource;
use crate::endpoint::{Endpoint, Labels, RecordType, Targets};
use crate::error::{Error, Result};

/// Endpoint file format version
const ENDPOINT_FILE_VERSION: &str = "1.0";

/// Serializable document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EndpointFile {
    version: String,
    #[serde(default)]
    endpoints: Vec<EndpointEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EndpointEntry {
    dns_name: String,
    record_type: RecordType,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

impl From<EndpointEntry> for Endpoint {
    fn from(entry: EndpointEntry) -> Self {
        Endpoint::with_targets(&entry.dns_name, entry.record_type, Targets::new(entry.targets))
            .with_labels(Labels::from(entry.labels))
    }
}

impl From<&Endpoint> for EndpointEntry {
    fn from(ep: &Endpoint) -> Self {
        Self {
            dns_name: ep.dns_name.clone(),
            record_type: ep.record_type,
            targets: ep.targets.as_slice().to_vec(),
            labels: ep.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// JSON file endpoint source
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the document
    async fn load(&self) -> Result<Vec<Endpoint>> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::source(format!("Failed to read endpoint file {}: {}", self.path.display(), e))
        })?;

        let file: EndpointFile = serde_json::from_str(&content).map_err(|e| {
            Error::source(format!("Invalid endpoint file {}: {}", self.path.display(), e))
        })?;

        if file.version != ENDPOINT_FILE_VERSION {
            tracing::warn!(
                "Endpoint file version mismatch: expected {}, found {}. Attempting to load anyway.",
                ENDPOINT_FILE_VERSION,
                file.version
            );
        }

        Ok(file.endpoints.into_iter().map(Endpoint::from).collect())
    }

    /// Atomically replace the document with `endpoints`
    pub async fn store(&self, endpoints: &[Endpoint]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::source(format!("Failed to create directory {}: {}", parent.display(), e))
                })?;
            }
        }

        let file = EndpointFile {
            version: ENDPOINT_FILE_VERSION.to_string(),
            endpoints: endpoints.iter().map(EndpointEntry::from).collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.path.with_extension("tmp");
        let mut temp = fs::File::create(&temp_path).await?;
        temp.write_all(json.as_bytes()).await?;
        temp.sync_all().await?;
        drop(temp);

        fs::rename(&temp_path, &self.path).await?;
        tracing::debug!("Wrote {} endpoint(s) to {}", endpoints.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl EndpointSource for FileSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.load().await
    }

    fn source_name(&self) -> &'static str {
        "file"
    }
}
