// # Static Source
//
// In-memory desired state for embedding and tests. Replacing the list with
// `set` notifies every active watch stream.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use super::{EndpointSource, SourceEvent, SourceEventStream};
use crate::endpoint::Endpoint;
use crate::error::Result;

const NOTIFY_CAPACITY: usize = 16;

/// In-memory endpoint source
///
/// # Example
///
/// ```rust
/// use dnsreconcile_core::endpoint::{Endpoint, RecordType};
/// use dnsreconcile_core::source::{EndpointSource, StaticSource};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let source = StaticSource::new(vec![]);
///     source.set(vec![Endpoint::new("www.example.com", "1.2.3.4", RecordType::A)]).await;
///     assert_eq!(source.endpoints().await?.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StaticSource {
    endpoints: Arc<RwLock<Vec<Endpoint>>>,
    notify: broadcast::Sender<SourceEvent>,
}

impl StaticSource {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            endpoints: Arc::new(RwLock::new(endpoints)),
            notify,
        }
    }

    /// Replace the desired endpoints and notify watchers
    pub async fn set(&self, endpoints: Vec<Endpoint>) {
        let count = endpoints.len();
        *self.endpoints.write().await = endpoints;
        // No receivers is fine: nobody is watching yet
        let _ = self
            .notify
            .send(SourceEvent::new(format!("{} endpoint(s) set", count)));
    }

    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.endpoints.read().await.is_empty()
    }
}

impl Default for StaticSource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl EndpointSource for StaticSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(self.endpoints.read().await.clone())
    }

    fn watch(&self) -> SourceEventStream {
        // Lagged receivers only lose intermediate notifications; the next
        // cycle reads the latest list anyway
        let stream = BroadcastStream::new(self.notify.subscribe()).filter_map(|event| event.ok());
        Box::pin(stream)
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}
