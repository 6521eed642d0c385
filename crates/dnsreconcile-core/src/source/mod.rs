//! Desired-state sources
//!
//! An [`EndpointSource`] tells the controller which endpoints should exist.
//! Sources are read fresh on every cycle; a source may also push change
//! notifications that make the controller reconcile before its next tick.
//!
//! - [`StaticSource`]: in-memory list, replaceable at runtime
//! - [`FileSource`]: JSON document on disk

mod file;
mod memory;

pub use file::FileSource;
pub use memory::StaticSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::pin::Pin;
use tokio_stream::Stream;

use crate::endpoint::Endpoint;
use crate::error::Result;

/// Change notification from a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    /// Human-readable cause, for logs
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl SourceEvent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Stream type returned by [`EndpointSource::watch`]
pub type SourceEventStream = Pin<Box<dyn Stream<Item = SourceEvent> + Send + 'static>>;

/// Provider of desired endpoints
#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// Current desired endpoints
    async fn endpoints(&self) -> Result<Vec<Endpoint>>;

    /// Change notifications
    ///
    /// The default stream never yields; the controller then relies on its
    /// interval alone. Dropping the stream must release its resources.
    fn watch(&self) -> SourceEventStream {
        Box::pin(tokio_stream::pending())
    }

    fn source_name(&self) -> &'static str;
}
