//! Test doubles and common utilities for contract tests
//!
//! The in-memory provider is the real reference implementation; the doubles
//! here only add call counting, delays and controllable notifications on
//! top of it.

#![allow(dead_code)]

use dnsreconcile_core::config::ControllerConfig;
use dnsreconcile_core::endpoint::{Endpoint, RecordType};
use dnsreconcile_core::error::{Error, Result};
use dnsreconcile_core::plan::Changes;
use dnsreconcile_core::provider::{InMemoryProvider, Provider};
use dnsreconcile_core::registry::{OwnershipFormat, TxtRegistry};
use dnsreconcile_core::source::{EndpointSource, SourceEvent, SourceEventStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Quoted ownership payload for `owner` with the default heritage
pub fn ownership(owner: &str) -> String {
    format!("\"heritage=external-dns,external-dns/owner={}\"", owner)
}

pub fn a(name: &str, target: &str) -> Endpoint {
    Endpoint::new(name, target, RecordType::A)
}

pub fn txt(name: &str, text: &str) -> Endpoint {
    Endpoint::new(name, text, RecordType::TXT)
}

/// Provider hosting the given zones
pub async fn provider_with_zones(zones: &[&str]) -> InMemoryProvider {
    let provider = InMemoryProvider::new();
    for (i, zone) in zones.iter().enumerate() {
        provider.create_zone(format!("zone-{}", i), zone).await;
    }
    provider
}

pub fn txt_registry(provider: Arc<dyn Provider>, owner: &str) -> TxtRegistry {
    TxtRegistry::new(provider, owner, OwnershipFormat::default()).expect("valid owner id")
}

/// Controller config for tests: one-second interval, small event channel
pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        interval_secs: 1,
        event_channel_capacity: 100,
        ..Default::default()
    }
}

/// A desired-state source whose notifications are sent by the test
pub struct ControlledSource {
    endpoints: Arc<std::sync::Mutex<Vec<Endpoint>>>,
    engine_rx: Arc<std::sync::Mutex<Option<mpsc::UnboundedReceiver<SourceEvent>>>>,
    test_tx: mpsc::UnboundedSender<SourceEvent>,
    endpoints_call_count: Arc<AtomicUsize>,
}

impl ControlledSource {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        let (test_tx, engine_rx) = mpsc::unbounded_channel();
        Self {
            endpoints: Arc::new(std::sync::Mutex::new(endpoints)),
            engine_rx: Arc::new(std::sync::Mutex::new(Some(engine_rx))),
            test_tx,
            endpoints_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle sharing state with this source
    pub fn handle(&self) -> Self {
        Self {
            endpoints: Arc::clone(&self.endpoints),
            engine_rx: Arc::clone(&self.engine_rx),
            test_tx: self.test_tx.clone(),
            endpoints_call_count: Arc::clone(&self.endpoints_call_count),
        }
    }

    /// Replace the endpoints without notifying
    pub fn replace(&self, endpoints: Vec<Endpoint>) {
        *self.endpoints.lock().unwrap() = endpoints;
    }

    pub fn notify(&self, reason: &str) {
        let _ = self.test_tx.send(SourceEvent::new(reason));
    }

    pub fn endpoints_call_count(&self) -> usize {
        self.endpoints_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EndpointSource for ControlledSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.endpoints_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.endpoints.lock().unwrap().clone())
    }

    fn watch(&self) -> SourceEventStream {
        let rx = self
            .engine_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "controlled"
    }
}

/// A source that always fails
pub struct FailingSource;

#[async_trait::async_trait]
impl EndpointSource for FailingSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        Err(Error::source("inventory unavailable"))
    }

    fn source_name(&self) -> &'static str {
        "failing"
    }
}

/// Wraps the in-memory provider, counting calls and optionally slowing
/// down `apply_changes`
pub struct CountingProvider {
    inner: InMemoryProvider,
    records_call_count: Arc<AtomicUsize>,
    apply_call_count: Arc<AtomicUsize>,
    apply_delay: Option<Duration>,
}

impl CountingProvider {
    pub fn new(inner: InMemoryProvider) -> Self {
        Self {
            inner,
            records_call_count: Arc::new(AtomicUsize::new(0)),
            apply_call_count: Arc::new(AtomicUsize::new(0)),
            apply_delay: None,
        }
    }

    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = Some(delay);
        self
    }

    pub fn records_call_count(&self) -> usize {
        self.records_call_count.load(Ordering::SeqCst)
    }

    pub fn apply_call_count(&self) -> usize {
        self.apply_call_count.load(Ordering::SeqCst)
    }

    /// Create a new CountingProvider that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            inner: other.inner.clone(),
            records_call_count: Arc::clone(&other.records_call_count),
            apply_call_count: Arc::clone(&other.apply_call_count),
            apply_delay: other.apply_delay,
        }
    }
}

#[async_trait::async_trait]
impl Provider for CountingProvider {
    async fn records(&self) -> Result<Vec<Endpoint>> {
        self.records_call_count.fetch_add(1, Ordering::SeqCst);
        self.inner.records().await
    }

    async fn apply_changes(&self, changes: Changes) -> Result<()> {
        self.apply_call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.apply_changes(changes).await
    }

    fn provider_name(&self) -> &'static str {
        "counting"
    }
}

/// Drain every event currently queued
pub fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
