//! Minimal embedding example for dnsreconcile-core
//!
//! This example uses dnsreconcile-core as a library in a custom application:
//! a service catalog acts as the source of desired endpoints, and the
//! application owns the controller lifecycle.

use dnsreconcile_core::provider::{InMemoryProvider, Provider};
use dnsreconcile_core::source::{EndpointSource, SourceEvent, SourceEventStream};
use dnsreconcile_core::{
    Controller, ControllerConfig, Endpoint, OwnershipFormat, RecordType, Result, TxtRegistry,
};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Service catalog mapping service hostnames to addresses
struct ServiceCatalog {
    services: Arc<RwLock<Vec<(String, String)>>>,
    event_tx: mpsc::UnboundedSender<SourceEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<SourceEvent>>>,
}

impl ServiceCatalog {
    fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            services: Arc::new(RwLock::new(Vec::new())),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Handle the application keeps to register services
    fn handle(&self) -> CatalogHandle {
        CatalogHandle {
            services: Arc::clone(&self.services),
            event_tx: self.event_tx.clone(),
        }
    }
}

#[derive(Clone)]
struct CatalogHandle {
    services: Arc<RwLock<Vec<(String, String)>>>,
    event_tx: mpsc::UnboundedSender<SourceEvent>,
}

impl CatalogHandle {
    async fn register(&self, host: &str, address: &str) {
        self.services.write().await.push((host.to_string(), address.to_string()));
        let _ = self.event_tx.send(SourceEvent::new(format!("registered {}", host)));
    }

    async fn deregister(&self, host: &str) {
        self.services.write().await.retain(|(h, _)| h != host);
        let _ = self.event_tx.send(SourceEvent::new(format!("deregistered {}", host)));
    }
}

#[async_trait::async_trait]
impl EndpointSource for ServiceCatalog {
    async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        let services = self.services.read().await;
        Ok(services
            .iter()
            .map(|(host, address)| Endpoint::new(host, address, RecordType::A))
            .collect())
    }

    fn watch(&self) -> SourceEventStream {
        // Only the first watcher receives notifications
        match self.event_rx.lock().ok().and_then(|mut rx| rx.take()) {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::pending()),
        }
    }

    fn source_name(&self) -> &'static str {
        "service-catalog"
    }
}

async fn print_zone(provider: &InMemoryProvider) -> Result<()> {
    for ep in provider.records().await? {
        println!("   {} {} {:?}", ep.dns_name, ep.record_type, ep.targets.as_slice());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded dnsreconcile-core Example ===\n");

    // Create custom components
    let provider = InMemoryProvider::new();
    provider.create_zone("zone-1", "example.com").await;
    let registry = TxtRegistry::new(
        Arc::new(provider.clone()) as Arc<dyn Provider>,
        "embedded-app",
        OwnershipFormat::default(),
    )?;
    let catalog = ServiceCatalog::new();
    let handle = catalog.handle();
    handle.register("api.example.com", "10.0.0.10").await;

    let config = ControllerConfig {
        interval_secs: 3600,
        event_channel_capacity: 100,
        ..Default::default()
    };

    println!("1. Creating controller...");
    let (controller, mut event_rx) =
        Controller::new(Box::new(catalog), Box::new(registry), config)?;

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    println!("2. Starting controller in background...");
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let controller_handle =
        tokio::spawn(async move { controller.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    println!("\n3. Zone after first cycle:");
    print_zone(&provider).await?;

    println!("\n4. Registering and removing services...");
    handle.register("web.example.com", "10.0.0.20").await;
    handle.deregister("api.example.com").await;
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    print_zone(&provider).await?;

    println!("\n5. Stopping controller...");
    let _ = shutdown_tx.send(());
    if let Ok(result) = controller_handle.await {
        result?;
    }
    let _ = event_listener.await;

    println!("\n=== Embedding Successful ===");
    println!("- Controller lifecycle is fully controlled by the application");
    println!("- Source notifications trigger cycles between ticks");
    println!("- Ownership TXT records sit next to every managed record");

    Ok(())
}
