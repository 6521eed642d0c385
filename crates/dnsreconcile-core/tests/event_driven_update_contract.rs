//! Contract Test: Source-Driven Cycles
//!
//! Constraints verified:
//! - The first cycle runs immediately on start
//! - A source change notification triggers a cycle before the next tick
//! - One notification → one extra cycle
//!
//! If this test fails, someone has:
//! - Ignored the source watch stream
//! - Delayed the first cycle until the first interval elapses

mod common;

use common::*;
use dnsreconcile_core::config::ControllerConfig;
use dnsreconcile_core::provider::Provider;
use dnsreconcile_core::source::StaticSource;
use dnsreconcile_core::{Controller, ControllerEvent};
use std::sync::Arc;
use std::time::Duration;

fn slow_tick_config() -> ControllerConfig {
    ControllerConfig {
        interval_secs: 3600,
        ..test_config()
    }
}

#[tokio::test]
async fn notification_triggers_an_early_cycle() {
    let provider = provider_with_zones(&["example.com"]).await;
    let registry = txt_registry(Arc::new(provider.clone()), "default");
    let source = ControlledSource::new(vec![a("www.example.com", "1.1.1.1")]);
    let handle = source.handle();

    let (controller, mut event_rx) =
        Controller::new(Box::new(source), Box::new(registry), slow_tick_config()).unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let task = tokio::spawn(async move { controller.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.endpoints_call_count(), 1, "first cycle runs immediately");
    assert!(provider.records().await.unwrap().contains(&a("www.example.com", "1.1.1.1")));

    handle.replace(vec![a("www.example.com", "2.2.2.2")]);
    handle.notify("service updated");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(handle.endpoints_call_count(), 2, "one notification, one cycle");
    assert!(provider.records().await.unwrap().contains(&a("www.example.com", "2.2.2.2")));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap().unwrap();

    let events = drain(&mut event_rx);
    assert!(events.contains(&ControllerEvent::SourceChanged {
        reason: "service updated".to_string()
    }));
    let cycles = events
        .iter()
        .filter(|e| matches!(e, ControllerEvent::CycleCompleted { .. }))
        .count();
    assert_eq!(cycles, 2);
}

#[tokio::test]
async fn static_source_set_triggers_a_cycle() {
    let provider = provider_with_zones(&["example.com"]).await;
    let registry = txt_registry(Arc::new(provider.clone()), "default");
    let source = StaticSource::default();
    let handle = source.clone();

    let (controller, _rx) =
        Controller::new(Box::new(source), Box::new(registry), slow_tick_config()).unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let task = tokio::spawn(async move { controller.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(provider.records().await.unwrap().is_empty());

    handle.set(vec![a("api.example.com", "10.0.0.1")]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(provider.records().await.unwrap().contains(&a("api.example.com", "10.0.0.1")));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
}
