//! Contract Test: Ownership Exclusivity
//!
//! Constraints verified:
//! - A record is managed iff an ownership TXT with our owner ID exists for
//!   its name
//! - Records without ownership, or owned by another instance, are never
//!   mutated or deleted
//! - A name holding unowned records is never claimed, whatever the type
//! - Two instances sharing one zone do not clobber each other
//! - Owner IDs with commas, `=` and whitespace survive the provider;
//!   IDs containing the ownership separator are refused up front
//!
//! If this test fails, the registry is leaking foreign records into the
//! plan or skipping its re-validation before writes.

mod common;

use common::*;
use dnsreconcile_core::endpoint::RecordType;
use dnsreconcile_core::provider::Provider;
use dnsreconcile_core::registry::{Registry, SkipReason, TxtRegistry};
use dnsreconcile_core::source::StaticSource;
use dnsreconcile_core::Controller;
use std::sync::Arc;

#[tokio::test]
async fn records_are_exactly_the_owned_ones() {
    let provider = provider_with_zones(&["example.com"]).await;
    provider
        .insert_records(vec![
            a("mine.example.com", "1.1.1.1"),
            txt("mine.example.com", &ownership("default")),
            a("foreign.example.com", "2.2.2.2"),
            txt("foreign.example.com", &ownership("someone-else")),
            a("manual.example.com", "3.3.3.3"),
            txt("orphan.example.com", &ownership("default")),
        ])
        .await
        .unwrap();
    let registry = txt_registry(Arc::new(provider.clone()), "default");

    let owned = registry.records().await.unwrap();
    let names: Vec<&str> = owned.iter().map(|ep| ep.dns_name.as_str()).collect();
    assert_eq!(names, ["mine.example.com"]);
    assert!(owned.iter().all(|ep| ep.owner() == Some("default")));
    assert!(owned.iter().all(|ep| ep.record_type != RecordType::TXT));
}

#[tokio::test]
async fn foreign_and_unowned_records_are_left_alone() {
    // Desired lists both records unchanged; neither carries our ownership
    let provider = provider_with_zones(&["example.com"]).await;
    provider
        .insert_records(vec![
            a("foreign.example.com", "2.2.2.2"),
            txt("foreign.example.com", &ownership("someone-else")),
            a("manual.example.com", "3.3.3.3"),
        ])
        .await
        .unwrap();
    let before = provider.records().await.unwrap();
    let registry = txt_registry(Arc::new(provider.clone()), "default");
    let source = StaticSource::new(vec![
        a("foreign.example.com", "2.2.2.2"),
        a("manual.example.com", "3.3.3.3"),
    ]);

    let (controller, _rx) =
        Controller::new(Box::new(source), Box::new(registry), test_config()).unwrap();
    let report = controller.run_once().await.unwrap();

    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped.iter().any(|s| s.reason
        == SkipReason::OwnershipConflict {
            owner: Some("someone-else".to_string())
        }));
    assert_eq!(provider.apply_calls().await, 0);
    assert_eq!(provider.records().await.unwrap(), before);
    // Standing conflicts do not keep a converged zone busy
    assert!(report.is_noop());
}

#[tokio::test]
async fn name_with_unowned_record_of_another_type_is_not_claimed() {
    let provider = provider_with_zones(&["example.com"]).await;
    let unowned = dnsreconcile_core::Endpoint::new("www.example.com", "::1", RecordType::AAAA);
    provider.insert_records(vec![unowned.clone()]).await.unwrap();
    let registry = txt_registry(Arc::new(provider.clone()), "default");
    let source = StaticSource::new(vec![a("www.example.com", "1.2.3.4")]);

    let (controller, _rx) =
        Controller::new(Box::new(source), Box::new(registry), test_config()).unwrap();
    for _ in 0..2 {
        let report = controller.run_once().await.unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::OwnershipConflict { owner: None });
    }

    assert_eq!(provider.apply_calls().await, 0);
    assert_eq!(provider.records().await.unwrap(), vec![unowned]);
}

#[tokio::test]
async fn empty_desired_state_never_deletes_foreign_records() {
    let provider = provider_with_zones(&["example.com"]).await;
    provider
        .insert_records(vec![
            a("foreign.example.com", "2.2.2.2"),
            txt("foreign.example.com", &ownership("someone-else")),
            a("manual.example.com", "3.3.3.3"),
        ])
        .await
        .unwrap();
    let registry = txt_registry(Arc::new(provider.clone()), "default");

    let (controller, _rx) = Controller::new(
        Box::new(StaticSource::default()),
        Box::new(registry),
        test_config(),
    )
    .unwrap();
    let report = controller.run_once().await.unwrap();

    assert!(report.is_noop());
    assert_eq!(provider.records().await.unwrap().len(), 3);
}

#[tokio::test]
async fn two_owners_share_a_zone() {
    let provider = provider_with_zones(&["example.com"]).await;
    let blue_source = StaticSource::new(vec![a("blue.example.com", "1.1.1.1")]);
    let green_source = StaticSource::new(vec![a("green.example.com", "2.2.2.2")]);

    let (blue, _blue_rx) = Controller::new(
        Box::new(blue_source),
        Box::new(txt_registry(Arc::new(provider.clone()), "blue")),
        test_config(),
    )
    .unwrap();
    let (green, _green_rx) = Controller::new(
        Box::new(green_source),
        Box::new(txt_registry(Arc::new(provider.clone()), "green")),
        test_config(),
    )
    .unwrap();

    for _ in 0..2 {
        blue.run_once().await.unwrap();
        green.run_once().await.unwrap();
    }

    let records = provider.records().await.unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.contains(&txt("blue.example.com", &ownership("blue"))));
    assert!(records.contains(&txt("green.example.com", &ownership("green"))));

    // Each instance sees only its own record
    let blue_view = txt_registry(Arc::new(provider.clone()), "blue").records().await.unwrap();
    assert_eq!(blue_view.len(), 1);
    assert_eq!(blue_view[0].dns_name, "blue.example.com");
}

#[tokio::test]
async fn ownership_taken_over_between_read_and_write() {
    let provider = provider_with_zones(&["example.com"]).await;
    provider
        .insert_records(vec![
            a("contested.example.com", "1.1.1.1"),
            txt("contested.example.com", &ownership("default")),
        ])
        .await
        .unwrap();
    let registry = txt_registry(Arc::new(provider.clone()), "default");
    let current = registry.records().await.unwrap();
    assert_eq!(current.len(), 1);

    // Another instance claims the name before our batch is applied
    let mut takeover = dnsreconcile_core::plan::Changes::default();
    takeover
        .update_old
        .push(txt("contested.example.com", &ownership("default")));
    takeover
        .update_new
        .push(txt("contested.example.com", &ownership("intruder")));
    provider.apply_changes(takeover).await.unwrap();

    let mut changes = dnsreconcile_core::plan::Changes::default();
    changes.update_old.push(current[0].clone());
    changes.update_new.push(a("contested.example.com", "9.9.9.9"));
    changes.delete.push(current[0].clone());

    let report = registry.apply_changes(changes).await.unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped.iter().all(|s| s.reason == SkipReason::OwnershipLost));
    assert!(provider.records().await.unwrap().contains(&a("contested.example.com", "1.1.1.1")));
}

#[tokio::test]
async fn unusual_owner_ids_round_trip_through_the_provider() {
    for owner in ["team a, prod", "k=v", "  spaced  out  ", "team,external-dns"] {
        let provider = provider_with_zones(&["example.com"]).await;
        let registry = txt_registry(Arc::new(provider.clone()), owner);
        let (controller, _rx) = Controller::new(
            Box::new(StaticSource::new(vec![a("www.example.com", "1.1.1.1")])),
            Box::new(registry),
            test_config(),
        )
        .unwrap();

        controller.run_once().await.unwrap();
        let second = controller.run_once().await.unwrap();
        assert!(second.is_noop(), "owner {:?} did not converge", owner);

        let owned = txt_registry(Arc::new(provider.clone()), owner).records().await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].owner(), Some(owner));
    }

    let provider: Arc<dyn Provider> = Arc::new(provider_with_zones(&["example.com"]).await);
    let format = dnsreconcile_core::OwnershipFormat::default();
    assert!(TxtRegistry::new(provider, "team,external-dns/x=1", format).is_err());
}
