//! Reconciliation control loop
//!
//! The Controller drives repeated reconciliation cycles:
//! - Reads desired endpoints from an EndpointSource
//! - Reads owned records through a Registry
//! - Computes a Plan
//! - Hands the changes back to the Registry
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────┐
//! │ EndpointSource   │      │ interval     │
//! │ (desired, watch) │      │ tick         │
//! └──────────────────┘      └──────────────┘
//!          │                        │
//!          └──────────┬─────────────┘
//!                     ▼
//!             ┌──────────────┐
//!             │  Controller  │── ControllerEvent ──▶ (monitoring)
//!             └──────────────┘
//!                     │
//!            ┌────────┴────────┐
//!            ▼                 ▼
//!     ┌────────────┐    ┌────────────┐
//!     │   Plan     │    │  Registry  │──▶ Provider
//!     │ (diff)     │    │ (owned)    │
//!     └────────────┘    └────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. desired ← source
//! 2. current ← registry
//! 3. changes ← plan(desired, current)
//! 4. registry.apply_changes(changes), unless empty
//!
//! Nothing carries over between cycles: a failed or cancelled cycle is
//! corrected by the next one, which starts again from live state.
//!
//! ## Cancellation
//!
//! Shutdown is cooperative. The cancel flag is checked before each source
//! and registry call; a batch already handed to the registry runs to
//! completion or failure.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::plan::{Changes, Plan};
use crate::registry::{Registry, SkippedChange};
use crate::source::EndpointSource;

/// Events emitted by the Controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Control loop started
    Started { interval_secs: u64, once: bool },

    /// The source reported a change
    SourceChanged { reason: String },

    /// A cycle finished
    CycleCompleted {
        created: usize,
        updated: usize,
        deleted: usize,
        skipped: usize,
    },

    /// A cycle failed; the next one starts from scratch
    CycleFailed { error: String },

    /// Control loop stopped
    Stopped { reason: String },
}

/// Outcome of one reconciliation cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Desired endpoints read from the source
    pub desired: usize,
    /// Owned records read through the registry
    pub current: usize,
    /// Changes sent to the provider, ownership records included
    pub applied: Changes,
    pub skipped: Vec<SkippedChange>,
}

impl CycleReport {
    /// True when the zone already matched the desired state
    ///
    /// Records held by another owner stay skipped every cycle; they do not
    /// make a converged zone look busy.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.skipped.iter().all(|s| s.reason.is_conflict())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.signed_duration_since(self.started_at)
    }
}

/// Shared flag that stops a controller at its next checkpoint
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Reconciliation controller
///
/// ## Lifecycle
///
/// 1. Create with [`Controller::new()`]
/// 2. Start with [`Controller::run()`], or drive single cycles with
///    [`Controller::run_once()`]
/// 3. The loop runs until a shutdown signal is received
///
/// ## Load Resistance
///
/// - **Bounded event channel**: events are dropped (logged) when full
/// - **Coalesced triggers**: a burst of source notifications during a cycle
///   results in at most one extra cycle per notification read
pub struct Controller {
    source: Box<dyn EndpointSource>,
    registry: Box<dyn Registry>,
    plan: Plan,
    interval_secs: u64,
    once: bool,
    cancel: CancelHandle,
    event_tx: mpsc::Sender<ControllerEvent>,
}

impl Controller {
    /// Create a new controller
    ///
    /// The plan is claimed for the registry's owner ID, so desired endpoints
    /// compare equal to owned records carrying the same owner label.
    ///
    /// # Returns
    ///
    /// A tuple of (controller, event_receiver)
    pub fn new(
        source: Box<dyn EndpointSource>,
        registry: Box<dyn Registry>,
        config: ControllerConfig,
    ) -> Result<(Self, mpsc::Receiver<ControllerEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let plan = Plan::new(config.policy)
            .with_owner(registry.owner_id().map(str::to_string))
            .with_domain_filter(config.domain_filter())
            .with_managed_types(config.managed_record_types.clone());

        let controller = Self {
            source,
            registry,
            plan,
            interval_secs: config.interval_secs,
            once: config.once,
            cancel: CancelHandle::default(),
            event_tx: tx,
        };

        Ok((controller, rx))
    }

    /// Handle that cancels this controller from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run one reconciliation cycle
    pub async fn run_once(&self) -> Result<CycleReport> {
        let started_at = Utc::now();
        match self.cycle(started_at).await {
            Ok(report) => {
                self.emit_event(ControllerEvent::CycleCompleted {
                    created: report.applied.create.len(),
                    updated: report.applied.update_new.len(),
                    deleted: report.applied.delete.len(),
                    skipped: report.skipped.len(),
                });
                Ok(report)
            }
            Err(Error::Cancelled) => {
                info!("Reconciliation cycle cancelled");
                Err(Error::Cancelled)
            }
            Err(e) => {
                self.emit_event(ControllerEvent::CycleFailed { error: e.to_string() });
                Err(e)
            }
        }
    }

    async fn cycle(&self, started_at: DateTime<Utc>) -> Result<CycleReport> {
        self.checkpoint()?;
        let desired = self.source.endpoints().await?;
        debug!("{} source returned {} endpoint(s)", self.source.source_name(), desired.len());

        self.checkpoint()?;
        let current = self.registry.records().await?;
        debug!(
            "{} registry returned {} owned record(s)",
            self.registry.registry_name(),
            current.len()
        );

        let (desired_count, current_count) = (desired.len(), current.len());
        let changes = self.plan.calculate(desired, current);

        let report = if changes.is_empty() {
            debug!("All records up to date");
            Default::default()
        } else {
            self.checkpoint()?;
            self.registry.apply_changes(changes).await?
        };

        for skipped in &report.skipped {
            if skipped.reason.is_conflict() {
                debug!("Skipped {} of {}: {}", skipped.kind, skipped.endpoint, skipped.reason);
            } else {
                warn!("Skipped {} of {}: {}", skipped.kind, skipped.endpoint, skipped.reason);
            }
        }
        if !report.applied.is_empty() {
            info!(
                "Reconciled: {} created, {} updated, {} deleted, {} skipped",
                report.applied.create.len(),
                report.applied.update_new.len(),
                report.applied.delete.len(),
                report.skipped.len()
            );
        }

        Ok(CycleReport {
            started_at,
            finished_at: Utc::now(),
            desired: desired_count,
            current: current_count,
            applied: report.applied,
            skipped: report.skipped,
        })
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Run the control loop
    ///
    /// Reconciles immediately, then on every interval tick or source change,
    /// until SIGINT. Cycle failures are logged and the loop continues.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: In `once` mode, the error of the single cycle
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the control loop until `shutdown_rx` fires (or SIGINT when `None`)
    ///
    /// Used by embedding applications and tests that own their shutdown
    /// signal.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.emit_event(ControllerEvent::Started {
            interval_secs: self.interval_secs,
            once: self.once,
        });
        info!(
            "Controller started (policy: {}, interval: {}s, once: {})",
            self.plan.policy(),
            self.interval_secs,
            self.once
        );

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);
        let mut shutting_down = false;

        let mut ticker = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut source_events = self.source.watch();

        let mut result = Ok(());
        loop {
            tokio::select! {
                _ = &mut shutdown, if !shutting_down => {
                    shutting_down = true;
                }

                // The first tick completes immediately
                _ = ticker.tick() => {}

                Some(event) = source_events.next() => {
                    debug!("Source change: {}", event.reason);
                    self.emit_event(ControllerEvent::SourceChanged { reason: event.reason });
                    ticker.reset();
                }
            }
            if shutting_down {
                break;
            }

            let cycle = self.run_once();
            tokio::pin!(cycle);
            let outcome = tokio::select! {
                outcome = &mut cycle => outcome,
                _ = &mut shutdown, if !shutting_down => {
                    info!("Shutdown requested, stopping at next checkpoint");
                    shutting_down = true;
                    self.cancel.cancel();
                    cycle.await
                }
            };

            match outcome {
                Ok(report) if report.is_noop() => {
                    debug!(
                        "Cycle finished in {}ms, no changes",
                        report.duration().num_milliseconds()
                    );
                }
                Ok(report) => {
                    debug!("Cycle finished in {}ms", report.duration().num_milliseconds());
                }
                Err(Error::Cancelled) => {}
                Err(e) => {
                    error!("Reconciliation cycle failed: {}", e);
                    if self.once {
                        result = Err(e);
                    }
                }
            }

            if self.once || shutting_down {
                break;
            }
        }

        let reason = if shutting_down {
            "Shutdown signal"
        } else {
            "Single cycle completed"
        };
        info!("Controller stopped: {}", reason);
        self.emit_event(ControllerEvent::Stopped {
            reason: reason.to_string(),
        });

        result
    }

    /// Emit a controller event
    fn emit_event(&self, event: ControllerEvent) {
        // Full channel means the consumer is behind; drop instead of blocking a cycle
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. \
                Consider increasing event_channel_capacity."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Endpoint, RecordType};
    use crate::provider::{InMemoryProvider, Provider};
    use crate::registry::{OwnershipFormat, TxtRegistry};
    use crate::source::StaticSource;

    async fn setup(
        desired: Vec<Endpoint>,
    ) -> (InMemoryProvider, Controller, mpsc::Receiver<ControllerEvent>) {
        let provider = InMemoryProvider::new();
        provider.create_zone("z1", "example.com").await;
        let registry =
            TxtRegistry::new(Arc::new(provider.clone()), "default", OwnershipFormat::default())
                .unwrap();
        let config = ControllerConfig {
            once: true,
            ..Default::default()
        };
        let source = StaticSource::new(desired);
        let (controller, rx) =
            Controller::new(Box::new(source), Box::new(registry), config).unwrap();
        (provider, controller, rx)
    }

    #[tokio::test]
    async fn first_cycle_creates_then_converges() {
        let (provider, controller, mut rx) =
            setup(vec![Endpoint::new("example.com", "1.2.3.4", RecordType::A)]).await;

        let report = controller.run_once().await.unwrap();
        assert_eq!(report.desired, 1);
        assert_eq!(report.current, 0);
        // Data record plus its ownership record
        assert_eq!(report.applied.create.len(), 2);
        assert_eq!(provider.records().await.unwrap().len(), 2);

        let second = controller.run_once().await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.current, 1);

        assert_eq!(
            rx.recv().await,
            Some(ControllerEvent::CycleCompleted {
                created: 2,
                updated: 0,
                deleted: 0,
                skipped: 0
            })
        );
    }

    #[tokio::test]
    async fn cancelled_controller_touches_nothing() {
        let (provider, controller, _rx) =
            setup(vec![Endpoint::new("example.com", "1.2.3.4", RecordType::A)]).await;

        controller.cancel_handle().cancel();
        assert!(matches!(controller.run_once().await, Err(Error::Cancelled)));
        assert_eq!(provider.apply_calls().await, 0);
    }

    #[tokio::test]
    async fn once_mode_returns_after_one_cycle() {
        let (provider, controller, mut rx) =
            setup(vec![Endpoint::new("www.example.com", "1.2.3.4", RecordType::A)]).await;

        controller.run().await.unwrap();
        assert_eq!(provider.apply_calls().await, 1);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(ControllerEvent::Started { once: true, .. })));
        assert!(matches!(events.last(), Some(ControllerEvent::Stopped { .. })));
    }

    #[tokio::test]
    async fn failed_cycle_emits_event() {
        let (provider, controller, mut rx) =
            setup(vec![Endpoint::new("www.example.com", "1.2.3.4", RecordType::A)]).await;
        provider.fail_after(Some(0)).await;

        let err = controller.run_once().await.unwrap_err();
        assert!(err.is_provider());
        assert!(matches!(rx.recv().await, Some(ControllerEvent::CycleFailed { .. })));
    }
}
