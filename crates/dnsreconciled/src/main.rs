// # dnsreconciled - DNS Reconciliation Daemon
//
// Thin integration layer: all reconciliation logic lives in
// dnsreconcile-core. The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring a source, a provider and a registry into a Controller
// 4. Translating SIGTERM/SIGINT into a graceful shutdown
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Ownership
// - `DNSRECONCILE_REGISTRY`: Registry type (txt, noop). Default: txt
// - `DNSRECONCILE_OWNER_ID`: Owner ID of this instance (required for txt)
// - `DNSRECONCILE_TXT_PREFIX`: Prefix of ownership record names
//
// ### Reconciliation
// - `DNSRECONCILE_POLICY`: sync, upsert-only, create-only. Default: sync
// - `DNSRECONCILE_INTERVAL`: Seconds between cycles. Default: 60
// - `DNSRECONCILE_ONCE`: Run a single cycle and exit
// - `DNSRECONCILE_DOMAIN_FILTER`: Comma-separated allowed root domains
//
// ### Source
// - `DNSRECONCILE_SOURCE_PATH`: JSON endpoint file (required)
//
// ### Provider
// - `DNSRECONCILE_PROVIDER`: Provider type (inmemory)
// - `DNSRECONCILE_ZONES`: Comma-separated zones hosted by the provider
// - `DNSRECONCILE_DRY_RUN`: Log changes instead of applying them
//
// ### Logging
// - `DNSRECONCILE_LOG_LEVEL`: trace, debug, info, warn, error. Default: info
//
// ## Example
//
// ```bash
// export DNSRECONCILE_OWNER_ID=cluster-a
// export DNSRECONCILE_SOURCE_PATH=/etc/dnsreconcile/endpoints.json
// export DNSRECONCILE_ZONES=example.com,internal.example.com
// export DNSRECONCILE_DRY_RUN=true
//
// dnsreconciled
// ```

use anyhow::{Context, Result};
use dnsreconcile_core::config::{ControllerConfig, ReconcileConfig, RegistryConfig};
use dnsreconcile_core::endpoint::RecordType;
use dnsreconcile_core::plan::Policy;
use dnsreconcile_core::provider::{DomainFilter, InMemoryProvider, Provider};
use dnsreconcile_core::source::FileSource;
use dnsreconcile_core::{Controller, ControllerEvent, registry};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long a shutdown may take before the daemon gives up waiting
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    registry_type: String,
    owner_id: Option<String>,
    txt_prefix: String,
    policy: String,
    interval_secs: u64,
    once: bool,
    domain_filter: Vec<String>,
    source_path: Option<String>,
    provider_type: String,
    zones: Vec<String>,
    dry_run: bool,
    log_level: String,
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn bool_var(name: &str) -> Result<bool> {
    match env::var(name) {
        Err(_) => Ok(false),
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("{} must be a boolean (true/false). Got: {}", name, other),
        },
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let interval_secs = match env::var("DNSRECONCILE_INTERVAL") {
            Ok(s) => s.trim().parse().with_context(|| {
                format!("DNSRECONCILE_INTERVAL must be a number of seconds. Got: {}", s)
            })?,
            Err(_) => 60,
        };

        Ok(Self {
            registry_type: env::var("DNSRECONCILE_REGISTRY").unwrap_or_else(|_| "txt".to_string()),
            owner_id: env::var("DNSRECONCILE_OWNER_ID").ok(),
            txt_prefix: env::var("DNSRECONCILE_TXT_PREFIX").unwrap_or_default(),
            policy: env::var("DNSRECONCILE_POLICY").unwrap_or_else(|_| "sync".to_string()),
            interval_secs,
            once: bool_var("DNSRECONCILE_ONCE")?,
            domain_filter: list_var("DNSRECONCILE_DOMAIN_FILTER"),
            source_path: env::var("DNSRECONCILE_SOURCE_PATH").ok(),
            provider_type: env::var("DNSRECONCILE_PROVIDER")
                .unwrap_or_else(|_| "inmemory".to_string()),
            zones: list_var("DNSRECONCILE_ZONES"),
            dry_run: bool_var("DNSRECONCILE_DRY_RUN")?,
            log_level: env::var("DNSRECONCILE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration and build the engine configuration
    fn validate(&self) -> Result<ReconcileConfig> {
        let registry = match self.registry_type.as_str() {
            "txt" => {
                let owner_id = self.owner_id.clone().unwrap_or_default();
                if owner_id.is_empty() {
                    anyhow::bail!(
                        "DNSRECONCILE_OWNER_ID is required with the txt registry. \
                        Set it via: export DNSRECONCILE_OWNER_ID=my-instance"
                    );
                }
                RegistryConfig::Txt {
                    owner_id,
                    prefix: self.txt_prefix.clone(),
                    heritage: dnsreconcile_core::registry::DEFAULT_HERITAGE.to_string(),
                }
            }
            "noop" => {
                if self.owner_id.is_some() {
                    eprintln!("WARNING: DNSRECONCILE_OWNER_ID is ignored with the noop registry.");
                }
                RegistryConfig::Noop
            }
            other => anyhow::bail!(
                "DNSRECONCILE_REGISTRY '{}' is not supported. Supported registries: txt, noop",
                other
            ),
        };

        let policy: Policy = self.policy.parse()?;

        match self.provider_type.as_str() {
            "inmemory" => {}
            other => anyhow::bail!(
                "DNSRECONCILE_PROVIDER '{}' is not supported. Supported providers: inmemory",
                other
            ),
        }

        if self.zones.is_empty() {
            anyhow::bail!(
                "DNSRECONCILE_ZONES must contain at least one zone. \
                Set it via: export DNSRECONCILE_ZONES=example.com"
            );
        }
        for zone in &self.zones {
            validate_domain_name(zone).context("Invalid entry in DNSRECONCILE_ZONES")?;
        }
        for domain in &self.domain_filter {
            validate_domain_name(domain).context("Invalid entry in DNSRECONCILE_DOMAIN_FILTER")?;
        }

        match self.source_path.as_deref() {
            None | Some("") => anyhow::bail!(
                "DNSRECONCILE_SOURCE_PATH is required. \
                Set it via: export DNSRECONCILE_SOURCE_PATH=/etc/dnsreconcile/endpoints.json"
            ),
            Some(path) => {
                if !std::path::Path::new(path).exists() {
                    eprintln!(
                        "WARNING: DNSRECONCILE_SOURCE_PATH {} does not exist yet. \
                        Cycles fail until it is created.",
                        path
                    );
                }
            }
        }

        if !self.once && !(1..=86400).contains(&self.interval_secs) {
            anyhow::bail!(
                "DNSRECONCILE_INTERVAL must be between 1 and 86400 seconds. Got: {}",
                self.interval_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DNSRECONCILE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        let config = ReconcileConfig {
            registry,
            controller: ControllerConfig {
                policy,
                interval_secs: self.interval_secs,
                once: self.once,
                domain_filter: self.domain_filter.clone(),
                managed_record_types: vec![RecordType::A, RecordType::AAAA, RecordType::CNAME],
                ..Default::default()
            },
        };
        config.validate()?;
        Ok(config)
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; catches common typos rather than every invalid name.
fn validate_domain_name(domain: &str) -> Result<()> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        anyhow::bail!("Domain name too long: {} chars (max 253). Got: {}", domain.len(), domain);
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }
        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }
        if !label.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric, hyphen and underscore only.",
                label
            );
        }
        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!("Domain label cannot start or end with hyphen. Label: '{}'", label);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    let reconcile_config = match config.validate() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting dnsreconciled");
    info!(
        "Configuration loaded: {} zone(s), policy {}, registry {}",
        config.zones.len(),
        reconcile_config.controller.policy,
        config.registry_type
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, reconcile_config).await {
            error!("Daemon error: {:#}", e);
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Wire the components together and run the control loop
async fn run_daemon(config: Config, reconcile_config: ReconcileConfig) -> Result<()> {
    let provider = InMemoryProvider::new()
        .with_domain_filter(DomainFilter::new(&config.domain_filter))
        .with_dry_run(config.dry_run);
    for (i, zone) in config.zones.iter().enumerate() {
        provider.create_zone(format!("zone-{}", i), zone).await;
        info!("Hosting zone: {}", zone);
    }
    if config.dry_run {
        warn!("Dry-run mode: changes are logged, not applied");
    }
    let provider: Arc<dyn Provider> = Arc::new(provider);

    let registry = registry::from_config(&reconcile_config.registry, Arc::clone(&provider))?;
    let source_path = config.source_path.unwrap_or_default();
    let source = FileSource::new(&source_path);
    info!("Reading desired endpoints from {}", source_path);

    let (controller, mut event_rx) =
        Controller::new(Box::new(source), registry, reconcile_config.controller)?;

    let events = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            log_event(&event);
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut controller_task =
        tokio::spawn(async move { controller.run_with_shutdown(Some(shutdown_rx)).await });

    let outcome = tokio::select! {
        joined = &mut controller_task => joined,
        signal = wait_for_shutdown() => {
            let signal = signal?;
            info!("Received shutdown signal: {}", signal);
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut controller_task).await {
                Ok(joined) => joined,
                Err(_) => {
                    controller_task.abort();
                    anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT);
                }
            }
        }
    };

    // The controller dropped its event sender, so the logger drains and ends
    let _ = events.await;

    outcome.context("Controller task panicked")??;
    info!("Daemon stopped");
    Ok(())
}

fn log_event(event: &ControllerEvent) {
    match event {
        ControllerEvent::CycleCompleted {
            created,
            updated,
            deleted,
            skipped,
        } => {
            if created + updated + deleted + skipped > 0 {
                info!(created, updated, deleted, skipped, "Cycle completed");
            } else {
                debug!("Cycle completed, zone up to date");
            }
        }
        ControllerEvent::CycleFailed { error } => {
            warn!("Cycle failed, retrying next interval: {}", error)
        }
        other => debug!("Controller event: {:?}", other),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            registry_type: "txt".to_string(),
            owner_id: Some("cluster-a".to_string()),
            txt_prefix: String::new(),
            policy: "sync".to_string(),
            interval_secs: 60,
            once: false,
            domain_filter: vec![],
            source_path: Some("/tmp/endpoints.json".to_string()),
            provider_type: "inmemory".to_string(),
            zones: vec!["example.com".to_string()],
            dry_run: false,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn valid_config_builds_engine_config() {
        let config = base_config().validate().unwrap();
        assert_eq!(config.registry.owner_id(), Some("cluster-a"));
        assert_eq!(config.controller.policy, Policy::Sync);
    }

    #[test]
    fn txt_registry_requires_owner() {
        let config = Config {
            owner_id: None,
            ..base_config()
        };
        assert!(config.validate().is_err());

        let noop = Config {
            owner_id: None,
            registry_type: "noop".to_string(),
            ..base_config()
        };
        assert!(noop.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_values() {
        for config in [
            Config {
                policy: "everything".to_string(),
                ..base_config()
            },
            Config {
                provider_type: "cloudflare".to_string(),
                ..base_config()
            },
            Config {
                zones: vec![],
                ..base_config()
            },
            Config {
                zones: vec!["bad..zone".to_string()],
                ..base_config()
            },
            Config {
                source_path: None,
                ..base_config()
            },
            Config {
                interval_secs: 0,
                ..base_config()
            },
            Config {
                log_level: "loud".to_string(),
                ..base_config()
            },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn once_mode_allows_zero_interval() {
        let config = Config {
            interval_secs: 0,
            once: true,
            ..base_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn domain_names() {
        assert!(validate_domain_name("example.com.").is_ok());
        assert!(validate_domain_name("_owner.example.com").is_ok());
        assert!(validate_domain_name("-bad.example.com").is_err());
        assert!(validate_domain_name("").is_err());
    }
}
