// # ddnsd - DDNS Daemon
//
// Thin integration layer: reads the environment, opens the settings store,
// wires the HTTP resolver and provider into the engine, and runs the
// scheduler until a signal stops it. All update logic lives in ddns-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Account (written to the settings store when DDNS_API_KEY is set)
// - `DDNS_API_KEY`: Provider API key
// - `DDNS_USERNAME`: Account e-mail / user name
// - `DDNS_RECORD_ID`: Provider record id
// - `DDNS_HOSTNAME`: Hostname the record belongs to
// - `DDNS_INTERVAL`: Update interval ("1 hour", "30m", "6 hours", ...)
// - `DDNS_ENDPOINT`: Update URL template (default: Sitelutions)
// - `DDNS_TTL`: Record TTL (default: 60)
// - `DDNS_ENABLED`: Run scheduled updates (default: true)
//
// ### Address discovery
// - `DDNS_IP_SOURCE_URLS`: Comma-separated discovery services
// - `DDNS_IP_VERSION`: v4, v6 or both
//
// ### Daemon
// - `DDNS_SETTINGS_PATH`: Settings file (default: <config dir>/ddns/settings.json)
// - `DDNS_MAX_RETRIES`: In-cycle retries (default: 0)
// - `DDNS_RETRY_DELAY_SECS`: Delay between retries
// - `DDNS_TIMEOUT_SECS`: Timeout for discovery and update requests
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error
// - `DDNS_MODE`: live or dry-run
//
// ## Signals
//
// - SIGTERM / SIGINT: stop (a running cycle is cancelled)
// - SIGUSR1: publish now, even if the address is unchanged
// - SIGUSR2: run a cycle now
//
// ## Example
//
// ```bash
// export DDNS_USERNAME=me@example.net
// export DDNS_API_KEY=...
// export DDNS_RECORD_ID=12345
// export DDNS_HOSTNAME=home.example.net
// export DDNS_INTERVAL="6 hours"
//
// ddnsd
// ```

mod config;

use anyhow::Result;
use config::DaemonConfig;
use ddns_core::engine::EngineEvent;
use ddns_core::traits::SettingsStore;
use ddns_core::{FileSettingsStore, Scheduler, SchedulerHandle, UpdateEngine};
use ddns_ip_http::HttpAddressResolver;
use ddns_provider_http::{HttpTemplateProvider, template};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound for a graceful stop
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// A running daemon
struct Daemon {
    scheduler: SchedulerHandle,
    reporter: JoinHandle<()>,
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match DaemonConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsd daemon");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match start_daemon(&config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        match supervise(daemon).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {}", e);
                DdnsExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Open the settings store, build the engine and start the scheduler
async fn start_daemon(config: &DaemonConfig) -> Result<Daemon> {
    let path = config.settings_path()?;
    let settings = FileSettingsStore::open(&path).await?;
    info!("Settings file: {}", path.display());

    if let Some(configuration) = config.configuration() {
        // An unchanged configuration keeps its revision, so a held rejection stays held
        let stored = settings.snapshot().await?.configuration;
        if stored.as_ref() != Some(&configuration) {
            let revision = settings.save_configuration(&configuration).await?;
            info!(
                "Stored configuration for {} from environment (revision {})",
                configuration.hostname, revision
            );
        }
    }

    let snapshot = settings.snapshot().await?;
    let Some(configuration) = snapshot.configuration else {
        anyhow::bail!(
            "No configuration stored in {}. \
            Set DDNS_API_KEY, DDNS_HOSTNAME and the account variables to create one.",
            path.display()
        );
    };
    template::validate(&configuration.provider.endpoint_template)?;

    if snapshot.record.is_held(snapshot.revision) {
        if let Some(rejection) = &snapshot.record.rejection {
            warn!(
                "Provider rejected the current configuration at {}: {}. \
                Scheduled updates are paused until the configuration changes (SIGUSR2 retries).",
                rejection.at, rejection.reason
            );
        }
    }

    match snapshot.record.last_address {
        Some(address) => info!("Last published address: {}", address),
        None => info!("No address published yet"),
    }

    if !configuration.enabled {
        warn!("Scheduled updates are disabled; only signals trigger cycles");
    }

    let resolver = HttpAddressResolver::from_config(&config.resolver_config(), config.timeout())?;
    let provider = HttpTemplateProvider::new(config.timeout(), config.dry_run)?;
    if provider.is_dry_run() {
        warn!("Dry-run mode: update requests are logged, not sent");
    }

    let (engine, events) = UpdateEngine::new(
        Box::new(resolver),
        Box::new(provider),
        Arc::new(settings),
        config.engine_config(),
    )?;

    let reporter = tokio::spawn(report_events(events));
    let scheduler = Scheduler::start(Arc::new(engine), configuration.interval)?;

    info!(
        "Updating {} every {}s",
        configuration.hostname,
        configuration.interval.as_secs()
    );

    Ok(Daemon {
        scheduler,
        reporter,
    })
}

/// Forward signals to the scheduler until it stops
#[cfg(unix)]
async fn supervise(daemon: Daemon) -> Result<()> {
    let Daemon {
        scheduler,
        reporter,
    } = daemon;

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sigusr1 = signal(SignalKind::user_defined1())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGUSR1 handler: {}", e))?;
    let mut sigusr2 = signal(SignalKind::user_defined2())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGUSR2 handler: {}", e))?;

    let result = loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received shutdown signal: SIGTERM");
                break stop(scheduler).await;
            }
            _ = sigint.recv() => {
                info!("Received shutdown signal: SIGINT");
                break stop(scheduler).await;
            }
            _ = sigusr1.recv() => {
                info!("SIGUSR1: forcing an update");
                scheduler.force_update();
            }
            _ = sigusr2.recv() => {
                info!("SIGUSR2: running a cycle now");
                scheduler.trigger_now();
            }
            _ = scheduler.closed() => {
                break scheduler.join().await.map_err(anyhow::Error::from);
            }
        }
    };

    finish_reporter(reporter).await;
    result
}

/// Forward CTRL-C to the scheduler until it stops
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn supervise(daemon: Daemon) -> Result<()> {
    let Daemon {
        scheduler,
        reporter,
    } = daemon;

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
            info!("Received shutdown signal: CTRL-C");
            stop(scheduler).await
        }
        _ = scheduler.closed() => scheduler.join().await.map_err(anyhow::Error::from),
    };

    finish_reporter(reporter).await;
    result
}

/// Stop the scheduler, bounded by [`SHUTDOWN_TIMEOUT`]
async fn stop(scheduler: SchedulerHandle) -> Result<()> {
    info!("Shutting down daemon");

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, scheduler.stop()).await {
        Ok(result) => result.map_err(anyhow::Error::from),
        Err(_) => Err(anyhow::anyhow!(
            "Shutdown timeout after {:?}",
            SHUTDOWN_TIMEOUT
        )),
    }
}

/// Let the reporter drain the remaining events
async fn finish_reporter(reporter: JoinHandle<()>) {
    let abort = reporter.abort_handle();
    if tokio::time::timeout(Duration::from_secs(1), reporter)
        .await
        .is_err()
    {
        abort.abort();
    }
}

/// Log engine events until the engine is dropped
async fn report_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Started { interval } => {
                info!("Scheduler started (interval {}s)", interval.as_secs())
            }
            EngineEvent::CycleStarted { trigger } => {
                tracing::debug!("Cycle started ({:?})", trigger)
            }
            EngineEvent::CycleSkipped { reason } => info!("Cycle skipped: {:?}", reason),
            EngineEvent::TriggerSkipped { trigger } => {
                info!("{:?} trigger dropped: a cycle is already running", trigger)
            }
            EngineEvent::AddressResolved { address } => {
                tracing::debug!("Public address: {}", address)
            }
            EngineEvent::ResolutionFailed { error } => {
                warn!("Could not determine public address: {}", error)
            }
            EngineEvent::UpdateSkipped { hostname, address } => {
                info!("{} already points to {}", hostname, address)
            }
            EngineEvent::UpdateStarted { hostname, address } => {
                info!("Updating {} to {}", hostname, address)
            }
            EngineEvent::UpdateSucceeded {
                hostname,
                address,
                previous,
            } => match previous {
                Some(previous) => info!("Updated {}: {} -> {}", hostname, previous, address),
                None => info!("Updated {}: {}", hostname, address),
            },
            EngineEvent::UpdateRejected { hostname, reason } => error!(
                "Provider rejected the update for {}: {}. Check the account settings.",
                hostname, reason
            ),
            EngineEvent::UpdateFailed { hostname, error } => {
                warn!("Update for {} failed, retrying next cycle: {}", hostname, error)
            }
            EngineEvent::Stopped { reason } => info!("Scheduler stopped: {}", reason),
        }
    }
}
