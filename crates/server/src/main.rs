use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use relaymon_config::{ConfigWatcher, SharedConfig, load_config};
use relaymon_events::EventEngine;
use relaymon_probe::{ProbeEngine, Scheduler};
use relaymon_server::api::{self, AppState};
use relaymon_server::aggregate::SnapshotCache;
use relaymon_server::announce::{AnnouncementsService, GithubFetcher};
use relaymon_server::sink::PipelineSink;
use relaymon_server::store_factory::create_store;
use relaymon_store::{ArchiveWriter, RetentionSweeper};

/// relaymon fleet availability monitor.
#[derive(Parser, Debug)]
#[command(name = "relaymon-server", about = "HTTP probe monitor for LLM relay fleets")]
struct Cli {
    /// Path to the fleet configuration file.
    #[arg(short, long, default_value = "relaymon.toml")]
    config: String,

    /// Bind host.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Bind port.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Initial config load fails fast; reloads later keep the previous
    // revision on error.
    let config = load_config(std::path::Path::new(&cli.config))?;
    if cli.check {
        info!(
            monitors = config.monitors.len(),
            warnings = config.warnings.len(),
            "configuration is valid"
        );
        return Ok(());
    }

    let store = create_store(&config).await?;

    // Event state machine and its outbound queue. Delivery beyond the
    // queue is a collaborator's concern; the built-in drain just logs.
    let (events, mut event_rx) = EventEngine::new(config.events.clone());
    let events = Arc::new(events);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(
                key = %event.key,
                kind = ?event.kind,
                sub_status = ?event.sub_status,
                "dispatching transition event"
            );
        }
    });

    let retention = config.storage.retention.clone();
    let archive = config.storage.archive.clone();
    let announcements_config = config.announcements.clone();

    let shared = Arc::new(SharedConfig::new(config));
    let root = CancellationToken::new();
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(ProbeEngine::new()?),
        Arc::new(PipelineSink::new(store.clone(), events.clone())),
        shared.clone(),
        root.clone(),
    ));
    scheduler.reconcile(&shared.load());

    let retention_handle = retention.enabled.then(|| {
        RetentionSweeper::new(store.clone(), retention).spawn()
    });
    let archive_handle = archive
        .enabled
        .then(|| ArchiveWriter::new(store.clone(), archive).spawn());

    let announcements = Arc::new(AnnouncementsService::new(
        announcements_config.clone(),
        Arc::new(GithubFetcher::new(announcements_config.clone())?),
    ));
    let poller_handle = announcements_config
        .enabled
        .then(|| announcements.clone().spawn_poller());

    let cache = Arc::new(SnapshotCache::new());

    // Hot reload: swap the config, flush the snapshot cache, and bring the
    // scheduler and event engine in line with the new revision.
    let watcher_handle = {
        let cache = cache.clone();
        let scheduler = scheduler.clone();
        let events = events.clone();
        ConfigWatcher::new(shared.clone(), cli.config.clone())
            .with_reload_hook(Arc::new(move |config| {
                cache.clear();
                scheduler.reconcile(&config);
                events.reconcile(&config);
            }))
            .spawn()
    };

    let state = AppState {
        shared: shared.clone(),
        store,
        cache,
        announcements,
        scheduler_metrics: scheduler.metrics(),
        events,
    };
    let router = api::router(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr, "relaymon server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    // Deterministic teardown: stop new probes, let in-flight ones hit
    // their deadlines, then wait for each background loop to confirm.
    info!("shutting down");
    root.cancel();
    scheduler.shutdown();
    watcher_handle.abort();
    if let Some(handle) = retention_handle {
        handle.shutdown().await;
    }
    if let Some(handle) = archive_handle {
        handle.shutdown().await;
    }
    if let Some(handle) = poller_handle {
        handle.shutdown().await;
    }

    Ok(())
}
