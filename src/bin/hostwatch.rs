use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hostwatch::{
    actors::{CycleSchedule, metrics::MetricsCycleActor, uptime::UptimeCycleActor},
    config::{Host, Settings, read_hosts_file},
    discord::{DiscordClient, DiscordSink, MessageIdRegistry},
    presentation::Reconciler,
    probe::{ProbeExecutor, Prober, local::SysinfoReader, ssh::SshTransport},
    status::StatusBoard,
    storage::{BucketGranularity, open_store},
    util,
};
use tokio::sync::mpsc;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// How long a cycle may take to finish its current pass on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Hosts file
    #[arg(short, long, default_value = "hosts.json")]
    file: PathBuf,

    /// Environment file to load before reading settings
    #[arg(long)]
    env_file: Option<PathBuf>,
}

fn init() {
    let level = util::get_var(util::LOG_LEVEL)
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::INFO);

    let filter = filter::Targets::new().with_targets(vec![("hostwatch", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn local_hostname() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| String::from("localhost"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    match &args.env_file {
        Some(path) => {
            dotenv::from_path(path).with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
    init();
    trace!("started with args: {args:?}");

    let settings = Settings::from_env()?;
    info!("settings: {settings:?}");

    let hosts: Arc<[Host]> = read_hosts_file(&args.file)?
        .resolve(&local_hostname())?
        .into();
    info!(
        "monitoring {} hosts: {}",
        hosts.len(),
        hosts.iter().map(|h| h.name.as_str()).collect::<Vec<_>>().join(", ")
    );

    let granularity = BucketGranularity::HOURLY;
    let store = open_store(&settings.storage, granularity)
        .await
        .context("failed to open uptime storage")?;

    let transport = SshTransport::new(SshTransport::default_control_dir(), settings.probe_timeout)
        .context("failed to prepare the ssh control directory")?;
    let prober: Arc<dyn Prober> = Arc::new(ProbeExecutor::new(
        Arc::new(SysinfoReader),
        transport,
        settings.probe_timeout,
    ));

    let discord = DiscordClient::new(&settings.discord_token)?;
    let registry = MessageIdRegistry::load(&settings.message_ids_file);
    let sink = Arc::new(DiscordSink::new(discord.clone(), settings.channel_id, registry));
    let reconciler = Arc::new(Reconciler::new(sink, store.clone(), granularity));
    let board = StatusBoard::new();

    let schedule = |interval| {
        CycleSchedule::new(interval)
            .spread(settings.update_spread)
            .max_concurrency(settings.max_concurrent_probes)
            .host_timeout(settings.probe_timeout)
    };

    let (local_tx, mut local_rx) = mpsc::unbounded_channel();
    let metrics = MetricsCycleActor::new(
        hosts.clone(),
        prober.clone(),
        board.clone(),
        reconciler,
        schedule(settings.update_interval),
    )
    .escalate_local_failures(local_tx)
    .spawn();

    let uptime = UptimeCycleActor::new(
        hosts.clone(),
        prober.clone(),
        store.clone(),
        schedule(settings.uptime_interval),
    )
    .granularity(granularity)
    .retention(settings.retention)
    .spawn();

    #[cfg(feature = "api")]
    if let Some(bind_addr) = settings.api_addr {
        use hostwatch::api::{ApiConfig, ApiState, spawn_api_server};

        if settings.api_token.is_none() {
            warn!("API_TOKEN is not set, the API is unauthenticated");
        }
        let state = ApiState::new(hosts.clone(), board.clone(), store.clone()).with_discord(discord);
        let config = ApiConfig {
            bind_addr,
            auth_token: settings.api_token.clone(),
        };
        spawn_api_server(config, state).await?;
    }

    let exit = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("received ctrl-c, shutting down");
            Ok(())
        }
        Some(failure) = local_rx.recv() => {
            error!("cannot read the local machine: {}", failure.reason);
            Err(anyhow::anyhow!(
                "local metrics unavailable on {}: {}",
                failure.hostname,
                failure.reason
            ))
        }
    };

    metrics.shutdown(SHUTDOWN_GRACE).await;
    uptime.shutdown(SHUTDOWN_GRACE).await;
    prober.shutdown().await;
    if let Err(e) = store.close().await {
        warn!("failed to close storage: {e}");
    }

    exit
}
