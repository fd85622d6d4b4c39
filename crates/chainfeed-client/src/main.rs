/*
[INPUT]:  CLI arguments, YAML configuration file, stdin key selections, OS shutdown signals
[OUTPUT]: Live option-chain snapshots logged as they arrive, graceful teardown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chainfeed_adapter::SubscriptionKey;
use chainfeed_client::{FeedConfig, FeedView, LiveChainFeed};

#[derive(Parser, Debug)]
#[command(name = "chainfeed", version, about = "Live option chain subscription client")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    /// Instrument to subscribe to (overrides the configured subscription)
    #[arg(long, requires = "expiry")]
    instrument: Option<String>,
    /// Expiry to subscribe to (overrides the configured subscription)
    #[arg(long, requires = "instrument")]
    expiry: Option<String>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting chainfeed"
    );

    let config = load_config(&args.config_path)?;
    let initial_key = initial_key(&args, &config)?;
    info!(hub_url = %config.hub_url, initial_key = ?initial_key, "configuration loaded");

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let transport = config.build_transport()?;
    let mut feed = LiveChainFeed::spawn(transport, config.refresh_interval());

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    if let Some(key) = initial_key {
        feed.set_key(Some(key));
    }
    info!("type `<instrument> <expiry>` to switch, `clear` to unsubscribe");

    let mut view = feed.subscribe_view();
    let mut state = feed.subscribe_connection_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                report_view(&view.borrow_and_update());
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                info!(state = current.name(), key = ?current.key(), "connection state changed");
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => handle_input(&feed, line.trim()),
                    Ok(None) => stdin_open = false,
                    Err(err) => {
                        warn!(error = %err, "stdin read failed");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    info!("shutdown requested");
    feed.teardown_and_wait().await;
    info!("chain feed closed");

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<FeedConfig> {
    let path_str = path
        .to_str()
        .context("config path must be valid utf-8")?;
    FeedConfig::from_file(path_str).context("load config")
}

fn initial_key(args: &Cli, config: &FeedConfig) -> Result<Option<SubscriptionKey>> {
    if let (Some(instrument), Some(expiry)) = (&args.instrument, &args.expiry) {
        let key = SubscriptionKey::new(instrument.clone(), expiry.clone())
            .context("invalid --instrument/--expiry")?;
        return Ok(Some(key));
    }
    config
        .subscription
        .as_ref()
        .map(|subscription| subscription.to_key())
        .transpose()
}

fn handle_input(feed: &LiveChainFeed, line: &str) {
    if line.is_empty() {
        return;
    }
    if line.eq_ignore_ascii_case("clear") {
        feed.set_key(None);
        return;
    }

    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(instrument), Some(expiry), None) => match SubscriptionKey::new(instrument, expiry) {
            Ok(key) => feed.set_key(Some(key)),
            Err(err) => warn!(error = %err, "ignoring selection"),
        },
        _ => warn!(input = line, "expected `<instrument> <expiry>` or `clear`"),
    }
}

fn report_view(view: &FeedView) {
    if let Some(error) = &view.error {
        warn!(key = %error.key, error = %error.message, "feed error");
    }
    match &view.snapshot {
        Some(snapshot) => {
            let bytes = serde_json::to_vec(&snapshot.payload)
                .map(|encoded| encoded.len())
                .unwrap_or_default();
            info!(
                key = %snapshot.key,
                received_at = %snapshot.received_at,
                bytes,
                connected = view.is_connected,
                "snapshot received"
            );
        }
        None => info!(connected = view.is_connected, "no snapshot yet"),
    }
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}

