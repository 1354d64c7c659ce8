use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ubibot_core::{
    resolve_scan_interval, validate_credentials, Coordinator, Credentials,
    HttpFetcher, PollConfig, SensorView,
};

mod report;

#[derive(Debug, Parser)]
#[command(name = "ubibotd")]
#[command(about = "UbiBot WS-1 channel poller")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, env = "UBIBOT_ACCOUNT_KEY", hide_env_values = true)]
    account_key: String,

    #[arg(long, env = "UBIBOT_CHANNEL_ID")]
    channel_id: String,

    #[arg(long, env = "UBIBOT_SCAN_INTERVAL")]
    scan_interval_minutes: Option<u64>,

    #[arg(long, default_value_t = 15)]
    request_timeout_secs: u64,

    #[arg(long, env = "UBIBOT_API_BASE", default_value = ubibot_core::config::DEFAULT_API_BASE)]
    api_base: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    Validate,
    Once {
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    Run {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Ndjson,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let credentials = Credentials::new(cli.account_key, cli.channel_id)?;
    let config = PollConfig::default()
        .with_interval_minutes(resolve_scan_interval(cli.scan_interval_minutes, None))?
        .with_request_timeout(Duration::from_secs(cli.request_timeout_secs))?
        .with_api_base(cli.api_base)?;
    let fetcher = HttpFetcher::new(&config)?;

    match cli.command {
        Command::Validate => match validate_credentials(&fetcher, &credentials).await {
            Ok(()) => println!("ok: channel {} is reachable", credentials.channel_id()),
            Err(err) => anyhow::bail!("{}: {err}", err.error_key()),
        },
        Command::Once { format } => {
            let coordinator = Coordinator::create(fetcher, credentials, config);
            let state = coordinator.first_refresh().await.context("initial refresh failed")?;
            let views = SensorView::all_for_channel(coordinator.credentials().channel_id());
            report::print_state(&state, &views, format)?;
        }
        Command::Run { format } => {
            let coordinator = Arc::new(Coordinator::create(fetcher, credentials, config));
            coordinator
                .first_refresh()
                .await
                .context("initial refresh failed, device not ready")?;
            stream_loop(coordinator, format).await?;
        }
    }

    Ok(())
}

async fn stream_loop(coordinator: Arc<Coordinator<HttpFetcher>>, format: OutputFormat) -> Result<()> {
    let views = SensorView::all_for_channel(coordinator.credentials().channel_id());
    let mut updates = coordinator.subscribe();
    let cancel = CancellationToken::new();
    let poller = coordinator.spawn(cancel.clone());

    report::print_state(&updates.borrow_and_update(), &views, format)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                report::print_state(&state, &views, format)?;
                let stale = state.is_stale(chrono::Utc::now(), coordinator.config().scan_interval);
                info!(last_success = %state.last_success, stale = %stale, "cycle published");
            }
        }
    }

    cancel.cancel();
    poller.await?;
    Ok(())
}
