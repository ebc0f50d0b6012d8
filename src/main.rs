use anyhow::{Context, Result};
use clap::Parser;
use rosavote::{
    config::ConventionSetting, lifecycle::DatasetController, load_config, query::parse_filters,
};
use serde::Serialize;
use std::{env, path::PathBuf, time::Duration};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "rosavote",
    version,
    about = "Load election result exports and query them"
)]
struct Args {
    /// YAML loader configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with the exports (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// auto | two-row | single-row | headerless
    #[arg(long)]
    convention: Option<ConventionSetting>,

    /// Force a delimiter instead of sniffing it per file
    #[arg(long)]
    delimiter: Option<char>,

    /// Filter as field=substring; repeat for more (all must match)
    #[arg(long = "filter", value_name = "FIELD=VALUE")]
    filters: Vec<String>,

    /// Print the schema instead of query results
    #[arg(long)]
    schema: bool,

    /// Print the load report instead of query results
    #[arg(long)]
    report: bool,

    /// Reload every N seconds until Ctrl-C
    #[arg(long, value_name = "SECS")]
    reload_every: Option<u64>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serializing output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("").add_directive(log_level.parse().unwrap_or(Level::INFO.into()))
    });
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) configuration ────────────────────────────────────────────
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(convention) = args.convention {
        config.convention = convention;
    }
    if let Some(delimiter) = args.delimiter {
        config.delimiter = Some(delimiter);
    }
    if let Some(secs) = args.reload_every {
        config.reload_interval_secs = Some(secs);
    }
    config.validate()?;
    let filters = parse_filters(&args.filters)?;
    info!(
        data_dir = %config.data_dir.display(),
        convention = %config.convention,
        "startup"
    );

    // ─── 3) initial load ─────────────────────────────────────────────
    let reload_interval = config.reload_interval_secs;
    let controller = DatasetController::new(config);
    controller.start();
    let snapshot = controller.ready().await;

    let names: Vec<&str> = snapshot
        .dataset
        .fields()
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    info!("queryable fields: {}", names.join(", "));

    // ─── 4) answer ───────────────────────────────────────────────────
    if args.report {
        print_json(snapshot.report.as_ref())?;
    } else if args.schema {
        print_json(&controller.schema().await)?;
    } else {
        print_json(&controller.query_result(&filters).await)?;
    }

    // ─── 5) optional periodic reload ─────────────────────────────────
    let Some(secs) = reload_interval.filter(|s| *s > 0) else {
        return Ok(());
    };
    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    ticker.tick().await;
    info!("reloading every {}s, Ctrl-C to stop", secs);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match controller.reload().await {
                    Ok(snapshot) => info!(
                        version = snapshot.version,
                        records = snapshot.dataset.len(),
                        "reloaded"
                    ),
                    Err(e) => error!("{:#}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}
