use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stakewatch::config::ExporterConfig;
use stakewatch::{server, Error};

#[derive(Parser)]
#[command(about = "Prometheus exporter for Cosmos-SDK validator sets")]
struct Args {
    /// Path to the configuration file.
    #[arg(long, env = "STAKEWATCH_CONFIG", default_value = "config/Settings.toml")]
    config: String,

    /// Emit logs as json.
    #[arg(long, env = "STAKEWATCH_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ExporterConfig::load(&args.config)?;
    info!(
        lcd = %config.node.lcd_addr,
        chain = config.chain.chain_id.as_deref().unwrap_or("unknown"),
        "configuration loaded"
    );

    server::serve(config).await
}
