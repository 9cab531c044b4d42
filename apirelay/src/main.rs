mod config;

use clap::Parser;
use config::{Config, ConfigError, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing::{info, warn};

/// Environment override for the upstream credential, so the key never has
/// to live in the config file.
const CREDENTIAL_ENV: &str = "RELAY_CREDENTIAL";

#[derive(Parser)]
#[command(name = "apirelay", about = "Prefix-routed reverse proxy for upstream APIs")]
struct Cli {
    /// Path to the YAML config file. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    if let Ok(credential) = std::env::var(CREDENTIAL_ENV) {
        config.relay.credential = Some(credential);
    }
    if let Err(e) = config.relay.validate() {
        eprintln!("invalid config: {e}");
        process::exit(1);
    }

    if let Some(metrics_config) = &config.metrics {
        install_statsd(metrics_config);
    }

    info!(
        host = %config.relay.listener.host,
        port = config.relay.listener.port,
        "starting reverse proxy"
    );
    for target in &config.relay.targets {
        info!(
            name = %target.name,
            prefix = %target.prefix,
            upstream = %target.base_url,
            "target registered"
        );
    }

    if let Err(e) = relay::run(config.relay).await {
        eprintln!("server error: {e}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    match &cli.config {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

/// Metrics export is best-effort: a broken statsd setup downgrades to the
/// default no-op recorder.
fn install_statsd(config: &MetricsConfig) {
    let recorder = match StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some("apirelay"))
    {
        Ok(recorder) => recorder,
        Err(e) => {
            warn!(error = %e, "could not build statsd recorder, metrics disabled");
            return;
        }
    };

    if metrics::set_global_recorder(recorder).is_err() {
        warn!("metrics recorder already installed");
        return;
    }

    for def in relay::metrics_defs::ALL_METRICS {
        tracing::debug!(
            name = def.name,
            kind = def.metric_type.as_str(),
            description = def.description,
            "metric registered"
        );
    }
}
