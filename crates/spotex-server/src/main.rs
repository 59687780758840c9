mod handlers;
mod router;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use spotex_auth::ChainCredentialProvider;
use spotex_collector::{ExporterConfig, SpotMarketExporter, VERSION, register_build_info};
use spotex_ec2::{
    Ec2Config,
    client::{DEFAULT_ENDPOINT_TEMPLATE, DEFAULT_REGION},
};
use spotex_metrics::MetricsRegistry;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::router::{ExporterState, exporter_router};

#[derive(Parser)]
#[command(
    name = "aws-spot-exporter",
    version,
    about = "Prometheus exporter for AWS spot instance prices"
)]
struct Cli {
    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address", default_value = "0.0.0.0:9190")]
    listen_address: String,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    telemetry_path: String,

    /// Region of the EC2 session used for region discovery.
    #[arg(long = "aws.region", default_value = DEFAULT_REGION)]
    region: String,

    /// EC2 endpoint; `{region}` is replaced with each target region.
    #[arg(long = "aws.endpoint", default_value = DEFAULT_ENDPOINT_TEMPLATE)]
    endpoint: String,

    /// Per-request timeout in seconds. Unset leaves requests unbounded.
    #[arg(long = "aws.request-timeout")]
    request_timeout: Option<u64>,

    /// Number of samples buffered between region fetchers and the aggregator.
    #[arg(long = "scrape.channel-capacity", default_value_t = 1)]
    channel_capacity: usize,

    #[arg(long = "log.level", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("spotex={}", cli.log_level).parse()?)
        .add_directive(format!("aws_spot_exporter={}", cli.log_level).parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!(version = VERSION, "starting aws spot market exporter");

    let ec2 = Ec2Config {
        region: cli.region,
        endpoint_template: cli.endpoint,
        request_timeout: cli.request_timeout.map(Duration::from_secs),
    };
    let config = ExporterConfig {
        channel_capacity: cli.channel_capacity,
    };
    let credentials = ChainCredentialProvider::default_chain();
    let exporter = match SpotMarketExporter::connect(ec2, &credentials, config) {
        Ok(exporter) => exporter,
        Err(err) => {
            error!(error = %err, kind = err.kind(), "failed to create aws session");
            return Err(err.into());
        }
    };

    let registry = Arc::new(MetricsRegistry::new());
    register_build_info(&registry)?;
    registry.register_collector(Arc::new(exporter))?;

    let state = Arc::new(ExporterState::new(registry, cli.telemetry_path)?);
    let telemetry_path = state.telemetry_path.clone();
    let app = exporter_router(state);

    let listener = tokio::net::TcpListener::bind(&cli.listen_address).await?;
    info!(
        address = %cli.listen_address,
        path = %telemetry_path,
        "aws spot market exporter listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("aws spot market exporter stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for interrupt");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                return std::future::pending::<&'static str>().await;
            }
        };
        let mut quit = match signal(SignalKind::quit()) {
            Ok(stream) => stream,
            Err(err) => {
                error!(error = %err, "failed to listen for SIGQUIT");
                return std::future::pending::<&'static str>().await;
            }
        };
        tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = quit.recv() => "SIGQUIT",
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let caught = tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    };
    info!(signal = caught, "caught signal, shutting down");
}
