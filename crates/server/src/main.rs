use clap::Parser;
use labelscan_server::config::ServerConfig;
use labelscan_server::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    telemetry::init_tracing(config.log_format)?;
    labelscan_server::run(config).await
}
