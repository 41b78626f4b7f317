use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use trip_planner::config::Config;
use trip_planner::error::Result;
use trip_planner::{web, TripPlanner};

#[derive(Parser, Debug)]
#[command(name = "trip-planner-server")]
#[command(about = "Serve the trip planner web page")]
#[command(version = env!("TRIP_PLANNER_GIT_SHA"))]
struct Cli {
    /// Overrides `server.host` from the config.
    #[arg(long)]
    host: Option<String>,

    /// Overrides `server.port` from the config.
    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    trip_planner::logging::init_tracing("trip_planner_server");
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let (host, port) = config.server_addr();
    let host = cli.host.unwrap_or(host);
    let port = cli.port.unwrap_or(port);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    };
    web::run_with_shutdown(&host, port, TripPlanner::new(config), shutdown).await
}
