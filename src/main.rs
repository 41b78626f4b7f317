use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::error;

use trip_planner::config::Config;
use trip_planner::domains::transcript::MESSAGE_SEPARATOR;
use trip_planner::domains::trip::TripForm;
use trip_planner::error::TripPlannerError;
use trip_planner::services::transcript::TranscriptSink;
use trip_planner::web::failure_message;
use trip_planner::{ChatMessage, TripPlanner};

#[derive(Parser, Debug)]
#[command(name = "trip-planner")]
#[command(about = "Plan a trip with a crew of LLM travel agents")]
#[command(version = env!("TRIP_PLANNER_GIT_SHA"))]
struct Cli {
    /// Starting location.
    #[arg(long)]
    from: String,

    /// Destination.
    #[arg(long)]
    to: String,

    /// Date of journey, YYYY-MM-DD.
    #[arg(long)]
    date: String,

    /// Falls back to the config file, then OPENAI_API_KEY.
    #[arg(long, env = "TRIP_PLANNER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    trip_planner::logging::init_tracing("trip_planner_cli");
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Could not load configuration");
            eprintln!("{}", failure_message(&err));
            return ExitCode::FAILURE;
        }
    };
    let planner = TripPlanner::new(config);

    let form = TripForm {
        api_key: cli.api_key,
        from_place: cli.from,
        to_place: cli.to,
        travel_date: cli.date,
    };
    let request = match planner.validate(&form) {
        Ok(request) => request,
        Err(err) => {
            match err {
                TripPlannerError::Validation(message) => eprintln!("{message}"),
                other => eprintln!("{other}"),
            }
            return ExitCode::from(2);
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ChatMessage>();
    // Streams the same markdown `Transcript::render_markdown` produces.
    let printer = tokio::spawn(async move {
        let mut first = true;
        while let Some(message) = rx.recv().await {
            if !first {
                print!("{MESSAGE_SEPARATOR}");
            }
            first = false;
            print!("{}", message.render_markdown());
            let _ = std::io::stdout().flush();
        }
        println!();
    });

    let sink = TranscriptSink::new().with_live(tx);
    let outcome = planner.plan(&request, &sink).await;
    drop(sink);
    let _ = printer.await;

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Trip planning failed");
            eprintln!("{}", failure_message(&err));
            ExitCode::FAILURE
        }
    }
}
