use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn default_filter(component: &str) -> String {
    format!("info,trip_planner=debug,{component}=debug")
}

/// Installs the global subscriber. `TRIP_PLANNER_LOG` wins over `RUST_LOG`.
pub fn init_tracing(component: &str) {
    let filter = std::env::var("TRIP_PLANNER_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter(component)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
