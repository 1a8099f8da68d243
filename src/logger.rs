use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variables consulted for a log filter, in order.
const LOG_ENV_VARS: [&str; 2] = ["TERJANG_LOG", "RUST_LOG"];

pub fn init_logging(verbose: bool, no_color: bool) {
    let directive = LOG_ENV_VARS
        .iter()
        .find_map(|key| std::env::var(key).ok());
    let filter = build_filter(directive.as_deref(), verbose);

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(!no_color)
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set global default subscriber: {}", err);
    }
}

fn build_filter(directive: Option<&str>, verbose: bool) -> EnvFilter {
    let fallback = if verbose { "debug" } else { "info" };
    directive.map_or_else(
        || EnvFilter::new(fallback),
        |value| EnvFilter::try_new(value).unwrap_or_else(|_err| EnvFilter::new(fallback)),
    )
}
