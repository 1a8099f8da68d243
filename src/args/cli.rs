use clap::{Args, Parser, Subcommand};

use super::defaults::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_RETRY_MS, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_METRICS_INTERVAL_MS, DEFAULT_NOTIFICATION_INTERVAL_MS, DEFAULT_PORT,
    DEFAULT_SERVER_HOST, DEFAULT_WORKER_HOST, default_worker_name,
};
use super::parsers::{
    parse_positive_u32, parse_positive_u64, parse_positive_usize, parse_worker_name,
};

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Scalable distributed HTTP load testing: one server coordinates many load-generating workers."
)]
pub struct TerjangArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (overridden by TERJANG_LOG/RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable ANSI colors in log output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the control server that workers join
    Server(ServerArgs),
    /// Run a load-generating worker
    Worker(WorkerArgs),
}

#[derive(Debug, Args, Clone, PartialEq, Eq)]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_SERVER_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path to a terjang.toml/terjang.json config file
    #[arg(long, short)]
    pub config: Option<String>,

    /// How often observers receive the cluster view (milliseconds)
    #[arg(
        long = "notification-interval-ms",
        default_value_t = DEFAULT_NOTIFICATION_INTERVAL_MS,
        value_parser = parse_positive_u64
    )]
    pub notification_interval_ms: u64,
}

#[derive(Debug, Args, Clone, PartialEq, Eq)]
pub struct WorkerArgs {
    /// Name reported to the server (defaults to the host name)
    #[arg(long, short, default_value_t = default_worker_name(), value_parser = parse_worker_name)]
    pub name: String,

    /// Server host to join
    #[arg(long, default_value = DEFAULT_WORKER_HOST)]
    pub host: String,

    /// Server port to join
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path to a terjang.toml/terjang.json config file
    #[arg(long, short)]
    pub config: Option<String>,

    /// Delay between connect attempts (milliseconds)
    #[arg(
        long = "connect-retry-ms",
        default_value_t = DEFAULT_CONNECT_RETRY_MS,
        value_parser = parse_positive_u64
    )]
    pub connect_retry_ms: u64,

    /// Connect attempts before giving up
    #[arg(
        long = "connect-attempts",
        default_value_t = DEFAULT_CONNECT_ATTEMPTS,
        value_parser = parse_positive_u32
    )]
    pub connect_attempts: u32,

    /// How often metrics are reported while a test runs (milliseconds)
    #[arg(
        long = "metrics-interval-ms",
        default_value_t = DEFAULT_METRICS_INTERVAL_MS,
        value_parser = parse_positive_u64
    )]
    pub metrics_interval_ms: u64,

    /// Maximum concurrent in-flight requests
    #[arg(
        long = "max-in-flight",
        default_value_t = DEFAULT_MAX_IN_FLIGHT,
        value_parser = parse_positive_usize
    )]
    pub max_in_flight: usize,

    /// Reconnect after the server connection ends instead of exiting
    #[arg(long)]
    pub reconnect: bool,
}

impl ServerArgs {
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl WorkerArgs {
    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
