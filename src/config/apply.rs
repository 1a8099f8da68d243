use clap::ArgMatches;
use clap::parser::ValueSource;

use crate::args::{ServerArgs, WorkerArgs};
use crate::error::{AppError, AppResult, ConfigError, ValidationError};

use super::types::{ServerConfig, WorkerConfig};

/// Applies `[server]` values to arguments not given on the command line.
///
/// # Errors
///
/// Returns an error when a config value is out of range.
pub fn apply_server_config(
    args: &mut ServerArgs,
    matches: &ArgMatches,
    config: &ServerConfig,
) -> AppResult<()> {
    if !is_cli(matches, "host")
        && let Some(host) = config.host.clone()
    {
        args.host = host;
    }

    if !is_cli(matches, "port")
        && let Some(port) = config.port
    {
        args.port = port;
    }

    if !is_cli(matches, "notification_interval_ms")
        && let Some(interval) = config.notification_interval_ms
    {
        args.notification_interval_ms = ensure_positive(interval, "notification_interval_ms")?;
    }

    Ok(())
}

/// Applies `[worker]` values to arguments not given on the command line.
///
/// # Errors
///
/// Returns an error when a config value is out of range or empty.
pub fn apply_worker_config(
    args: &mut WorkerArgs,
    matches: &ArgMatches,
    config: &WorkerConfig,
) -> AppResult<()> {
    if !is_cli(matches, "name")
        && let Some(name) = config.name.as_deref()
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation(ValidationError::EmptyWorkerName));
        }
        args.name = name.to_owned();
    }

    if !is_cli(matches, "host")
        && let Some(host) = config.host.clone()
    {
        args.host = host;
    }

    if !is_cli(matches, "port")
        && let Some(port) = config.port
    {
        args.port = port;
    }

    if !is_cli(matches, "connect_retry_ms")
        && let Some(retry) = config.connect_retry_ms
    {
        args.connect_retry_ms = ensure_positive(retry, "connect_retry_ms")?;
    }

    if !is_cli(matches, "connect_attempts")
        && let Some(attempts) = config.connect_attempts
    {
        if attempts == 0 {
            return Err(AppError::config(ConfigError::FieldMustBePositive {
                field: "connect_attempts",
            }));
        }
        args.connect_attempts = attempts;
    }

    if !is_cli(matches, "metrics_interval_ms")
        && let Some(interval) = config.metrics_interval_ms
    {
        args.metrics_interval_ms = ensure_positive(interval, "metrics_interval_ms")?;
    }

    if !is_cli(matches, "max_in_flight")
        && let Some(max_in_flight) = config.max_in_flight
    {
        if max_in_flight == 0 {
            return Err(AppError::config(ConfigError::FieldMustBePositive {
                field: "max_in_flight",
            }));
        }
        args.max_in_flight = max_in_flight;
    }

    if !is_cli(matches, "reconnect")
        && let Some(reconnect) = config.reconnect
    {
        args.reconnect = reconnect;
    }

    Ok(())
}

fn is_cli(matches: &ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(ValueSource::CommandLine)
}

fn ensure_positive(value: u64, field: &'static str) -> AppResult<u64> {
    if value == 0 {
        return Err(AppError::config(ConfigError::FieldMustBePositive { field }));
    }
    Ok(value)
}
