use std::time::Duration;

use clap::{ArgMatches, CommandFactory, FromArgMatches};

use crate::args::{Command, ServerArgs, TerjangArgs, WorkerArgs};
use crate::config::{apply_server_config, apply_worker_config, load_config};
use crate::distributed::{AgentOptions, ClusterServer, ServerOptions, WorkerAgent};
use crate::error::AppResult;
use crate::http::AttackerOptions;
use crate::shutdown_handlers::{setup_signal_shutdown_handler, shutdown_channel};

/// Parses the command line, sets up logging and drives the chosen role to
/// completion.
///
/// # Errors
///
/// Returns an error when arguments or config are invalid, or when the server
/// or worker fails.
pub fn run() -> AppResult<()> {
    let matches = TerjangArgs::command().get_matches();
    let args = TerjangArgs::from_arg_matches(&matches)?;

    crate::logger::init_logging(args.verbose, args.no_color);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_async(args, &matches))
}

async fn run_async(args: TerjangArgs, matches: &ArgMatches) -> AppResult<()> {
    match args.command {
        Command::Server(mut server_args) => {
            if let Some(sub_matches) = matches.subcommand_matches("server") {
                apply_server_section(&mut server_args, sub_matches)?;
            }
            run_server(&server_args).await
        }
        Command::Worker(mut worker_args) => {
            if let Some(sub_matches) = matches.subcommand_matches("worker") {
                apply_worker_section(&mut worker_args, sub_matches)?;
            }
            run_worker(worker_args).await
        }
    }
}

fn apply_server_section(args: &mut ServerArgs, matches: &ArgMatches) -> AppResult<()> {
    if let Some(section) = load_config(args.config.as_deref())?.and_then(|config| config.server) {
        apply_server_config(args, matches, &section)?;
    }
    Ok(())
}

fn apply_worker_section(args: &mut WorkerArgs, matches: &ArgMatches) -> AppResult<()> {
    if let Some(section) = load_config(args.config.as_deref())?.and_then(|config| config.worker) {
        apply_worker_config(args, matches, &section)?;
    }
    Ok(())
}

async fn run_server(args: &ServerArgs) -> AppResult<()> {
    let options = ServerOptions {
        notification_interval: Duration::from_millis(args.notification_interval_ms),
    };
    let server = ClusterServer::bind(&args.listen_addr(), options).await?;

    let (shutdown_tx, _) = shutdown_channel();
    let signal_handle = setup_signal_shutdown_handler(&shutdown_tx);

    let result = server.run(&shutdown_tx).await;
    drop(shutdown_tx.send(()));
    signal_handle.await?;
    result
}

async fn run_worker(args: WorkerArgs) -> AppResult<()> {
    let server_addr = args.server_addr();
    let options = AgentOptions {
        connect_retry: Duration::from_millis(args.connect_retry_ms),
        connect_attempts: args.connect_attempts,
        metrics_interval: Duration::from_millis(args.metrics_interval_ms),
        attacker: AttackerOptions {
            max_in_flight: args.max_in_flight,
            ..AttackerOptions::default()
        },
        reconnect: args.reconnect,
        ..AgentOptions::new(args.name, server_addr)
    };
    let agent = WorkerAgent::new(options)?;

    let (shutdown_tx, _) = shutdown_channel();
    let signal_handle = setup_signal_shutdown_handler(&shutdown_tx);

    let result = agent.run(&shutdown_tx).await;
    if let Err(err) = &result {
        tracing::error!("Worker stopped: {}", err);
    }
    drop(shutdown_tx.send(()));
    signal_handle.await?;
    result
}
