use std::time::Duration;

use crate::distributed::protocol::{
    Envelope, MessageKind, StartLoadTestRequest, WorkerState, encode,
};
use crate::error::{AppError, AppResult, ClusterError};
use crate::shutdown_handlers::shutdown_channel;
use crate::test_support::{OK_RESPONSE, run_async_test, spawn_counting_server};

use super::command::WorkerCommand;
use super::session::join_url;
use super::{AgentOptions, WorkerAgent, parse_header_block};

fn start_frame(url: &str, rate: u64, duration: u64) -> AppResult<String> {
    encode(
        MessageKind::StartLoadTestRequest,
        &StartLoadTestRequest {
            method: "GET".to_owned(),
            url: url.to_owned(),
            duration,
            rate,
            header: "X-load-test: agent".to_owned(),
            body: String::new(),
        },
    )
}

fn stop_frame() -> AppResult<String> {
    Envelope::empty(MessageKind::StopLoadTestRequest).to_wire()
}

async fn wait_for_state(agent: &WorkerAgent, expected: WorkerState) -> AppResult<()> {
    let mut states = agent.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), states.wait_for(|state| *state == expected))
        .await
        .map_err(|_elapsed| AppError::cluster(format!("Timed out waiting for {}", expected)))?
        .map_err(|_closed| AppError::cluster("State channel closed"))?;
    Ok(())
}

#[test]
fn header_block_parsing() -> AppResult<()> {
    let parsed = parse_header_block("X-load-test: MyLoadTest\nX-Foo:  Bar\nbroken line\nHost: a:80\n\nX-Empty:");
    let expected = vec![
        ("X-load-test".to_owned(), "MyLoadTest".to_owned()),
        ("X-Foo".to_owned(), "Bar".to_owned()),
        ("X-Empty".to_owned(), String::new()),
    ];
    if parsed != expected {
        return Err(AppError::cluster(format!("Unexpected headers: {:?}", parsed)));
    }
    if !parse_header_block("").is_empty() {
        return Err(AppError::cluster("Expected no headers from an empty block"));
    }
    Ok(())
}

#[test]
fn commands_come_from_start_and_stop_only() -> AppResult<()> {
    let start = Envelope::decode(start_frame("http://localhost", 1, 1)?.as_bytes())
        .ok_or_else(|| AppError::cluster("Expected start envelope"))?;
    if !matches!(WorkerCommand::from_envelope(&start), Some(WorkerCommand::Start(_))) {
        return Err(AppError::cluster("Expected start command"));
    }
    let stop = Envelope::empty(MessageKind::StopLoadTestRequest);
    if WorkerCommand::from_envelope(&stop) != Some(WorkerCommand::Stop) {
        return Err(AppError::cluster("Expected stop command"));
    }
    let info = Envelope::new(MessageKind::ServerInfo, "{}".to_owned());
    if WorkerCommand::from_envelope(&info).is_some() {
        return Err(AppError::cluster("ServerInfo is not a command"));
    }
    let broken = Envelope::new(MessageKind::StartLoadTestRequest, "[]".to_owned());
    if WorkerCommand::from_envelope(&broken).is_some() {
        return Err(AppError::cluster("Malformed start must be ignored"));
    }
    Ok(())
}

#[test]
fn join_url_carries_encoded_name() -> AppResult<()> {
    let url = join_url("localhost:9009", "worker one")?;
    if url.as_str() != "ws://localhost:9009/cluster/join?name=worker+one" {
        return Err(AppError::cluster(format!("Unexpected url: {}", url)));
    }
    Ok(())
}

#[test]
fn connect_gives_up_after_configured_attempts() -> AppResult<()> {
    run_async_test(async {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let mut options = AgentOptions::new("w", addr.to_string());
        options.connect_attempts = 2;
        options.connect_retry = Duration::from_millis(10);
        let agent = WorkerAgent::new(options)?;
        let (shutdown_tx, _) = shutdown_channel();

        match agent.run(&shutdown_tx).await {
            Err(AppError::Cluster(ClusterError::ConnectAttemptsExhausted { attempts, .. })) => {
                if attempts != 2 {
                    return Err(AppError::cluster(format!("Unexpected attempts: {}", attempts)));
                }
                Ok(())
            }
            Err(err) => Err(AppError::cluster(format!("Unexpected error: {}", err))),
            Ok(()) => Err(AppError::cluster("Expected connect failure")),
        }
    })
}

#[test]
fn zero_connect_attempts_is_rejected() -> AppResult<()> {
    run_async_test(async {
        let mut options = AgentOptions::new("w", "127.0.0.1:1");
        options.connect_attempts = 0;
        let agent = WorkerAgent::new(options)?;
        let (shutdown_tx, _) = shutdown_channel();
        if !matches!(
            agent.run(&shutdown_tx).await,
            Err(AppError::Cluster(ClusterError::NoConnectAttempts))
        ) {
            return Err(AppError::cluster("Expected NoConnectAttempts"));
        }
        Ok(())
    })
}

#[test]
fn start_runs_to_done() -> AppResult<()> {
    run_async_test(async {
        let server = spawn_counting_server(OK_RESPONSE).await?;
        let agent = WorkerAgent::new(AgentOptions::new("w", "127.0.0.1:1"))?;
        if agent.state() != WorkerState::NotStarted {
            return Err(AppError::cluster("Expected NotStarted initially"));
        }

        agent
            .handle_message(start_frame(&server.url("/"), 10, 1)?.as_bytes())
            .await;
        if agent.state() != WorkerState::Running {
            return Err(AppError::cluster("Expected Running right after start"));
        }
        wait_for_state(&agent, WorkerState::Done).await?;
        if server.hits() != 10 {
            return Err(AppError::cluster(format!("Expected 10 hits, got {}", server.hits())));
        }
        Ok(())
    })
}

#[test]
fn stop_is_sticky() -> AppResult<()> {
    run_async_test(async {
        let server = spawn_counting_server(OK_RESPONSE).await?;
        let agent = WorkerAgent::new(AgentOptions::new("w", "127.0.0.1:1"))?;

        agent
            .handle_message(start_frame(&server.url("/"), 20, 0)?.as_bytes())
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        agent.handle_message(stop_frame()?.as_bytes()).await;
        if agent.state() != WorkerState::Stopped {
            return Err(AppError::cluster("Expected Stopped after stop"));
        }

        let settled = server.hits();
        tokio::time::sleep(Duration::from_millis(300)).await;
        if agent.state() != WorkerState::Stopped {
            return Err(AppError::cluster("Stopped must survive the attack ending"));
        }
        if server.hits() > settled.saturating_add(1) {
            return Err(AppError::cluster("Expected no new hits after stop"));
        }
        Ok(())
    })
}

#[test]
fn stop_when_idle_still_stops() -> AppResult<()> {
    run_async_test(async {
        let agent = WorkerAgent::new(AgentOptions::new("w", "127.0.0.1:1"))?;
        agent.handle_message(stop_frame()?.as_bytes()).await;
        if agent.state() != WorkerState::Stopped {
            return Err(AppError::cluster("Expected Stopped"));
        }
        Ok(())
    })
}

#[test]
fn invalid_target_is_rejected() -> AppResult<()> {
    run_async_test(async {
        let agent = WorkerAgent::new(AgentOptions::new("w", "127.0.0.1:1"))?;
        agent
            .handle_message(start_frame("not a url", 10, 1)?.as_bytes())
            .await;
        if agent.state() != WorkerState::Stopped {
            return Err(AppError::cluster(format!("Unexpected state: {}", agent.state())));
        }
        Ok(())
    })
}

#[test]
fn malformed_frames_change_nothing() -> AppResult<()> {
    run_async_test(async {
        let agent = WorkerAgent::new(AgentOptions::new("w", "127.0.0.1:1"))?;
        agent.handle_message(b"").await;
        agent.handle_message(b"{]").await;
        agent
            .handle_message(br#"{"kind":"WorkerInfo","data":"{\"state\":1}"}"#)
            .await;
        if agent.state() != WorkerState::NotStarted {
            return Err(AppError::cluster("Expected state untouched"));
        }
        Ok(())
    })
}
