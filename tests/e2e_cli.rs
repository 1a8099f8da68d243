
use std::fs;
use std::time::Duration;

use tempfile::tempdir;

use support_cli::{http_request, pick_port, spawn_terjang, wait_for_exit, wait_until};
use support_target::spawn_target;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

fn server_info(port: u16) -> Result<serde_json::Value, String> {
    let (status, body) = http_request(port, "GET", "/api/v1/server_info", "")?;
    if status != 200 {
        return Err(format!("Unexpected status {}", status));
    }
    serde_json::from_str(&body).map_err(|err| format!("Bad server_info body: {}", err))
}

#[test]
fn cli_server_and_worker_complete_load_test() -> Result<(), String> {
    let target = spawn_target()?;
    let port = pick_port()?;
    let port_arg = port.to_string();

    let _server = spawn_terjang([
        "server",
        "--host",
        "127.0.0.1",
        "--port",
        port_arg.as_str(),
        "--notification-interval-ms",
        "100",
    ])?;
    let _worker = spawn_terjang([
        "worker",
        "--name",
        "cli-worker",
        "--host",
        "127.0.0.1",
        "--port",
        port_arg.as_str(),
        "--connect-retry-ms",
        "100",
        "--connect-attempts",
        "100",
    ])?;

    wait_until("worker to join", STARTUP_TIMEOUT, || {
        Ok(server_info(port)?.get("num_of_workers") == Some(&serde_json::json!(1)))
    })?;

    let request = serde_json::json!({
        "method": "GET",
        "url": target.url("/cli"),
        "duration": "1",
        "rate": "5",
        "header": "X-load-test: cli",
        "body": "",
    });
    let (status, body) = http_request(port, "POST", "/api/v1/load_test", &request.to_string())?;
    if status != 200 {
        return Err(format!("Unexpected start status {}: {}", status, body));
    }

    wait_until("load test to finish", STARTUP_TIMEOUT, || {
        Ok(server_info(port)?.get("state") == Some(&serde_json::json!("Done")))
    })?;

    let (status, body) = http_request(port, "GET", "/api/v1/worker_info", "")?;
    if status != 200 {
        return Err(format!("Unexpected worker_info status {}", status));
    }
    let workers: serde_json::Value =
        serde_json::from_str(&body).map_err(|err| format!("Bad worker_info body: {}", err))?;
    let worker = workers
        .get(0)
        .ok_or_else(|| format!("Missing worker entry: {}", workers))?;
    if worker.get("name") != Some(&serde_json::json!("cli-worker")) {
        return Err(format!("Unexpected worker entry: {}", worker));
    }
    if target.hits() != 5 {
        return Err(format!("Expected 5 hits, got {}", target.hits()));
    }
    Ok(())
}

#[test]
fn worker_gives_up_when_server_is_unreachable() -> Result<(), String> {
    let port = pick_port()?;
    let port_arg = port.to_string();
    let mut worker = spawn_terjang([
        "worker",
        "--port",
        port_arg.as_str(),
        "--connect-retry-ms",
        "10",
        "--connect-attempts",
        "2",
    ])?;

    let status = wait_for_exit(&mut worker, STARTUP_TIMEOUT)?;
    if status.success() {
        return Err("Expected worker to fail without a server".to_owned());
    }
    Ok(())
}

#[test]
fn invalid_config_is_rejected() -> Result<(), String> {
    let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
    let path = dir.path().join("terjang.toml");
    fs::write(&path, "[server]\nnotification_interval_ms = 0\n")
        .map_err(|err| format!("write config failed: {}", err))?;
    let path_arg = path.to_string_lossy().into_owned();

    let mut server = spawn_terjang(["server", "--port", "0", "--config", path_arg.as_str()])?;
    let status = wait_for_exit(&mut server, STARTUP_TIMEOUT)?;
    if status.success() {
        return Err("Expected invalid config to fail".to_owned());
    }
    Ok(())
}
