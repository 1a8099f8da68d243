use std::path::Path;

pub(crate) const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_WORKER_HOST: &str = "localhost";
pub(crate) const DEFAULT_PORT: u16 = 9009;
pub(crate) const DEFAULT_NOTIFICATION_INTERVAL_MS: u64 = 1000;
pub(crate) const DEFAULT_CONNECT_RETRY_MS: u64 = 5000;
pub(crate) const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;
pub(crate) const DEFAULT_METRICS_INTERVAL_MS: u64 = 1000;
pub(crate) const DEFAULT_MAX_IN_FLIGHT: usize = 1024;

const FALLBACK_WORKER_NAME: &str = "worker";

/// The host name, falling back to a fixed name when it cannot be read.
pub(crate) fn default_worker_name() -> String {
    hostname_from_env()
        .or_else(|| hostname_from_file(Path::new("/etc/hostname")))
        .unwrap_or_else(|| FALLBACK_WORKER_NAME.to_owned())
}

fn hostname_from_env() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty())
}

fn hostname_from_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let name = content.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_owned())
    }
}
