use serde::Deserialize;

/// Contents of `terjang.toml` / `terjang.json`. Every field is optional;
/// command-line values take precedence.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub server: Option<ServerConfig>,
    pub worker: Option<WorkerConfig>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub notification_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub connect_retry_ms: Option<u64>,
    pub connect_attempts: Option<u32>,
    pub metrics_interval_ms: Option<u64>,
    pub max_in_flight: Option<usize>,
    pub reconnect: Option<bool>,
}
