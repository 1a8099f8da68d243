use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use super::serde_helpers::{duration_nanos, u64_string, worker_state_label};

/// Command broadcast by the server to start a test on every worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartLoadTestRequest {
    pub method: String,
    pub url: String,
    /// Test length in seconds.
    #[serde(with = "u64_string")]
    pub duration: u64,
    /// Requests per second, per worker.
    #[serde(with = "u64_string")]
    pub rate: u64,
    /// Raw `Key: Value` lines separated by newlines.
    pub header: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyMetrics {
    #[serde(with = "duration_nanos")]
    pub total: Duration,
    #[serde(with = "duration_nanos")]
    pub mean: Duration,
    #[serde(rename = "50th", with = "duration_nanos")]
    pub p50: Duration,
    #[serde(rename = "90th", with = "duration_nanos")]
    pub p90: Duration,
    #[serde(rename = "95th", with = "duration_nanos")]
    pub p95: Duration,
    #[serde(rename = "99th", with = "duration_nanos")]
    pub p99: Duration,
    #[serde(with = "duration_nanos")]
    pub max: Duration,
    #[serde(with = "duration_nanos")]
    pub min: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteMetrics {
    pub total: u64,
    pub mean: f64,
}

/// Point-in-time metrics a worker reports once per tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerLoadTestMetrics {
    /// Span between the first and the last request start.
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
    /// Extra time spent waiting on the last response.
    #[serde(with = "duration_nanos")]
    pub wait: Duration,
    pub requests: u64,
    pub rate: f64,
    pub throughput: f64,
    /// Ratio of responses with a 2xx/3xx status.
    pub success: f64,
    pub latencies: LatencyMetrics,
    pub bytes_in: ByteMetrics,
    pub bytes_out: ByteMetrics,
    pub status_codes: BTreeMap<String, u64>,
    pub errors: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WorkerState {
    #[default]
    NotStarted,
    Running,
    Done,
    Stopped,
}

impl WorkerState {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            WorkerState::NotStarted => 0,
            WorkerState::Running => 1,
            WorkerState::Done => 2,
            WorkerState::Stopped => 3,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(WorkerState::NotStarted),
            1 => Some(WorkerState::Running),
            2 => Some(WorkerState::Done),
            3 => Some(WorkerState::Stopped),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            WorkerState::NotStarted => "NotStarted",
            WorkerState::Running => "Running",
            WorkerState::Done => "Done",
            WorkerState::Stopped => "Stopped",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "NotStarted" => Some(WorkerState::NotStarted),
            "Running" => Some(WorkerState::Running),
            "Done" => Some(WorkerState::Done),
            "Stopped" => Some(WorkerState::Stopped),
            _ => None,
        }
    }

    /// Done or Stopped.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Done | WorkerState::Stopped)
    }

    /// Whether the periodic reporter should send metrics in this state.
    #[must_use]
    pub const fn reports_metrics(self) -> bool {
        matches!(self, WorkerState::Running | WorkerState::Done)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Worker state travels as its integer code inside `WorkerInfo`.
impl Serialize for WorkerState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for WorkerState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u8::deserialize(deserializer)?;
        WorkerState::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("Unknown worker state {}", code)))
    }
}

/// Aggregate test state across the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    #[default]
    NotStarted,
    Running,
    Done,
    Stopped,
}

impl ServerState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ServerState::NotStarted => "NotStarted",
            ServerState::Running => "Running",
            ServerState::Done => "Done",
            ServerState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub state: WorkerState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub num_of_workers: usize,
    pub state: ServerState,
}

/// One entry of the `WorkersInfo` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub name: String,
    pub metrics: WorkerLoadTestMetrics,
    #[serde(with = "worker_state_label")]
    pub state: WorkerState,
}
