//! Envelope wire protocol shared by the server and its workers.
//!
//! Every websocket text frame carries one [`Envelope`]: a `kind` tag plus the
//! JSON-encoded payload as a string.
mod envelope;
mod serde_helpers;
mod types;

pub use envelope::{Envelope, MessageKind, encode};
pub use types::{
    ByteMetrics, LatencyMetrics, ServerInfo, ServerState, StartLoadTestRequest, WorkerInfo,
    WorkerLoadTestMetrics, WorkerState, WorkerSummary,
};
