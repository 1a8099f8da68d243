use crate::distributed::protocol::{Envelope, MessageKind, StartLoadTestRequest};

/// Commands a worker accepts from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum WorkerCommand {
    Start(StartLoadTestRequest),
    Stop,
}

impl WorkerCommand {
    /// `None` for kinds a worker does not act on and for malformed payloads.
    pub(super) fn from_envelope(envelope: &Envelope) -> Option<Self> {
        match envelope.kind()? {
            MessageKind::StartLoadTestRequest => envelope
                .payload::<StartLoadTestRequest>()
                .map(WorkerCommand::Start),
            MessageKind::StopLoadTestRequest => Some(WorkerCommand::Stop),
            MessageKind::WorkerLoadTestMetrics
            | MessageKind::ServerInfo
            | MessageKind::WorkerInfo
            | MessageKind::WorkersInfo => None,
        }
    }
}
