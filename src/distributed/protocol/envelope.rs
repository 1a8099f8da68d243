use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ClusterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    StartLoadTestRequest,
    StopLoadTestRequest,
    WorkerLoadTestMetrics,
    ServerInfo,
    WorkerInfo,
    WorkersInfo,
}

impl MessageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::StartLoadTestRequest => "StartLoadTestRequest",
            MessageKind::StopLoadTestRequest => "StopLoadTestRequest",
            MessageKind::WorkerLoadTestMetrics => "WorkerLoadTestMetrics",
            MessageKind::ServerInfo => "ServerInfo",
            MessageKind::WorkerInfo => "WorkerInfo",
            MessageKind::WorkersInfo => "WorkersInfo",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "StartLoadTestRequest" => Some(MessageKind::StartLoadTestRequest),
            "StopLoadTestRequest" => Some(MessageKind::StopLoadTestRequest),
            "WorkerLoadTestMetrics" => Some(MessageKind::WorkerLoadTestMetrics),
            "ServerInfo" => Some(MessageKind::ServerInfo),
            "WorkerInfo" => Some(MessageKind::WorkerInfo),
            "WorkersInfo" => Some(MessageKind::WorkersInfo),
            _ => None,
        }
    }
}

/// Tagged wrapper used for every message on every connection.
///
/// `kind` stays a plain string on the wire so that frames with kinds this
/// build does not know still decode; handlers then ignore them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub data: String,
}

impl Envelope {
    /// Wrap an already serialized payload.
    #[must_use]
    pub fn new(kind: MessageKind, data: String) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            data,
        }
    }

    /// An envelope without payload (used by `StopLoadTestRequest`).
    #[must_use]
    pub fn empty(kind: MessageKind) -> Self {
        Self::new(kind, String::new())
    }

    /// Serialize the envelope to its wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_wire(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|err| {
            AppError::cluster(ClusterError::Serialize {
                context: "envelope",
                source: err,
            })
        })
    }

    /// Decode a frame. Malformed JSON yields `None`; the protocol has no
    /// negative acknowledgment, so callers just drop the frame.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        serde_json::from_slice::<Envelope>(bytes).ok()
    }

    #[must_use]
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::parse(&self.kind)
    }

    /// Decode the payload as `T`, or `None` when `data` does not fit.
    #[must_use]
    pub fn payload<T>(&self) -> Option<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_str::<T>(&self.data).ok()
    }
}

/// Serialize `payload`, wrap it as `kind`, and serialize the envelope.
///
/// # Errors
///
/// Returns an error if the payload or the envelope cannot be serialized.
pub fn encode<T>(kind: MessageKind, payload: &T) -> AppResult<String>
where
    T: Serialize + ?Sized,
{
    let data = serde_json::to_string(payload).map_err(|err| {
        AppError::cluster(ClusterError::Serialize {
            context: kind.as_str(),
            source: err,
        })
    })?;
    Envelope::new(kind, data).to_wire()
}
