use async_trait::async_trait;
use tracing::debug;

use crate::distributed::protocol::{Envelope, MessageKind, WorkerInfo, WorkerLoadTestMetrics};

use super::outbound::ConnectionId;
use super::registry::WorkerRegistry;

/// Reacts to a decoded envelope received from a worker connection.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, registry: &WorkerRegistry, connection: ConnectionId, envelope: Envelope);
}

/// Tracks worker state and metrics reports; everything else is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerMessageHandler;

#[async_trait]
impl MessageHandler for WorkerMessageHandler {
    async fn handle(&self, registry: &WorkerRegistry, connection: ConnectionId, envelope: Envelope) {
        match envelope.kind() {
            Some(MessageKind::WorkerInfo) => {
                let Some(info) = envelope.payload::<WorkerInfo>() else {
                    debug!("Dropping malformed WorkerInfo from {}", connection);
                    return;
                };
                registry.set_state(connection, info.state).await;
            }
            Some(MessageKind::WorkerLoadTestMetrics) => {
                let Some(metrics) = envelope.payload::<WorkerLoadTestMetrics>() else {
                    debug!("Dropping malformed metrics from {}", connection);
                    return;
                };
                registry.set_metrics(connection, metrics).await;
            }
            Some(
                MessageKind::StartLoadTestRequest
                | MessageKind::StopLoadTestRequest
                | MessageKind::ServerInfo
                | MessageKind::WorkersInfo,
            ) => {
                debug!("Ignoring {} from worker {}", envelope.kind, connection);
            }
            None => {
                debug!("Ignoring unknown kind '{}' from {}", envelope.kind, connection);
            }
        }
    }
}
