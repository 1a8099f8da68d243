use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, Span, debug, info, warn};

use crate::distributed::protocol::{MessageKind, encode};
use crate::error::AppResult;
use crate::shutdown::ShutdownReceiver;

use super::coordinator::Coordinator;
use super::outbound::{BroadcastOutcome, ConnectionId, ConnectionTable, Outbound, fan_out};

pub const DEFAULT_NOTIFICATION_INTERVAL: Duration = Duration::from_secs(1);

/// Observer connections that receive the periodic cluster view.
#[derive(Default)]
pub struct NotificationHub {
    subscribers: RwLock<ConnectionTable<Outbound>>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_subscriber(&self, outbound: Outbound) -> ConnectionId {
        let connection = ConnectionId::next();
        self.subscribers.write().await.insert(connection, outbound);
        info!("Notification subscriber {} connected", connection);
        connection
    }

    pub async fn remove_subscriber(&self, connection: ConnectionId) {
        if self.subscribers.write().await.remove(&connection).is_some() {
            info!("Notification subscriber {} removed", connection);
        }
    }

    pub async fn broadcast(&self, message: &str) -> BroadcastOutcome {
        let subscribers = self.subscribers.read().await;
        fan_out(subscribers.values(), message)
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    /// Send `ServerInfo` followed by `WorkersInfo` to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if either message cannot be serialized.
    pub async fn publish(&self, coordinator: &Coordinator) -> AppResult<()> {
        let server_info = encode(MessageKind::ServerInfo, &coordinator.server_info().await)?;
        let outcome = self.broadcast(&server_info).await;
        let workers_info = encode(MessageKind::WorkersInfo, &coordinator.workers_info().await)?;
        let workers_outcome = self.broadcast(&workers_info).await;
        let undelivered = outcome.undelivered.saturating_add(workers_outcome.undelivered);
        if undelivered > 0 {
            debug!("{} notifications were not delivered", undelivered);
        }
        Ok(())
    }

    /// Publish the cluster view every `period` until shutdown.
    pub fn spawn_notifier(
        self: &Arc<Self>,
        coordinator: Arc<Coordinator>,
        period: Duration,
        mut shutdown_rx: ShutdownReceiver,
        span: Span,
    ) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(
            async move {
                let mut ticker = interval(period.max(Duration::from_millis(1)));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(err) = hub.publish(&coordinator).await {
                                warn!("Failed to publish notifications: {}", err);
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }
            .instrument(span),
        )
    }
}
