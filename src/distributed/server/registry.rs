use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

use crate::distributed::protocol::{Envelope, WorkerLoadTestMetrics, WorkerState, WorkerSummary};

use super::handler::{MessageHandler, WorkerMessageHandler};
use super::outbound::{BroadcastOutcome, ConnectionId, ConnectionTable, Outbound, fan_out};

#[derive(Debug)]
struct WorkerRecord {
    name: String,
    outbound: Outbound,
    metrics: WorkerLoadTestMetrics,
    state: WorkerState,
}

/// Table of connected workers keyed by connection.
///
/// Mutations take the write lock; broadcast and snapshots share the read
/// lock. A change of any worker's state raises a coalescing signal that the
/// coordinator waits on.
pub struct WorkerRegistry {
    workers: RwLock<ConnectionTable<WorkerRecord>>,
    state_changed: Notify,
    handler: Arc<dyn MessageHandler>,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_handler(Arc::new(WorkerMessageHandler))
    }

    #[must_use]
    pub fn with_handler(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            workers: RwLock::new(ConnectionTable::new()),
            state_changed: Notify::new(),
            handler,
        }
    }

    /// Register a worker connection in `NotStarted` state.
    pub async fn add_worker(&self, outbound: Outbound, name: String) -> ConnectionId {
        let connection = ConnectionId::next();
        info!("Worker '{}' registered as {}", name, connection);
        let record = WorkerRecord {
            name,
            outbound,
            metrics: WorkerLoadTestMetrics::default(),
            state: WorkerState::NotStarted,
        };
        self.workers.write().await.insert(connection, record);
        connection
    }

    /// Forget a worker and return how many remain.
    pub async fn remove_worker(&self, connection: ConnectionId) -> usize {
        let mut workers = self.workers.write().await;
        if let Some(record) = workers.remove(&connection) {
            info!("Worker '{}' ({}) removed", record.name, connection);
        }
        let remaining = workers.len();
        drop(workers);
        self.state_changed.notify_one();
        remaining
    }

    /// Queue `message` once on every worker registered right now.
    pub async fn broadcast(&self, message: &str) -> BroadcastOutcome {
        let workers = self.workers.read().await;
        let outcome = fan_out(workers.values().map(|record| &record.outbound), message);
        drop(workers);
        if outcome.undelivered > 0 {
            debug!(
                "Broadcast reached {}/{} workers",
                outcome.delivered(),
                outcome.attempted
            );
        }
        outcome
    }

    /// Decode one inbound frame and pass it to the configured handler.
    /// Malformed frames are dropped.
    pub async fn handle_inbound(&self, connection: ConnectionId, bytes: &[u8]) {
        let Some(envelope) = Envelope::decode(bytes) else {
            debug!("Dropping malformed frame from {}", connection);
            return;
        };
        self.handler.handle(self, connection, envelope).await;
    }

    /// Record a reported state. Returns whether it differed from the stored
    /// one; a difference raises the state-changed signal.
    pub async fn set_state(&self, connection: ConnectionId, state: WorkerState) -> bool {
        let mut workers = self.workers.write().await;
        let Some(record) = workers.get_mut(&connection) else {
            return false;
        };
        if record.state == state {
            return false;
        }
        debug!(
            "Worker '{}' state {} -> {}",
            record.name, record.state, state
        );
        record.state = state;
        drop(workers);
        self.state_changed.notify_one();
        true
    }

    pub async fn set_metrics(&self, connection: ConnectionId, metrics: WorkerLoadTestMetrics) {
        if let Some(record) = self.workers.write().await.get_mut(&connection) {
            record.metrics = metrics;
        }
    }

    pub async fn snapshot(&self) -> Vec<WorkerSummary> {
        self.workers
            .read()
            .await
            .values()
            .map(|record| WorkerSummary {
                name: record.name.clone(),
                metrics: record.metrics.clone(),
                state: record.state,
            })
            .collect()
    }

    pub async fn states(&self) -> Vec<WorkerState> {
        self.workers
            .read()
            .await
            .values()
            .map(|record| record.state)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    /// Resolves once a state change was signalled since the last wait.
    /// Several changes before a wait collapse into one wakeup.
    pub async fn state_changed(&self) {
        self.state_changed.notified().await;
    }
}
