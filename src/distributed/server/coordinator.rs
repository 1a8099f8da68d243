use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, info};

use crate::distributed::protocol::{
    Envelope, MessageKind, ServerInfo, ServerState, StartLoadTestRequest, WorkerState,
    WorkerSummary, encode,
};
use crate::error::AppResult;
use crate::shutdown::ShutdownReceiver;

use super::outbound::{BroadcastOutcome, ConnectionId};
use super::registry::WorkerRegistry;

/// Owns the cluster-wide test state and issues start/stop to every worker.
pub struct Coordinator {
    registry: Arc<WorkerRegistry>,
    state: RwLock<ServerState>,
    span: Span,
}

impl Coordinator {
    #[must_use]
    pub fn new(registry: Arc<WorkerRegistry>, span: Span) -> Self {
        Self {
            registry,
            state: RwLock::new(ServerState::NotStarted),
            span,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Mark the cluster running and send the request to every worker. There
    /// is no acknowledgment; workers report back through `WorkerInfo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be serialized.
    pub async fn start_load_test(&self, request: &StartLoadTestRequest) -> AppResult<BroadcastOutcome> {
        let message = encode(MessageKind::StartLoadTestRequest, request)?;
        *self.state.write().await = ServerState::Running;
        let outcome = self.registry.broadcast(&message).await;
        info!(
            parent: &self.span,
            "Started load test {} {} (rate={}, duration={}s) on {} workers",
            request.method,
            request.url,
            request.rate,
            request.duration,
            outcome.attempted
        );
        Ok(outcome)
    }

    /// Ask every worker to stop. The cluster state follows from what the
    /// workers report.
    ///
    /// # Errors
    ///
    /// Returns an error if the stop frame cannot be serialized.
    pub async fn stop_load_test(&self) -> AppResult<BroadcastOutcome> {
        let message = Envelope::empty(MessageKind::StopLoadTestRequest).to_wire()?;
        let outcome = self.registry.broadcast(&message).await;
        info!(
            parent: &self.span,
            "Stop requested on {} workers",
            outcome.attempted
        );
        Ok(outcome)
    }

    /// Drop a disconnected worker. An empty cluster is always `Stopped`.
    pub async fn worker_disconnected(&self, connection: ConnectionId) {
        let remaining = self.registry.remove_worker(connection).await;
        if remaining == 0 {
            let mut state = self.state.write().await;
            if *state != ServerState::Stopped {
                info!(parent: &self.span, "No workers remaining; load test stopped");
            }
            *state = ServerState::Stopped;
        }
    }

    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    pub async fn server_info(&self) -> ServerInfo {
        ServerInfo {
            num_of_workers: self.registry.len().await,
            state: self.state().await,
        }
    }

    pub async fn workers_info(&self) -> Vec<WorkerSummary> {
        self.registry.snapshot().await
    }

    /// Re-derive the cluster state from the current worker states.
    ///
    /// Worker states are read under the state lock so a concurrent
    /// [`Coordinator::worker_disconnected`] cannot be overwritten with a
    /// state derived from workers that are already gone.
    pub async fn recompute(&self) -> ServerState {
        let mut state = self.state.write().await;
        let states = self.registry.states().await;
        let next = derive_cluster_state(*state, &states);
        if next != *state {
            info!(parent: &self.span, "Load test state {} -> {}", *state, next);
            *state = next;
        }
        next
    }

    /// Recompute on every worker state change until shutdown.
    pub fn spawn_watcher(self: &Arc<Self>, mut shutdown_rx: ShutdownReceiver) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let span = self.span.clone();
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        () = coordinator.registry.state_changed() => {
                            coordinator.recompute().await;
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }
            .instrument(span),
        )
    }
}

/// All workers `Done` gives `Done`; all terminal with at least one `Stopped`
/// gives `Stopped`. Anything else, including an empty cluster, keeps
/// `current`.
#[must_use]
pub fn derive_cluster_state(current: ServerState, states: &[WorkerState]) -> ServerState {
    if states.is_empty() || !states.iter().all(|state| state.is_terminal()) {
        return current;
    }
    if states.iter().all(|state| *state == WorkerState::Done) {
        ServerState::Done
    } else {
        ServerState::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::server::outbound_channel;
    use crate::error::AppError;
    use crate::test_support::run_async_test;
    use std::time::Duration;

    const PARK_DELAY: Duration = Duration::from_millis(50);

    #[test]
    fn recompute_racing_last_disconnect_leaves_cluster_stopped() -> AppResult<()> {
        run_async_test(async {
            let registry = Arc::new(WorkerRegistry::new());
            let coordinator = Arc::new(Coordinator::new(Arc::clone(&registry), Span::none()));
            let (out_tx, _out_rx) = outbound_channel();
            let worker = registry.add_worker(out_tx, "last".to_owned()).await;
            coordinator
                .start_load_test(&StartLoadTestRequest::default())
                .await?;
            registry.set_state(worker, WorkerState::Done).await;

            // Park both callers on the state lock: recompute first, then the
            // disconnect, which has already emptied the registry.
            let held = coordinator.state.write().await;
            let recompute = tokio::spawn({
                let coordinator = Arc::clone(&coordinator);
                async move { coordinator.recompute().await }
            });
            tokio::time::sleep(PARK_DELAY).await;
            let disconnect = tokio::spawn({
                let coordinator = Arc::clone(&coordinator);
                async move { coordinator.worker_disconnected(worker).await }
            });
            crate::test_support::wait_until(Duration::from_secs(1), {
                let registry = Arc::clone(&registry);
                move || {
                    let registry = Arc::clone(&registry);
                    async move { registry.is_empty().await }
                }
            })
            .await?;
            drop(held);

            let derived = recompute.await?;
            disconnect.await?;
            if derived == ServerState::Done {
                return Err(AppError::cluster(
                    "Recompute derived Done from a worker that already left",
                ));
            }
            if coordinator.state().await != ServerState::Stopped {
                return Err(AppError::cluster(format!(
                    "Empty cluster must be Stopped, got {}",
                    coordinator.state().await
                )));
            }
            Ok(())
        })
    }

    #[test]
    fn recompute_after_last_disconnect_keeps_stopped() -> AppResult<()> {
        run_async_test(async {
            let registry = Arc::new(WorkerRegistry::new());
            let coordinator = Coordinator::new(Arc::clone(&registry), Span::none());
            let (out_tx, _out_rx) = outbound_channel();
            let worker = registry.add_worker(out_tx, "last".to_owned()).await;
            registry.set_state(worker, WorkerState::Done).await;

            coordinator.worker_disconnected(worker).await;
            if coordinator.recompute().await != ServerState::Stopped {
                return Err(AppError::cluster("Recompute must not revive an empty cluster"));
            }
            Ok(())
        })
    }
}
