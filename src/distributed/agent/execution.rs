use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{Instrument, Span, debug, error, info};

use crate::distributed::protocol::{
    MessageKind, StartLoadTestRequest, WorkerInfo, WorkerState, encode,
};
use crate::distributed::server::Outbound;
use crate::error::AppResult;
use crate::http::{AttackRun, AttackStopper, Attacker, Pacer, Target};
use crate::metrics::MetricsAccumulator;

use super::headers::parse_header_block;

/// State shared by the session tasks and the attack loop of one worker.
pub(super) struct AgentShared {
    pub(super) name: String,
    pub(super) span: Span,
    attacker: Attacker,
    accumulator: Mutex<MetricsAccumulator>,
    active: Mutex<Option<AttackStopper>>,
    generation: AtomicU64,
    state_tx: watch::Sender<WorkerState>,
    pub(super) connected_tx: watch::Sender<bool>,
    outbound: Mutex<Option<Outbound>>,
}

impl AgentShared {
    pub(super) fn new(name: String, attacker: Attacker, span: Span) -> AppResult<Self> {
        Ok(Self {
            name,
            span,
            attacker,
            accumulator: Mutex::new(MetricsAccumulator::new()?),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            state_tx: watch::channel(WorkerState::NotStarted).0,
            connected_tx: watch::channel(false).0,
            outbound: Mutex::new(None),
        })
    }

    pub(super) fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    pub(super) fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    pub(super) async fn attach(&self, outbound: Outbound) {
        *self.outbound.lock().await = Some(outbound);
        self.connected_tx.send_replace(true);
    }

    pub(super) async fn detach(&self) {
        self.connected_tx.send_replace(false);
        *self.outbound.lock().await = None;
    }

    async fn send(&self, message: String) -> bool {
        let Some(outbound) = self.outbound.lock().await.clone() else {
            debug!("Not connected; dropping outbound message");
            return false;
        };
        outbound.send(message).await.is_ok()
    }

    pub(super) async fn report_state(&self) {
        let info = WorkerInfo {
            state: self.state(),
        };
        match encode(MessageKind::WorkerInfo, &info) {
            Ok(message) => {
                self.send(message).await;
            }
            Err(err) => error!("Failed to encode worker info: {}", err),
        }
    }

    /// Send the latest metrics while a test is running or has completed.
    pub(super) async fn report_metrics(&self) {
        if !self.state().reports_metrics() {
            return;
        }
        self.send_metrics().await;
    }

    async fn send_metrics(&self) {
        let metrics = self.accumulator.lock().await.close().clone();
        match encode(MessageKind::WorkerLoadTestMetrics, &metrics) {
            Ok(message) => {
                self.send(message).await;
            }
            Err(err) => error!("Failed to encode metrics: {}", err),
        }
    }

    /// Replace any current attack with the one described by `request`.
    pub(super) async fn start(self: &Arc<Self>, request: StartLoadTestRequest) {
        let headers = parse_header_block(&request.header);
        let target = match Target::new(&request.method, &request.url, &headers, request.body.clone()) {
            Ok(target) => Arc::new(target),
            Err(err) => {
                error!("Rejecting load test for {}: {}", request.url, err);
                self.stop_quietly().await;
                self.state_tx.send_replace(WorkerState::Stopped);
                self.report_state().await;
                return;
            }
        };
        info!(
            "Starting load test {} {} (rate={}, duration={}s)",
            target.method(),
            target.url(),
            request.rate,
            request.duration
        );

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.stop();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.accumulator.lock().await.reset();

        let pacer = Pacer::new(request.rate, Duration::from_secs(request.duration));
        let run = self.attacker.attack(target, pacer);
        *active = Some(run.stopper());
        drop(active);

        self.state_tx.send_replace(WorkerState::Running);
        self.report_state().await;

        let shared = Arc::clone(self);
        let span = self.span.clone();
        tokio::spawn(async move { shared.drain(run, generation).await }.instrument(span));
    }

    /// Stop the current attack, if any. The state becomes `Stopped` either way.
    pub(super) async fn stop(&self) {
        info!("Stopping load test");
        self.state_tx.send_replace(WorkerState::Stopped);
        if let Some(active) = self.active.lock().await.as_ref() {
            active.stop();
        }
        self.report_state().await;
    }

    /// Cancel the current attack on shutdown without reporting anything.
    pub(super) async fn stop_quietly(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.stop();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn drain(self: Arc<Self>, mut run: AttackRun, generation: u64) {
        while let Some(result) = run.next().await {
            if self.is_current(generation) {
                self.accumulator.lock().await.add(&result);
            }
        }
        if !self.is_current(generation) {
            return;
        }

        self.state_tx.send_if_modified(|state| {
            if *state == WorkerState::Running {
                *state = WorkerState::Done;
                true
            } else {
                false
            }
        });
        self.send_metrics().await;
        self.report_state().await;
        info!("Finished load test ({})", self.state());
    }
}
