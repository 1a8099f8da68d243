use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::error::{AppError, AppResult, AttackError};

use super::{DEFAULT_USER_AGENT, Pacer, Target};

const DEFAULT_MAX_IN_FLIGHT: usize = 1024;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackerOptions {
    pub max_in_flight: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for AttackerOptions {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Outcome of a single hit.
///
/// `status_code` is `0` when the request never produced a response; `error`
/// then carries the transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackResult {
    pub started_at: Instant,
    pub latency: Duration,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub status_code: u16,
    pub error: Option<String>,
}

impl AttackResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status_code)
    }

    #[must_use]
    pub fn finished_at(&self) -> Instant {
        self.started_at
            .checked_add(self.latency)
            .unwrap_or(self.started_at)
    }
}

/// Cancels an attack. Cloneable so the owner of the result stream and a
/// command handler can both hold one.
#[derive(Debug, Clone)]
pub struct AttackStopper {
    stop_tx: Arc<watch::Sender<bool>>,
}

impl AttackStopper {
    /// Stop scheduling new hits. Requests already in flight still complete.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

/// A running attack: a stream of results that ends once the schedule is
/// exhausted (or stopped) and every in-flight request has finished.
#[derive(Debug)]
pub struct AttackRun {
    results: mpsc::Receiver<AttackResult>,
    stopper: AttackStopper,
}

impl AttackRun {
    pub async fn next(&mut self) -> Option<AttackResult> {
        self.results.recv().await
    }

    #[must_use]
    pub fn stopper(&self) -> AttackStopper {
        self.stopper.clone()
    }

    pub fn stop(&self) {
        self.stopper.stop();
    }
}

/// Shared HTTP client plus the concurrency cap used for every attack.
#[derive(Debug, Clone)]
pub struct Attacker {
    client: Client,
    max_in_flight: usize,
}

impl Attacker {
    /// Build the HTTP client used by every hit.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(options: AttackerOptions) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|source| AppError::attack(AttackError::BuildClient { source }))?;
        Ok(Self {
            client,
            max_in_flight: options.max_in_flight.max(1),
        })
    }

    /// Start hitting `target` on the schedule described by `pacer`.
    #[must_use]
    pub fn attack(&self, target: Arc<Target>, pacer: Pacer) -> AttackRun {
        let (result_tx, result_rx) = mpsc::channel(self.max_in_flight);
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(run_schedule(
            self.client.clone(),
            target,
            pacer,
            Arc::new(Semaphore::new(self.max_in_flight)),
            result_tx,
            stop_rx,
        ));
        AttackRun {
            results: result_rx,
            stopper: AttackStopper {
                stop_tx: Arc::new(stop_tx),
            },
        }
    }
}

async fn run_schedule(
    client: Client,
    target: Arc<Target>,
    pacer: Pacer,
    limiter: Arc<Semaphore>,
    result_tx: mpsc::Sender<AttackResult>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let started = Instant::now();
    let mut hit: u64 = 0;
    loop {
        if pacer.total_hits().is_some_and(|total| hit >= total) {
            break;
        }
        let due = started.checked_add(pacer.offset(hit)).unwrap_or(started);
        tokio::select! {
            () = sleep_until(due) => {}
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
        }
        let permit = tokio::select! {
            permit = limiter.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_closed) => break,
            },
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
        };

        let client = client.clone();
        let target = target.clone();
        let result_tx = result_tx.clone();
        tokio::spawn(async move {
            let result = hit_target(&client, &target).await;
            drop(permit);
            drop(result_tx.send(result).await);
        });
        hit = hit.saturating_add(1);
    }
    debug!("Attack schedule finished after {} hits", hit);
}

async fn hit_target(client: &Client, target: &Target) -> AttackResult {
    let mut request = client
        .request(target.method.clone(), target.url.clone())
        .headers(target.headers.clone());
    if !target.body.is_empty() {
        request = request.body(target.body.clone());
    }

    let started_at = Instant::now();
    let (status_code, bytes_in, error) = match request.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            match drain_response_body(response).await {
                Ok(bytes) => (status, bytes, None),
                Err(err) => (status, 0, Some(err.to_string())),
            }
        }
        Err(err) => (0, 0, Some(err.to_string())),
    };

    AttackResult {
        started_at,
        latency: started_at.elapsed(),
        bytes_in,
        bytes_out: target.body_len(),
        status_code,
        error,
    }
}

async fn drain_response_body(response: reqwest::Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        total_bytes = total_bytes.saturating_add(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
    }
    Ok(total_bytes)
}
