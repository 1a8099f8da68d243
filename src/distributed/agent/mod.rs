//! Load-generating worker: joins the server, runs the attacks it is told to
//! run and reports state and metrics back.
mod command;
mod execution;
mod headers;
mod session;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, info_span, warn};

use crate::distributed::protocol::WorkerState;
use crate::error::AppResult;
use crate::http::{Attacker, AttackerOptions};
use crate::shutdown::{ShutdownReceiver, ShutdownSender};

use execution::AgentShared;
use session::{SessionEnd, connect_with_retry, handle_frame, join_url, run_session};

pub use headers::parse_header_block;

pub const DEFAULT_CONNECT_RETRY: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOptions {
    pub name: String,
    /// `host:port` of the server.
    pub server_addr: String,
    pub connect_retry: Duration,
    pub connect_attempts: u32,
    pub metrics_interval: Duration,
    pub attacker: AttackerOptions,
    /// Start a new connect cycle whenever a session ends.
    pub reconnect: bool,
}

impl AgentOptions {
    #[must_use]
    pub fn new(name: impl Into<String>, server_addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_addr: server_addr.into(),
            connect_retry: DEFAULT_CONNECT_RETRY,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
            attacker: AttackerOptions::default(),
            reconnect: false,
        }
    }
}

pub struct WorkerAgent {
    shared: Arc<AgentShared>,
    options: AgentOptions,
}

impl WorkerAgent {
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the metrics histogram cannot be
    /// created.
    pub fn new(options: AgentOptions) -> AppResult<Self> {
        let attacker = Attacker::new(options.attacker)?;
        let span = info_span!("worker", name = %options.name);
        let shared = AgentShared::new(options.name.clone(), attacker, span)?;
        Ok(Self {
            shared: Arc::new(shared),
            options,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.shared.subscribe_state()
    }

    /// Flips to `true` once a session is established and back to `false`
    /// when it ends.
    #[must_use]
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.shared.connected_tx.subscribe()
    }

    /// Act on one raw frame as if it came from the server.
    pub async fn handle_message(&self, bytes: &[u8]) {
        handle_frame(&self.shared, bytes).await;
    }

    /// Connect and serve until the server goes away or shutdown is
    /// broadcast. In reconnect mode a finished session starts a new connect
    /// cycle instead.
    ///
    /// # Errors
    ///
    /// Returns an error when the server address is invalid, when every
    /// connect attempt fails, or when the connection breaks (outside
    /// reconnect mode).
    pub async fn run(&self, shutdown_tx: &ShutdownSender) -> AppResult<()> {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let url = join_url(&self.options.server_addr, &self.options.name)?;
        info!(
            parent: &self.shared.span,
            "Worker starting (reconnect={})",
            self.options.reconnect
        );

        loop {
            match self.run_once(&url, &mut shutdown_rx).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => {
                    if !self.options.reconnect {
                        break;
                    }
                }
                Err(err) => {
                    if !self.options.reconnect {
                        return Err(err);
                    }
                    warn!(parent: &self.shared.span, "Worker session error: {}", err);
                }
            }
            tokio::select! {
                () = sleep(self.options.connect_retry) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        self.shared.stop_quietly().await;
        Ok(())
    }

    async fn run_once(&self, url: &url::Url, shutdown_rx: &mut ShutdownReceiver) -> AppResult<SessionEnd> {
        let Some(socket) = connect_with_retry(url, &self.options, shutdown_rx).await? else {
            return Ok(SessionEnd::Shutdown);
        };
        run_session(&self.shared, socket, self.options.metrics_interval, shutdown_rx).await
    }
}
