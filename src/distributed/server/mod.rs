//! Control point: accepts worker and observer websockets and serves the REST
//! control plane on a single listener.
mod connections;
mod coordinator;
mod handler;
mod http;
mod hub;
mod outbound;
mod registry;
mod routes;


use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{Instrument, Span, info, info_span, warn};

use crate::error::{AppError, AppResult, ClusterError};
use crate::shutdown::ShutdownSender;

pub use coordinator::{Coordinator, derive_cluster_state};
pub use handler::{MessageHandler, WorkerMessageHandler};
pub use hub::{DEFAULT_NOTIFICATION_INTERVAL, NotificationHub};
pub use outbound::{
    BroadcastOutcome, ConnectionId, OUTBOUND_QUEUE_CAPACITY, Outbound, outbound_channel,
};
pub use registry::WorkerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    pub notification_interval: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            notification_interval: DEFAULT_NOTIFICATION_INTERVAL,
        }
    }
}

pub(crate) struct ServerContext {
    coordinator: Arc<Coordinator>,
    hub: Arc<NotificationHub>,
}

pub struct ClusterServer {
    listener: TcpListener,
    context: Arc<ServerContext>,
    options: ServerOptions,
    span: Span,
}

impl ClusterServer {
    /// Bind the listener. Use port `0` to let the OS pick one.
    ///
    /// # Errors
    ///
    /// Returns an error when the address cannot be bound.
    pub async fn bind(addr: &str, options: ServerOptions) -> AppResult<Self> {
        Self::bind_with_registry(addr, options, Arc::new(WorkerRegistry::new())).await
    }

    /// Bind with a caller-supplied registry, e.g. one carrying a custom
    /// [`MessageHandler`].
    ///
    /// # Errors
    ///
    /// Returns an error when the address cannot be bound.
    pub async fn bind_with_registry(
        addr: &str,
        options: ServerOptions,
        registry: Arc<WorkerRegistry>,
    ) -> AppResult<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            AppError::cluster(ClusterError::Bind {
                addr: addr.to_owned(),
                source,
            })
        })?;
        let span = info_span!("server");
        let coordinator = Arc::new(Coordinator::new(registry, span.clone()));
        Ok(Self {
            listener,
            context: Arc::new(ServerContext {
                coordinator,
                hub: Arc::new(NotificationHub::new()),
            }),
            options,
            span,
        })
    }

    /// # Errors
    ///
    /// Returns an error when the socket address cannot be read.
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        self.listener.local_addr().map_err(|source| {
            AppError::cluster(ClusterError::Io {
                context: "read listener address",
                source,
            })
        })
    }

    #[must_use]
    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.context.coordinator)
    }

    #[must_use]
    pub fn hub(&self) -> Arc<NotificationHub> {
        Arc::clone(&self.context.hub)
    }

    /// Accept connections until shutdown is broadcast.
    ///
    /// # Errors
    ///
    /// Returns an error if a background task panics.
    pub async fn run(self, shutdown_tx: &ShutdownSender) -> AppResult<()> {
        let Self {
            listener,
            context,
            options,
            span,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            info!(parent: &span, "Server is listening on {}", addr);
        }

        let watcher = context.coordinator.spawn_watcher(shutdown_tx.subscribe());
        let notifier = context.hub.spawn_notifier(
            Arc::clone(&context.coordinator),
            options.notification_interval,
            shutdown_tx.subscribe(),
            span.clone(),
        );

        let mut shutdown_rx = shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(parent: &span, "Failed to accept connection: {}", err);
                            continue;
                        }
                    };
                    let context = Arc::clone(&context);
                    let connection_span = tracing::debug_span!(parent: &span, "connection", %peer);
                    tokio::spawn(routes::handle_connection(stream, context).instrument(connection_span));
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        info!(parent: &span, "Server shutting down");
        watcher.await?;
        notifier.await?;
        Ok(())
    }
}
