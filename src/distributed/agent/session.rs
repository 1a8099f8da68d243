use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{Instrument, debug, info, warn};
use url::Url;

use crate::distributed::protocol::Envelope;
use crate::distributed::server::outbound_channel;
use crate::error::{AppError, AppResult, ClusterError};
use crate::shutdown::ShutdownReceiver;

use super::AgentOptions;
use super::command::WorkerCommand;
use super::execution::AgentShared;

type ServerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SessionEnd {
    Closed,
    Shutdown,
}

/// `ws://<addr>/cluster/join?name=<name>`
pub(super) fn join_url(addr: &str, name: &str) -> AppResult<Url> {
    let mut url = Url::parse(&format!("ws://{}/cluster/join", addr)).map_err(|source| {
        AppError::cluster(ClusterError::InvalidServerAddress {
            addr: addr.to_owned(),
            source,
        })
    })?;
    url.query_pairs_mut().append_pair("name", name);
    Ok(url)
}

/// Dial the server, retrying on a fixed interval. `None` means shutdown was
/// requested while waiting.
pub(super) async fn connect_with_retry(
    url: &Url,
    options: &AgentOptions,
    shutdown_rx: &mut ShutdownReceiver,
) -> AppResult<Option<ServerSocket>> {
    if options.connect_attempts == 0 {
        return Err(AppError::cluster(ClusterError::NoConnectAttempts));
    }

    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        info!("Connecting to server {} (attempt {}/{})", url, attempt, options.connect_attempts);
        let err = match connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                info!("Connected to server {}", url);
                return Ok(Some(socket));
            }
            Err(err) => err,
        };

        if attempt >= options.connect_attempts {
            return Err(AppError::cluster(ClusterError::ConnectAttemptsExhausted {
                url: url.to_string(),
                attempts: attempt,
                source: err,
            }));
        }
        warn!("Connect failed: {}; retrying in {}ms", err, options.connect_retry.as_millis());
        tokio::select! {
            () = sleep(options.connect_retry) => {}
            _ = shutdown_rx.recv() => return Ok(None),
        }
    }
}

/// Serve one connected session: a writer task, the periodic metrics task and
/// the command read loop.
pub(super) async fn run_session(
    shared: &Arc<AgentShared>,
    socket: ServerSocket,
    metrics_interval: Duration,
    shutdown_rx: &mut ShutdownReceiver,
) -> AppResult<SessionEnd> {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = outbound_channel();
    let writer_handle = tokio::spawn(
        async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(err) = sink.send(Message::Text(text)).await {
                    debug!("Write to server failed: {}", err);
                    break;
                }
            }
            drop(sink.close().await);
        }
        .instrument(shared.span.clone()),
    );
    shared.attach(out_tx).await;

    let metrics_shared = Arc::clone(shared);
    let metrics_handle = tokio::spawn(
        async move {
            let mut ticker = interval(metrics_interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                metrics_shared.report_metrics().await;
            }
        }
        .instrument(shared.span.clone()),
    );

    let session_result = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(shared, text.as_bytes()).await,
                Some(Ok(Message::Binary(bytes))) => handle_frame(shared, &bytes).await,
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    info!("Server closed the connection");
                    break Ok(SessionEnd::Closed);
                }
                Some(Err(err)) => {
                    break Err(AppError::cluster(ClusterError::Websocket {
                        context: "read from server",
                        source: err,
                    }));
                }
            },
            _ = shutdown_rx.recv() => break Ok(SessionEnd::Shutdown),
        }
    };

    metrics_handle.abort();
    shared.detach().await;
    if let Err(err) = writer_handle.await {
        debug!("Writer task ended abnormally: {}", err);
    }
    session_result
}

/// Decode and act on one frame from the server. Frames that are not a
/// worker command are dropped.
pub(super) async fn handle_frame(shared: &Arc<AgentShared>, bytes: &[u8]) {
    let Some(envelope) = Envelope::decode(bytes) else {
        debug!("Dropping malformed frame from server");
        return;
    };
    match WorkerCommand::from_envelope(&envelope) {
        Some(WorkerCommand::Start(request)) => shared.start(request).await,
        Some(WorkerCommand::Stop) => shared.stop().await,
        None => debug!("Ignoring '{}' from server", envelope.kind),
    }
}
