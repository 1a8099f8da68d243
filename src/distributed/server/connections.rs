use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use futures_util::stream::SplitSink;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::coordinator::Coordinator;
use super::hub::NotificationHub;
use super::outbound::outbound_channel;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

fn spawn_writer(mut sink: WsSink, mut out_rx: mpsc::Receiver<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(err) = sink.send(Message::Text(text)).await {
                debug!("Websocket write failed: {}", err);
                break;
            }
        }
        drop(sink.close().await);
    })
}

/// Serve one worker connection until it closes.
pub(super) async fn serve_worker(
    socket: WebSocketStream<TcpStream>,
    name: String,
    coordinator: Arc<Coordinator>,
) {
    let (sink, mut stream) = socket.split();
    let (out_tx, out_rx) = outbound_channel();
    let writer = spawn_writer(sink, out_rx);

    let registry = Arc::clone(coordinator.registry());
    let connection = registry.add_worker(out_tx, name).await;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => registry.handle_inbound(connection, text.as_bytes()).await,
            Ok(Message::Binary(bytes)) => registry.handle_inbound(connection, &bytes).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(err) => {
                debug!("Worker {} read failed: {}", connection, err);
                break;
            }
        }
    }

    coordinator.worker_disconnected(connection).await;
    writer.abort();
}

/// Serve one observer connection. Inbound traffic only keeps the
/// connection alive.
pub(super) async fn serve_subscriber(socket: WebSocketStream<TcpStream>, hub: Arc<NotificationHub>) {
    let (sink, mut stream) = socket.split();
    let (out_tx, out_rx) = outbound_channel();
    let writer = spawn_writer(sink, out_rx);

    let connection = hub.add_subscriber(out_tx).await;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(Message::Text(_) | Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
        }
    }

    hub.remove_subscriber(connection).await;
    writer.abort();
}
