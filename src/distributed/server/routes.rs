use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, warn};

use crate::distributed::protocol::StartLoadTestRequest;
use crate::error::AppResult;

use super::ServerContext;
use super::connections::{serve_subscriber, serve_worker};
use super::http::{
    HttpError, HttpRequest, HttpResponse, read_http_request, write_response,
    write_switching_protocols,
};

const ALLOWED_METHODS: &str = "GET, POST, DELETE, OPTIONS";

pub(super) async fn handle_connection(mut stream: TcpStream, context: Arc<ServerContext>) {
    let request = match read_http_request(&mut stream).await {
        Ok(request) => request,
        Err(err) => {
            debug!("Rejecting request: {}", err.message);
            if let Err(write_err) = write_response(&mut stream, &HttpResponse::error(&err)).await {
                debug!("Failed to write error response: {}", write_err);
            }
            return;
        }
    };

    if request.method == "GET" && request.is_websocket_upgrade() {
        match request.path() {
            "/cluster/join" => {
                let name = request.query_param("name").unwrap_or_default();
                let Some(socket) = upgrade(stream, &request).await else {
                    return;
                };
                serve_worker(socket, name, Arc::clone(&context.coordinator)).await;
                return;
            }
            "/notifications" => {
                let Some(socket) = upgrade(stream, &request).await else {
                    return;
                };
                serve_subscriber(socket, Arc::clone(&context.hub)).await;
                return;
            }
            _ => {}
        }
    }

    let response = match route(&context, &request).await {
        Ok(response) => response,
        Err(err) => {
            warn!("Failed to handle {} {}: {}", request.method, request.target, err);
            HttpResponse::text(500, "internal error")
        }
    };
    if let Err(err) = write_response(&mut stream, &response).await {
        debug!("Failed to write response: {}", err);
    }
}

async fn upgrade(mut stream: TcpStream, request: &HttpRequest) -> Option<WebSocketStream<TcpStream>> {
    let key = match request.websocket_key() {
        Ok(key) => key,
        Err(err) => {
            debug!("Rejecting websocket handshake: {}", err.message);
            let response = HttpResponse::handshake_error(&err);
            if let Err(write_err) = write_response(&mut stream, &response).await {
                debug!("Failed to write handshake rejection: {}", write_err);
            }
            return None;
        }
    };
    if let Err(err) = write_switching_protocols(&mut stream, key).await {
        warn!("Failed to upgrade websocket connection: {}", err);
        return None;
    }
    let trailing = request.trailing.clone();
    Some(WebSocketStream::from_partially_read(stream, trailing, Role::Server, None).await)
}

/// Answer a plain HTTP request.
///
/// # Errors
///
/// Returns an error if a response body cannot be serialized or a command
/// cannot be encoded.
pub(super) async fn route(context: &ServerContext, request: &HttpRequest) -> AppResult<HttpResponse> {
    let coordinator = &context.coordinator;
    let response = match (request.method.as_str(), request.path()) {
        ("OPTIONS", _) => preflight(request),
        ("POST", "/api/v1/load_test") => {
            match serde_json::from_slice::<StartLoadTestRequest>(&request.body) {
                Ok(start) => {
                    coordinator.start_load_test(&start).await?;
                    HttpResponse::text(200, "ok")
                }
                Err(err) => HttpResponse::error(&HttpError::new(400, err.to_string())),
            }
        }
        ("DELETE", "/api/v1/load_test") => {
            coordinator.stop_load_test().await?;
            HttpResponse::empty(204)
        }
        ("GET", "/api/v1/server_info") => HttpResponse::json(200, &coordinator.server_info().await)?,
        ("GET", "/api/v1/worker_info") => HttpResponse::json(200, &coordinator.workers_info().await)?,
        ("GET", "/healthz") => HttpResponse::text(200, "ok"),
        _ => HttpResponse::error(&HttpError::new(404, "not found")),
    };
    Ok(response)
}

fn preflight(request: &HttpRequest) -> HttpResponse {
    let response = HttpResponse::empty(204);
    if request.header("access-control-request-method").is_none() {
        return response;
    }
    response
        .with_header("Access-Control-Allow-Methods", ALLOWED_METHODS)
        .with_header("Access-Control-Allow-Headers", "*")
}
