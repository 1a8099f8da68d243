use std::collections::HashMap;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::error::{AppError, AppResult, ClusterError};

const MAX_REQUEST_BYTES: usize = 1024 * 1024;
const WEBSOCKET_VERSION: &str = "13";
/// Base64 length of the 16-byte handshake nonce.
const WEBSOCKET_KEY_LEN: usize = 24;

pub(super) struct HttpRequest {
    pub(super) method: String,
    pub(super) target: String,
    pub(super) headers: HashMap<String, String>,
    pub(super) body: Vec<u8>,
    /// Bytes read past the declared body; handed to the websocket layer on
    /// upgrade.
    pub(super) trailing: Vec<u8>,
}

impl HttpRequest {
    pub(super) fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    pub(super) fn query_param(&self, key: &str) -> Option<String> {
        let (_, query) = self.target.split_once('?')?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    pub(super) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub(super) fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    }

    /// Validate the client side of the websocket handshake and return the
    /// `Sec-WebSocket-Key` to answer.
    pub(super) fn websocket_key(&self) -> Result<&str, HttpError> {
        let connection_upgrade = self.header("connection").is_some_and(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        if !connection_upgrade {
            return Err(HttpError::new(400, "Missing 'Connection: Upgrade'"));
        }
        if self.header("sec-websocket-version") != Some(WEBSOCKET_VERSION) {
            return Err(HttpError::new(426, "Unsupported websocket version"));
        }
        match self.header("sec-websocket-key") {
            Some(key) if key.len() == WEBSOCKET_KEY_LEN => Ok(key),
            Some(_) | None => Err(HttpError::new(400, "Invalid 'Sec-WebSocket-Key'")),
        }
    }
}

#[derive(Debug)]
pub(super) struct HttpError {
    pub(super) status: u16,
    pub(super) message: String,
}

impl HttpError {
    pub(super) fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

pub(super) async fn read_http_request<S>(socket: &mut S) -> Result<HttpRequest, HttpError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let header_end;

    loop {
        let bytes = socket
            .read(&mut chunk)
            .await
            .map_err(|err| HttpError::new(400, format!("Failed to read request: {}", err)))?;
        if bytes == 0 {
            return Err(HttpError::new(400, "Empty request"));
        }
        let read_slice = chunk
            .get(..bytes)
            .ok_or_else(|| HttpError::new(400, "Invalid read length"))?;
        buffer.extend_from_slice(read_slice);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(HttpError::new(413, "Request too large"));
        }
        if let Some(pos) = find_header_end(&buffer) {
            header_end = pos;
            break;
        }
    }

    let header_bytes = buffer
        .get(..header_end)
        .ok_or_else(|| HttpError::new(400, "Malformed request headers"))?;
    let header_text = std::str::from_utf8(header_bytes)
        .map_err(|err| HttpError::new(400, format!("Invalid request encoding: {}", err)))?;
    let mut lines = header_text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| HttpError::new(400, "Missing request line"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| HttpError::new(400, "Missing HTTP method"))?;
    let target = parts
        .next()
        .ok_or_else(|| HttpError::new(400, "Missing request path"))?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(HttpError::new(400, "Malformed header"));
        };
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Err(HttpError::new(413, "Request body too large"));
    }
    let body_start = header_end
        .checked_add(4)
        .ok_or_else(|| HttpError::new(400, "Malformed request headers"))?;
    let mut body = buffer.get(body_start..).unwrap_or_default().to_vec();
    while body.len() < content_length {
        let bytes = socket
            .read(&mut chunk)
            .await
            .map_err(|err| HttpError::new(400, format!("Failed to read body: {}", err)))?;
        if bytes == 0 {
            break;
        }
        let read_slice = chunk
            .get(..bytes)
            .ok_or_else(|| HttpError::new(400, "Invalid read length"))?;
        body.extend_from_slice(read_slice);
    }
    let trailing = if body.len() > content_length {
        body.split_off(content_length)
    } else {
        Vec::new()
    };

    Ok(HttpRequest {
        method: method.to_owned(),
        target: target.to_owned(),
        headers,
        body,
        trailing,
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

const fn status_text(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct HttpResponse {
    pub(super) status: u16,
    pub(super) content_type: Option<&'static str>,
    pub(super) headers: Vec<(&'static str, &'static str)>,
    pub(super) body: Vec<u8>,
}

impl HttpResponse {
    pub(super) fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub(super) fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8"),
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    pub(super) fn json<T>(status: u16, value: &T) -> AppResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(value).map_err(|err| {
            AppError::cluster(ClusterError::Serialize {
                context: "http response",
                source: err,
            })
        })?;
        Ok(Self {
            status,
            content_type: Some("application/json"),
            headers: Vec::new(),
            body,
        })
    }

    pub(super) fn error(error: &HttpError) -> Self {
        Self::text(error.status, &error.message)
    }

    /// Rejection of a websocket handshake; a version mismatch advertises the
    /// supported version.
    pub(super) fn handshake_error(error: &HttpError) -> Self {
        let response = Self::error(error);
        if error.status == 426 {
            return response.with_header("Sec-WebSocket-Version", WEBSOCKET_VERSION);
        }
        response
    }

    pub(super) fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }
}

pub(super) async fn write_response<S>(socket: &mut S, response: &HttpResponse) -> AppResult<()>
where
    S: AsyncWrite + Unpin,
{
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        status_text(response.status),
        response.body.len()
    );
    if let Some(content_type) = response.content_type {
        head.push_str("Content-Type: ");
        head.push_str(content_type);
        head.push_str("\r\n");
    }
    for (name, value) in &response.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    socket.write_all(head.as_bytes()).await.map_err(|err| {
        AppError::cluster(ClusterError::Io {
            context: "write http response",
            source: err,
        })
    })?;
    socket.write_all(&response.body).await.map_err(|err| {
        AppError::cluster(ClusterError::Io {
            context: "write http response body",
            source: err,
        })
    })?;
    socket.flush().await.map_err(|err| {
        AppError::cluster(ClusterError::Io {
            context: "flush http response",
            source: err,
        })
    })?;
    Ok(())
}

/// Complete the websocket handshake for a validated `Sec-WebSocket-Key`.
pub(super) async fn write_switching_protocols<S>(socket: &mut S, key: &str) -> AppResult<()>
where
    S: AsyncWrite + Unpin,
{
    let accept = derive_accept_key(key.as_bytes());
    let head = format!(
        "HTTP/1.1 101 {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        status_text(101),
        accept
    );
    socket.write_all(head.as_bytes()).await.map_err(|err| {
        AppError::cluster(ClusterError::Io {
            context: "write websocket handshake",
            source: err,
        })
    })?;
    socket.flush().await.map_err(|err| {
        AppError::cluster(ClusterError::Io {
            context: "flush websocket handshake",
            source: err,
        })
    })?;
    Ok(())
}
