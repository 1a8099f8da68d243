use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Bind error on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid server address '{addr}': {source}")]
    InvalidServerAddress {
        addr: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Gave up connecting to {url} after {attempts} attempts: {source}")]
    ConnectAttemptsExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("Connect attempts must be >= 1.")]
    NoConnectAttempts,
    #[error("Websocket error during {context}: {source}")]
    Websocket {
        context: &'static str,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("Serialization error during {context}: {source}")]
    Serialize {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
