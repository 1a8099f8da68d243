use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// Sender half feeding a connection's writer task. Each queued string is
/// written as one text frame.
pub type Outbound = mpsc::Sender<String>;

/// Frames queued per connection before a fan-out counts it as undelivered.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Bounded queue between a connection's producers and its writer task.
#[must_use]
pub fn outbound_channel() -> (Outbound, mpsc::Receiver<String>) {
    mpsc::channel(OUTBOUND_QUEUE_CAPACITY)
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of a best-effort fan-out. Undelivered messages are not retried
/// and do not unregister the connection. A full queue counts as undelivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub attempted: usize,
    pub undelivered: usize,
}

impl BroadcastOutcome {
    #[must_use]
    pub const fn delivered(&self) -> usize {
        self.attempted.saturating_sub(self.undelivered)
    }
}

pub(crate) fn fan_out<'conn, I>(connections: I, message: &str) -> BroadcastOutcome
where
    I: IntoIterator<Item = &'conn Outbound>,
{
    let mut outcome = BroadcastOutcome::default();
    for outbound in connections {
        outcome.attempted = outcome.attempted.saturating_add(1);
        if outbound.try_send(message.to_owned()).is_err() {
            outcome.undelivered = outcome.undelivered.saturating_add(1);
        }
    }
    outcome
}

pub(crate) type ConnectionTable<T> = HashMap<ConnectionId, T>;
