//! Cluster coordination over websockets: the envelope protocol, the server
//! side (registry, coordinator, notification hub) and the worker agent.
pub mod agent;
pub mod protocol;
pub mod server;

pub use agent::{AgentOptions, WorkerAgent};
pub use server::{ClusterServer, ServerOptions};
