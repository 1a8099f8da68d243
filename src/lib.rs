//! Core library for the `terjang` CLI.
//!
//! A `terjang server` coordinates any number of `terjang worker` processes
//! over websockets: it relays load-test commands to every joined worker,
//! tracks their state and metrics, derives a cluster state, and pushes the
//! aggregated view to observers. Workers generate constant-rate HTTP load
//! and report vegeta-style metrics back.
pub mod args;
pub mod config;
pub mod distributed;
pub mod entry;
pub mod error;
pub mod http;
pub mod logger;
pub mod metrics;
pub mod shutdown;
pub mod shutdown_handlers;

#[cfg(test)]
mod test_support;
