mod app;
mod attack;
mod cluster;
mod config;
mod validation;

#[cfg(test)]
mod test_support;

pub use app::{AppError, AppResult};
pub use attack::AttackError;
pub use cluster::ClusterError;
pub use config::ConfigError;
pub use validation::ValidationError;
