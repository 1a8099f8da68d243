//! Configuration loading and application.
mod apply;
mod loader;
pub mod types;


pub use apply::{apply_server_config, apply_worker_config};
pub use loader::{DEFAULT_CONFIG_FILES, load_config, load_config_file, load_config_in};
