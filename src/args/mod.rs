//! CLI argument types and parsing helpers.
mod cli;
mod defaults;
mod parsers;


pub use cli::{Command, ServerArgs, TerjangArgs, WorkerArgs};
