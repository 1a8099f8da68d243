//! Paced HTTP request execution.
mod attacker;
mod rate;
mod target;


pub use attacker::{AttackResult, AttackRun, AttackStopper, Attacker, AttackerOptions};
pub use rate::Pacer;
pub use target::Target;

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("terjang/", env!("CARGO_PKG_VERSION"));
