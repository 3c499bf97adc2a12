pub mod config;
pub mod runtime;

pub use config::MachineConfig;
pub use runtime::machine::{Machine, RunState};
