//! CLI module - argument parsing and command runners

pub mod args;
pub mod fit;
pub mod score;
pub mod simulate;

pub use args::{BatchArgs, Cli, Commands, SimulateArgs};
pub use fit::run_fit;
pub use score::run_score;
pub use simulate::run_simulate;
