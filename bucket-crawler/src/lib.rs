pub mod cli;
pub mod github;
pub mod index;
pub mod load_config;
pub mod queue;

pub use cli::{run, Cli, Commands};
