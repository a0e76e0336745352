//! Interactive command line client for a Moyeo room.

mod command;
mod config;
mod error;
mod formatter;
mod runner;

pub use config::Args;
pub use error::CliError;
pub use runner::run_client;
