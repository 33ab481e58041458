pub mod change_handler;
pub mod config;
pub mod convert;
pub mod dummy;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod models;
pub mod osc;
pub mod replication;
pub mod sparql;
pub mod stats;
pub mod updater;
pub mod uri;
pub mod vocab;

pub use config::{Cli, Config, ExitCode};
pub use error::{Error, Result};
pub use updater::Updater;
