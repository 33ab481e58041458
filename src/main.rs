use clap::Parser;
use tracing_subscriber::EnvFilter;

use osm_rdf_sync::config::{Cli, Config, ExitCode};
use osm_rdf_sync::updater::Updater;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("osm_rdf_sync=info")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Let clap render help and version normally; anything else is an
            // argument error.
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::Success
                }
                clap::error::ErrorKind::MissingRequiredArgument => ExitCode::EndpointUriMissing,
                _ => ExitCode::UnknownArgument,
            };
            let _ = e.print();
            std::process::exit(code as i32);
        }
    };

    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err((code, message)) => {
            eprintln!("{message}");
            std::process::exit(code as i32);
        }
    };

    let updater = match Updater::new(config) {
        Ok(updater) => updater,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(ExitCode::Failure as i32);
        }
    };

    if let Err(e) = updater.run().await {
        tracing::error!("update run aborted: {e}");
        std::process::exit(ExitCode::Failure as i32);
    }
}
