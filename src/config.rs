//! CLI surface, validated run configuration and exit codes.

use std::path::PathBuf;

use clap::Parser;

use crate::sparql::OutputMode;

pub const DEFAULT_WKT_PRECISION: u8 = 7;

/// Exit codes beyond plain success/failure, one per argument-validation
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    UnknownArgument = 3,
    IncorrectArguments = 11,
    EndpointUriMissing = 12,
    EndpointUriInvalid = 13,
    EndpointUpdateUriInvalid = 14,
    GraphUriInvalid = 15,
    InputNotExists = 16,
    InputIsNotDirectory = 17,
    PolygonFileNotExists = 18,
    BboxInvalid = 19,
}

#[derive(Debug, Parser)]
#[command(
    name = "osm-rdf-sync",
    about = "Keeps an osm2rdf knowledge graph synchronized with OSM change files."
)]
pub struct Cli {
    /// URI of the SPARQL endpoint to update.
    pub endpoint_uri: String,

    /// URI of the graph to update.
    #[arg(short, long)]
    pub graph: Option<String>,

    /// Access token for the SPARQL endpoint.
    #[arg(short, long)]
    pub access_token: Option<String>,

    /// Separate URI for SPARQL updates; defaults to the endpoint URI.
    #[arg(short = 'u', long)]
    pub endpoint_uri_updates: Option<String>,

    /// Local directory with the change files to process.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Base URI of the replication server to download change files from.
    #[arg(short, long)]
    pub file_server: Option<String>,

    /// Write SPARQL updates to this file instead of sending them.
    #[arg(short = 'o', long, value_name = "FILE")]
    pub sparql_output: Option<PathBuf>,

    /// With --sparql-output: also send the queries and record responses.
    #[arg(short, long)]
    pub debug: bool,

    /// Start from the database state matching this timestamp.
    #[arg(short, long)]
    pub timestamp: Option<String>,

    /// Start from this replication sequence number.
    #[arg(short, long)]
    pub sequence_number: Option<i64>,

    /// Maximum number of triples per update query.
    #[arg(short, long, default_value_t = 64)]
    pub batch_size: usize,

    /// Maximum number of VALUES per select query.
    #[arg(long, default_value_t = 250)]
    pub max_values_per_query: usize,

    /// Number of decimal places node coordinates are normalized to.
    #[arg(short, long, default_value_t = DEFAULT_WKT_PRECISION)]
    pub wkt_precision: u8,

    /// Number of parallel change-file downloads.
    #[arg(long)]
    pub num_threads: Option<usize>,

    /// The endpoint is a QLever instance.
    #[arg(short, long)]
    pub qlever: bool,

    /// Print detailed statistics at the end of the run.
    #[arg(long)]
    pub statistics: bool,

    /// Restrict updates to this bounding box (left,bottom,right,top).
    #[arg(long)]
    pub bbox: Option<String>,

    /// Restrict updates to the polygon in this file.
    #[arg(long)]
    pub polygon_file: Option<PathBuf>,

    /// Path of the osm2rdf binary.
    #[arg(long, default_value = "osm2rdf")]
    pub osm2rdf_binary: String,
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint_uri: String,
    pub update_endpoint_uri: String,
    pub graph: Option<String>,
    pub access_token: Option<String>,
    pub input_dir: Option<PathBuf>,
    pub file_server: Option<String>,
    pub output_mode: OutputMode,
    pub output_file: Option<PathBuf>,
    pub timestamp: Option<String>,
    pub sequence_number: Option<i64>,
    pub batch_size: usize,
    pub max_values_per_query: usize,
    pub wkt_precision: u8,
    pub num_threads: usize,
    pub qlever: bool,
    pub statistics: bool,
    pub bbox: Option<String>,
    pub polygon_file: Option<PathBuf>,
    pub osm2rdf_binary: String,
    pub tmp_dir: PathBuf,
}

impl Config {
    /// Validate the CLI arguments. On failure returns the exit code to use
    /// together with the message to print.
    pub fn from_cli(cli: Cli) -> Result<Config, (ExitCode, String)> {
        if !is_valid_uri(&cli.endpoint_uri) {
            return Err((
                ExitCode::EndpointUriInvalid,
                format!("SPARQL endpoint URI is not valid: {}", cli.endpoint_uri),
            ));
        }

        if cli.input.is_some() == cli.file_server.is_some() {
            return Err((
                ExitCode::IncorrectArguments,
                "either a directory with change files (--input) or a replication server \
                 (--file-server) must be given, but not both"
                    .to_string(),
            ));
        }

        if let Some(input) = &cli.input {
            if !input.exists() {
                return Err((
                    ExitCode::InputNotExists,
                    format!("input does not exist: {}", input.display()),
                ));
            }
            if !input.is_dir() {
                return Err((
                    ExitCode::InputIsNotDirectory,
                    format!("input is not a directory: {}", input.display()),
                ));
            }
        }

        if let Some(server) = &cli.file_server {
            if !is_valid_uri(server) {
                return Err((
                    ExitCode::EndpointUriInvalid,
                    format!("replication server URI is not valid: {server}"),
                ));
            }
        }

        let update_endpoint_uri = match &cli.endpoint_uri_updates {
            Some(uri) if !is_valid_uri(uri) => {
                return Err((
                    ExitCode::EndpointUpdateUriInvalid,
                    format!("URI for SPARQL updates is not valid: {uri}"),
                ));
            }
            Some(uri) => uri.clone(),
            None => cli.endpoint_uri.clone(),
        };

        if let Some(graph) = &cli.graph {
            if !is_valid_uri(graph) {
                return Err((
                    ExitCode::GraphUriInvalid,
                    format!("URI for the SPARQL graph is not valid: {graph}"),
                ));
            }
        }

        if let Some(bbox) = &cli.bbox {
            if !is_valid_bbox(bbox) {
                return Err((
                    ExitCode::BboxInvalid,
                    format!("bounding box is not valid: {bbox}"),
                ));
            }
        }

        if let Some(polygon) = &cli.polygon_file {
            if !polygon.is_file() {
                return Err((
                    ExitCode::PolygonFileNotExists,
                    format!("polygon file does not exist: {}", polygon.display()),
                ));
            }
        }

        let output_mode = match (&cli.sparql_output, cli.debug) {
            (None, _) => OutputMode::Endpoint,
            (Some(_), false) => OutputMode::File,
            (Some(_), true) => OutputMode::DebugFile,
        };

        Ok(Config {
            endpoint_uri: cli.endpoint_uri,
            update_endpoint_uri,
            graph: cli.graph,
            access_token: cli.access_token,
            input_dir: cli.input,
            file_server: cli.file_server,
            output_mode,
            output_file: cli.sparql_output,
            timestamp: cli.timestamp,
            sequence_number: cli.sequence_number,
            batch_size: cli.batch_size.max(1),
            max_values_per_query: cli.max_values_per_query.max(1),
            wkt_precision: cli.wkt_precision,
            num_threads: cli.num_threads.unwrap_or_else(num_cpus::get).max(1),
            qlever: cli.qlever,
            statistics: cli.statistics,
            bbox: cli.bbox,
            polygon_file: cli.polygon_file,
            osm2rdf_binary: cli.osm2rdf_binary,
            tmp_dir: PathBuf::from("tmp"),
        })
    }

    pub fn changes_dir(&self) -> PathBuf {
        self.tmp_dir.join("changes")
    }

    pub fn dummy_dir(&self) -> PathBuf {
        self.tmp_dir.join("dummy")
    }

    pub fn merged_change_file(&self) -> PathBuf {
        self.tmp_dir.join("changes.osc")
    }

    pub fn converter_input(&self) -> PathBuf {
        self.tmp_dir.join("input.osm")
    }

    pub fn converter_output(&self) -> PathBuf {
        self.tmp_dir.join("output.ttl")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.tmp_dir.join("scratch")
    }

    /// Log the effective configuration, one line per setting that matters.
    pub fn log_summary(&self) {
        tracing::info!("SPARQL endpoint: {}", self.endpoint_uri);
        if self.update_endpoint_uri != self.endpoint_uri {
            tracing::info!("SPARQL update endpoint: {}", self.update_endpoint_uri);
        }
        if self.qlever {
            tracing::info!("endpoint is treated as a QLever instance");
        }
        if let Some(graph) = &self.graph {
            tracing::info!("SPARQL graph: {graph}");
        }
        match (&self.input_dir, &self.file_server) {
            (Some(dir), _) => tracing::info!("input: {}", dir.display()),
            (None, Some(server)) => tracing::info!("replication server: {server}"),
            _ => {}
        }
        if let Some(sequence) = self.sequence_number {
            tracing::info!("start sequence number: {sequence}");
        } else if let Some(timestamp) = &self.timestamp {
            tracing::info!("start timestamp: {timestamp}");
        }
        if let Some(output) = &self.output_file {
            tracing::info!("SPARQL output file: {}", output.display());
        }
        if self.wkt_precision != DEFAULT_WKT_PRECISION {
            tracing::info!("WKT precision: {}", self.wkt_precision);
        }
    }
}

fn is_valid_uri(uri: &str) -> bool {
    reqwest::Url::parse(uri).is_ok()
}

fn is_valid_bbox(bbox: &str) -> bool {
    let parts: Vec<&str> = bbox.split(',').collect();
    parts.len() == 4 && parts.iter().all(|p| p.trim().parse::<f64>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli(extra: &[&str]) -> Cli {
        let mut args = vec!["osm-rdf-sync", "http://localhost:7015/"];
        args.extend_from_slice(extra);
        Cli::parse_from(args)
    }

    #[test]
    fn requires_exactly_one_input_source() {
        let err = Config::from_cli(base_cli(&[])).unwrap_err();
        assert_eq!(err.0, ExitCode::IncorrectArguments);

        let dir = tempfile::tempdir().unwrap();
        let both = base_cli(&[
            "--input",
            dir.path().to_str().unwrap(),
            "--file-server",
            "https://planet.osm.org/replication/minute/",
        ]);
        assert_eq!(
            Config::from_cli(both).unwrap_err().0,
            ExitCode::IncorrectArguments
        );

        let ok = base_cli(&["--input", dir.path().to_str().unwrap()]);
        assert!(Config::from_cli(ok).is_ok());
    }

    #[test]
    fn rejects_invalid_uris() {
        let cli = Cli::parse_from(["osm-rdf-sync", "not a uri"]);
        assert_eq!(
            Config::from_cli(cli).unwrap_err().0,
            ExitCode::EndpointUriInvalid
        );

        let dir = tempfile::tempdir().unwrap();
        let cli = base_cli(&[
            "--input",
            dir.path().to_str().unwrap(),
            "--graph",
            "::::",
        ]);
        assert_eq!(
            Config::from_cli(cli).unwrap_err().0,
            ExitCode::GraphUriInvalid
        );
    }

    #[test]
    fn validates_bbox_shape() {
        let dir = tempfile::tempdir().unwrap();
        let cli = base_cli(&[
            "--input",
            dir.path().to_str().unwrap(),
            "--bbox",
            "7.5,47.8,8.0",
        ]);
        assert_eq!(Config::from_cli(cli).unwrap_err().0, ExitCode::BboxInvalid);

        let cli = base_cli(&[
            "--input",
            dir.path().to_str().unwrap(),
            "--bbox",
            "7.5,47.8,8.0,48.1",
        ]);
        assert!(Config::from_cli(cli).is_ok());
    }

    #[test]
    fn output_mode_follows_flags() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().to_str().unwrap().to_string();

        let cli = base_cli(&["--input", &input]);
        assert_eq!(
            Config::from_cli(cli).unwrap().output_mode,
            OutputMode::Endpoint
        );

        let cli = base_cli(&["--input", &input, "--sparql-output", "out.sparql"]);
        assert_eq!(Config::from_cli(cli).unwrap().output_mode, OutputMode::File);

        let cli = base_cli(&[
            "--input",
            &input,
            "--sparql-output",
            "out.sparql",
            "--debug",
        ]);
        assert_eq!(
            Config::from_cli(cli).unwrap().output_mode,
            OutputMode::DebugFile
        );
    }

    #[test]
    fn update_endpoint_defaults_to_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let cli = base_cli(&["--input", dir.path().to_str().unwrap()]);
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.update_endpoint_uri, config.endpoint_uri);
    }

    #[test]
    fn wkt_precision_defaults_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().to_str().unwrap().to_string();

        let cli = base_cli(&["--input", &input]);
        assert_eq!(
            Config::from_cli(cli).unwrap().wkt_precision,
            DEFAULT_WKT_PRECISION
        );

        let cli = base_cli(&["--input", &input, "--wkt-precision", "5"]);
        assert_eq!(Config::from_cli(cli).unwrap().wkt_precision, 5);
    }
}
