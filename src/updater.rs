//! The run driver: determine the starting sequence number, fetch and merge
//! change files, run the pipeline, commit the watermark, clean up.

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;

use crate::change_handler::ChangeHandler;
use crate::config::Config;
use crate::convert;
use crate::error::{Error, Result};
use crate::models::DatabaseState;
use crate::osc::merger;
use crate::replication::ReplicationClient;
use crate::sparql::client::SparqlClient;
use crate::sparql::queries::QueryWriter;
use crate::sparql::results::{QleverJson, ResultFormat, SparqlJson};
use crate::sparql::DataFetcher;
use crate::stats::RunStats;
use crate::vocab;

pub struct Updater {
    config: Config,
    stats: Arc<RunStats>,
    fetcher: DataFetcher,
    replication: Option<ReplicationClient>,
}

impl Updater {
    pub fn new(config: Config) -> Result<Self> {
        let stats = Arc::new(RunStats::default());
        let format: Box<dyn ResultFormat> = if config.qlever {
            Box::new(QleverJson)
        } else {
            Box::new(SparqlJson)
        };
        let client = SparqlClient::new(
            &config.endpoint_uri,
            &config.update_endpoint_uri,
            config.access_token.clone(),
            format.accept(),
            config.output_mode,
            config.output_file.as_deref(),
        )?;
        let fetcher = DataFetcher::new(
            client,
            format,
            QueryWriter::new(config.graph.clone()),
            config.max_values_per_query,
            config.wkt_precision,
            stats.clone(),
        );
        let replication = match &config.file_server {
            Some(server) => Some(ReplicationClient::new(server)?),
            None => None,
        };
        Ok(Updater {
            config,
            stats,
            fetcher,
            replication,
        })
    }

    pub async fn run(&self) -> Result<()> {
        self.prepare_directories()?;
        self.config.log_summary();
        self.check_osm2rdf_metadata().await;

        let latest = match self.prepare_merged_change_file().await {
            Ok(latest) => latest,
            Err(Error::AlreadyUpToDate) => {
                tracing::info!("database is already up to date, done");
                self.clear_tmp_dir()?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if self.config.bbox.is_some() || self.config.polygon_file.is_some() {
            let _timer = self.stats.phase("applying boundaries");
            tracing::info!("applying boundaries to the merged change file");
            convert::apply_boundaries(
                &self.config.merged_change_file(),
                self.config.bbox.as_deref(),
                self.config.polygon_file.as_deref(),
            )
            .await?;
        }

        let mut handler = ChangeHandler::new(&self.config, &self.fetcher, &self.stats);
        handler.run(&self.config.merged_change_file()).await?;

        if let Some(latest) = &latest {
            self.commit_watermark(latest).await?;
        }

        self.clear_tmp_dir()?;
        self.stats.report(self.config.statistics);
        tracing::info!("done");
        Ok(())
    }

    fn prepare_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config.tmp_dir)?;
        std::fs::create_dir_all(self.config.changes_dir())?;
        std::fs::create_dir_all(self.config.dummy_dir())?;
        Ok(())
    }

    /// Produce the merged change file, either from the local input directory
    /// or by downloading the outstanding range from the replication server.
    /// Returns the latest server state when one is known; the watermark is
    /// only committed in that case.
    async fn prepare_merged_change_file(&self) -> Result<Option<DatabaseState>> {
        if let Some(input_dir) = &self.config.input_dir {
            tracing::info!("merging change files from {}", input_dir.display());
            let _timer = self.stats.phase("merging change files");
            let count = merger::merge_dir(
                input_dir,
                &self.config.merged_change_file(),
                self.config.wkt_precision,
            )?;
            self.stats.set_change_files(count as u64);
            return Ok(None);
        }

        let replication = self.replication.as_ref().expect("validated by config");
        let latest = replication.latest_state().await?;
        tracing::info!("latest database state on the replication server: {latest}");

        let start = {
            let _timer = self.stats.phase("determining start sequence number");
            self.decide_start_sequence_number(&latest).await?
        };
        if start > latest.sequence_number {
            return Err(Error::AlreadyUpToDate);
        }
        tracing::info!(
            "processing sequence numbers {start} through {}",
            latest.sequence_number
        );

        {
            let _timer = self.stats.phase("fetching change files");
            self.fetch_change_files(start, latest.sequence_number).await?;
        }
        {
            let _timer = self.stats.phase("merging change files");
            merger::merge_dir(
                &self.config.changes_dir(),
                &self.config.merged_change_file(),
                self.config.wkt_precision,
            )?;
        }
        self.clear_changes_dir()?;
        Ok(Some(latest))
    }

    /// The first rule that fires wins: CLI sequence number, CLI timestamp,
    /// the endpoint's stored watermark plus one, or the latest node
    /// timestamp on the endpoint.
    async fn decide_start_sequence_number(&self, latest: &DatabaseState) -> Result<i64> {
        let replication = self.replication.as_ref().expect("validated by config");

        if let Some(sequence) = self.config.sequence_number {
            tracing::info!("starting from the given sequence number {sequence}");
            return Ok(sequence);
        }

        if let Some(timestamp) = &self.config.timestamp {
            tracing::info!("searching the database state for timestamp {timestamp}");
            let state = replication.state_for_timestamp(timestamp, latest).await?;
            tracing::info!("matching database state is {state}");
            return Ok(state.sequence_number);
        }

        if let Some(watermark) = self.fetcher.updates_complete_until().await? {
            tracing::info!("endpoint reports updates complete until {watermark}");
            return Ok(watermark + 1);
        }

        tracing::info!("no stored watermark, falling back to the latest node timestamp");
        let timestamp = self.fetcher.latest_timestamp().await?;
        tracing::info!("latest node timestamp on the endpoint is {timestamp}");
        let state = replication.state_for_timestamp(&timestamp, latest).await?;
        tracing::info!("matching database state is {state}");
        Ok(state.sequence_number)
    }

    /// Download the whole range with bounded parallelism; any failed
    /// download aborts the run.
    async fn fetch_change_files(&self, from: i64, to: i64) -> Result<()> {
        let replication = self.replication.as_ref().expect("validated by config");
        let changes_dir = self.config.changes_dir();
        let total = (to - from + 1) as u64;
        self.stats.set_change_files(total);
        tracing::info!("fetching {total} change files from the replication server");

        let mut downloads = futures_util::stream::iter(
            (from..=to).map(|sequence| replication.download_change_file(sequence, &changes_dir)),
        )
        .buffer_unordered(self.config.num_threads);

        let mut completed = 0u64;
        while let Some(result) = downloads.next().await {
            result?;
            completed += 1;
            if total > 1 && completed % 100 == 0 {
                tracing::info!("downloaded {completed}/{total} change files");
            }
        }
        Ok(())
    }

    /// Warn-only check of the osm2rdf metadata recorded in the dump.
    async fn check_osm2rdf_metadata(&self) {
        match self.fetcher.osm2rdf_version().await {
            Ok(Some(version)) => {
                tracing::info!("endpoint data was produced by osm2rdf {version}");
            }
            Ok(None) => {
                tracing::warn!(
                    "endpoint reports no osm2rdf version; make sure the dump was produced \
                     by the same converter this tool invokes"
                );
            }
            Err(e) => {
                tracing::warn!("could not verify the osm2rdf version on the endpoint: {e}");
            }
        }

        match self.fetcher.osm2rdf_options().await {
            Ok(options) if options.is_empty() => {
                tracing::warn!("endpoint reports no osm2rdf conversion options");
            }
            Ok(options) => {
                tracing::info!("endpoint records {} osm2rdf conversion options", options.len());
                for (option, value) in options {
                    tracing::debug!("osm2rdf option {option} = {value}");
                }
            }
            Err(e) => {
                tracing::warn!("could not fetch the osm2rdf options from the endpoint: {e}");
            }
        }
    }

    /// The run's commit point: replace the watermark pair. Any earlier
    /// failure leaves the previous watermark in place, so a re-run resumes
    /// from there.
    async fn commit_watermark(&self, latest: &DatabaseState) -> Result<()> {
        let writer = self.fetcher.writer();
        let prefixes = vocab::PREFIXES_FOR_METADATA.join(" ");

        for predicate in [
            vocab::META_UPDATES_COMPLETE_UNTIL,
            vocab::META_DATE_MODIFIED,
        ] {
            let update = format!("{prefixes} {}", writer.delete_metadata(predicate));
            self.stats.count_update();
            if let Err(e) = self.fetcher.client().update(&update).await {
                tracing::error!(
                    "watermark commit failed; the stored watermark still reflects the \
                     previous run"
                );
                return Err(e);
            }
        }

        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let update = format!(
            "{prefixes} {}",
            writer.insert_metadata(latest.sequence_number, &now)
        );
        self.stats.count_update();
        if let Err(e) = self.fetcher.client().update(&update).await {
            tracing::error!(
                "watermark commit failed; the stored watermark still reflects the previous run"
            );
            return Err(e);
        }
        tracing::info!("updates complete until {latest}");
        Ok(())
    }

    fn clear_changes_dir(&self) -> Result<()> {
        clear_directory(&self.config.changes_dir())
    }

    fn clear_tmp_dir(&self) -> Result<()> {
        if self.config.tmp_dir.exists() {
            std::fs::remove_dir_all(&self.config.tmp_dir)?;
        }
        Ok(())
    }
}

fn clear_directory(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
