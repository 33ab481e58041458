//! Read-only client for the OSM replication server: state files, compressed
//! change files, and the search for the sequence number matching a timestamp.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::DatabaseState;
use crate::models::state::normalize_timestamp;
use crate::uri;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// How many state files to inspect per round during the backward search.
const SEARCH_BATCH: i64 = 10;

static SEQUENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sequenceNumber=(\d+)").unwrap());
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"timestamp=([0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}\\?:[0-9]{2}\\?:[0-9]{2}Z)")
        .unwrap()
});

pub struct ReplicationClient {
    http: reqwest::Client,
    base: String,
}

impl ReplicationClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(ReplicationClient {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    pub async fn latest_state(&self) -> Result<DatabaseState> {
        let url = format!("{}/state.txt", self.base);
        let body = self.get(&url).await?.text().await?;
        parse_state_file(&body)
    }

    pub async fn state_for(&self, sequence_number: i64) -> Result<DatabaseState> {
        let url = format!(
            "{}/{}.state.txt",
            self.base,
            uri::sequence_path(sequence_number)?
        );
        let body = self.get(&url).await?.text().await?;
        parse_state_file(&body)
    }

    /// Download one gzipped change file into `dir`, named by its sequence
    /// number.
    pub async fn download_change_file(
        &self,
        sequence_number: i64,
        dir: &Path,
    ) -> Result<PathBuf> {
        let url = format!(
            "{}/{}.osc.gz",
            self.base,
            uri::sequence_path(sequence_number)?
        );
        let bytes = self.get(&url).await?.bytes().await?;
        let path = dir.join(format!("{sequence_number}.osc.gz"));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }

    /// Find the last state whose timestamp is not after the given one: an
    /// educated guess on the planet replication cadence first, then a
    /// backward batch scan. A 404 during the scan means the state file has
    /// been rotated away, so the search continues further back.
    pub async fn state_for_timestamp(
        &self,
        timestamp: &str,
        latest: &DatabaseState,
    ) -> Result<DatabaseState> {
        let wanted = normalize_timestamp(timestamp)
            .ok_or_else(|| Error::Parse(format!("invalid timestamp: {timestamp}")))?;
        let latest_normalized = normalize_timestamp(&latest.timestamp).ok_or_else(|| {
            Error::Parse(format!("invalid state timestamp: {}", latest.timestamp))
        })?;
        if latest_normalized <= wanted {
            return Err(Error::AlreadyUpToDate);
        }

        let not_after_wanted = |state: &DatabaseState| {
            matches!(normalize_timestamp(&state.timestamp), Some(ts) if ts <= wanted)
        };

        if let Some(guess) = self.educated_guess(&wanted, latest.sequence_number) {
            for sequence in (guess - 1)..=(guess + 1) {
                if sequence < 0 || sequence > latest.sequence_number {
                    continue;
                }
                match self.state_for(sequence).await {
                    Ok(state) if not_after_wanted(&state) => return Ok(state),
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
            tracing::info!("educated guess for the sequence number did not match, scanning");
        }

        let mut upper = latest.sequence_number;
        while upper > 0 {
            let lower = (upper - SEARCH_BATCH).max(0);
            let mut states = Vec::new();
            for sequence in lower..=upper {
                match self.state_for(sequence).await {
                    Ok(state) => states.push(state),
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e),
                }
            }
            states.sort_by(|a, b| b.sequence_number.cmp(&a.sequence_number));
            for state in states {
                if not_after_wanted(&state) {
                    return Ok(state);
                }
            }
            upper = lower;
        }

        Err(Error::Data(format!(
            "no database state found for timestamp {timestamp}"
        )))
    }

    /// Only the planet replication hierarchy has a known cadence; for any
    /// other server the guess is skipped.
    fn educated_guess(&self, timestamp: &str, latest_sequence: i64) -> Option<i64> {
        if !self.base.starts_with("https://planet.osm.org/replication/") {
            return None;
        }
        let wanted = chrono::DateTime::parse_from_rfc3339(timestamp).ok()?;
        let elapsed = Utc::now().signed_duration_since(wanted.with_timezone(&Utc));
        let sequences_since = if self.base.ends_with("day") {
            elapsed.num_days()
        } else if self.base.ends_with("hour") {
            elapsed.num_hours()
        } else if self.base.ends_with("minute") {
            elapsed.num_minutes()
        } else {
            return None;
        };
        let guess = latest_sequence - sequences_since;
        (guess > 0).then_some(guess)
    }
}

/// State files carry `sequenceNumber=N` and `timestamp=...Z` (with escaped
/// colons); everything else is ignored.
pub fn parse_state_file(body: &str) -> Result<DatabaseState> {
    let sequence_number = SEQUENCE_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .ok_or_else(|| Error::Parse(format!("state file has no sequence number: {body}")))?;
    let timestamp = TIMESTAMP_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace('\\', ""))
        .ok_or_else(|| Error::Parse(format!("state file has no timestamp: {body}")))?;
    Ok(DatabaseState {
        sequence_number,
        timestamp,
    })
}
