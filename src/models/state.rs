use std::cmp::Ordering;
use std::fmt;

/// A replication-server database state: the sequence number of a change file
/// and the instant it covers. Totally ordered by sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseState {
    pub sequence_number: i64,
    pub timestamp: String,
}

impl Ord for DatabaseState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence_number.cmp(&other.sequence_number)
    }
}

impl PartialOrd for DatabaseState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DatabaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.sequence_number, self.timestamp)
    }
}

/// Normalize an ISO-8601 timestamp to second precision in UTC
/// (`YYYY-MM-DDTHH:MM:SSZ`) so that endpoint-stored and replication-server
/// timestamps compare lexicographically.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let cleaned = raw.replace('\\', "");
    let parsed = chrono::DateTime::parse_from_rfc3339(&cleaned).ok()?;
    Some(
        parsed
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string(),
    )
}
