use thiserror::Error;

/// Error taxonomy for a sync run. Everything except `AlreadyUpToDate` aborts
/// the run with the watermark left unchanged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("endpoint returned inconsistent data: {0}")]
    Data(String),

    #[error("classification invariant violated: {0}")]
    Integrity(String),

    #[error("external command failed: {0}")]
    Command(String),

    #[error("database is already up to date")]
    AlreadyUpToDate,
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Parse(format!("xml: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(format!("json: {e}"))
    }
}

impl Error {
    /// True for a 404 response, which the timestamp search treats as "keep
    /// looking further back".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::HttpStatus { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
