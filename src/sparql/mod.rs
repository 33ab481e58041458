pub mod client;
pub mod fetcher;
pub mod queries;
pub mod results;

pub use client::{OutputMode, SparqlClient};
pub use fetcher::DataFetcher;
pub use queries::QueryWriter;
