//! HTTP transport for SPARQL queries and updates, with the three output
//! modes: post to the endpoint, write updates to a file, or write everything
//! (queries and responses) to a file while also posting.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};

pub const ACCEPT_SPARQL_JSON: &str = "application/sparql-results+json";
pub const ACCEPT_QLEVER_JSON: &str = "application/qlever-results+json";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Endpoint,
    File,
    DebugFile,
}

pub struct SparqlClient {
    http: reqwest::Client,
    endpoint: String,
    update_endpoint: String,
    access_token: Option<String>,
    accept: &'static str,
    output: OutputMode,
    output_file: Option<Mutex<File>>,
}

impl SparqlClient {
    pub fn new(
        endpoint: &str,
        update_endpoint: &str,
        access_token: Option<String>,
        accept: &'static str,
        output: OutputMode,
        output_path: Option<&Path>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let output_file = match (output, output_path) {
            (OutputMode::Endpoint, _) => None,
            (_, Some(path)) => Some(Mutex::new(
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)?,
            )),
            (_, None) => {
                return Err(Error::Config(
                    "file output mode requires an output path".into(),
                ));
            }
        };

        Ok(SparqlClient {
            http,
            endpoint: endpoint.to_string(),
            update_endpoint: update_endpoint.to_string(),
            access_token,
            accept,
            output,
            output_file,
        })
    }

    /// POST a SELECT query and return the raw response body.
    pub async fn select(&self, query: &str) -> Result<String> {
        if self.output == OutputMode::DebugFile {
            self.append_to_file(query)?;
        }
        let body = format!("query={}", urlencoding::encode(query));
        let response = self.post(&self.endpoint, body).await?;
        if self.output == OutputMode::DebugFile {
            self.append_to_file(&response)?;
        }
        Ok(response)
    }

    /// Send a SPARQL update, or append it to the output file depending on
    /// the output mode.
    pub async fn update(&self, update: &str) -> Result<()> {
        match self.output {
            OutputMode::Endpoint => {
                let body = format!("update={}", urlencoding::encode(update));
                self.post(&self.update_endpoint, body).await?;
            }
            OutputMode::File => {
                self.append_to_file(update)?;
            }
            OutputMode::DebugFile => {
                self.append_to_file(update)?;
                let body = format!("update={}", urlencoding::encode(update));
                let response = self.post(&self.update_endpoint, body).await?;
                self.append_to_file(&response)?;
            }
        }
        Ok(())
    }

    async fn post(&self, url: &str, body: String) -> Result<String> {
        let mut request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(reqwest::header::ACCEPT, self.accept)
            .body(body);
        if let Some(token) = &self.access_token {
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {token}"),
            );
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    fn append_to_file(&self, entry: &str) -> Result<()> {
        if let Some(file) = &self.output_file {
            let mut file = file.lock().unwrap();
            writeln!(file, "{entry}")?;
            writeln!(file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_mode_appends_updates_without_posting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updates.sparql");
        let client = SparqlClient::new(
            "http://localhost:1/never-contacted",
            "http://localhost:1/never-contacted",
            None,
            ACCEPT_SPARQL_JSON,
            OutputMode::File,
            Some(&path),
        )
        .unwrap();

        client.update("INSERT DATA { osmnode:1 osmkey:name \"x\" . }")
            .await
            .unwrap();
        client.update("DELETE { ?s ?p ?o . } WHERE { ?s ?p ?o . }")
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<&str> = written.split("\n\n").filter(|e| !e.is_empty()).collect();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].starts_with("INSERT DATA"));
        assert!(entries[1].starts_with("DELETE"));
    }

    #[test]
    fn file_mode_requires_a_path() {
        let result = SparqlClient::new(
            "http://localhost:1/",
            "http://localhost:1/",
            None,
            ACCEPT_SPARQL_JSON,
            OutputMode::File,
            None,
        );
        assert!(result.is_err());
    }
}
