//! Invocation of the external `osm2rdf` converter: one OSM XML file in, one
//! turtle file out.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Converter {
    binary: String,
    scratch_dir: PathBuf,
}

impl Converter {
    pub fn new(binary: &str, scratch_dir: &Path) -> Self {
        Converter {
            binary: binary.to_string(),
            scratch_dir: scratch_dir.to_path_buf(),
        }
    }

    /// Run the converter over `input`, producing `output`. The converter is a
    /// black box; only its exit status is inspected.
    pub async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.scratch_dir)?;

        let status = tokio::process::Command::new(&self.binary)
            .arg(input)
            .arg("-o")
            .arg(output)
            .arg("-t")
            .arg(&self.scratch_dir)
            .arg("--output-no-compress")
            .status()
            .await
            .map_err(|e| Error::Command(format!("failed to run {}: {e}", self.binary)))?;

        if !status.success() {
            return Err(Error::Command(format!(
                "{} exited with {status} for input {}",
                self.binary,
                input.display()
            )));
        }
        if !output.exists() {
            return Err(Error::Command(format!(
                "{} produced no output at {}",
                self.binary,
                output.display()
            )));
        }
        Ok(())
    }
}

/// Run `osmium extract` over the merged change file, restricting it to a
/// bounding box or polygon. The smart strategy keeps whole ways and
/// multipolygons that intersect the boundary.
pub async fn apply_boundaries(
    merged: &Path,
    bbox: Option<&str>,
    polygon_file: Option<&Path>,
) -> Result<()> {
    let extracted = merged.with_extension("extract.osc.gz");

    let mut command = tokio::process::Command::new("osmium");
    command.arg("extract").arg(merged);
    match (bbox, polygon_file) {
        (Some(bbox), _) => {
            command.arg("--bbox").arg(bbox);
        }
        (None, Some(polygon)) => {
            command.arg("--polygon").arg(polygon);
        }
        (None, None) => {
            return Err(Error::Config(
                "no bounding box or polygon file specified".into(),
            ));
        }
    }
    command
        .arg("-o")
        .arg(&extracted)
        .arg("--overwrite")
        .arg("-s")
        .arg("smart")
        .arg("--no-progress");

    let status = command
        .status()
        .await
        .map_err(|e| Error::Command(format!("failed to run osmium extract: {e}")))?;
    if !status.success() {
        return Err(Error::Command(format!("osmium extract exited with {status}")));
    }

    std::fs::rename(&extracted, merged)?;
    Ok(())
}
