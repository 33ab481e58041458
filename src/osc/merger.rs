//! Merges N change files into one canonical document with per-(kind, id)
//! latest-wins semantics.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{ChangeAction, OsmKind, OsmObject};
use crate::osc::reader;

/// Merge every regular file in `dir` into a single change file at `out`.
/// Returns the number of input files. Any malformed input aborts the merge
/// and no output is left behind.
pub fn merge_dir(dir: &Path, out: &Path, wkt_precision: u8) -> Result<usize> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    inputs.sort();

    if inputs.is_empty() {
        return Err(Error::Config(format!(
            "no change files found for merging in {}",
            dir.display()
        )));
    }

    merge_files(&inputs, out, wkt_precision)?;
    Ok(inputs.len())
}

/// Merge the given change files into `out`. Progress is reported once per
/// input file, suppressed when there is only one.
pub fn merge_files(inputs: &[PathBuf], out: &Path, wkt_precision: u8) -> Result<()> {
    let show_progress = inputs.len() > 1;
    let mut objects = Vec::new();
    for (index, input) in inputs.iter().enumerate() {
        let result = reader::read_osc(input, wkt_precision);
        let parsed = match result {
            Ok(parsed) => parsed,
            Err(e) => {
                let _ = std::fs::remove_file(out);
                return Err(Error::Parse(format!(
                    "change file {} is malformed: {e}",
                    input.display()
                )));
            }
        };
        objects.extend(parsed);
        if show_progress {
            tracing::info!("merged change file {}/{}", index + 1, inputs.len());
        }
    }

    canonical_sort(&mut objects);
    objects.dedup_by(|later, first| later.kind() == first.kind() && later.id() == first.id());
    write_osc(&objects, out)
}

/// The canonical change ordering: (kind, sign(id), |id|, version descending,
/// deleted flag, timestamp descending when both sides have one). After this
/// sort the first record per (kind, id) is the surviving one.
pub fn canonical_sort(objects: &mut [OsmObject]) {
    objects.sort_by(|a, b| {
        let key_a = (kind_rank(a.kind()), a.id() >= 0, a.id().unsigned_abs());
        let key_b = (kind_rank(b.kind()), b.id() >= 0, b.id().unsigned_abs());
        key_a
            .cmp(&key_b)
            .then_with(|| b.meta().version.cmp(&a.meta().version))
            .then_with(|| b.meta().deleted.cmp(&a.meta().deleted))
            .then_with(|| match (&a.meta().timestamp, &b.meta().timestamp) {
                (Some(ts_a), Some(ts_b)) => ts_b.cmp(ts_a),
                _ => std::cmp::Ordering::Equal,
            })
    });
}

fn kind_rank(kind: OsmKind) -> u8 {
    match kind {
        OsmKind::Node => 0,
        OsmKind::Way => 1,
        OsmKind::Relation => 2,
    }
}

/// Write the objects as one OsmChange document, grouping consecutive objects
/// with the same derived action into a shared block.
pub fn write_osc(objects: &[OsmObject], out: &Path) -> Result<()> {
    let mut file = BufWriter::new(File::create(out)?);
    writeln!(file, "<?xml version='1.0' encoding='UTF-8'?>")?;
    writeln!(file, "<osmChange version=\"0.6\" generator=\"osm-rdf-sync\">")?;

    let mut open_block: Option<ChangeAction> = None;
    for object in objects {
        let action = object.action();
        if open_block != Some(action) {
            if let Some(previous) = open_block {
                writeln!(file, "</{}>", previous.xml_tag())?;
            }
            writeln!(file, "<{}>", action.xml_tag())?;
            open_block = Some(action);
        }
        writeln!(file, "{}", object.to_xml())?;
    }
    if let Some(previous) = open_block {
        writeln!(file, "</{}>", previous.xml_tag())?;
    }

    writeln!(file, "</osmChange>")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeAction;

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn delete_then_create_at_higher_version_collapses_to_create() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(
            dir.path(),
            "a.osc",
            r#"<osmChange version="0.6"><delete>
               <node id="9" version="4" lat="1.0" lon="1.0"/>
               </delete></osmChange>"#,
        );
        let b = write_file(
            dir.path(),
            "b.osc",
            r#"<osmChange version="0.6"><create>
               <node id="9" version="5" lat="1.0" lon="1.0"/>
               </create></osmChange>"#,
        );
        let out = dir.path().join("merged.osc");
        merge_files(&[a, b], &out, 7).unwrap();

        let merged = reader::read_osc(&out, 7).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id(), 9);
        assert_eq!(merged[0].meta().version, 5);
        assert!(!merged[0].meta().deleted);
    }

    #[test]
    fn orders_kinds_and_ids_canonically() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(
            dir.path(),
            "in.osc",
            r#"<osmChange version="0.6"><modify>
               <relation id="5" version="2"><member type="node" ref="1" role=""/></relation>
               <way id="3" version="2"><nd ref="1"/></way>
               <node id="8" version="2" lat="1.0" lon="1.0"/>
               <node id="2" version="2" lat="1.0" lon="1.0"/>
               </modify></osmChange>"#,
        );
        let out = dir.path().join("merged.osc");
        merge_files(std::slice::from_ref(&input), &out, 7).unwrap();

        let merged = reader::read_osc(&out, 7).unwrap();
        let ids: Vec<i64> = merged.iter().map(|o| o.id()).collect();
        assert_eq!(ids, vec![2, 8, 3, 5]);
    }

    #[test]
    fn same_version_prefers_the_deleted_record() {
        let mut objects = reader_objects(
            r#"<osmChange version="0.6">
               <modify><node id="1" version="3" lat="1.0" lon="1.0"/></modify>
               <delete><node id="1" version="3" lat="1.0" lon="1.0"/></delete>
               </osmChange>"#,
        );
        canonical_sort(&mut objects);
        assert!(objects[0].meta().deleted);
    }

    #[test]
    fn merged_actions_are_rederivable() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(
            dir.path(),
            "in.osc",
            r#"<osmChange version="0.6">
               <create><node id="1" version="1" lat="1.0" lon="1.0"/></create>
               <modify><node id="2" version="2" lat="1.0" lon="1.0"/></modify>
               <delete><node id="3" version="2" lat="1.0" lon="1.0"/></delete>
               </osmChange>"#,
        );
        let out = dir.path().join("merged.osc");
        merge_files(std::slice::from_ref(&input), &out, 7).unwrap();

        let merged = reader::read_osc(&out, 7).unwrap();
        let actions: Vec<ChangeAction> = merged.iter().map(|o| o.action()).collect();
        assert_eq!(
            actions,
            vec![
                ChangeAction::Create,
                ChangeAction::Modify,
                ChangeAction::Delete
            ]
        );
    }

    #[test]
    fn malformed_input_aborts_the_merge() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_file(dir.path(), "bad.osc", "<osmChange><create><node id=");
        let out = dir.path().join("merged.osc");
        assert!(merge_files(&[bad], &out, 7).is_err());
        assert!(!out.exists());
    }

    fn reader_objects(body: &str) -> Vec<OsmObject> {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "tmp.osc", body);
        reader::read_osc(&path, 7).unwrap()
    }
}
