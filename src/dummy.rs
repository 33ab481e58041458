//! Synthetic OSM objects. For every referenced object that is absent from the
//! change file, a minimal XML element is fabricated from endpoint state so the
//! converter sees a syntactically complete world.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{Location, OsmId, RelationMember};

/// The single tag added to every synthetic way so the converter treats it as
/// tagged. The triple it produces is dropped again by the relevance filter.
pub const SENTINEL_KEY: &str = "K";
pub const SENTINEL_VALUE: &str = "V";

/// Escape the XML special characters plus newline, carriage return and tab.
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            '\t' => out.push_str("&#x9;"),
            _ => out.push(c),
        }
    }
    out
}

/// `<node id="I" lat="L" lon="G"/>` — no tags, no metadata.
pub fn node_dummy(id: OsmId, loc: &Location) -> String {
    format!("<node id=\"{id}\" lat=\"{}\" lon=\"{}\"/>", loc.lat, loc.lon)
}

/// `<way id="I"><nd .../><tag k="K" v="V"/></way>` — member refs plus the
/// sentinel tag.
pub fn way_dummy(id: OsmId, members: &[OsmId]) -> String {
    let mut out = String::with_capacity(32 + members.len() * 20);
    out.push_str(&format!("<way id=\"{id}\">"));
    for member in members {
        out.push_str(&format!("<nd ref=\"{member}\"/>"));
    }
    out.push_str(&format!(
        "<tag k=\"{SENTINEL_KEY}\" v=\"{SENTINEL_VALUE}\"/></way>"
    ));
    out
}

/// `<relation id="I"><member .../><tag k="type" v="T"/></relation>` — the
/// real `type` tag is preserved, no other tags.
pub fn relation_dummy(id: OsmId, rel_type: &str, members: &[RelationMember]) -> String {
    let mut out = String::with_capacity(64 + members.len() * 48);
    out.push_str(&format!("<relation id=\"{id}\">"));
    for member in members {
        out.push_str(&format!(
            "<member type=\"{}\" ref=\"{}\" role=\"{}\"/>",
            member.kind.xml_tag(),
            member.id,
            xml_escape(&member.role)
        ));
    }
    out.push_str(&format!(
        "<tag k=\"type\" v=\"{}\"/></relation>",
        xml_escape(rel_type)
    ));
    out
}

/// Collects synthetic elements per kind, id-ordered, and writes each kind to
/// its own temp file. The per-kind streams are later merge-sorted with the
/// change-file objects into the converter input.
pub struct DummyBuilder {
    dir: PathBuf,
    pub nodes: BTreeMap<OsmId, String>,
    pub ways: BTreeMap<OsmId, String>,
    pub relations: BTreeMap<OsmId, String>,
}

impl DummyBuilder {
    pub fn new(dir: &Path) -> Self {
        DummyBuilder {
            dir: dir.to_path_buf(),
            nodes: BTreeMap::new(),
            ways: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn add_node(&mut self, id: OsmId, loc: &Location) {
        self.nodes.insert(id, node_dummy(id, loc));
    }

    pub fn add_way(&mut self, id: OsmId, members: &[OsmId]) {
        self.ways.insert(id, way_dummy(id, members));
    }

    pub fn add_relation(&mut self, id: OsmId, rel_type: &str, members: &[RelationMember]) {
        self.relations.insert(id, relation_dummy(id, rel_type, members));
    }

    /// Write the three per-kind streams to disk, one element per line,
    /// ascending by id.
    pub fn write_files(&self) -> Result<(PathBuf, PathBuf, PathBuf)> {
        std::fs::create_dir_all(&self.dir)?;
        let paths = (
            self.dir.join("nodes.osm"),
            self.dir.join("ways.osm"),
            self.dir.join("relations.osm"),
        );
        write_lines(&paths.0, &self.nodes)?;
        write_lines(&paths.1, &self.ways)?;
        write_lines(&paths.2, &self.relations)?;
        Ok(paths)
    }
}

fn write_lines(path: &Path, elements: &BTreeMap<OsmId, String>) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    for line in elements.values() {
        writeln!(file, "{line}")?;
    }
    file.flush()?;
    Ok(())
}
