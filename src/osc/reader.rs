//! Streaming reader for OsmChange XML, optionally gzip-compressed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::models::{
    Location, Meta, Node, OsmId, OsmKind, OsmObject, Relation, RelationMember, Way,
};

/// Read a `.osc` or `.osc.gz` file into its objects, in document order.
/// The enclosing `<delete>` block (or a `visible="false"` attribute) marks an
/// object as deleted. Node coordinates are normalized to `wkt_precision`
/// decimal places so they compare byte-equal against endpoint locations.
pub fn read_osc(path: &Path, wkt_precision: u8) -> Result<Vec<OsmObject>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        parse_osc(BufReader::new(GzDecoder::new(file)), wkt_precision)
    } else {
        parse_osc(BufReader::new(file), wkt_precision)
    }
}

fn parse_osc<R: BufRead>(reader: R, wkt_precision: u8) -> Result<Vec<OsmObject>> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();
    let mut objects = Vec::new();
    let mut in_delete_block = false;
    let mut current: Option<Builder> = None;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => {
                handle_open(
                    &e,
                    true,
                    wkt_precision,
                    &mut in_delete_block,
                    &mut current,
                    &mut objects,
                )?;
            }
            Event::Empty(e) => {
                handle_open(
                    &e,
                    false,
                    wkt_precision,
                    &mut in_delete_block,
                    &mut current,
                    &mut objects,
                )?;
            }
            Event::End(e) => match e.name().as_ref() {
                b"delete" => in_delete_block = false,
                b"node" | b"way" | b"relation" => {
                    if let Some(builder) = current.take() {
                        objects.push(builder.finish(in_delete_block, wkt_precision)?);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(objects)
}

fn handle_open(
    element: &BytesStart<'_>,
    has_children: bool,
    wkt_precision: u8,
    in_delete_block: &mut bool,
    current: &mut Option<Builder>,
    objects: &mut Vec<OsmObject>,
) -> Result<()> {
    match element.name().as_ref() {
        b"delete" => *in_delete_block = true,
        b"node" | b"way" | b"relation" => {
            let tag = String::from_utf8_lossy(element.name().as_ref()).into_owned();
            let kind = OsmKind::from_xml_tag(&tag).expect("matched tag");
            let builder = Builder::start(kind, element)?;
            if has_children {
                *current = Some(builder);
            } else {
                objects.push(builder.finish(*in_delete_block, wkt_precision)?);
            }
        }
        b"nd" => {
            if let Some(builder) = current.as_mut() {
                builder.add_node_ref(element)?;
            }
        }
        b"member" => {
            if let Some(builder) = current.as_mut() {
                builder.add_member(element)?;
            }
        }
        b"tag" => {
            if let Some(builder) = current.as_mut() {
                builder.add_tag(element)?;
            }
        }
        _ => {}
    }
    Ok(())
}

struct Builder {
    kind: OsmKind,
    id: OsmId,
    lat: Option<String>,
    lon: Option<String>,
    meta: Meta,
    way_members: Vec<OsmId>,
    relation_members: Vec<RelationMember>,
    tags: Vec<(String, String)>,
}

impl Builder {
    fn start(kind: OsmKind, element: &BytesStart<'_>) -> Result<Self> {
        let mut builder = Builder {
            kind,
            id: 0,
            lat: None,
            lon: None,
            meta: Meta::default(),
            way_members: Vec::new(),
            relation_members: Vec::new(),
            tags: Vec::new(),
        };
        let mut saw_id = false;
        for attr in element.attributes() {
            let attr = attr.map_err(|e| Error::Parse(format!("xml attribute: {e}")))?;
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Parse(format!("xml attribute value: {e}")))?;
            match attr.key.as_ref() {
                b"id" => {
                    builder.id = parse_number(&value, "id")?;
                    saw_id = true;
                }
                b"lat" => builder.lat = Some(value.into_owned()),
                b"lon" => builder.lon = Some(value.into_owned()),
                b"version" => builder.meta.version = parse_number(&value, "version")?,
                b"timestamp" => builder.meta.timestamp = Some(value.into_owned()),
                b"changeset" => {
                    builder.meta.changeset = Some(parse_number(&value, "changeset")?)
                }
                b"visible" if value.as_ref() == "false" => builder.meta.deleted = true,
                _ => {}
            }
        }
        if !saw_id {
            return Err(Error::Parse(format!("{} element without id", kind.xml_tag())));
        }
        Ok(builder)
    }

    fn add_node_ref(&mut self, element: &BytesStart<'_>) -> Result<()> {
        for attr in element.attributes() {
            let attr = attr.map_err(|e| Error::Parse(format!("xml attribute: {e}")))?;
            if attr.key.as_ref() == b"ref" {
                let value = attr
                    .unescape_value()
                    .map_err(|e| Error::Parse(format!("xml attribute value: {e}")))?;
                self.way_members.push(parse_number(&value, "nd ref")?);
            }
        }
        Ok(())
    }

    fn add_member(&mut self, element: &BytesStart<'_>) -> Result<()> {
        let mut id: Option<OsmId> = None;
        let mut kind: Option<OsmKind> = None;
        let mut role = String::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| Error::Parse(format!("xml attribute: {e}")))?;
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Parse(format!("xml attribute value: {e}")))?;
            match attr.key.as_ref() {
                b"ref" => id = Some(parse_number(&value, "member ref")?),
                b"type" => kind = OsmKind::from_xml_tag(&value),
                b"role" => role = value.into_owned(),
                _ => {}
            }
        }
        match (id, kind) {
            (Some(id), Some(kind)) => {
                self.relation_members.push(RelationMember { id, kind, role });
                Ok(())
            }
            _ => Err(Error::Parse(format!(
                "relation {} has a member without ref or type",
                self.id
            ))),
        }
    }

    fn add_tag(&mut self, element: &BytesStart<'_>) -> Result<()> {
        let mut key = String::new();
        let mut value = String::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| Error::Parse(format!("xml attribute: {e}")))?;
            let text = attr
                .unescape_value()
                .map_err(|e| Error::Parse(format!("xml attribute value: {e}")))?;
            match attr.key.as_ref() {
                b"k" => key = text.into_owned(),
                b"v" => value = text.into_owned(),
                _ => {}
            }
        }
        self.tags.push((key, value));
        Ok(())
    }

    fn finish(mut self, in_delete_block: bool, wkt_precision: u8) -> Result<OsmObject> {
        if in_delete_block {
            self.meta.deleted = true;
        }
        Ok(match self.kind {
            OsmKind::Node => {
                let loc = match (&self.lon, &self.lat) {
                    (Some(lon), Some(lat)) => {
                        Some(Location::new(lon, lat, wkt_precision).ok_or_else(|| {
                            Error::Parse(format!("node {} has malformed coordinates", self.id))
                        })?)
                    }
                    _ => None,
                };
                OsmObject::Node(Node {
                    id: self.id,
                    loc,
                    tags: self.tags,
                    meta: self.meta,
                })
            }
            OsmKind::Way => OsmObject::Way(Way {
                id: self.id,
                members: self.way_members,
                tags: self.tags,
                meta: self.meta,
            }),
            OsmKind::Relation => OsmObject::Relation(Relation {
                id: self.id,
                members: self.relation_members,
                tags: self.tags,
                meta: self.meta,
            }),
        })
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::Parse(format!("invalid {what} attribute '{value}': {e}")))
}
