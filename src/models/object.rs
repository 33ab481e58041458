use std::fmt;

use crate::dummy::xml_escape;

/// OSM object ids are 64-bit signed integers, scoped by kind.
pub type OsmId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OsmKind {
    Node,
    Way,
    Relation,
}

impl OsmKind {
    pub fn xml_tag(&self) -> &'static str {
        match self {
            OsmKind::Node => "node",
            OsmKind::Way => "way",
            OsmKind::Relation => "relation",
        }
    }

    pub fn from_xml_tag(tag: &str) -> Option<Self> {
        match tag {
            "node" => Some(OsmKind::Node),
            "way" => Some(OsmKind::Way),
            "relation" => Some(OsmKind::Relation),
            _ => None,
        }
    }
}

impl fmt::Display for OsmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.xml_tag())
    }
}

/// A (longitude, latitude) pair kept as text, normalized to the configured
/// number of decimal places (seven by default) so values round-trip
/// byte-equal between change-file attributes and endpoint WKT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub lon: String,
    pub lat: String,
}

impl Location {
    pub fn new(lon: &str, lat: &str, precision: u8) -> Option<Self> {
        Some(Location {
            lon: normalize_coordinate(lon, precision)?,
            lat: normalize_coordinate(lat, precision)?,
        })
    }
}

fn normalize_coordinate(text: &str, precision: u8) -> Option<String> {
    let value: f64 = text.trim().parse().ok()?;
    let precision = usize::from(precision);
    Some(format!("{value:.precision$}"))
}

/// Common OSM object metadata from the change file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub version: i64,
    pub timestamp: Option<String>,
    pub changeset: Option<i64>,
    pub deleted: bool,
}

/// What a change file entry means for the graph. A `Modify` may still act as
/// a create when the endpoint has no prior state for the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Modify,
    Delete,
}

impl ChangeAction {
    pub fn from_meta(meta: &Meta) -> Self {
        if meta.deleted {
            ChangeAction::Delete
        } else if meta.version == 1 {
            ChangeAction::Create
        } else {
            ChangeAction::Modify
        }
    }

    pub fn xml_tag(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Modify => "modify",
            ChangeAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMember {
    pub id: OsmId,
    pub kind: OsmKind,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: OsmId,
    pub loc: Option<Location>,
    pub tags: Vec<(String, String)>,
    pub meta: Meta,
}

#[derive(Debug, Clone)]
pub struct Way {
    pub id: OsmId,
    pub members: Vec<OsmId>,
    pub tags: Vec<(String, String)>,
    pub meta: Meta,
}

#[derive(Debug, Clone)]
pub struct Relation {
    pub id: OsmId,
    pub members: Vec<RelationMember>,
    pub tags: Vec<(String, String)>,
    pub meta: Meta,
}

impl Relation {
    /// The distinguished `type` tag, which drives geometry semantics.
    pub fn rel_type(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == "type")
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum OsmObject {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl OsmObject {
    pub fn id(&self) -> OsmId {
        match self {
            OsmObject::Node(n) => n.id,
            OsmObject::Way(w) => w.id,
            OsmObject::Relation(r) => r.id,
        }
    }

    pub fn kind(&self) -> OsmKind {
        match self {
            OsmObject::Node(_) => OsmKind::Node,
            OsmObject::Way(_) => OsmKind::Way,
            OsmObject::Relation(_) => OsmKind::Relation,
        }
    }

    pub fn meta(&self) -> &Meta {
        match self {
            OsmObject::Node(n) => &n.meta,
            OsmObject::Way(w) => &w.meta,
            OsmObject::Relation(r) => &r.meta,
        }
    }

    pub fn action(&self) -> ChangeAction {
        ChangeAction::from_meta(self.meta())
    }

    /// Serialize the object as a single OSM XML element, attributes included.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(128);
        match self {
            OsmObject::Node(n) => {
                out.push_str(&format!("<node id=\"{}\"", n.id));
                push_meta_attrs(&mut out, &n.meta);
                if let Some(loc) = &n.loc {
                    out.push_str(&format!(" lat=\"{}\" lon=\"{}\"", loc.lat, loc.lon));
                }
                if n.tags.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    push_tags(&mut out, &n.tags);
                    out.push_str("</node>");
                }
            }
            OsmObject::Way(w) => {
                out.push_str(&format!("<way id=\"{}\"", w.id));
                push_meta_attrs(&mut out, &w.meta);
                out.push('>');
                for member in &w.members {
                    out.push_str(&format!("<nd ref=\"{member}\"/>"));
                }
                push_tags(&mut out, &w.tags);
                out.push_str("</way>");
            }
            OsmObject::Relation(r) => {
                out.push_str(&format!("<relation id=\"{}\"", r.id));
                push_meta_attrs(&mut out, &r.meta);
                out.push('>');
                for member in &r.members {
                    out.push_str(&format!(
                        "<member type=\"{}\" ref=\"{}\" role=\"{}\"/>",
                        member.kind.xml_tag(),
                        member.id,
                        xml_escape(&member.role)
                    ));
                }
                push_tags(&mut out, &r.tags);
                out.push_str("</relation>");
            }
        }
        out
    }
}

fn push_meta_attrs(out: &mut String, meta: &Meta) {
    out.push_str(&format!(" version=\"{}\"", meta.version));
    if let Some(ts) = &meta.timestamp {
        out.push_str(&format!(" timestamp=\"{}\"", xml_escape(ts)));
    }
    if let Some(changeset) = meta.changeset {
        out.push_str(&format!(" changeset=\"{changeset}\""));
    }
}

fn push_tags(out: &mut String, tags: &[(String, String)]) {
    for (k, v) in tags {
        out.push_str(&format!(
            "<tag k=\"{}\" v=\"{}\"/>",
            xml_escape(k),
            xml_escape(v)
        ));
    }
}
