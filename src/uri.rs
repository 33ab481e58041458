//! Parsing of OSM ids and object kinds out of IRIs and prefixed names, and
//! the replication-server sequence-number path format.

use crate::error::{Error, Result};
use crate::models::{OsmId, OsmKind};
use crate::vocab;

/// Extract the trailing integer id from an IRI or prefixed name, skipping any
/// trailing `>` or `"` that may wrap the term.
pub fn parse_id(term: &str) -> Result<OsmId> {
    if term.is_empty() {
        return Err(Error::Parse("cannot parse id from empty term".into()));
    }

    let bytes = term.as_bytes();
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == b'>' || bytes[end - 1] == b'"') {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == end {
        return Err(Error::Parse(format!("no trailing id in term: {term}")));
    }

    term[start..end]
        .parse::<OsmId>()
        .map_err(|e| Error::Parse(format!("id out of range in term {term}: {e}")))
}

/// Determine the object kind of an IRI or prefixed name by matching the
/// closed set of node/way/relation stems.
pub fn parse_kind(term: &str) -> Result<OsmKind> {
    let cleaned = term.trim_start_matches(['<', '"']);
    let stems: [(&str, &str, OsmKind); 3] = [
        (vocab::IRI_OSM_NODE, vocab::NS_OSM_NODE, OsmKind::Node),
        (vocab::IRI_OSM_WAY, vocab::NS_OSM_WAY, OsmKind::Way),
        (vocab::IRI_OSM_REL, vocab::NS_OSM_REL, OsmKind::Relation),
    ];
    for (iri, ns, kind) in stems {
        if cleaned.starts_with(iri) {
            return Ok(kind);
        }
        if let Some(rest) = cleaned.strip_prefix(ns) {
            if rest.starts_with(':') {
                return Ok(kind);
            }
        }
    }
    Err(Error::Parse(format!("no osm kind stem in term: {term}")))
}

/// The prefixed name for an object, e.g. `osmnode:1234`.
pub fn prefixed(kind: OsmKind, id: OsmId) -> String {
    let ns = match kind {
        OsmKind::Node => vocab::NS_OSM_NODE,
        OsmKind::Way => vocab::NS_OSM_WAY,
        OsmKind::Relation => vocab::NS_OSM_REL,
    };
    format!("{ns}:{id}")
}

/// The geometry subject osm2rdf uses for a node location, e.g.
/// `osm2rdfgeom:osm_node_1234`.
pub fn node_geometry_subject(id: OsmId) -> String {
    format!("{}{id}", vocab::GEOM_NODE_STEM)
}

/// Format a replication sequence number as the `NNN/NNN/NNN` URL path,
/// zero-padded to nine digits. Numbers above 999 999 999 or below zero have
/// no representation on the server and are rejected.
pub fn sequence_path(sequence_number: i64) -> Result<String> {
    if !(0..=999_999_999).contains(&sequence_number) {
        return Err(Error::Parse(format!(
            "sequence number {sequence_number} cannot be formatted as NNN/NNN/NNN"
        )));
    }
    let digits = format!("{sequence_number:09}");
    Ok(format!("{}/{}/{}", &digits[0..3], &digits[3..6], &digits[6..9]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_id_from_prefixed_name() {
        assert_eq!(parse_id("osmnode:1234").unwrap(), 1234);
        assert_eq!(parse_id("osm2rdfgeom:osm_node_77").unwrap(), 77);
    }

    #[test]
    fn parses_id_from_iri_with_wrapping() {
        assert_eq!(
            parse_id("<https://www.openstreetmap.org/way/42>").unwrap(),
            42
        );
        assert_eq!(
            parse_id("\"https://www.openstreetmap.org/relation/9\"").unwrap(),
            9
        );
    }

    #[test]
    fn rejects_terms_without_trailing_digits() {
        assert!(parse_id("osmnode:").is_err());
        assert!(parse_id("https://www.openstreetmap.org/node/abc").is_err());
        assert!(parse_id("").is_err());
    }

    #[test]
    fn detects_kind_from_iri_and_prefixed_name() {
        assert_eq!(
            parse_kind("https://www.openstreetmap.org/node/1").unwrap(),
            OsmKind::Node
        );
        assert_eq!(parse_kind("osmway:5").unwrap(), OsmKind::Way);
        assert_eq!(
            parse_kind("<https://www.openstreetmap.org/relation/2>").unwrap(),
            OsmKind::Relation
        );
        assert!(parse_kind("osmkey:name").is_err());
    }

    #[test]
    fn id_round_trips_through_prefixed_name() {
        for kind in [OsmKind::Node, OsmKind::Way, OsmKind::Relation] {
            for id in [1_i64, 42, 123_456_789, i64::MAX] {
                let term = prefixed(kind, id);
                assert_eq!(parse_id(&term).unwrap(), id);
                assert_eq!(parse_kind(&term).unwrap(), kind);
            }
        }
    }

    #[test]
    fn sequence_path_zero_pads() {
        assert_eq!(sequence_path(0).unwrap(), "000/000/000");
        assert_eq!(sequence_path(4290).unwrap(), "000/004/290");
        assert_eq!(sequence_path(999_999_999).unwrap(), "999/999/999");
    }

    #[test]
    fn sequence_path_rejects_out_of_range() {
        assert!(sequence_path(-1).is_err());
        assert!(sequence_path(1_000_000_000).is_err());
    }
}
