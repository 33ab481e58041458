//! Filters converter output down to the triples that describe in-scope
//! objects, discarding everything that was only emitted for dependency
//! dummies. Works line by line, tracking the most recently kept link object
//! so blank-node chains (geometry, member hubs) follow their anchor.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::dummy::{SENTINEL_KEY, SENTINEL_VALUE};
use crate::error::{Error, Result};
use crate::models::{OsmId, Triple};
use crate::uri;
use crate::vocab;

/// The id sets that decide relevance. For ways and relations a structure-
/// unchanged object only keeps its tag and metadata triples.
#[derive(Debug, Default)]
pub struct RelevanceScope {
    pub nodes: BTreeSet<OsmId>,
    pub ways_full: BTreeSet<OsmId>,
    pub ways_tags_only: BTreeSet<OsmId>,
    pub relations_full: BTreeSet<OsmId>,
    pub relations_tags_only: BTreeSet<OsmId>,
}

#[derive(Debug, Default)]
pub struct FilteredOutput {
    pub prefixes: Vec<String>,
    pub triples: Vec<Triple>,
}

pub fn filter_converter_output(path: &Path, scope: &RelevanceScope) -> Result<FilteredOutput> {
    let reader = BufReader::new(File::open(path)?);
    filter_lines(reader.lines().map(|line| line.map_err(Error::from)), scope)
}

pub fn filter_lines(
    lines: impl Iterator<Item = Result<String>>,
    scope: &RelevanceScope,
) -> Result<FilteredOutput> {
    let mut output = FilteredOutput::default();
    let mut seen_prefixes = BTreeSet::new();
    let mut current_link: Option<String> = None;

    for line in lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with("@prefix") {
            let declaration = rewrite_prefix(trimmed)?;
            if seen_prefixes.insert(declaration.clone()) {
                output.prefixes.push(declaration);
            }
            continue;
        }

        let triple = Triple::parse(trimmed)
            .ok_or_else(|| Error::Parse(format!("invalid triple line: {trimmed}")))?;

        if let Some(kind) = subject_namespace(&triple.subject) {
            // A new osm subject ends the previous chain.
            current_link = None;
            let id = uri::parse_id(&triple.subject)?;
            let keep = match kind {
                SubjectKind::Node => scope.nodes.contains(&id),
                SubjectKind::Way => {
                    if is_sentinel_tag(&triple) {
                        false
                    } else if scope.ways_full.contains(&id) {
                        true
                    } else {
                        scope.ways_tags_only.contains(&id)
                            && is_tag_or_meta_predicate(&triple.predicate)
                    }
                }
                SubjectKind::Relation => {
                    if scope.relations_full.contains(&id) {
                        true
                    } else {
                        scope.relations_tags_only.contains(&id)
                            && is_tag_or_meta_predicate(&triple.predicate)
                    }
                }
            };
            if keep {
                if is_link_predicate(kind, &triple.predicate) {
                    current_link = Some(triple.object.clone());
                }
                output.triples.push(triple);
            }
        } else if current_link.as_deref() == Some(triple.subject.as_str()) {
            // Geometry subject or member blank node anchored to a kept object.
            output.triples.push(triple);
        }
    }

    Ok(output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubjectKind {
    Node,
    Way,
    Relation,
}

fn subject_namespace(subject: &str) -> Option<SubjectKind> {
    let cleaned = subject.trim_start_matches('<');
    if cleaned.starts_with("osmnode:") || cleaned.starts_with(vocab::IRI_OSM_NODE) {
        Some(SubjectKind::Node)
    } else if cleaned.starts_with("osmway:") || cleaned.starts_with(vocab::IRI_OSM_WAY) {
        Some(SubjectKind::Way)
    } else if cleaned.starts_with("osmrel:") || cleaned.starts_with(vocab::IRI_OSM_REL) {
        Some(SubjectKind::Relation)
    } else {
        None
    }
}

fn is_tag_or_meta_predicate(predicate: &str) -> bool {
    predicate.starts_with("osmkey:")
        || predicate.starts_with("osmmeta:")
        || predicate == vocab::OSM2RDF_FACTS
}

/// Predicates whose object anchors further triples: geometry and centroid
/// for every kind, plus the member hub for ways and relations.
fn is_link_predicate(kind: SubjectKind, predicate: &str) -> bool {
    match kind {
        SubjectKind::Node => {
            predicate == vocab::GEO_HAS_GEOMETRY || predicate == vocab::GEO_HAS_CENTROID
        }
        SubjectKind::Way => {
            predicate == vocab::WAY_MEMBER
                || predicate == vocab::GEO_HAS_GEOMETRY
                || predicate == vocab::GEO_HAS_CENTROID
        }
        SubjectKind::Relation => {
            predicate == vocab::REL_MEMBER
                || predicate == vocab::GEO_HAS_GEOMETRY
                || predicate == vocab::GEO_HAS_CENTROID
        }
    }
}

/// The artifact of the tag every synthetic way carries.
fn is_sentinel_tag(triple: &Triple) -> bool {
    triple.predicate == format!("osmkey:{SENTINEL_KEY}")
        && (triple.object == format!("\"{SENTINEL_VALUE}\"")
            || triple
                .object
                .starts_with(&format!("\"{SENTINEL_VALUE}\"^^")))
}

/// Turtle `@prefix x: <iri> .` becomes the SPARQL clause `PREFIX x: <iri>`.
fn rewrite_prefix(line: &str) -> Result<String> {
    let rest = line
        .strip_prefix("@prefix")
        .map(str::trim)
        .and_then(|r| r.strip_suffix('.'))
        .map(str::trim)
        .ok_or_else(|| Error::Parse(format!("invalid prefix declaration: {line}")))?;
    Ok(format!("PREFIX {rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str], scope: &RelevanceScope) -> FilteredOutput {
        filter_lines(lines.iter().map(|l| Ok(l.to_string())), scope).unwrap()
    }

    fn ids(values: &[OsmId]) -> BTreeSet<OsmId> {
        values.iter().copied().collect()
    }

    #[test]
    fn prefixes_are_rewritten_and_deduplicated() {
        let scope = RelevanceScope::default();
        let output = run(
            &[
                "@prefix osmnode: <https://www.openstreetmap.org/node/> .",
                "@prefix osmnode: <https://www.openstreetmap.org/node/> .",
                "@prefix geo: <http://www.opengis.net/ont/geosparql#> .",
            ],
            &scope,
        );
        assert_eq!(
            output.prefixes,
            vec![
                "PREFIX osmnode: <https://www.openstreetmap.org/node/>",
                "PREFIX geo: <http://www.opengis.net/ont/geosparql#>"
            ]
        );
    }

    #[test]
    fn node_triples_follow_their_geometry_chain() {
        let scope = RelevanceScope {
            nodes: ids(&[42]),
            ..Default::default()
        };
        let output = run(
            &[
                "osmnode:42 rdf:type osm:node .",
                "osmnode:42 geo:hasGeometry osm2rdfgeom:osm_node_42 .",
                "osm2rdfgeom:osm_node_42 geo:asWKT \"POINT(2.0 1.0)\" .",
                "osmnode:7 rdf:type osm:node .",
                "osmnode:7 geo:hasGeometry osm2rdfgeom:osm_node_7 .",
                "osm2rdfgeom:osm_node_7 geo:asWKT \"POINT(9.0 9.0)\" .",
            ],
            &scope,
        );
        assert_eq!(output.triples.len(), 3);
        assert!(output.triples.iter().all(|t| t.subject.contains("42")));
    }

    #[test]
    fn structure_unchanged_ways_keep_only_tags_and_meta() {
        let scope = RelevanceScope {
            ways_tags_only: ids(&[100]),
            ..Default::default()
        };
        let output = run(
            &[
                "osmway:100 osmkey:highway \"residential\" .",
                "osmway:100 osmmeta:version \"3\" .",
                "osmway:100 osm2rdf:facts \"2\" .",
                "osmway:100 osm2rdf:length \"12.5\" .",
                "osmway:100 geo:hasGeometry osm2rdfgeom:osm_wayarea_100 .",
                "osm2rdfgeom:osm_wayarea_100 geo:asWKT \"LINESTRING(0 0, 1 1)\" .",
            ],
            &scope,
        );
        let predicates: Vec<&str> =
            output.triples.iter().map(|t| t.predicate.as_str()).collect();
        assert_eq!(
            predicates,
            vec!["osmkey:highway", "osmmeta:version", "osm2rdf:facts"]
        );
    }

    #[test]
    fn full_scope_ways_keep_geometry_but_not_the_sentinel_tag() {
        let scope = RelevanceScope {
            ways_full: ids(&[99]),
            ..Default::default()
        };
        let output = run(
            &[
                "osmway:99 osmkey:K \"V\" .",
                "osmway:99 geo:hasGeometry osm2rdfgeom:osm_wayarea_99 .",
                "osm2rdfgeom:osm_wayarea_99 geo:asWKT \"LINESTRING(0 0, 1 1)\" .",
                "osmway:99 osm2rdf:length \"7.0\" .",
            ],
            &scope,
        );
        assert_eq!(output.triples.len(), 3);
        assert!(
            output
                .triples
                .iter()
                .all(|t| t.predicate != "osmkey:K")
        );
    }

    #[test]
    fn relation_member_hubs_follow_their_anchor() {
        let scope = RelevanceScope {
            relations_full: ids(&[200]),
            ..Default::default()
        };
        let output = run(
            &[
                "osmrel:200 osmrel:member _:0_1 .",
                "_:0_1 osm2rdfmember:id osmway:9 .",
                "_:0_1 osm2rdfmember:role \"outer\" .",
                "osmrel:201 osmrel:member _:0_2 .",
                "_:0_2 osm2rdfmember:id osmway:10 .",
            ],
            &scope,
        );
        assert_eq!(output.triples.len(), 3);
        assert!(
            output
                .triples
                .iter()
                .all(|t| t.subject == "osmrel:200" || t.subject == "_:0_1")
        );
    }

    #[test]
    fn dropped_subjects_break_the_chain() {
        let scope = RelevanceScope {
            nodes: ids(&[1]),
            ..Default::default()
        };
        let output = run(
            &[
                "osmnode:1 geo:hasGeometry osm2rdfgeom:osm_node_1 .",
                "osmnode:2 geo:hasGeometry osm2rdfgeom:osm_node_2 .",
                "osm2rdfgeom:osm_node_2 geo:asWKT \"POINT(1 1)\" .",
            ],
            &scope,
        );
        assert_eq!(output.triples.len(), 1);
        assert_eq!(output.triples[0].subject, "osmnode:1");
    }

    #[test]
    fn every_kept_subject_is_in_scope() {
        let scope = RelevanceScope {
            nodes: ids(&[1]),
            ways_full: ids(&[2]),
            relations_full: ids(&[3]),
            ..Default::default()
        };
        let output = run(
            &[
                "osmnode:1 osmkey:name \"a\" .",
                "osmnode:10 osmkey:name \"drop\" .",
                "osmway:2 osmkey:name \"b\" .",
                "osmway:20 osmkey:name \"drop\" .",
                "osmrel:3 osmkey:name \"c\" .",
                "osmrel:30 osmkey:name \"drop\" .",
            ],
            &scope,
        );
        for triple in &output.triples {
            let id = uri::parse_id(&triple.subject).unwrap();
            assert!(id <= 3, "subject out of scope: {}", triple.subject);
        }
        assert_eq!(output.triples.len(), 3);
    }

    #[test]
    fn malformed_lines_abort() {
        let scope = RelevanceScope::default();
        let result = filter_lines(
            [Ok("justonetoken".to_string())].into_iter(),
            &scope,
        );
        assert!(result.is_err());
    }
}
