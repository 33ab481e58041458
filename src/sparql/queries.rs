//! Builders for every SPARQL query the engine sends: typed selects, the four
//! delete families, insert batches and the watermark pair.

use std::collections::BTreeSet;

use crate::models::{OsmId, OsmKind, Triple};
use crate::uri;
use crate::vocab;

/// Assembles query strings, optionally scoped to a named graph.
#[derive(Debug, Clone, Default)]
pub struct QueryWriter {
    graph: Option<String>,
}

impl QueryWriter {
    pub fn new(graph: Option<String>) -> Self {
        QueryWriter { graph }
    }

    fn object_namespace(kind: OsmKind) -> &'static str {
        match kind {
            OsmKind::Node => vocab::NS_OSM_NODE,
            OsmKind::Way => vocab::NS_OSM_WAY,
            OsmKind::Relation => vocab::NS_OSM_REL,
        }
    }

    fn values_clause(var: &str, namespace: &str, ids: &BTreeSet<OsmId>) -> String {
        let terms: Vec<String> = ids.iter().map(|id| format!("{namespace}:{id}")).collect();
        format!("VALUES ?{var} {{ {} }} ", terms.join(" "))
    }

    fn from_clause(&self) -> String {
        match &self.graph {
            Some(graph) => format!("FROM <{graph}> "),
            None => String::new(),
        }
    }

    fn with_clause(&self) -> String {
        match &self.graph {
            Some(graph) => format!("WITH <{graph}> "),
            None => String::new(),
        }
    }

    // ── Updates ──

    /// One `INSERT DATA` block for a batch of triples.
    pub fn insert_data(&self, triples: &[Triple]) -> String {
        let body: Vec<String> = triples.iter().map(|t| t.to_string()).collect();
        match &self.graph {
            Some(graph) => format!(
                "INSERT DATA {{ GRAPH <{graph}> {{ {} }} }}",
                body.join(" ")
            ),
            None => format!("INSERT DATA {{ {} }}", body.join(" ")),
        }
    }

    /// Full delete: every triple of the subjects plus one level of linked
    /// objects (geometry nodes, member hubs).
    pub fn delete_objects(&self, kind: OsmKind, ids: &BTreeSet<OsmId>) -> String {
        format!(
            "{}DELETE {{ ?s ?p1 ?o1 . ?o1 ?p2 ?o2 . }} \
             WHERE {{ {}?s ?p1 ?o1 . OPTIONAL {{ ?o1 ?p2 ?o2 . }} }}",
            self.with_clause(),
            Self::values_clause("s", Self::object_namespace(kind), ids)
        )
    }

    /// Delete only tag and metadata triples of structure-unchanged ways or
    /// relations.
    pub fn delete_tags_and_meta(&self, kind: OsmKind, ids: &BTreeSet<OsmId>) -> String {
        format!(
            "{}DELETE {{ ?s ?p ?o . }} WHERE {{ {}?s ?p ?o . \
             FILTER(STRSTARTS(STR(?p), \"{}\") || STRSTARTS(STR(?p), \"{}\") || ?p = {}) }}",
            self.with_clause(),
            Self::values_clause("s", Self::object_namespace(kind), ids),
            vocab::IRI_OSM_KEY,
            vocab::IRI_OSM_META,
            vocab::OSM2RDF_FACTS
        )
    }

    /// Delete only geometry triples of geometry-dependent ways or relations:
    /// the `geo:hasGeometry`/`geo:hasCentroid` chains plus the direct
    /// geometry predicates, one scoped query each.
    pub fn delete_geometry(&self, kind: OsmKind, ids: &BTreeSet<OsmId>) -> Vec<String> {
        let values = Self::values_clause("s", Self::object_namespace(kind), ids);
        let mut queries = vec![
            format!(
                "{}DELETE {{ ?s {pred} ?geom . ?geom ?p ?o . }} \
                 WHERE {{ {values}?s {pred} ?geom . ?geom ?p ?o . }}",
                self.with_clause(),
                pred = vocab::GEO_HAS_GEOMETRY
            ),
            format!(
                "{}DELETE {{ ?s {pred} ?centroid . ?centroid ?p ?o . }} \
                 WHERE {{ {values}?s {pred} ?centroid . ?centroid ?p ?o . }}",
                self.with_clause(),
                pred = vocab::GEO_HAS_CENTROID
            ),
        ];
        for predicate in [
            vocab::GEOM_OBB,
            vocab::GEOM_ENVELOPE,
            vocab::GEOM_CONVEX_HULL,
            vocab::OSM2RDF_LENGTH,
            vocab::OSM2RDF_AREA,
        ] {
            queries.push(format!(
                "{}DELETE {{ ?s {predicate} ?o . }} WHERE {{ {values}?s {predicate} ?o . }}",
                self.with_clause()
            ));
        }
        queries
    }

    /// Delete the member blank-node hubs of structure-changed ways or
    /// relations.
    pub fn delete_member_hubs(&self, kind: OsmKind, ids: &BTreeSet<OsmId>) -> String {
        let member_predicate = match kind {
            OsmKind::Way => vocab::WAY_MEMBER,
            _ => vocab::REL_MEMBER,
        };
        format!(
            "{}DELETE {{ ?s {member_predicate} ?m . ?m ?p ?o . }} \
             WHERE {{ {}?s {member_predicate} ?m . ?m ?p ?o . }}",
            self.with_clause(),
            Self::values_clause("s", Self::object_namespace(kind), ids)
        )
    }

    /// Delete one metadata triple at the fixed metadata subject.
    pub fn delete_metadata(&self, predicate: &str) -> String {
        format!(
            "{}DELETE {{ {subject} {predicate} ?value . }} \
             WHERE {{ {subject} {predicate} ?value . }}",
            self.with_clause(),
            subject = vocab::META_INFO
        )
    }

    /// The watermark pair: `updatesCompleteUntil` and `dateModified`.
    pub fn insert_metadata(&self, sequence_number: i64, date_modified: &str) -> String {
        self.insert_data(&[
            Triple::new(
                vocab::META_INFO,
                vocab::META_DATE_MODIFIED,
                format!("\"{date_modified}\"^^{}", vocab::XSD_DATE_TIME),
            ),
            Triple::new(
                vocab::META_INFO,
                vocab::META_UPDATES_COMPLETE_UNTIL,
                format!("\"{sequence_number}\"^^{}", vocab::XSD_INTEGER),
            ),
        ])
    }

    // ── Selects ──

    pub fn node_locations(&self, ids: &BTreeSet<OsmId>) -> String {
        let terms: Vec<String> = ids.iter().map(|id| uri::node_geometry_subject(*id)).collect();
        format!(
            "SELECT ?nodeGeo ?location {}WHERE {{ VALUES ?nodeGeo {{ {} }} \
             ?nodeGeo {} ?location . }}",
            self.from_clause(),
            terms.join(" "),
            vocab::GEO_AS_WKT
        )
    }

    pub fn latest_timestamp(&self) -> String {
        format!(
            "SELECT ?timestamp {}WHERE {{ ?s rdf:type osm:node . \
             ?s {} ?timestamp . }} ORDER BY DESC(?timestamp) LIMIT 1",
            self.from_clause(),
            vocab::OSMMETA_TIMESTAMP
        )
    }

    pub fn ways_members(&self, ids: &BTreeSet<OsmId>) -> String {
        format!(
            "SELECT ?way (GROUP_CONCAT(?memberId;SEPARATOR=\";\") AS ?memberIds) \
             (GROUP_CONCAT(?memberPos;SEPARATOR=\";\") AS ?memberPoss) \
             {}WHERE {{ {}?way {} ?member . ?member {} ?memberId . \
             ?member {} ?memberPos . }} GROUP BY ?way",
            self.from_clause(),
            Self::values_clause("way", vocab::NS_OSM_WAY, ids),
            vocab::WAY_MEMBER,
            vocab::MEMBER_ID,
            vocab::MEMBER_POS
        )
    }

    pub fn relations_members(&self, ids: &BTreeSet<OsmId>) -> String {
        format!(
            "SELECT ?rel ?type (GROUP_CONCAT(?memberId;SEPARATOR=\";\") AS ?memberIds) \
             (GROUP_CONCAT(?memberRole;SEPARATOR=\";\") AS ?memberRoles) \
             (GROUP_CONCAT(?memberPos;SEPARATOR=\";\") AS ?memberPoss) \
             {}WHERE {{ {}?rel osmkey:type ?type . ?rel {} ?member . \
             ?member {} ?memberId . ?member {} ?memberRole . ?member {} ?memberPos . }} \
             GROUP BY ?rel ?type",
            self.from_clause(),
            Self::values_clause("rel", vocab::NS_OSM_REL, ids),
            vocab::REL_MEMBER,
            vocab::MEMBER_ID,
            vocab::MEMBER_ROLE,
            vocab::MEMBER_POS
        )
    }

    /// Distinct node ids referenced by the given ways.
    pub fn way_referenced_nodes(&self, ids: &BTreeSet<OsmId>) -> String {
        format!(
            "SELECT ?node {}WHERE {{ {}?way {} ?member . ?member {} ?node . }} GROUP BY ?node",
            self.from_clause(),
            Self::values_clause("way", vocab::NS_OSM_WAY, ids),
            vocab::WAY_MEMBER,
            vocab::MEMBER_ID
        )
    }

    /// Distinct member ids (nodes and ways) of the given relations.
    pub fn relation_member_ids(&self, ids: &BTreeSet<OsmId>) -> String {
        format!(
            "SELECT ?member {}WHERE {{ {}?rel {} ?o . ?o {} ?member . }} GROUP BY ?member",
            self.from_clause(),
            Self::values_clause("rel", vocab::NS_OSM_REL, ids),
            vocab::REL_MEMBER,
            vocab::MEMBER_ID
        )
    }

    pub fn ways_referencing_nodes(&self, ids: &BTreeSet<OsmId>) -> String {
        format!(
            "SELECT ?way {}WHERE {{ {}?way {} ?member . ?member {} ?node . }} GROUP BY ?way",
            self.from_clause(),
            Self::values_clause("node", vocab::NS_OSM_NODE, ids),
            vocab::WAY_MEMBER,
            vocab::MEMBER_ID
        )
    }

    pub fn relations_referencing_nodes(&self, ids: &BTreeSet<OsmId>) -> String {
        self.relations_referencing("node", vocab::NS_OSM_NODE, ids)
    }

    pub fn relations_referencing_ways(&self, ids: &BTreeSet<OsmId>) -> String {
        self.relations_referencing("way", vocab::NS_OSM_WAY, ids)
    }

    pub fn relations_referencing_relations(&self, ids: &BTreeSet<OsmId>) -> String {
        self.relations_referencing("memberRel", vocab::NS_OSM_REL, ids)
    }

    fn relations_referencing(
        &self,
        var: &str,
        namespace: &str,
        ids: &BTreeSet<OsmId>,
    ) -> String {
        format!(
            "SELECT ?rel {}WHERE {{ {}?rel {} ?o . ?o {} ?{var} . }} GROUP BY ?rel",
            self.from_clause(),
            Self::values_clause(var, namespace, ids),
            vocab::REL_MEMBER,
            vocab::MEMBER_ID
        )
    }

    pub fn updates_complete_until(&self) -> String {
        format!(
            "SELECT ?sequenceNumber {}WHERE {{ {} {} ?sequenceNumber . }}",
            self.from_clause(),
            vocab::META_INFO,
            vocab::META_UPDATES_COMPLETE_UNTIL
        )
    }

    pub fn osm2rdf_version(&self) -> String {
        format!(
            "SELECT ?version {}WHERE {{ {} {} ?version . }}",
            self.from_clause(),
            vocab::META_INFO,
            vocab::META_VERSION
        )
    }

    pub fn osm2rdf_options(&self) -> String {
        format!(
            "SELECT ?option ?value {}WHERE {{ {} ?option ?value . }}",
            self.from_clause(),
            vocab::META_INFO
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> QueryWriter {
        QueryWriter::new(None)
    }

    fn ids(values: &[OsmId]) -> BTreeSet<OsmId> {
        values.iter().copied().collect()
    }

    #[test]
    fn insert_data_joins_triples() {
        let query = writer().insert_data(&[
            Triple::new("osmrel:1960198", "ogc:sfContains", "osmnode:10559440"),
            Triple::new("osmrel:102740", "osmkey:name", "\"Bretagne\""),
        ]);
        assert_eq!(
            query,
            "INSERT DATA { osmrel:1960198 ogc:sfContains osmnode:10559440 . \
             osmrel:102740 osmkey:name \"Bretagne\" . }"
        );
    }

    #[test]
    fn insert_data_wraps_graph() {
        let query = QueryWriter::new(Some("https://example.org/g".into()))
            .insert_data(&[Triple::new("osmnode:1", "osmkey:name", "\"x\"")]);
        assert_eq!(
            query,
            "INSERT DATA { GRAPH <https://example.org/g> { osmnode:1 osmkey:name \"x\" . } }"
        );
    }

    #[test]
    fn full_delete_follows_one_blank_node_level() {
        let query = writer().delete_objects(OsmKind::Node, &ids(&[1960198, 1960199]));
        assert_eq!(
            query,
            "DELETE { ?s ?p1 ?o1 . ?o1 ?p2 ?o2 . } \
             WHERE { VALUES ?s { osmnode:1960198 osmnode:1960199 } \
             ?s ?p1 ?o1 . OPTIONAL { ?o1 ?p2 ?o2 . } }"
        );
    }

    #[test]
    fn tags_and_meta_delete_is_scoped_to_tag_predicates() {
        let query = writer().delete_tags_and_meta(OsmKind::Way, &ids(&[7]));
        assert!(query.contains("VALUES ?s { osmway:7 }"));
        assert!(query.contains("STRSTARTS(STR(?p), \"https://www.openstreetmap.org/wiki/Key:\")"));
        assert!(query.contains("STRSTARTS(STR(?p), \"https://www.openstreetmap.org/meta/\")"));
        assert!(query.contains("?p = osm2rdf:facts"));
    }

    #[test]
    fn geometry_delete_covers_chains_and_direct_predicates() {
        let queries = writer().delete_geometry(OsmKind::Way, &ids(&[99]));
        assert_eq!(queries.len(), 7);
        assert!(queries[0].contains("geo:hasGeometry"));
        assert!(queries[1].contains("geo:hasCentroid"));
        let direct: Vec<&str> = queries[2..].iter().map(|q| q.as_str()).collect();
        assert!(direct.iter().any(|q| q.contains("osm2rdfgeom:obb")));
        assert!(direct.iter().any(|q| q.contains("osm2rdf:length")));
        assert!(direct.iter().any(|q| q.contains("osm2rdf:area")));
    }

    #[test]
    fn member_hub_delete_uses_kind_member_predicate() {
        let query = writer().delete_member_hubs(OsmKind::Relation, &ids(&[200]));
        assert_eq!(
            query,
            "DELETE { ?s osmrel:member ?m . ?m ?p ?o . } \
             WHERE { VALUES ?s { osmrel:200 } ?s osmrel:member ?m . ?m ?p ?o . }"
        );
    }

    #[test]
    fn node_locations_queries_geometry_subjects() {
        let query = writer().node_locations(&ids(&[1, 2, 3]));
        assert_eq!(
            query,
            "SELECT ?nodeGeo ?location WHERE { VALUES ?nodeGeo \
             { osm2rdfgeom:osm_node_1 osm2rdfgeom:osm_node_2 osm2rdfgeom:osm_node_3 } \
             ?nodeGeo geo:asWKT ?location . }"
        );
    }

    #[test]
    fn latest_timestamp_orders_descending() {
        assert_eq!(
            writer().latest_timestamp(),
            "SELECT ?timestamp WHERE { ?s rdf:type osm:node . \
             ?s osmmeta:timestamp ?timestamp . } ORDER BY DESC(?timestamp) LIMIT 1"
        );
    }

    #[test]
    fn ways_referencing_nodes_groups_by_way() {
        let query = writer().ways_referencing_nodes(&ids(&[1, 2, 3]));
        assert_eq!(
            query,
            "SELECT ?way WHERE { VALUES ?node { osmnode:1 osmnode:2 osmnode:3 } \
             ?way osmway:member ?member . ?member osm2rdfmember:id ?node . } GROUP BY ?way"
        );
    }

    #[test]
    fn relations_referencing_relations_groups_by_rel() {
        let query = writer().relations_referencing_relations(&ids(&[1, 2]));
        assert_eq!(
            query,
            "SELECT ?rel WHERE { VALUES ?memberRel { osmrel:1 osmrel:2 } \
             ?rel osmrel:member ?o . ?o osm2rdfmember:id ?memberRel . } GROUP BY ?rel"
        );
    }

    #[test]
    fn watermark_pair_is_typed() {
        let query = writer().insert_metadata(4290, "2025-01-04T21:21:15Z");
        assert!(query.contains(
            "osm2rdfmeta:info osm2rdfmeta:updatesCompleteUntil \
             \"4290\"^^<http://www.w3.org/2001/XMLSchema#integer> ."
        ));
        assert!(query.contains(
            "osm2rdfmeta:info osm2rdfmeta:dateModified \
             \"2025-01-04T21:21:15Z\"^^<http://www.w3.org/2001/XMLSchema#dateTime> ."
        ));
        let delete = writer().delete_metadata(vocab::META_UPDATES_COMPLETE_UNTIL);
        assert_eq!(
            delete,
            "DELETE { osm2rdfmeta:info osm2rdfmeta:updatesCompleteUntil ?value . } \
             WHERE { osm2rdfmeta:info osm2rdfmeta:updatesCompleteUntil ?value . }"
        );
    }

    #[test]
    fn select_carries_from_clause_for_graph() {
        let writer = QueryWriter::new(Some("https://example.org/g".into()));
        let query = writer.updates_complete_until();
        assert!(query.starts_with("SELECT ?sequenceNumber FROM <https://example.org/g> WHERE"));
    }
}
