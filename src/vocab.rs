//! RDF namespaces, prefixed names and PREFIX declaration groups shared by the
//! query writer and the triple filter. Mirrors the vocabulary emitted by
//! osm2rdf.

pub const NS_OSM: &str = "osm";
pub const NS_OSM_NODE: &str = "osmnode";
pub const NS_OSM_WAY: &str = "osmway";
pub const NS_OSM_REL: &str = "osmrel";
pub const NS_OSM_KEY: &str = "osmkey";
pub const NS_OSM_META: &str = "osmmeta";
pub const NS_OSM2RDF: &str = "osm2rdf";
pub const NS_OSM2RDF_META: &str = "osm2rdfmeta";
pub const NS_OSM2RDF_MEMBER: &str = "osm2rdfmember";
pub const NS_OSM2RDF_GEOM: &str = "osm2rdfgeom";

pub const IRI_OSM: &str = "https://www.openstreetmap.org/";
pub const IRI_OSM_NODE: &str = "https://www.openstreetmap.org/node/";
pub const IRI_OSM_WAY: &str = "https://www.openstreetmap.org/way/";
pub const IRI_OSM_REL: &str = "https://www.openstreetmap.org/relation/";
pub const IRI_OSM_KEY: &str = "https://www.openstreetmap.org/wiki/Key:";
pub const IRI_OSM_META: &str = "https://www.openstreetmap.org/meta/";
pub const IRI_OSM2RDF: &str = "https://osm2rdf.cs.uni-freiburg.de/rdf#";
pub const IRI_OSM2RDF_META: &str = "https://osm2rdf.cs.uni-freiburg.de/rdf/meta#";
pub const IRI_OSM2RDF_MEMBER: &str = "https://osm2rdf.cs.uni-freiburg.de/rdf/member#";
pub const IRI_OSM2RDF_GEOM: &str = "https://osm2rdf.cs.uni-freiburg.de/rdf/geom#";
pub const IRI_GENID: &str = "http://osm2rdf.cs.uni-freiburg.de/.well-known/genid/";
pub const IRI_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const IRI_XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const IRI_WD: &str = "http://www.wikidata.org/entity/";
pub const IRI_OGC: &str = "http://www.opengis.net/rdf#";
pub const IRI_GEO: &str = "http://www.opengis.net/ont/geosparql#";

pub const PREFIX_DECL_OSM: &str = "PREFIX osm: <https://www.openstreetmap.org/>";
pub const PREFIX_DECL_OSM_NODE: &str = "PREFIX osmnode: <https://www.openstreetmap.org/node/>";
pub const PREFIX_DECL_OSM_WAY: &str = "PREFIX osmway: <https://www.openstreetmap.org/way/>";
pub const PREFIX_DECL_OSM_REL: &str = "PREFIX osmrel: <https://www.openstreetmap.org/relation/>";
pub const PREFIX_DECL_OSM_KEY: &str = "PREFIX osmkey: <https://www.openstreetmap.org/wiki/Key:>";
pub const PREFIX_DECL_OSM_META: &str = "PREFIX osmmeta: <https://www.openstreetmap.org/meta/>";
pub const PREFIX_DECL_OSM2RDF: &str = "PREFIX osm2rdf: <https://osm2rdf.cs.uni-freiburg.de/rdf#>";
pub const PREFIX_DECL_OSM2RDF_META: &str =
    "PREFIX osm2rdfmeta: <https://osm2rdf.cs.uni-freiburg.de/rdf/meta#>";
pub const PREFIX_DECL_OSM2RDF_MEMBER: &str =
    "PREFIX osm2rdfmember: <https://osm2rdf.cs.uni-freiburg.de/rdf/member#>";
pub const PREFIX_DECL_OSM2RDF_GEOM: &str =
    "PREFIX osm2rdfgeom: <https://osm2rdf.cs.uni-freiburg.de/rdf/geom#>";
pub const PREFIX_DECL_RDF: &str = "PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>";
pub const PREFIX_DECL_XSD: &str = "PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>";
pub const PREFIX_DECL_GEO: &str = "PREFIX geo: <http://www.opengis.net/ont/geosparql#>";
pub const PREFIX_DECL_OGC: &str = "PREFIX ogc: <http://www.opengis.net/rdf#>";

// Prefixed names that the filter and the query writer match on.
pub const WAY_MEMBER: &str = "osmway:member";
pub const REL_MEMBER: &str = "osmrel:member";
pub const MEMBER_ID: &str = "osm2rdfmember:id";
pub const MEMBER_POS: &str = "osm2rdfmember:pos";
pub const MEMBER_ROLE: &str = "osm2rdfmember:role";
pub const GEO_HAS_GEOMETRY: &str = "geo:hasGeometry";
pub const GEO_HAS_CENTROID: &str = "geo:hasCentroid";
pub const GEO_AS_WKT: &str = "geo:asWKT";
pub const OSM2RDF_FACTS: &str = "osm2rdf:facts";
pub const OSM2RDF_LENGTH: &str = "osm2rdf:length";
pub const OSM2RDF_AREA: &str = "osm2rdf:area";
pub const GEOM_OBB: &str = "osm2rdfgeom:obb";
pub const GEOM_ENVELOPE: &str = "osm2rdfgeom:envelope";
pub const GEOM_CONVEX_HULL: &str = "osm2rdfgeom:convex_hull";
pub const GEOM_NODE_STEM: &str = "osm2rdfgeom:osm_node_";
pub const OSMMETA_TIMESTAMP: &str = "osmmeta:timestamp";
pub const META_INFO: &str = "osm2rdfmeta:info";
pub const META_UPDATES_COMPLETE_UNTIL: &str = "osm2rdfmeta:updatesCompleteUntil";
pub const META_DATE_MODIFIED: &str = "osm2rdfmeta:dateModified";
pub const META_VERSION: &str = "osm2rdfmeta:version";

pub const XSD_INTEGER: &str = "<http://www.w3.org/2001/XMLSchema#integer>";
pub const XSD_DATE_TIME: &str = "<http://www.w3.org/2001/XMLSchema#dateTime>";

// PREFIX groups per query family; each generated query carries only the
// declarations its template needs.
pub const PREFIXES_FOR_NODE_LOCATIONS: &[&str] =
    &[PREFIX_DECL_OSM2RDF_GEOM, PREFIX_DECL_GEO];
pub const PREFIXES_FOR_LATEST_TIMESTAMP: &[&str] =
    &[PREFIX_DECL_OSM, PREFIX_DECL_OSM_META, PREFIX_DECL_RDF];
pub const PREFIXES_FOR_WAY_MEMBERS: &[&str] =
    &[PREFIX_DECL_OSM_WAY, PREFIX_DECL_OSM2RDF_MEMBER];
pub const PREFIXES_FOR_RELATION_MEMBERS: &[&str] = &[
    PREFIX_DECL_OSM_REL,
    PREFIX_DECL_OSM_KEY,
    PREFIX_DECL_OSM2RDF_MEMBER,
];
pub const PREFIXES_FOR_WAYS_REFERENCING_NODES: &[&str] = &[
    PREFIX_DECL_OSM_WAY,
    PREFIX_DECL_OSM_NODE,
    PREFIX_DECL_OSM2RDF_MEMBER,
];
pub const PREFIXES_FOR_RELATIONS_REFERENCING_NODES: &[&str] = &[
    PREFIX_DECL_OSM_REL,
    PREFIX_DECL_OSM_NODE,
    PREFIX_DECL_OSM2RDF_MEMBER,
];
pub const PREFIXES_FOR_RELATIONS_REFERENCING_WAYS: &[&str] = &[
    PREFIX_DECL_OSM_REL,
    PREFIX_DECL_OSM_WAY,
    PREFIX_DECL_OSM2RDF_MEMBER,
];
pub const PREFIXES_FOR_RELATIONS_REFERENCING_RELATIONS: &[&str] =
    &[PREFIX_DECL_OSM_REL, PREFIX_DECL_OSM2RDF_MEMBER];
pub const PREFIXES_FOR_FULL_DELETE_NODE: &[&str] =
    &[PREFIX_DECL_OSM_NODE, PREFIX_DECL_OGC, PREFIX_DECL_GEO];
pub const PREFIXES_FOR_FULL_DELETE_WAY: &[&str] =
    &[PREFIX_DECL_OSM_WAY, PREFIX_DECL_OGC, PREFIX_DECL_GEO];
pub const PREFIXES_FOR_FULL_DELETE_REL: &[&str] =
    &[PREFIX_DECL_OSM_REL, PREFIX_DECL_OGC, PREFIX_DECL_GEO];
pub const PREFIXES_FOR_TAGS_AND_META_DELETE_WAY: &[&str] = &[
    PREFIX_DECL_OSM_WAY,
    PREFIX_DECL_OSM_META,
    PREFIX_DECL_OSM_KEY,
    PREFIX_DECL_OSM2RDF,
];
pub const PREFIXES_FOR_TAGS_AND_META_DELETE_REL: &[&str] = &[
    PREFIX_DECL_OSM_REL,
    PREFIX_DECL_OSM_META,
    PREFIX_DECL_OSM_KEY,
    PREFIX_DECL_OSM2RDF,
];
pub const PREFIXES_FOR_GEOMETRY_DELETE_WAY: &[&str] = &[
    PREFIX_DECL_OSM_WAY,
    PREFIX_DECL_GEO,
    PREFIX_DECL_OSM2RDF,
    PREFIX_DECL_OSM2RDF_GEOM,
];
pub const PREFIXES_FOR_GEOMETRY_DELETE_REL: &[&str] = &[
    PREFIX_DECL_OSM_REL,
    PREFIX_DECL_GEO,
    PREFIX_DECL_OSM2RDF,
    PREFIX_DECL_OSM2RDF_GEOM,
];
pub const PREFIXES_FOR_MEMBER_DELETE_WAY: &[&str] = &[PREFIX_DECL_OSM_WAY];
pub const PREFIXES_FOR_MEMBER_DELETE_REL: &[&str] = &[PREFIX_DECL_OSM_REL];
pub const PREFIXES_FOR_METADATA: &[&str] = &[PREFIX_DECL_OSM2RDF_META, PREFIX_DECL_XSD];
