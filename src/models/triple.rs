use std::fmt;

/// One RDF triple of opaque terms, as read from converter output or written
/// into an `INSERT DATA` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Triple {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Parse a converter output line of the form `subject predicate object .`.
    /// The object may contain spaces (literals, WKT); no further validation
    /// is done because the converter emits well-formed lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();
        let line = line.strip_suffix(" .").unwrap_or(line);
        let (subject, rest) = line.split_once(' ')?;
        let (predicate, object) = rest.split_once(' ')?;
        if subject.is_empty() || predicate.is_empty() || object.is_empty() {
            return None;
        }
        Some(Triple::new(subject, predicate, object))
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_triple() {
        let t = Triple::parse("osmnode:1 osmkey:name \"Freiburg\" .").unwrap();
        assert_eq!(t.subject, "osmnode:1");
        assert_eq!(t.predicate, "osmkey:name");
        assert_eq!(t.object, "\"Freiburg\"");
    }

    #[test]
    fn object_keeps_internal_spaces() {
        let t = Triple::parse(
            "osm2rdfgeom:osm_node_1 geo:asWKT \"POINT(7.8 47.9)\"^^geo:wktLiteral .",
        )
        .unwrap();
        assert_eq!(t.object, "\"POINT(7.8 47.9)\"^^geo:wktLiteral");
    }

    #[test]
    fn rejects_short_lines() {
        assert!(Triple::parse("osmnode:1").is_none());
        assert!(Triple::parse("").is_none());
    }

    #[test]
    fn display_round_trip() {
        let t = Triple::new("osmway:2", "osm2rdf:length", "\"1.2\"");
        assert_eq!(t.to_string(), "osmway:2 osm2rdf:length \"1.2\" .");
    }
}
