//! Response parsing for the two endpoint flavors. The engine only differs in
//! where the cells live in the JSON, so the variants share one small trait.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Turns a response body into rows of cells, one cell per requested
/// variable. A missing binding yields `None` (valid for OPTIONAL patterns).
pub trait ResultFormat: Send + Sync {
    fn accept(&self) -> &'static str;
    fn rows(&self, body: &str, vars: &[&str]) -> Result<Vec<Vec<Option<String>>>>;
}

/// Standard `application/sparql-results+json`:
/// `results.bindings[*].<var>.value`.
pub struct SparqlJson;

#[derive(Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Deserialize)]
struct SparqlResults {
    bindings: Vec<HashMap<String, SparqlCell>>,
}

#[derive(Deserialize)]
struct SparqlCell {
    value: String,
}

impl ResultFormat for SparqlJson {
    fn accept(&self) -> &'static str {
        super::client::ACCEPT_SPARQL_JSON
    }

    fn rows(&self, body: &str, vars: &[&str]) -> Result<Vec<Vec<Option<String>>>> {
        let response: SparqlResponse = serde_json::from_str(body)
            .map_err(|e| Error::Parse(format!("sparql json response: {e}")))?;

        let rows = response
            .results
            .bindings
            .into_iter()
            .map(|binding| {
                vars.iter()
                    .map(|var| binding.get(*var).map(|cell| cell.value.clone()))
                    .collect()
            })
            .collect();
        Ok(rows)
    }
}

/// QLever's `application/qlever-results+json`: column order in `selected`,
/// row arrays in `res`, cells carrying full RDF term syntax.
pub struct QleverJson;

#[derive(Deserialize)]
struct QleverResponse {
    selected: Vec<String>,
    res: Vec<Vec<Option<String>>>,
}

impl ResultFormat for QleverJson {
    fn accept(&self) -> &'static str {
        super::client::ACCEPT_QLEVER_JSON
    }

    fn rows(&self, body: &str, vars: &[&str]) -> Result<Vec<Vec<Option<String>>>> {
        let response: QleverResponse = serde_json::from_str(body)
            .map_err(|e| Error::Parse(format!("qlever json response: {e}")))?;
        let columns: Vec<&str> = response
            .selected
            .iter()
            .map(|name| name.trim_start_matches('?'))
            .collect();

        let indices: Vec<usize> = vars
            .iter()
            .map(|var| {
                columns.iter().position(|c| c == var).ok_or_else(|| {
                    Error::Parse(format!("variable ?{var} not in qlever 'selected' list"))
                })
            })
            .collect::<Result<_>>()?;

        let rows = response
            .res
            .iter()
            .map(|cells| {
                indices
                    .iter()
                    .map(|&index| {
                        cells
                            .get(index)
                            .and_then(|cell| cell.as_deref())
                            .map(unwrap_term)
                    })
                    .collect()
            })
            .collect();
        Ok(rows)
    }
}

/// Reduce a QLever cell to the plain value the standard format would return:
/// IRIs lose their angle brackets, literals their quotes and datetype or
/// language suffix.
fn unwrap_term(term: &str) -> String {
    if let Some(iri) = term.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return iri.to_string();
    }
    if let Some(rest) = term.strip_prefix('"') {
        if let Some(end) = rest.rfind('"') {
            return rest[..end].to_string();
        }
    }
    term.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparql_json_extracts_cells_by_variable() {
        let body = r#"{
            "head": {"vars": ["way", "memberIds"]},
            "results": {"bindings": [
                {"way": {"type": "uri", "value": "https://www.openstreetmap.org/way/99"},
                 "memberIds": {"type": "literal", "value": "osmnode:1;osmnode:2"}},
                {"way": {"type": "uri", "value": "https://www.openstreetmap.org/way/100"}}
            ]}
        }"#;
        let rows = SparqlJson.rows(body, &["way", "memberIds"]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0][0].as_deref(),
            Some("https://www.openstreetmap.org/way/99")
        );
        assert_eq!(rows[0][1].as_deref(), Some("osmnode:1;osmnode:2"));
        assert_eq!(rows[1][1], None);
    }

    #[test]
    fn sparql_json_without_bindings_is_a_parse_error() {
        assert!(SparqlJson.rows("{\"status\": \"ERROR\"}", &["x"]).is_err());
    }

    #[test]
    fn qlever_json_maps_selected_columns() {
        let body = r#"{
            "selected": ["?timestamp"],
            "res": [["\"2025-01-04T21:21:15\"^^<http://www.w3.org/2001/XMLSchema#dateTime>"]]
        }"#;
        let rows = QleverJson.rows(body, &["timestamp"]).unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("2025-01-04T21:21:15"));
    }

    #[test]
    fn qlever_json_unwraps_iris() {
        let body = r#"{
            "selected": ["?way", "?node"],
            "res": [["<https://www.openstreetmap.org/way/7>", null]]
        }"#;
        let rows = QleverJson.rows(body, &["node", "way"]).unwrap();
        assert_eq!(rows[0][0], None);
        assert_eq!(
            rows[0][1].as_deref(),
            Some("https://www.openstreetmap.org/way/7")
        );
    }

    #[test]
    fn qlever_json_rejects_unknown_variables() {
        let body = r#"{"selected": ["?a"], "res": []}"#;
        assert!(QleverJson.rows(body, &["b"]).is_err());
    }
}
