//! Typed, batched fetch operations against the SPARQL endpoint. Each call is
//! one query per batch: template + VALUES clause + the PREFIX declarations
//! the template needs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{Location, OsmId, OsmKind, RelationMember};
use crate::sparql::client::SparqlClient;
use crate::sparql::queries::QueryWriter;
use crate::sparql::results::ResultFormat;
use crate::stats::RunStats;
use crate::uri;
use crate::vocab;

/// Split an id set into query-sized batches.
pub fn in_batches(ids: &BTreeSet<OsmId>, size: usize) -> Vec<BTreeSet<OsmId>> {
    let mut batches = Vec::new();
    let mut current = BTreeSet::new();
    for &id in ids {
        current.insert(id);
        if current.len() == size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

pub struct DataFetcher {
    client: SparqlClient,
    format: Box<dyn ResultFormat>,
    writer: QueryWriter,
    max_values: usize,
    wkt_precision: u8,
    stats: Arc<RunStats>,
}

impl DataFetcher {
    pub fn new(
        client: SparqlClient,
        format: Box<dyn ResultFormat>,
        writer: QueryWriter,
        max_values: usize,
        wkt_precision: u8,
        stats: Arc<RunStats>,
    ) -> Self {
        DataFetcher {
            client,
            format,
            writer,
            max_values,
            wkt_precision,
            stats,
        }
    }

    pub fn writer(&self) -> &QueryWriter {
        &self.writer
    }

    pub fn client(&self) -> &SparqlClient {
        &self.client
    }

    async fn run_select(
        &self,
        prefixes: &[&str],
        query: &str,
        vars: &[&str],
    ) -> Result<Vec<Vec<Option<String>>>> {
        self.stats.count_query();
        let full = format!("{} {query}", prefixes.join(" "));
        let body = self.client.select(&full).await?;
        self.format.rows(&body, vars)
    }

    fn check_cardinality(returned: usize, requested: usize, what: &str) -> Result<()> {
        if returned > requested {
            return Err(Error::Data(format!(
                "endpoint returned {returned} {what} for {requested} requested ids"
            )));
        }
        Ok(())
    }

    /// Current stored locations of the given nodes. Nodes unknown to the
    /// endpoint are simply absent from the result.
    pub async fn node_locations(
        &self,
        ids: &BTreeSet<OsmId>,
    ) -> Result<BTreeMap<OsmId, Location>> {
        let mut locations = BTreeMap::new();
        for batch in in_batches(ids, self.max_values) {
            let query = self.writer.node_locations(&batch);
            let rows = self
                .run_select(
                    vocab::PREFIXES_FOR_NODE_LOCATIONS,
                    &query,
                    &["nodeGeo", "location"],
                )
                .await?;
            Self::check_cardinality(rows.len(), batch.len(), "node locations")?;
            for row in rows {
                let (Some(subject), Some(wkt)) = (&row[0], &row[1]) else {
                    continue;
                };
                let id = uri::parse_id(subject)?;
                locations.insert(id, parse_wkt_point(wkt, self.wkt_precision)?);
            }
        }
        Ok(locations)
    }

    /// Current ordered member lists of the given ways.
    pub async fn ways_members(
        &self,
        ids: &BTreeSet<OsmId>,
    ) -> Result<BTreeMap<OsmId, Vec<OsmId>>> {
        let mut members = BTreeMap::new();
        for batch in in_batches(ids, self.max_values) {
            let query = self.writer.ways_members(&batch);
            let rows = self
                .run_select(
                    vocab::PREFIXES_FOR_WAY_MEMBERS,
                    &query,
                    &["way", "memberIds", "memberPoss"],
                )
                .await?;
            Self::check_cardinality(rows.len(), batch.len(), "way member lists")?;
            for row in rows {
                let (Some(way), Some(ids_list), Some(pos_list)) = (&row[0], &row[1], &row[2])
                else {
                    continue;
                };
                let way_id = uri::parse_id(way)?;
                let member_ids = parse_id_list(ids_list)?;
                let positions = parse_position_list(pos_list)?;
                members.insert(way_id, sort_by_position(member_ids, positions, way_id)?);
            }
        }
        Ok(members)
    }

    /// Current type tag and ordered member list of the given relations.
    pub async fn relations_members(
        &self,
        ids: &BTreeSet<OsmId>,
    ) -> Result<BTreeMap<OsmId, (String, Vec<RelationMember>)>> {
        let mut relations = BTreeMap::new();
        for batch in in_batches(ids, self.max_values) {
            let query = self.writer.relations_members(&batch);
            let rows = self
                .run_select(
                    vocab::PREFIXES_FOR_RELATION_MEMBERS,
                    &query,
                    &["rel", "type", "memberIds", "memberRoles", "memberPoss"],
                )
                .await?;
            Self::check_cardinality(rows.len(), batch.len(), "relation member lists")?;
            for row in rows {
                let (Some(rel), Some(rel_type), Some(ids_list), Some(role_list), Some(pos_list)) =
                    (&row[0], &row[1], &row[2], &row[3], &row[4])
                else {
                    continue;
                };
                let rel_id = uri::parse_id(rel)?;
                let member_terms: Vec<&str> = ids_list.split(';').collect();
                let roles: Vec<&str> = role_list.split(';').collect();
                let positions = parse_position_list(pos_list)?;
                if member_terms.len() != roles.len() || member_terms.len() != positions.len() {
                    return Err(Error::Data(format!(
                        "relation {rel_id} member lists have mismatched lengths"
                    )));
                }

                let mut ordered: Vec<(i64, RelationMember)> = member_terms
                    .iter()
                    .zip(roles.iter())
                    .zip(positions.iter())
                    .map(|((term, role), &pos)| {
                        Ok((
                            pos,
                            RelationMember {
                                id: uri::parse_id(term)?,
                                kind: uri::parse_kind(term)?,
                                role: (*role).to_string(),
                            },
                        ))
                    })
                    .collect::<Result<_>>()?;
                ordered.sort_by_key(|(pos, _)| *pos);
                relations.insert(
                    rel_id,
                    (
                        rel_type.clone(),
                        ordered.into_iter().map(|(_, member)| member).collect(),
                    ),
                );
            }
        }
        Ok(relations)
    }

    /// Distinct node ids referenced by the given ways.
    pub async fn way_referenced_nodes(&self, ids: &BTreeSet<OsmId>) -> Result<BTreeSet<OsmId>> {
        self.fetch_id_set(
            ids,
            vocab::PREFIXES_FOR_WAY_MEMBERS,
            |writer, batch| writer.way_referenced_nodes(batch),
            "node",
        )
        .await
    }

    /// Distinct node and way member ids of the given relations.
    pub async fn relation_member_ids(
        &self,
        ids: &BTreeSet<OsmId>,
    ) -> Result<(BTreeSet<OsmId>, BTreeSet<OsmId>)> {
        let mut nodes = BTreeSet::new();
        let mut ways = BTreeSet::new();
        for batch in in_batches(ids, self.max_values) {
            let query = self.writer.relation_member_ids(&batch);
            let rows = self
                .run_select(vocab::PREFIXES_FOR_RELATION_MEMBERS, &query, &["member"])
                .await?;
            for row in rows {
                let Some(term) = &row[0] else { continue };
                match uri::parse_kind(term) {
                    Ok(OsmKind::Node) => {
                        nodes.insert(uri::parse_id(term)?);
                    }
                    Ok(OsmKind::Way) => {
                        ways.insert(uri::parse_id(term)?);
                    }
                    _ => {}
                }
            }
        }
        Ok((nodes, ways))
    }

    pub async fn ways_referencing_nodes(
        &self,
        ids: &BTreeSet<OsmId>,
    ) -> Result<BTreeSet<OsmId>> {
        self.fetch_id_set(
            ids,
            vocab::PREFIXES_FOR_WAYS_REFERENCING_NODES,
            |writer, batch| writer.ways_referencing_nodes(batch),
            "way",
        )
        .await
    }

    pub async fn relations_referencing_nodes(
        &self,
        ids: &BTreeSet<OsmId>,
    ) -> Result<BTreeSet<OsmId>> {
        self.fetch_id_set(
            ids,
            vocab::PREFIXES_FOR_RELATIONS_REFERENCING_NODES,
            |writer, batch| writer.relations_referencing_nodes(batch),
            "rel",
        )
        .await
    }

    pub async fn relations_referencing_ways(
        &self,
        ids: &BTreeSet<OsmId>,
    ) -> Result<BTreeSet<OsmId>> {
        self.fetch_id_set(
            ids,
            vocab::PREFIXES_FOR_RELATIONS_REFERENCING_WAYS,
            |writer, batch| writer.relations_referencing_ways(batch),
            "rel",
        )
        .await
    }

    pub async fn relations_referencing_relations(
        &self,
        ids: &BTreeSet<OsmId>,
    ) -> Result<BTreeSet<OsmId>> {
        self.fetch_id_set(
            ids,
            vocab::PREFIXES_FOR_RELATIONS_REFERENCING_RELATIONS,
            |writer, batch| writer.relations_referencing_relations(batch),
            "rel",
        )
        .await
    }

    async fn fetch_id_set(
        &self,
        ids: &BTreeSet<OsmId>,
        prefixes: &[&str],
        build: impl Fn(&QueryWriter, &BTreeSet<OsmId>) -> String,
        var: &str,
    ) -> Result<BTreeSet<OsmId>> {
        let mut out = BTreeSet::new();
        for batch in in_batches(ids, self.max_values) {
            let query = build(&self.writer, &batch);
            let rows = self.run_select(prefixes, &query, &[var]).await?;
            for row in rows {
                if let Some(term) = &row[0] {
                    out.insert(uri::parse_id(term)?);
                }
            }
        }
        Ok(out)
    }

    /// The most recent node timestamp stored on the endpoint.
    pub async fn latest_timestamp(&self) -> Result<String> {
        let query = self.writer.latest_timestamp();
        let rows = self
            .run_select(vocab::PREFIXES_FOR_LATEST_TIMESTAMP, &query, &["timestamp"])
            .await?;
        rows.into_iter()
            .next()
            .and_then(|row| row.into_iter().next().flatten())
            .ok_or_else(|| Error::Data("endpoint has no node timestamp".into()))
    }

    /// The stored watermark, or `None` when the endpoint was never updated.
    pub async fn updates_complete_until(&self) -> Result<Option<i64>> {
        let query = self.writer.updates_complete_until();
        let rows = self
            .run_select(vocab::PREFIXES_FOR_METADATA, &query, &["sequenceNumber"])
            .await?;
        let mut best = None;
        for row in rows {
            let Some(value) = &row[0] else { continue };
            match value.parse::<i64>() {
                Ok(number) => best = Some(best.map_or(number, |b: i64| b.max(number))),
                Err(_) => {
                    tracing::warn!("endpoint returned an invalid watermark value: {value}");
                }
            }
        }
        Ok(best)
    }

    /// The osm2rdf version recorded in the dump, if any. Warn-only metadata.
    pub async fn osm2rdf_version(&self) -> Result<Option<String>> {
        let query = self.writer.osm2rdf_version();
        let rows = self
            .run_select(vocab::PREFIXES_FOR_METADATA, &query, &["version"])
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next().flatten()))
    }

    /// All metadata triples at the info subject. Warn-only metadata.
    pub async fn osm2rdf_options(&self) -> Result<Vec<(String, String)>> {
        let query = self.writer.osm2rdf_options();
        let rows = self
            .run_select(vocab::PREFIXES_FOR_METADATA, &query, &["option", "value"])
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match (&row[0], &row[1]) {
                (Some(option), Some(value)) => Some((option.clone(), value.clone())),
                _ => None,
            })
            .collect())
    }
}

/// Extract a normalized location from a WKT point literal like
/// `POINT(7.8391234 47.9928773)`.
pub fn parse_wkt_point(wkt: &str, precision: u8) -> Result<Location> {
    let start = wkt.find('(');
    let end = wkt.find(')');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(Error::Parse(format!("malformed WKT point: {wkt}")));
    };
    let coords = &wkt[start + 1..end];
    let mut parts = coords.split_whitespace();
    let (Some(lon), Some(lat)) = (parts.next(), parts.next()) else {
        return Err(Error::Parse(format!("malformed WKT point: {wkt}")));
    };
    Location::new(lon, lat, precision)
        .ok_or_else(|| Error::Parse(format!("malformed WKT point: {wkt}")))
}

fn parse_id_list(list: &str) -> Result<Vec<OsmId>> {
    list.split(';').map(uri::parse_id).collect()
}

fn parse_position_list(list: &str) -> Result<Vec<i64>> {
    list.split(';')
        .map(|pos| {
            pos.parse::<i64>()
                .map_err(|e| Error::Parse(format!("invalid member position '{pos}': {e}")))
        })
        .collect()
}

/// The endpoint does not guarantee GROUP_CONCAT order, so members are sorted
/// by their stored position.
fn sort_by_position(
    member_ids: Vec<OsmId>,
    positions: Vec<i64>,
    owner: OsmId,
) -> Result<Vec<OsmId>> {
    if member_ids.len() != positions.len() {
        return Err(Error::Data(format!(
            "way {owner} member and position lists have mismatched lengths"
        )));
    }
    let mut paired: Vec<(i64, OsmId)> = positions.into_iter().zip(member_ids).collect();
    paired.sort();
    Ok(paired.into_iter().map(|(_, id)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_are_query_sized() {
        let ids: BTreeSet<OsmId> = (1..=7).collect();
        let batches = in_batches(&ids, 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[2].len(), 1);
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn wkt_point_parses_into_normalized_location() {
        let loc = parse_wkt_point("POINT(7.8391234 47.9928773)", 7).unwrap();
        assert_eq!(loc.lon, "7.8391234");
        assert_eq!(loc.lat, "47.9928773");
        let coarse = parse_wkt_point("POINT(7.8391234 47.9928773)", 3).unwrap();
        assert_eq!(coarse.lon, "7.839");
        assert!(parse_wkt_point("POINT 7 47", 7).is_err());
        assert!(parse_wkt_point("POINT()", 7).is_err());
    }

    #[test]
    fn members_sort_by_stored_position() {
        let sorted = sort_by_position(vec![30, 10, 20], vec![2, 0, 1], 5).unwrap();
        assert_eq!(sorted, vec![10, 20, 30]);
        assert!(sort_by_position(vec![1], vec![0, 1], 5).is_err());
    }

    #[test]
    fn id_lists_split_on_semicolons() {
        let ids = parse_id_list(
            "https://www.openstreetmap.org/node/1;https://www.openstreetmap.org/node/2",
        )
        .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }
}
