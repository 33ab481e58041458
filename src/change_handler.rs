//! Processes one merged change file end to end: classify, discover
//! dependents, fetch references, synthesize dummies, convert, filter, then
//! delete and insert in batches.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::Config;
use crate::convert::Converter;
use crate::dummy::DummyBuilder;
use crate::error::{Error, Result};
use crate::filter::{self, FilteredOutput, RelevanceScope};
use crate::handlers::{NodeHandler, ReferencesHandler, RelationHandler, WayHandler};
use crate::models::{ChangeAction, OsmId, OsmKind, OsmObject};
use crate::osc::reader;
use crate::sparql::DataFetcher;
use crate::sparql::fetcher::in_batches;
use crate::stats::RunStats;
use crate::vocab;

pub struct ChangeHandler<'a> {
    config: &'a Config,
    fetcher: &'a DataFetcher,
    stats: &'a RunStats,
    nodes: NodeHandler,
    ways: WayHandler,
    relations: RelationHandler,
    references: ReferencesHandler,
    ways_to_update_geometry: BTreeSet<OsmId>,
    relations_to_update_geometry: BTreeSet<OsmId>,
    objects: Vec<OsmObject>,
}

impl<'a> ChangeHandler<'a> {
    pub fn new(config: &'a Config, fetcher: &'a DataFetcher, stats: &'a RunStats) -> Self {
        ChangeHandler {
            config,
            fetcher,
            stats,
            nodes: NodeHandler::default(),
            ways: WayHandler::default(),
            relations: RelationHandler::default(),
            references: ReferencesHandler::default(),
            ways_to_update_geometry: BTreeSet::new(),
            relations_to_update_geometry: BTreeSet::new(),
            objects: Vec::new(),
        }
    }

    pub async fn run(&mut self, merged: &Path) -> Result<()> {
        {
            let _timer = self.stats.phase("classifying change file");
            self.classify(merged).await?;
        }
        self.verify_classification()?;

        {
            let _timer = self.stats.phase("discovering geometry dependents");
            self.discover_dependents().await?;
        }
        {
            let _timer = self.stats.phase("fetching references");
            self.collect_references().await?;
        }

        let filtered = {
            let _timer = self.stats.phase("synthesizing and converting");
            let builder = self.synthesize_dummies().await?;
            self.write_converter_input(&builder)?;
            let converter = Converter::new(
                &self.config.osm2rdf_binary,
                &self.config.scratch_dir(),
            );
            converter
                .convert(&self.config.converter_input(), &self.config.converter_output())
                .await?;
            let _filter_timer = self.stats.phase("filtering triples");
            filter::filter_converter_output(&self.config.converter_output(), &self.relevance_scope())?
        };

        {
            let _timer = self.stats.phase("deleting triples");
            self.delete_phase().await?;
        }
        {
            let _timer = self.stats.phase("inserting triples");
            self.insert_phase(&filtered).await?;
        }
        Ok(())
    }

    async fn classify(&mut self, merged: &Path) -> Result<()> {
        self.objects = reader::read_osc(merged, self.config.wkt_precision)?;

        for object in &self.objects {
            match object {
                OsmObject::Node(node) => self.nodes.node(node),
                OsmObject::Way(way) => self.ways.way(way),
                OsmObject::Relation(relation) => self.relations.relation(relation),
            }
        }

        self.nodes.check_locations(self.fetcher).await?;
        self.ways
            .check_members(&self.nodes.modified_with_changed_location, self.fetcher)
            .await?;
        self.relations
            .check_members(
                &self.nodes.modified_with_changed_location,
                &self.ways.modified_with_changed_members,
                self.fetcher,
            )
            .await?;

        // Reference scan happens after classification so membership checks
        // see the complete per-kind sets.
        for object in &self.objects {
            match object {
                OsmObject::Way(way) => self.references.scan_way(way, &self.nodes),
                OsmObject::Relation(relation) => self.references.scan_relation(
                    relation,
                    &self.nodes,
                    &self.ways,
                    &self.relations,
                ),
                OsmObject::Node(_) => {}
            }
        }

        self.stats.set_kind_counts(0, self.nodes.counts());
        self.stats.set_kind_counts(1, self.ways.counts());
        self.stats.set_kind_counts(2, self.relations.counts());
        tracing::info!(
            "nodes: {} created, {} modified, {} moved, {} deleted",
            self.nodes.created.len(),
            self.nodes.modified.len(),
            self.nodes.modified_with_changed_location.len(),
            self.nodes.deleted.len()
        );
        tracing::info!(
            "ways: {} created, {} modified, {} with changed members, {} deleted",
            self.ways.created.len(),
            self.ways.modified.len(),
            self.ways.modified_with_changed_members.len(),
            self.ways.deleted.len()
        );
        tracing::info!(
            "relations: {} created, {} modified, {} with changed members, {} deleted",
            self.relations.created.len(),
            self.relations.modified.len(),
            self.relations.modified_with_changed_members.len(),
            self.relations.deleted.len()
        );
        Ok(())
    }

    /// The four per-kind sets must partition the ids seen in the change
    /// file, and no reference may overlap a work set.
    fn verify_classification(&self) -> Result<()> {
        verify_disjoint(
            "nodes",
            &[
                &self.nodes.created,
                &self.nodes.modified,
                &self.nodes.modified_with_changed_location,
                &self.nodes.deleted,
            ],
        )?;
        verify_disjoint(
            "ways",
            &[
                &self.ways.created,
                &self.ways.modified,
                &self.ways.modified_with_changed_members,
                &self.ways.deleted,
            ],
        )?;
        verify_disjoint(
            "relations",
            &[
                &self.relations.created,
                &self.relations.modified,
                &self.relations.modified_with_changed_members,
                &self.relations.deleted,
            ],
        )?;

        if self.references.nodes.iter().any(|id| self.nodes.in_change_file(*id))
            || self.references.ways.iter().any(|id| self.ways.in_change_file(*id))
            || self
                .references
                .relations
                .iter()
                .any(|id| self.relations.in_change_file(*id))
        {
            return Err(Error::Integrity(
                "a referenced id is also part of a work set".into(),
            ));
        }
        Ok(())
    }

    /// Ways and relations whose geometry must be recomputed because a
    /// referenced object changed, excluding anything already in the change
    /// file. A modified multipolygon or boundary relation gets its area
    /// geometry rebuilt as well.
    async fn discover_dependents(&mut self) -> Result<()> {
        let changed_nodes = &self.nodes.modified_with_changed_location;
        if !changed_nodes.is_empty() {
            for way_id in self.fetcher.ways_referencing_nodes(changed_nodes).await? {
                if !self.ways.in_change_file(way_id) {
                    self.ways_to_update_geometry.insert(way_id);
                }
            }
            for rel_id in self
                .fetcher
                .relations_referencing_nodes(changed_nodes)
                .await?
            {
                self.relations_to_update_geometry.insert(rel_id);
            }
        }

        let changed_ways = &self.ways.modified_with_changed_members;
        if !changed_ways.is_empty() {
            for rel_id in self.fetcher.relations_referencing_ways(changed_ways).await? {
                self.relations_to_update_geometry.insert(rel_id);
            }
        }

        let changed_relations = &self.relations.modified_with_changed_members;
        if !changed_relations.is_empty() {
            for rel_id in self
                .fetcher
                .relations_referencing_relations(changed_relations)
                .await?
            {
                self.relations_to_update_geometry.insert(rel_id);
            }
        }

        self.relations_to_update_geometry
            .retain(|id| !self.relations.in_change_file(*id));
        self.relations_to_update_geometry
            .extend(self.relations.modified_areas.iter().copied());

        tracing::info!(
            "geometry dependents: {} ways, {} relations",
            self.ways_to_update_geometry.len(),
            self.relations_to_update_geometry.len()
        );
        Ok(())
    }

    /// Close the reference sets over the members of everything that will be
    /// synthesized: relations first (they add ways), then ways (they add
    /// nodes).
    async fn collect_references(&mut self) -> Result<()> {
        let nodes_in_file = self.all_node_ids();
        let ways_in_file = self.all_way_ids();

        let mut relations_needed = self.references.relations.clone();
        relations_needed.extend(
            self.relations_to_update_geometry
                .iter()
                .filter(|id| !self.relations.in_change_file(**id)),
        );
        self.references
            .collect_for_relations(&relations_needed, &nodes_in_file, &ways_in_file, self.fetcher)
            .await?;

        let mut ways_needed = self.references.ways.clone();
        ways_needed.extend(self.ways_to_update_geometry.iter().copied());
        self.references
            .collect_for_ways(&ways_needed, &nodes_in_file, self.fetcher)
            .await?;
        Ok(())
    }

    async fn synthesize_dummies(&mut self) -> Result<DummyBuilder> {
        let mut builder = DummyBuilder::new(&self.config.dummy_dir());

        let locations = self.fetcher.node_locations(&self.references.nodes).await?;
        for (id, location) in &locations {
            builder.add_node(*id, location);
        }
        let missing = self.references.nodes.len() - locations.len();
        if missing > 0 {
            tracing::warn!("{missing} referenced nodes have no location on the endpoint");
        }

        let mut ways_needed = self.references.ways.clone();
        ways_needed.extend(self.ways_to_update_geometry.iter().copied());
        for (id, members) in self.fetcher.ways_members(&ways_needed).await? {
            builder.add_way(id, &members);
        }

        let mut relations_needed = self.references.relations.clone();
        relations_needed.extend(
            self.relations_to_update_geometry
                .iter()
                .filter(|id| !self.relations.in_change_file(**id)),
        );
        for (id, (rel_type, members)) in
            self.fetcher.relations_members(&relations_needed).await?
        {
            builder.add_relation(id, &rel_type, &members);
        }

        self.stats.set_dummy_counts(
            builder.nodes.len() as u64,
            builder.ways.len() as u64,
            builder.relations.len() as u64,
        );
        builder.write_files()?;
        Ok(builder)
    }

    /// Merge the change-file objects (tombstones excluded) with the dummy
    /// elements into one id-sorted OSM document per kind.
    fn write_converter_input(&self, builder: &DummyBuilder) -> Result<()> {
        let mut per_kind: [BTreeMap<OsmId, String>; 3] = [
            builder.nodes.clone(),
            builder.ways.clone(),
            builder.relations.clone(),
        ];
        for object in &self.objects {
            if object.action() == ChangeAction::Delete {
                continue;
            }
            let index = match object.kind() {
                OsmKind::Node => 0,
                OsmKind::Way => 1,
                OsmKind::Relation => 2,
            };
            per_kind[index].insert(object.id(), object.to_xml());
        }

        let mut out = BufWriter::new(File::create(self.config.converter_input())?);
        writeln!(out, "<?xml version='1.0' encoding='UTF-8'?>")?;
        writeln!(out, "<osm version=\"0.6\" generator=\"osm-rdf-sync\">")?;
        for kind in &per_kind {
            for element in kind.values() {
                writeln!(out, "{element}")?;
            }
        }
        writeln!(out, "</osm>")?;
        out.flush()?;
        Ok(())
    }

    /// The id sets the filter keeps triples for.
    fn relevance_scope(&self) -> RelevanceScope {
        let mut scope = RelevanceScope::default();
        scope.nodes.extend(&self.nodes.created);
        scope.nodes.extend(&self.nodes.modified);
        scope.nodes.extend(&self.nodes.modified_with_changed_location);

        scope.ways_full.extend(&self.ways.created);
        scope.ways_full.extend(&self.ways.modified_with_changed_members);
        scope.ways_full.extend(&self.ways_to_update_geometry);
        scope.ways_tags_only.extend(&self.ways.modified);

        scope.relations_full.extend(&self.relations.created);
        scope
            .relations_full
            .extend(&self.relations.modified_with_changed_members);
        scope
            .relations_full
            .extend(&self.relations_to_update_geometry);
        scope.relations_tags_only.extend(&self.relations.modified);
        scope
            .relations_tags_only
            .retain(|id| !scope.relations_full.contains(id));
        scope
    }

    // ── Delete phase ──

    /// Ids per kind that lose every triple: deleted and structure-changed
    /// objects, plus creations (which may be effective modifies of state the
    /// endpoint already has). Location-unchanged node modifies are included
    /// because their tags may have changed and nodes have no scoped delete.
    fn full_delete_sets(&self) -> [BTreeSet<OsmId>; 3] {
        let mut nodes = BTreeSet::new();
        nodes.extend(&self.nodes.deleted);
        nodes.extend(&self.nodes.created);
        nodes.extend(&self.nodes.modified);
        nodes.extend(&self.nodes.modified_with_changed_location);

        let mut ways = BTreeSet::new();
        ways.extend(&self.ways.deleted);
        ways.extend(&self.ways.created);
        ways.extend(&self.ways.modified_with_changed_members);

        let mut relations = BTreeSet::new();
        relations.extend(&self.relations.deleted);
        relations.extend(&self.relations.created);
        relations.extend(&self.relations.modified_with_changed_members);

        [nodes, ways, relations]
    }

    async fn delete_phase(&self) -> Result<()> {
        let writer = self.fetcher.writer();
        let [nodes, ways, relations] = self.full_delete_sets();

        for (kind, ids, prefixes) in [
            (OsmKind::Node, &nodes, vocab::PREFIXES_FOR_FULL_DELETE_NODE),
            (OsmKind::Way, &ways, vocab::PREFIXES_FOR_FULL_DELETE_WAY),
            (
                OsmKind::Relation,
                &relations,
                vocab::PREFIXES_FOR_FULL_DELETE_REL,
            ),
        ] {
            for batch in in_batches(ids, self.config.batch_size) {
                self.run_update(prefixes, &writer.delete_objects(kind, &batch))
                    .await?;
            }
        }

        for (kind, ids, prefixes) in [
            (
                OsmKind::Way,
                &self.ways.modified,
                vocab::PREFIXES_FOR_TAGS_AND_META_DELETE_WAY,
            ),
            (
                OsmKind::Relation,
                &self.relations.modified,
                vocab::PREFIXES_FOR_TAGS_AND_META_DELETE_REL,
            ),
        ] {
            for batch in in_batches(ids, self.config.batch_size) {
                self.run_update(prefixes, &writer.delete_tags_and_meta(kind, &batch))
                    .await?;
            }
        }

        for (kind, ids, prefixes) in [
            (
                OsmKind::Way,
                &self.ways_to_update_geometry,
                vocab::PREFIXES_FOR_GEOMETRY_DELETE_WAY,
            ),
            (
                OsmKind::Relation,
                &self.relations_to_update_geometry,
                vocab::PREFIXES_FOR_GEOMETRY_DELETE_REL,
            ),
        ] {
            for batch in in_batches(ids, self.config.batch_size) {
                for query in writer.delete_geometry(kind, &batch) {
                    self.run_update(prefixes, &query).await?;
                }
            }
        }

        for (kind, ids, prefixes) in [
            (
                OsmKind::Way,
                &self.ways.modified_with_changed_members,
                vocab::PREFIXES_FOR_MEMBER_DELETE_WAY,
            ),
            (
                OsmKind::Relation,
                &self.relations.modified_with_changed_members,
                vocab::PREFIXES_FOR_MEMBER_DELETE_REL,
            ),
        ] {
            for batch in in_batches(ids, self.config.batch_size) {
                self.run_update(prefixes, &writer.delete_member_hubs(kind, &batch))
                    .await?;
            }
        }

        Ok(())
    }

    // ── Insert phase ──

    async fn insert_phase(&self, filtered: &FilteredOutput) -> Result<()> {
        let writer = self.fetcher.writer();
        let prefix_block = filtered.prefixes.join(" ");
        for batch in filtered.triples.chunks(self.config.batch_size) {
            let query = writer.insert_data(batch);
            let update = if prefix_block.is_empty() {
                query
            } else {
                format!("{prefix_block} {query}")
            };
            self.stats.count_update();
            self.fetcher.client().update(&update).await?;
            self.stats.count_inserted_triples(batch.len() as u64);
        }
        tracing::info!("inserted {} relevant triples", filtered.triples.len());
        Ok(())
    }

    async fn run_update(&self, prefixes: &[&str], query: &str) -> Result<()> {
        self.stats.count_update();
        let update = if prefixes.is_empty() {
            query.to_string()
        } else {
            format!("{} {query}", prefixes.join(" "))
        };
        self.fetcher.client().update(&update).await
    }

    fn all_node_ids(&self) -> BTreeSet<OsmId> {
        let mut ids = BTreeSet::new();
        ids.extend(&self.nodes.created);
        ids.extend(&self.nodes.modified);
        ids.extend(&self.nodes.modified_with_changed_location);
        ids.extend(&self.nodes.deleted);
        ids
    }

    fn all_way_ids(&self) -> BTreeSet<OsmId> {
        let mut ids = BTreeSet::new();
        ids.extend(&self.ways.created);
        ids.extend(&self.ways.modified);
        ids.extend(&self.ways.modified_with_changed_members);
        ids.extend(&self.ways.deleted);
        ids
    }
}

fn verify_disjoint(kind: &str, sets: &[&BTreeSet<OsmId>]) -> Result<()> {
    for (index, first) in sets.iter().enumerate() {
        for second in &sets[index + 1..] {
            if let Some(id) = first.intersection(second).next() {
                return Err(Error::Integrity(format!(
                    "{kind} id {id} is classified into two sets"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cli, Config};
    use crate::sparql::client::{ACCEPT_SPARQL_JSON, SparqlClient};
    use crate::sparql::queries::QueryWriter;
    use crate::sparql::results::SparqlJson;
    use clap::Parser;
    use std::sync::Arc;

    fn test_setup(dir: &Path) -> (Config, DataFetcher, Arc<RunStats>) {
        let cli = Cli::parse_from([
            "osm-rdf-sync",
            "http://localhost:1/never-contacted",
            "--input",
            dir.to_str().unwrap(),
        ]);
        let mut config = Config::from_cli(cli).unwrap();
        config.tmp_dir = dir.join("tmp");
        let stats = Arc::new(RunStats::default());
        let client = SparqlClient::new(
            "http://localhost:1/never-contacted",
            "http://localhost:1/never-contacted",
            None,
            ACCEPT_SPARQL_JSON,
            crate::sparql::OutputMode::Endpoint,
            None,
        )
        .unwrap();
        let fetcher = DataFetcher::new(
            client,
            Box::new(SparqlJson),
            QueryWriter::new(None),
            config.max_values_per_query,
            config.wkt_precision,
            stats.clone(),
        );
        (config, fetcher, stats)
    }

    #[test]
    fn relevance_scope_splits_full_and_tags_only() {
        let dir = tempfile::tempdir().unwrap();
        let (config, fetcher, stats) = test_setup(dir.path());
        let mut handler = ChangeHandler::new(&config, &fetcher, &stats);

        handler.nodes.created.insert(1);
        handler.nodes.modified.insert(2);
        handler.nodes.modified_with_changed_location.insert(3);
        handler.nodes.deleted.insert(4);

        handler.ways.created.insert(10);
        handler.ways.modified.insert(11);
        handler.ways.modified_with_changed_members.insert(12);
        handler.ways_to_update_geometry.insert(13);

        handler.relations.modified.insert(20);
        handler.relations_to_update_geometry.insert(20);

        let scope = handler.relevance_scope();
        assert_eq!(scope.nodes, [1, 2, 3].into_iter().collect::<BTreeSet<_>>());
        assert_eq!(
            scope.ways_full,
            [10, 12, 13].into_iter().collect::<BTreeSet<_>>()
        );
        assert_eq!(
            scope.ways_tags_only,
            [11].into_iter().collect::<BTreeSet<_>>()
        );
        // A relation that is both structure-unchanged and a geometry
        // dependent keeps all its triples.
        assert!(scope.relations_full.contains(&20));
        assert!(!scope.relations_tags_only.contains(&20));
    }

    #[test]
    fn full_delete_sets_cover_tombstones_and_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let (config, fetcher, stats) = test_setup(dir.path());
        let mut handler = ChangeHandler::new(&config, &fetcher, &stats);

        handler.nodes.created.insert(1);
        handler.nodes.modified.insert(2);
        handler.nodes.deleted.insert(3);
        handler.ways.modified.insert(10);
        handler.ways.modified_with_changed_members.insert(11);
        handler.relations.deleted.insert(20);

        let [nodes, ways, relations] = handler.full_delete_sets();
        assert_eq!(nodes, [1, 2, 3].into_iter().collect::<BTreeSet<_>>());
        // Structure-unchanged ways are handled by the scoped tags+meta
        // delete, not the full delete.
        assert_eq!(ways, [11].into_iter().collect::<BTreeSet<_>>());
        assert_eq!(relations, [20].into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn overlapping_classification_is_an_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let (config, fetcher, stats) = test_setup(dir.path());
        let mut handler = ChangeHandler::new(&config, &fetcher, &stats);

        handler.nodes.created.insert(5);
        handler.nodes.deleted.insert(5);
        assert!(matches!(
            handler.verify_classification(),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn converter_input_merges_dummies_and_change_objects() {
        let dir = tempfile::tempdir().unwrap();
        let (config, fetcher, stats) = test_setup(dir.path());
        std::fs::create_dir_all(&config.tmp_dir).unwrap();
        let mut handler = ChangeHandler::new(&config, &fetcher, &stats);

        handler.objects = vec![
            OsmObject::Node(crate::models::Node {
                id: 5,
                loc: crate::models::Location::new("1.0", "2.0", 7),
                tags: Vec::new(),
                meta: crate::models::Meta {
                    version: 1,
                    ..Default::default()
                },
            }),
            OsmObject::Node(crate::models::Node {
                id: 6,
                loc: None,
                tags: Vec::new(),
                meta: crate::models::Meta {
                    version: 2,
                    deleted: true,
                    ..Default::default()
                },
            }),
        ];

        let mut builder = DummyBuilder::new(&config.dummy_dir());
        builder.add_node(3, &crate::models::Location::new("0.5", "0.5", 7).unwrap());
        handler.write_converter_input(&builder).unwrap();

        let written = std::fs::read_to_string(config.converter_input()).unwrap();
        let dummy_pos = written.find("<node id=\"3\"").unwrap();
        let created_pos = written.find("<node id=\"5\"").unwrap();
        assert!(dummy_pos < created_pos);
        // Tombstones never reach the converter.
        assert!(!written.contains("<node id=\"6\""));
    }
}
