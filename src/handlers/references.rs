//! Collection of ids that are referenced by the change file (or by geometry
//! dependents) but are not themselves part of it. These are the objects that
//! must be synthesized from endpoint state.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::handlers::{NodeHandler, RelationHandler, WayHandler};
use crate::models::{OsmId, OsmKind, Relation, Way};
use crate::sparql::DataFetcher;

#[derive(Debug, Default)]
pub struct ReferencesHandler {
    pub nodes: BTreeSet<OsmId>,
    pub ways: BTreeSet<OsmId>,
    pub relations: BTreeSet<OsmId>,
}

impl ReferencesHandler {
    /// Record the member nodes of a change-file way that the change file does
    /// not itself contain. Every node of the file must have been routed
    /// before this is called.
    pub fn scan_way(&mut self, way: &Way, nodes: &NodeHandler) {
        for &node_id in &way.members {
            if !nodes.in_change_file(node_id) {
                self.nodes.insert(node_id);
            }
        }
    }

    /// Record the members of a change-file relation that the change file does
    /// not itself contain.
    pub fn scan_relation(
        &mut self,
        relation: &Relation,
        nodes: &NodeHandler,
        ways: &WayHandler,
        relations: &RelationHandler,
    ) {
        for member in &relation.members {
            match member.kind {
                OsmKind::Node => {
                    if !nodes.in_change_file(member.id) {
                        self.nodes.insert(member.id);
                    }
                }
                OsmKind::Way => {
                    if !ways.in_change_file(member.id) {
                        self.ways.insert(member.id);
                    }
                }
                OsmKind::Relation => {
                    if !relations.in_change_file(member.id) {
                        self.relations.insert(member.id);
                    }
                }
            }
        }
    }

    /// Fetch the member nodes of ways that will be synthesized, so their
    /// locations can be materialized too.
    pub async fn collect_for_ways(
        &mut self,
        way_ids: &BTreeSet<OsmId>,
        nodes_in_change_file: &BTreeSet<OsmId>,
        fetcher: &DataFetcher,
    ) -> Result<()> {
        if way_ids.is_empty() {
            return Ok(());
        }
        for node_id in fetcher.way_referenced_nodes(way_ids).await? {
            if !nodes_in_change_file.contains(&node_id) {
                self.nodes.insert(node_id);
            }
        }
        Ok(())
    }

    /// Fetch the member nodes and ways of relations that will be synthesized.
    pub async fn collect_for_relations(
        &mut self,
        relation_ids: &BTreeSet<OsmId>,
        nodes_in_change_file: &BTreeSet<OsmId>,
        ways_in_change_file: &BTreeSet<OsmId>,
        fetcher: &DataFetcher,
    ) -> Result<()> {
        if relation_ids.is_empty() {
            return Ok(());
        }
        let (node_ids, way_ids) = fetcher.relation_member_ids(relation_ids).await?;
        for node_id in node_ids {
            if !nodes_in_change_file.contains(&node_id) {
                self.nodes.insert(node_id);
            }
        }
        for way_id in way_ids {
            if !ways_in_change_file.contains(&way_id) {
                self.ways.insert(way_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Meta, Node, RelationMember};

    #[test]
    fn way_members_missing_from_change_file_become_references() {
        let mut nodes = NodeHandler::default();
        nodes.node(&Node {
            id: 1,
            loc: None,
            tags: Vec::new(),
            meta: Meta {
                version: 1,
                ..Default::default()
            },
        });

        let way = Way {
            id: 100,
            members: vec![1, 2, 3],
            tags: Vec::new(),
            meta: Meta {
                version: 3,
                ..Default::default()
            },
        };

        let mut references = ReferencesHandler::default();
        references.scan_way(&way, &nodes);
        assert_eq!(
            references.nodes.iter().copied().collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn relation_members_are_split_by_kind() {
        let nodes = NodeHandler::default();
        let ways = WayHandler::default();
        let relations = RelationHandler::default();

        let relation = Relation {
            id: 200,
            members: vec![
                RelationMember {
                    id: 1,
                    kind: OsmKind::Node,
                    role: String::new(),
                },
                RelationMember {
                    id: 2,
                    kind: OsmKind::Way,
                    role: "outer".into(),
                },
                RelationMember {
                    id: 201,
                    kind: OsmKind::Relation,
                    role: String::new(),
                },
            ],
            tags: Vec::new(),
            meta: Meta {
                version: 2,
                ..Default::default()
            },
        };

        let mut references = ReferencesHandler::default();
        references.scan_relation(&relation, &nodes, &ways, &relations);
        assert!(references.nodes.contains(&1));
        assert!(references.ways.contains(&2));
        assert!(references.relations.contains(&201));
    }
}
