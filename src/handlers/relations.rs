//! Classification of the relations in a change file.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::models::{ChangeAction, OsmId, OsmKind, Relation, RelationMember};
use crate::sparql::DataFetcher;
use crate::stats::KindCounts;

/// Sorts relation ids into created / modified / modified-with-changed-members
/// / deleted, and tracks modified multipolygon/boundary relations whose area
/// geometry must be rebuilt.
#[derive(Debug, Default)]
pub struct RelationHandler {
    pub created: BTreeSet<OsmId>,
    pub modified: BTreeSet<OsmId>,
    pub modified_with_changed_members: BTreeSet<OsmId>,
    pub deleted: BTreeSet<OsmId>,
    pub modified_areas: BTreeSet<OsmId>,
    buffer: BTreeMap<OsmId, Vec<RelationMember>>,
}

impl RelationHandler {
    pub fn relation(&mut self, relation: &Relation) {
        match ChangeAction::from_meta(&relation.meta) {
            ChangeAction::Create => {
                self.created.insert(relation.id);
            }
            ChangeAction::Modify => {
                if matches!(relation.rel_type(), Some("multipolygon") | Some("boundary")) {
                    self.modified_areas.insert(relation.id);
                }
                self.buffer.insert(relation.id, relation.members.clone());
            }
            ChangeAction::Delete => {
                self.deleted.insert(relation.id);
            }
        }
    }

    pub async fn check_members(
        &mut self,
        nodes_with_changed_location: &BTreeSet<OsmId>,
        ways_with_changed_members: &BTreeSet<OsmId>,
        fetcher: &DataFetcher,
    ) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut to_compare = BTreeSet::new();
        for (&rel_id, members) in &self.buffer {
            let has_modified_member = members.iter().any(|member| match member.kind {
                OsmKind::Node => nodes_with_changed_location.contains(&member.id),
                OsmKind::Way => ways_with_changed_members.contains(&member.id),
                // A relation member may itself have changed geometry; that
                // cannot be decided from local data, so assume it did.
                OsmKind::Relation => true,
            });
            if has_modified_member {
                self.modified_with_changed_members.insert(rel_id);
            } else {
                to_compare.insert(rel_id);
            }
        }

        if !to_compare.is_empty() {
            let stored = fetcher.relations_members(&to_compare).await?;
            for rel_id in to_compare {
                let local = &self.buffer[&rel_id];
                match stored.get(&rel_id) {
                    Some((_, remote)) if remote == local => {
                        self.modified.insert(rel_id);
                    }
                    Some(_) => {
                        self.modified_with_changed_members.insert(rel_id);
                    }
                    None => {
                        self.created.insert(rel_id);
                    }
                }
            }
        }

        self.buffer.clear();
        Ok(())
    }

    /// True if the relation occurred in any changeset of the change file.
    /// Only valid once every relation of the file has been routed.
    pub fn in_change_file(&self, id: OsmId) -> bool {
        self.created.contains(&id)
            || self.modified.contains(&id)
            || self.modified_with_changed_members.contains(&id)
            || self.deleted.contains(&id)
            || self.buffer.contains_key(&id)
    }

    pub fn counts(&self) -> KindCounts {
        KindCounts {
            created: self.created.len() as u64,
            modified: self.modified.len() as u64,
            modified_structure_changed: self.modified_with_changed_members.len() as u64,
            deleted: self.deleted.len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Meta;

    fn relation(
        id: OsmId,
        version: i64,
        rel_type: &str,
        members: Vec<RelationMember>,
    ) -> Relation {
        Relation {
            id,
            members,
            tags: vec![("type".into(), rel_type.into())],
            meta: Meta {
                version,
                ..Default::default()
            },
        }
    }

    fn member(id: OsmId, kind: OsmKind) -> RelationMember {
        RelationMember {
            id,
            kind,
            role: String::new(),
        }
    }

    #[test]
    fn modified_multipolygons_are_tracked_as_areas() {
        let mut handler = RelationHandler::default();
        handler.relation(&relation(1, 2, "multipolygon", vec![member(5, OsmKind::Way)]));
        handler.relation(&relation(2, 2, "route", vec![member(6, OsmKind::Way)]));
        handler.relation(&relation(3, 1, "boundary", vec![member(7, OsmKind::Way)]));

        assert!(handler.modified_areas.contains(&1));
        assert!(!handler.modified_areas.contains(&2));
        // Created relations are not buffered as modified areas.
        assert!(!handler.modified_areas.contains(&3));
        assert!(handler.created.contains(&3));
    }
}
