//! Classification of the ways in a change file.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::models::{ChangeAction, OsmId, Way};
use crate::sparql::DataFetcher;
use crate::stats::KindCounts;

/// Sorts way ids into created / modified / modified-with-changed-members /
/// deleted. A way whose member list is unchanged still counts as structure
/// changed when one of its member nodes moved, because its geometry must be
/// rebuilt.
#[derive(Debug, Default)]
pub struct WayHandler {
    pub created: BTreeSet<OsmId>,
    pub modified: BTreeSet<OsmId>,
    pub modified_with_changed_members: BTreeSet<OsmId>,
    pub deleted: BTreeSet<OsmId>,
    buffer: BTreeMap<OsmId, Vec<OsmId>>,
}

impl WayHandler {
    pub fn way(&mut self, way: &Way) {
        match ChangeAction::from_meta(&way.meta) {
            ChangeAction::Create => {
                self.created.insert(way.id);
            }
            ChangeAction::Modify => {
                self.buffer.insert(way.id, way.members.clone());
            }
            ChangeAction::Delete => {
                self.deleted.insert(way.id);
            }
        }
    }

    pub async fn check_members(
        &mut self,
        nodes_with_changed_location: &BTreeSet<OsmId>,
        fetcher: &DataFetcher,
    ) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        // A moved member node forces a geometry rebuild regardless of the
        // member list itself.
        let mut to_compare = BTreeSet::new();
        for (&way_id, members) in &self.buffer {
            if members
                .iter()
                .any(|node_id| nodes_with_changed_location.contains(node_id))
            {
                self.modified_with_changed_members.insert(way_id);
            } else {
                to_compare.insert(way_id);
            }
        }

        if !to_compare.is_empty() {
            let stored = fetcher.ways_members(&to_compare).await?;
            for way_id in to_compare {
                let local = &self.buffer[&way_id];
                match stored.get(&way_id) {
                    Some(remote) if remote == local => {
                        self.modified.insert(way_id);
                    }
                    Some(_) => {
                        self.modified_with_changed_members.insert(way_id);
                    }
                    None => {
                        self.created.insert(way_id);
                    }
                }
            }
        }

        self.buffer.clear();
        Ok(())
    }

    /// True if the way occurred in any changeset of the change file. Only
    /// valid once every way of the file has been routed.
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

    fn way(id: OsmId, version: i64, deleted: bool, members: Vec<OsmId>) -> Way {
        Way {
            id,
            members,
            tags: Vec::new(),
            meta: Meta {
                version,
                deleted,
                ..Default::default()
            },
        }
    }

    #[test]
    fn routes_by_change_action() {
        let mut handler = WayHandler::default();
        handler.way(&way(1, 1, false, vec![10]));
        handler.way(&way(2, 3, false, vec![10, 11]));
        handler.way(&way(3, 3, true, vec![]));

        assert!(handler.created.contains(&1));
        assert!(handler.buffer.contains_key(&2));
        assert!(handler.deleted.contains(&3));
        assert!(handler.in_change_file(2));
    }
}
