//! Classification of the nodes in a change file.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::models::{ChangeAction, Location, Node, OsmId};
use crate::sparql::DataFetcher;
use crate::stats::KindCounts;

/// Sorts node ids into created / modified / modified-with-changed-location /
/// deleted. Modifies are buffered with their new location until the stored
/// locations can be compared in one batched fetch.
#[derive(Debug, Default)]
pub struct NodeHandler {
    pub created: BTreeSet<OsmId>,
    pub modified: BTreeSet<OsmId>,
    pub modified_with_changed_location: BTreeSet<OsmId>,
    pub deleted: BTreeSet<OsmId>,
    buffer: BTreeMap<OsmId, Option<Location>>,
}

impl NodeHandler {
    pub fn node(&mut self, node: &Node) {
        match ChangeAction::from_meta(&node.meta) {
            ChangeAction::Create => {
                self.created.insert(node.id);
            }
            ChangeAction::Modify => {
                self.buffer.insert(node.id, node.loc.clone());
            }
            ChangeAction::Delete => {
                self.deleted.insert(node.id);
            }
        }
    }

    /// Compare the buffered locations against the endpoint. A node unknown to
    /// the endpoint is promoted to created: the modify is an effective
    /// create.
    pub async fn check_locations(&mut self, fetcher: &DataFetcher) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let ids: BTreeSet<OsmId> = self.buffer.keys().copied().collect();
        let stored = fetcher.node_locations(&ids).await?;

        for (id, local) in std::mem::take(&mut self.buffer) {
            match stored.get(&id) {
                Some(remote) if local.as_ref() == Some(remote) => {
                    self.modified.insert(id);
                }
                Some(_) => {
                    self.modified_with_changed_location.insert(id);
                }
                None => {
                    self.created.insert(id);
                }
            }
        }
        Ok(())
    }

    /// True if the node occurred in any changeset of the change file. Only
    /// valid once every node of the file has been routed.
    pub fn in_change_file(&self, id: OsmId) -> bool {
        self.created.contains(&id)
            || self.modified.contains(&id)
            || self.modified_with_changed_location.contains(&id)
            || self.deleted.contains(&id)
            || self.buffer.contains_key(&id)
    }

    pub fn counts(&self) -> KindCounts {
        KindCounts {
            created: self.created.len() as u64,
            modified: self.modified.len() as u64,
            modified_structure_changed: self.modified_with_changed_location.len() as u64,
            deleted: self.deleted.len() as u64,
        }
    }
}
