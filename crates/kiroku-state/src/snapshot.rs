//! Conversions between a state and a [`BaseSnapshot`].

use kiroku_types::keys::is_local_key;
use kiroku_types::{BaseSnapshot, Block};

use crate::DocumentState;

impl DocumentState {
    /// Root state seeded from a snapshot. Local keys found in the snapshot
    /// details are routed to the local store. A snapshot without the root
    /// block gets an empty one.
    pub fn from_snapshot(root_id: impl Into<String>, snapshot: &BaseSnapshot) -> Self {
        let root_id = root_id.into();
        let mut state = DocumentState::with_blocks(root_id.clone(), snapshot.blocks.iter().cloned());
        if !state.blocks.contains_key(&root_id) {
            state.set(Block::new(root_id, Default::default()));
        }
        for (key, value) in &snapshot.details {
            state.set_detail(key.clone(), value.clone());
        }
        state.relation_links = Some(snapshot.relation_links.clone());
        state.object_types = Some(snapshot.object_types.clone());
        state.file_info = snapshot.file_info.clone();
        state
    }

    /// Snapshot of the visible state: blocks in tree order (root first),
    /// shared details only.
    pub fn to_snapshot(&self) -> BaseSnapshot {
        let mut blocks = Vec::new();
        self.iterate(|block| {
            blocks.push(block.clone());
            true
        });
        BaseSnapshot {
            blocks,
            details: self
                .details()
                .iter()
                .filter(|(k, _)| !is_local_key(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            relation_links: self.relation_links().to_vec(),
            object_types: self.object_types().to_vec(),
            file_info: self.file_info().cloned(),
        }
    }
}
