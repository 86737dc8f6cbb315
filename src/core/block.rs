//! Nested block decomposition trees.
//!
//! A `BlockTree` is an arena of blocks addressed by `BlockId`; each block
//! covers `[start_addr, start_addr + size)` and owns, per revision, an
//! independent full snapshot of child blocks. Child sets are never deltas:
//! `children(id, None)` always reads the block's own creation revision, and
//! an explicit revision reads whichever set was populated under it. Parent
//! links are non-owning back-references used only for bounds validation.
//!
//! Sibling invariants are enforced on every structural mutation: children in
//! one revision's set are pairwise non-overlapping and fully contained in
//! their parent's own range.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::core::changeset::Revision;
use crate::core::metadata::{Entity, EntityMeta};
use crate::error::{ModelError, Result};

/// Arena handle of a block inside its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlockNode {
    start_addr: u64,
    size: u64,
    parent: Option<BlockId>,
    revision: Revision,
    children: BTreeMap<Revision, Vec<BlockId>>,
    meta: EntityMeta,
}

impl BlockNode {
    fn end_addr(&self) -> u64 {
        self.start_addr + self.size
    }
}

/// A generic nested decomposition tree over an address range.
///
/// All methods take `BlockId` handles minted by this tree; handles from a
/// different tree index arbitrary nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockTree {
    nodes: Vec<BlockNode>,
    root: BlockId,
}

impl BlockTree {
    /// Create a tree whose root spans `[start_addr, start_addr + size)` and
    /// was created under `revision`.
    pub fn new(start_addr: u64, size: u64, revision: Revision) -> Self {
        let root = BlockNode {
            start_addr,
            size,
            parent: None,
            revision,
            children: BTreeMap::new(),
            meta: EntityMeta::default(),
        };
        Self {
            nodes: vec![root],
            root: BlockId(0),
        }
    }

    pub fn root(&self) -> BlockId {
        self.root
    }

    /// Number of blocks ever created in this tree, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn start_addr(&self, id: BlockId) -> u64 {
        self.nodes[id.0].start_addr
    }

    pub fn size(&self, id: BlockId) -> u64 {
        self.nodes[id.0].size
    }

    /// First address past the block (exclusive).
    pub fn end_addr(&self, id: BlockId) -> u64 {
        self.nodes[id.0].end_addr()
    }

    /// The revision the block was created under.
    pub fn revision(&self, id: BlockId) -> Revision {
        self.nodes[id.0].revision
    }

    pub fn parent(&self, id: BlockId) -> Option<BlockId> {
        self.nodes[id.0].parent
    }

    pub fn meta(&self, id: BlockId) -> &EntityMeta {
        &self.nodes[id.0].meta
    }

    pub fn meta_mut(&mut self, id: BlockId) -> &mut EntityMeta {
        &mut self.nodes[id.0].meta
    }

    /// Stable ident of a block: its arena position.
    pub fn block_ident(&self, id: BlockId) -> String {
        id.to_string()
    }

    /// The child set stored under `revision` (default: the block's own
    /// creation revision). Sets are independent snapshots, not deltas.
    pub fn children(&self, id: BlockId, revision: Option<Revision>) -> &[BlockId] {
        let node = &self.nodes[id.0];
        let revision = revision.unwrap_or(node.revision);
        node.children
            .get(&revision)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The child set of the maximum populated revision, the view an external
    /// consumer maps over by default.
    pub fn map(&self, id: BlockId) -> &[BlockId] {
        let node = &self.nodes[id.0];
        node.children
            .iter()
            .next_back()
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// The child set stored under exactly `revision`, unlike `map` which
    /// falls back to the maximum populated one.
    pub fn map_at(&self, id: BlockId, revision: Revision) -> &[BlockId] {
        self.children(id, Some(revision))
    }

    /// Revisions under which the block has any children.
    pub fn revisions(&self, id: BlockId) -> Vec<Revision> {
        self.nodes[id.0]
            .children
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(r, _)| *r)
            .collect()
    }

    /// Every `(revision, child)` pair across every populated revision, in
    /// revision order. Visits each set fully, with no deduplication across
    /// revisions.
    pub fn iter_with_revision(&self, id: BlockId) -> impl Iterator<Item = (Revision, BlockId)> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .flat_map(|(r, v)| v.iter().map(move |c| (*r, *c)))
    }

    /// Maximum nesting depth of the subtree under `revision`'s child set;
    /// 0 when the set is empty.
    pub fn nesting(&self, id: BlockId, revision: Option<Revision>) -> usize {
        let revision = revision.unwrap_or(self.nodes[id.0].revision);
        self.children(id, Some(revision))
            .iter()
            .map(|c| 1 + self.nesting(*c, Some(revision)))
            .max()
            .unwrap_or(0)
    }

    fn validate_child(
        &self,
        parent: BlockId,
        revision: Revision,
        start_addr: u64,
        size: u64,
        skip: Option<BlockId>,
    ) -> Result<()> {
        let parent_node = &self.nodes[parent.0];
        let end = start_addr
            .checked_add(size)
            .ok_or(ModelError::BoundsExceeded {
                offset: start_addr,
                size,
                limit: parent_node.end_addr(),
            })?;
        if size == 0 || start_addr < parent_node.start_addr || end > parent_node.end_addr() {
            return Err(ModelError::BoundsExceeded {
                offset: start_addr,
                size,
                limit: parent_node.end_addr(),
            });
        }
        for &sibling in self.children(parent, Some(revision)) {
            if Some(sibling) == skip {
                continue;
            }
            let node = &self.nodes[sibling.0];
            if node.start_addr == start_addr && node.size == size {
                return Err(ModelError::Duplicate { start: start_addr, size });
            }
            if start_addr < node.end_addr() && node.start_addr < end {
                return Err(ModelError::ChildOverlap {
                    start: start_addr,
                    size,
                    other_start: node.start_addr,
                    other_size: node.size,
                });
            }
        }
        Ok(())
    }

    /// Create a child of `parent` covering `[start_addr, start_addr + size)`
    /// in `revision`'s child set (default: the parent's own revision).
    ///
    /// Fails with `Duplicate` for an identical existing range,
    /// `BoundsExceeded` when the range leaves the parent, and `ChildOverlap`
    /// when it intersects a sibling in that revision's set.
    pub fn create_child(
        &mut self,
        parent: BlockId,
        start_addr: u64,
        size: u64,
        revision: Option<Revision>,
    ) -> Result<BlockId> {
        let revision = revision.unwrap_or(self.nodes[parent.0].revision);
        self.validate_child(parent, revision, start_addr, size, None)?;
        let id = BlockId(self.nodes.len());
        self.nodes.push(BlockNode {
            start_addr,
            size,
            parent: Some(parent),
            revision,
            children: BTreeMap::new(),
            meta: EntityMeta::default(),
        });
        self.nodes[parent.0]
            .children
            .entry(revision)
            .or_default()
            .push(id);
        debug!(%parent, %id, start_addr, size, revision, "created child block");
        Ok(id)
    }

    /// Move the block to a new start address, re-validating its membership
    /// in its parent's revision set exactly as `create_child` does.
    pub fn set_start_addr(&mut self, id: BlockId, start_addr: u64) -> Result<()> {
        let size = self.nodes[id.0].size;
        self.revalidate_move(id, start_addr, size)?;
        self.nodes[id.0].start_addr = start_addr;
        Ok(())
    }

    /// Resize the block, re-validating against parent bounds and siblings.
    pub fn set_size(&mut self, id: BlockId, size: u64) -> Result<()> {
        let start_addr = self.nodes[id.0].start_addr;
        self.revalidate_move(id, start_addr, size)?;
        self.nodes[id.0].size = size;
        Ok(())
    }

    fn revalidate_move(&self, id: BlockId, start_addr: u64, size: u64) -> Result<()> {
        let node = &self.nodes[id.0];
        match node.parent {
            Some(parent) => self.validate_child(parent, node.revision, start_addr, size, Some(id)),
            // The root has no siblings or enclosing bounds.
            None => Ok(()),
        }
    }

    /// Remove the child whose range starts at `start_addr` from the block's
    /// own-revision child set. Other revisions' snapshots are untouched.
    /// Returns the detached child, if one matched.
    pub fn delete(&mut self, id: BlockId, start_addr: u64) -> Option<BlockId> {
        let revision = self.nodes[id.0].revision;
        let pos = self.nodes[id.0]
            .children
            .get(&revision)?
            .iter()
            .position(|c| self.nodes[c.0].start_addr == start_addr)?;
        let removed = self.nodes[id.0].children.get_mut(&revision)?.remove(pos);
        debug!(%id, %removed, start_addr, revision, "deleted child block");
        Some(removed)
    }

    /// Empty the block's own-revision child set.
    pub fn clear(&mut self, id: BlockId) {
        let revision = self.nodes[id.0].revision;
        if let Some(children) = self.nodes[id.0].children.get_mut(&revision) {
            children.clear();
        }
    }
}

impl Entity for BlockTree {
    fn ident(&self) -> String {
        self.block_ident(self.root)
    }

    fn kind(&self) -> &'static str {
        "block"
    }
}
