//! Sparse byte changesets and the revision chain.
//!
//! Revision 0 is the unmodified base image. Every revision `1..=N` owns one
//! `Changeset`: a sparse map from byte offset to the patched value, storing
//! only the bytes that revision actually modified. Reconstructing revision R
//! replays changesets `1..=R` over the base bytes in order, later layers
//! overriding earlier ones at the same offset.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ModelError, Result};

/// An integer revision marker; 0 is the unmodified base state.
pub type Revision = usize;

/// The sparse byte overrides introduced by one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    patches: BTreeMap<u64, u8>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `bytes` starting at `offset`, overriding prior patches there.
    pub fn patch(&mut self, offset: u64, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.patches.insert(offset + i as u64, *b);
        }
    }

    /// The patched value at `offset`, if this changeset touches it.
    pub fn get(&self, offset: u64) -> Option<u8> {
        self.patches.get(&offset).copied()
    }

    /// Iterate patched `(offset, byte)` pairs in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u8)> + '_ {
        self.patches.iter().map(|(o, b)| (*o, *b))
    }

    /// Number of individually patched bytes.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Overlay this changeset onto `buffer`; patches past the buffer end are
    /// ignored (a shrunken window sees only what it covers).
    pub fn apply(&self, buffer: &mut [u8]) {
        for (&offset, &byte) in &self.patches {
            if let Some(slot) = buffer.get_mut(offset as usize) {
                *slot = byte;
            }
        }
    }
}

/// The ordered patch layers of a container, one per revision `>= 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionChain {
    layers: Vec<Changeset>,
}

impl RevisionChain {
    /// A chain with no revisions beyond the base.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current (topmost) revision number; 0 when only the base exists.
    pub fn current(&self) -> Revision {
        self.layers.len()
    }

    /// All revision numbers from the base up to the current one.
    pub fn revisions(&self) -> Vec<Revision> {
        (0..=self.current()).collect()
    }

    /// Whether `revision` exists in this chain (0 always does).
    pub fn has_revision(&self, revision: Revision) -> bool {
        revision <= self.current()
    }

    /// Append a fresh empty changeset layer and make it current.
    pub fn add_revision(&mut self) -> Revision {
        self.layers.push(Changeset::new());
        debug!(revision = self.current(), "added revision");
        self.current()
    }

    /// Remove `revision`. Only the current (topmost) revision may be
    /// removed; the base revision 0 never can.
    pub fn remove_revision(&mut self, revision: Revision) -> Result<()> {
        if revision == 0 || revision != self.current() {
            return Err(ModelError::InvalidRevision {
                revision,
                current: self.current(),
            });
        }
        self.layers.pop();
        debug!(revision, current = self.current(), "removed revision");
        Ok(())
    }

    /// The changeset introduced by `revision`, for revisions `>= 1`.
    pub fn changeset(&self, revision: Revision) -> Option<&Changeset> {
        if revision == 0 {
            return None;
        }
        self.layers.get(revision - 1)
    }

    /// The current revision's changeset; `None` at the base revision.
    pub fn current_changeset(&self) -> Option<&Changeset> {
        self.layers.last()
    }

    /// Write `bytes` at `offset` into the current revision's changeset.
    ///
    /// Fails with `BoundsExceeded` when the write leaves `[0, limit)` and
    /// with `InvalidRevision` at the base revision, whose bytes are
    /// immutable.
    pub fn patch_bytes(&mut self, offset: u64, bytes: &[u8], limit: u64) -> Result<()> {
        let end = offset
            .checked_add(bytes.len() as u64)
            .ok_or(ModelError::BoundsExceeded {
                offset,
                size: bytes.len() as u64,
                limit,
            })?;
        if end > limit {
            return Err(ModelError::BoundsExceeded {
                offset,
                size: bytes.len() as u64,
                limit,
            });
        }
        let current = self.current();
        let layer = self
            .layers
            .last_mut()
            .ok_or(ModelError::InvalidRevision {
                revision: 0,
                current,
            })?;
        layer.patch(offset, bytes);
        debug!(offset, len = bytes.len(), revision = current, "patched bytes");
        Ok(())
    }

    /// Reconstruct the effective bytes of `revision` by overlaying
    /// changesets `1..=revision` onto `base` in order.
    pub fn reconstruct(&self, base: &[u8], revision: Revision) -> Result<Vec<u8>> {
        if !self.has_revision(revision) {
            return Err(ModelError::InvalidRevision {
                revision,
                current: self.current(),
            });
        }
        let mut buffer = base.to_vec();
        for layer in &self.layers[..revision] {
            layer.apply(&mut buffer);
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_is_sparse() {
        let mut cs = Changeset::new();
        cs.patch(4, &[0xAA, 0xBB]);
        assert_eq!(cs.len(), 2);
        assert_eq!(cs.get(4), Some(0xAA));
        assert_eq!(cs.get(5), Some(0xBB));
        assert_eq!(cs.get(6), None);
    }

    #[test]
    fn test_add_and_remove_revisions() {
        let mut chain = RevisionChain::new();
        assert_eq!(chain.current(), 0);
        assert_eq!(chain.add_revision(), 1);
        assert_eq!(chain.add_revision(), 2);
        assert_eq!(chain.revisions(), vec![0, 1, 2]);

        // Only the topmost revision may go.
        assert!(matches!(
            chain.remove_revision(1),
            Err(ModelError::InvalidRevision { .. })
        ));
        chain.remove_revision(2).unwrap();
        assert_eq!(chain.current(), 1);
        assert!(matches!(
            chain.remove_revision(0),
            Err(ModelError::InvalidRevision { .. })
        ));
    }

    #[test]
    fn test_patch_requires_revision() {
        let mut chain = RevisionChain::new();
        assert!(matches!(
            chain.patch_bytes(0, &[1], 16),
            Err(ModelError::InvalidRevision { .. })
        ));
        chain.add_revision();
        chain.patch_bytes(0, &[1], 16).unwrap();
    }

    #[test]
    fn test_patch_bounds() {
        let mut chain = RevisionChain::new();
        chain.add_revision();
        assert!(matches!(
            chain.patch_bytes(14, &[1, 2, 3], 16),
            Err(ModelError::BoundsExceeded { .. })
        ));
        // The failed patch left the layer untouched.
        assert!(chain.current_changeset().unwrap().is_empty());
    }

    #[test]
    fn test_reconstruct_layers_in_order() {
        let base = vec![0u8; 8];
        let mut chain = RevisionChain::new();
        chain.add_revision();
        chain.patch_bytes(0, &[0x11, 0x22], 8).unwrap();
        chain.add_revision();
        chain.patch_bytes(1, &[0x33], 8).unwrap();

        assert_eq!(chain.reconstruct(&base, 0).unwrap(), base);
        assert_eq!(
            chain.reconstruct(&base, 1).unwrap(),
            vec![0x11, 0x22, 0, 0, 0, 0, 0, 0]
        );
        // Later layer wins at offset 1.
        assert_eq!(
            chain.reconstruct(&base, 2).unwrap(),
            vec![0x11, 0x33, 0, 0, 0, 0, 0, 0]
        );
        assert!(matches!(
            chain.reconstruct(&base, 3),
            Err(ModelError::InvalidRevision { .. })
        ));
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        let base: Vec<u8> = (0..16).collect();
        let mut chain = RevisionChain::new();
        chain.add_revision();
        chain.patch_bytes(3, &[9, 9, 9], 16).unwrap();
        let once = chain.reconstruct(&base, 1).unwrap();
        let twice = chain.reconstruct(&base, 1).unwrap();
        assert_eq!(once, twice);
    }
}
