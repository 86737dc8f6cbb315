//! Revision-indexed address registries with gap-filling reconstruction.
//!
//! An `AddressContainer` composes a byte container with a revision chain and
//! one address registry slot per revision. Records are created in exactly one
//! revision; recursive queries merge every revision up to the requested one,
//! later revisions overriding earlier records at the same offset.

use std::collections::BTreeMap;
use tracing::debug;

use crate::core::address::Address;
use crate::core::changeset::{Changeset, Revision, RevisionChain};
use crate::core::container::ByteContainer;
use crate::core::image::Image;
use crate::core::metadata::{assigned_ident, Entity, EntityMeta};
use crate::error::{ModelError, Result};

/// A byte container with an edit history and address annotations.
#[derive(Debug, Clone)]
pub struct AddressContainer {
    container: ByteContainer,
    chain: RevisionChain,
    /// One registry slot per revision, indexed by revision number.
    registry: Vec<BTreeMap<u64, Address>>,
    ident: String,
    pub meta: EntityMeta,
}

impl AddressContainer {
    /// Wrap a byte container with an empty history and registry.
    pub fn new(container: ByteContainer) -> Self {
        Self {
            container,
            chain: RevisionChain::new(),
            registry: vec![BTreeMap::new()],
            ident: assigned_ident(),
            meta: EntityMeta::default(),
        }
    }

    pub(crate) fn from_parts(
        container: ByteContainer,
        chain: RevisionChain,
        registry: Vec<BTreeMap<u64, Address>>,
        ident: String,
        meta: EntityMeta,
    ) -> Self {
        Self {
            container,
            chain,
            registry,
            ident,
            meta,
        }
    }

    pub fn container(&self) -> &ByteContainer {
        &self.container
    }

    pub(crate) fn chain(&self) -> &RevisionChain {
        &self.chain
    }

    pub(crate) fn registry(&self) -> &[BTreeMap<u64, Address>] {
        &self.registry
    }

    /// The current (topmost) revision number.
    pub fn revision(&self) -> Revision {
        self.chain.current()
    }

    /// All revision numbers, base included.
    pub fn revisions(&self) -> Vec<Revision> {
        self.chain.revisions()
    }

    /// The current revision's changeset; `None` at the base revision.
    pub fn changeset(&self) -> Option<&Changeset> {
        self.chain.current_changeset()
    }

    /// Append a new revision with an empty changeset and registry slot.
    pub fn add_revision(&mut self) -> Revision {
        let revision = self.chain.add_revision();
        self.registry.push(BTreeMap::new());
        revision
    }

    /// Remove `revision`; only the current (topmost) one may be removed.
    /// Its changeset and registry slot are dropped together.
    pub fn remove_revision(&mut self, revision: Revision) -> Result<()> {
        self.chain.remove_revision(revision)?;
        self.registry.pop();
        Ok(())
    }

    /// Write `bytes` at container-relative `offset` into the current
    /// revision's changeset.
    pub fn patch_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.chain.patch_bytes(offset, bytes, self.container.size())
    }

    /// The effective byte buffer of the current revision.
    pub fn image(&self) -> Result<Vec<u8>> {
        self.image_at(self.revision())
    }

    /// The effective byte buffer of `revision`: base bytes with changesets
    /// `1..=revision` applied in order.
    pub fn image_at(&self, revision: Revision) -> Result<Vec<u8>> {
        let base = self.container.base_bytes()?;
        self.chain.reconstruct(&base, revision)
    }

    fn resolve_revision(&self, revision: Option<Revision>) -> Result<Revision> {
        let revision = revision.unwrap_or_else(|| self.revision());
        if !self.chain.has_revision(revision) {
            return Err(ModelError::InvalidRevision {
                revision,
                current: self.revision(),
            });
        }
        Ok(revision)
    }

    /// The merged view at `revision`: every record from revisions `<=
    /// revision`, later revisions overriding earlier ones at the same offset.
    fn merged(&self, revision: Revision) -> BTreeMap<u64, &Address> {
        let mut view: BTreeMap<u64, &Address> = BTreeMap::new();
        for slot in &self.registry[..=revision] {
            for (offset, addr) in slot {
                view.insert(*offset, addr);
            }
        }
        view
    }

    /// Create an unclassified record at `offset` in the current revision.
    pub fn add_address(&mut self, offset: u64, size: u64) -> Result<&Address> {
        self.add_address_at(offset, size, None)
    }

    /// Create an unclassified record at `offset` in `revision`
    /// (default: current).
    pub fn add_address_at(
        &mut self,
        offset: u64,
        size: u64,
        revision: Option<Revision>,
    ) -> Result<&Address> {
        let revision = self.resolve_revision(revision)?;
        let vma = self.container.start_addr() + offset;
        let address = Address::new(offset, size, vma)?;
        self.insert_address(address, revision)
    }

    /// Insert a fully-formed record built by an external decoder into the
    /// current revision, under the same validation as `add_address`.
    pub fn add_address_object(&mut self, address: Address) -> Result<&Address> {
        let revision = self.revision();
        self.insert_address(address, revision)
    }

    fn insert_address(&mut self, address: Address, revision: Revision) -> Result<&Address> {
        let end = address
            .offset
            .checked_add(address.size)
            .ok_or(ModelError::BoundsExceeded {
                offset: address.offset,
                size: address.size,
                limit: self.container.size(),
            })?;
        if end > self.container.size() {
            return Err(ModelError::BoundsExceeded {
                offset: address.offset,
                size: address.size,
                limit: self.container.size(),
            });
        }
        // Collisions are judged against the records created directly in the
        // target revision; a later revision may re-annotate an offset it
        // inherited, and the recursive merge then prefers its record.
        // Records within one revision never overlap, so the last record
        // starting before `end` is the only overlap candidate.
        if let Some((_, existing)) = self.registry[revision].range(..end).next_back() {
            if existing.end_offset() > address.offset {
                return Err(ModelError::AddressExists {
                    offset: address.offset,
                    revision,
                });
            }
        }
        debug!(
            offset = address.offset,
            size = address.size,
            revision,
            "added address"
        );
        let offset = address.offset;
        let slot = &mut self.registry[revision];
        slot.insert(offset, address);
        Ok(&slot[&offset])
    }

    /// Remove the record created at `offset` in the current revision.
    pub fn remove_address(&mut self, offset: u64) -> Result<Option<Address>> {
        self.remove_address_at(offset, None)
    }

    /// Remove the record created at `offset` directly in `revision`.
    /// Records inherited from earlier revisions are not affected.
    pub fn remove_address_at(
        &mut self,
        offset: u64,
        revision: Option<Revision>,
    ) -> Result<Option<Address>> {
        let revision = self.resolve_revision(revision)?;
        Ok(self.registry[revision].remove(&offset))
    }

    /// Records visible at `revision` (default: current), sorted by vma.
    ///
    /// With `recurse`, merges every revision up to the requested one (later
    /// wins per offset); without, returns only records created directly in
    /// that revision.
    pub fn addresses(&self, revision: Option<Revision>, recurse: bool) -> Result<Vec<&Address>> {
        let revision = self.resolve_revision(revision)?;
        let mut records: Vec<&Address> = if recurse {
            self.merged(revision).into_values().collect()
        } else {
            self.registry[revision].values().collect()
        };
        records.sort();
        Ok(records)
    }

    /// Idents of the records `addresses` would return.
    pub fn address_idents(
        &self,
        revision: Option<Revision>,
        recurse: bool,
    ) -> Result<Vec<String>> {
        Ok(self
            .addresses(revision, recurse)?
            .into_iter()
            .map(|a| a.ident())
            .collect())
    }

    /// Records of the current merged view intersecting
    /// `[start_vma, start_vma + size)`; with `strict`, only records fully
    /// contained in the window.
    pub fn address_range(&self, start_vma: u64, size: u64, strict: bool) -> Result<Vec<&Address>> {
        let end_vma = start_vma.saturating_add(size);
        Ok(self
            .addresses(None, true)?
            .into_iter()
            .filter(|a| {
                if strict {
                    a.vma >= start_vma && a.end_vma() <= end_vma
                } else {
                    a.vma < end_vma && start_vma < a.end_vma()
                }
            })
            .collect())
    }

    /// A gap-free ordered sequence covering the whole container: the current
    /// merged records plus synthetic unknown fillers for every uncovered
    /// range.
    pub fn contiguous_addresses(&self) -> Result<Vec<Address>> {
        let base_vma = self.container.start_addr();
        let known: Vec<Address> = self
            .addresses(None, true)?
            .into_iter()
            .cloned()
            .collect();
        Ok(sweep(
            known,
            base_vma,
            base_vma,
            base_vma + self.container.size(),
        ))
    }
}

impl Entity for AddressContainer {
    fn ident(&self) -> String {
        self.ident.clone()
    }

    fn kind(&self) -> &'static str {
        "container"
    }
}

/// Gap-filling reconstruction of the window
/// `[start_vma, base_vma + image.size)`.
///
/// Each record's `offset` is translated to `vma = base_vma + offset`.
/// Records whose translated vma precedes `start_vma` are omitted entirely
/// and no filler is synthesized before `start_vma`, which lets callers page
/// through a large space with repeated calls at advancing `start_vma`.
/// A `start_vma` below `base_vma` is clamped to `base_vma`; nothing maps
/// below the base.
pub fn address_space(
    addresses: &[Address],
    image: &Image,
    base_vma: u64,
    start_vma: Option<u64>,
) -> Vec<Address> {
    let known: Vec<Address> = addresses
        .iter()
        .map(|a| {
            let mut rebased = a.clone();
            rebased.vma = base_vma + a.offset;
            rebased
        })
        .collect();
    let start = start_vma.unwrap_or(base_vma).max(base_vma);
    sweep(known, base_vma, start, base_vma + image.size())
}

/// Single left-to-right sweep emitting known records and fillers so that
/// `[start_vma, end_vma)` has no gaps and no overlaps among emitted fillers.
fn sweep(mut known: Vec<Address>, base_vma: u64, start_vma: u64, end_vma: u64) -> Vec<Address> {
    known.sort();
    let mut out = Vec::new();
    let mut cursor = start_vma;
    for record in known {
        if record.vma < start_vma || record.vma >= end_vma {
            continue;
        }
        if cursor < record.vma {
            out.push(Address::filler(
                cursor - base_vma,
                record.vma - cursor,
                cursor,
            ));
        }
        cursor = cursor.max(record.end_vma());
        out.push(record);
    }
    if cursor < end_vma {
        out.push(Address::filler(cursor - base_vma, end_vma - cursor, cursor));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn container16(start_addr: u64) -> AddressContainer {
        let image = Arc::new(Image::from_bytes((0u8..16).collect::<Vec<u8>>()));
        AddressContainer::new(ByteContainer::spanning(image, start_addr, None))
    }

    #[test]
    fn test_add_address_bounds_and_duplicates() {
        let mut ac = container16(0x1000);
        ac.add_address(0, 4).unwrap();
        assert!(matches!(
            ac.add_address(0, 2),
            Err(ModelError::AddressExists { .. })
        ));
        assert!(matches!(
            ac.add_address(14, 4),
            Err(ModelError::BoundsExceeded { .. })
        ));
        // Failed inserts left the registry untouched.
        assert_eq!(ac.addresses(None, true).unwrap().len(), 1);
    }

    #[test]
    fn test_overlapping_addresses_rejected() {
        let mut ac = container16(0x1000);
        ac.add_address(4, 4).unwrap();
        // Partial overlap from either side, full containment, and a record
        // containing the existing one are all rejected.
        for (offset, size) in [(2, 4), (6, 4), (5, 2), (2, 8)] {
            assert!(matches!(
                ac.add_address(offset, size),
                Err(ModelError::AddressExists { .. })
            ));
        }
        // Abutting records are fine.
        ac.add_address(0, 4).unwrap();
        ac.add_address(8, 4).unwrap();
        let all = ac.contiguous_addresses().unwrap();
        let mut cursor = 0x1000;
        for a in &all {
            assert_eq!(a.vma, cursor);
            cursor = a.end_vma();
        }
        assert_eq!(cursor, 0x1010);
    }

    #[test]
    fn test_vma_derived_from_start_addr() {
        let mut ac = container16(0x1000);
        let addr = ac.add_address(4, 2).unwrap();
        assert_eq!(addr.vma, 0x1004);
    }

    #[test]
    fn test_recursive_merge_later_wins() {
        let mut ac = container16(0);
        ac.add_address(0, 1).unwrap();
        ac.add_address(4, 4).unwrap();
        ac.add_revision();

        // A later revision may re-annotate an inherited offset; its record
        // shadows the earlier one in the recursive merge.
        ac.add_address_object(Address::new(0, 2, 0).unwrap().with_name("reworked"))
            .unwrap();
        ac.add_address(8, 2).unwrap();
        // But within one revision the offset is taken.
        assert!(matches!(
            ac.add_address(8, 1),
            Err(ModelError::AddressExists { .. })
        ));

        let merged = ac.addresses(None, true).unwrap();
        let offsets: Vec<u64> = merged.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(merged[0].name.as_deref(), Some("reworked"));
        assert_eq!(merged[0].size, 2);

        let local = ac.addresses(None, false).unwrap();
        assert_eq!(local.len(), 2);

        // The base view is unchanged by revision 1 activity.
        let base = ac.addresses(Some(0), true).unwrap();
        assert_eq!(base.len(), 2);
        assert_eq!(base[0].size, 1);
    }

    #[test]
    fn test_remove_revision_drops_registry_slot() {
        let mut ac = container16(0);
        ac.add_revision();
        ac.add_address(0, 1).unwrap();
        assert_eq!(ac.addresses(None, true).unwrap().len(), 1);
        ac.remove_revision(1).unwrap();
        assert_eq!(ac.revision(), 0);
        assert!(ac.addresses(None, true).unwrap().is_empty());
        // A fresh revision starts with an empty slot.
        ac.add_revision();
        assert!(ac.addresses(None, false).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_revision_query() {
        let ac = container16(0);
        assert!(matches!(
            ac.addresses(Some(3), true),
            Err(ModelError::InvalidRevision { .. })
        ));
    }

    #[test]
    fn test_address_range_windowing() {
        let mut ac = container16(0x100);
        ac.add_address(0, 4).unwrap();
        ac.add_address(4, 4).unwrap();
        ac.add_address(8, 2).unwrap();

        let hits = ac.address_range(0x102, 4, false).unwrap();
        let vmas: Vec<u64> = hits.iter().map(|a| a.vma).collect();
        assert_eq!(vmas, vec![0x100, 0x104]);

        let strict = ac.address_range(0x102, 4, true).unwrap();
        assert!(strict.is_empty());

        let strict = ac.address_range(0x104, 6, true).unwrap();
        let vmas: Vec<u64> = strict.iter().map(|a| a.vma).collect();
        assert_eq!(vmas, vec![0x104, 0x108]);
    }

    #[test]
    fn test_contiguous_addresses_cover_container() {
        let mut ac = container16(0x1000);
        ac.add_address(4, 4).unwrap();
        ac.add_address(8, 2).unwrap();
        ac.add_address(12, 4).unwrap();

        let all = ac.contiguous_addresses().unwrap();
        assert_eq!(all.len(), 5);
        // Fillers at [0,4) and [10,12), no gaps in between.
        assert!(all[0].synthetic);
        assert_eq!((all[0].offset, all[0].size), (0, 4));
        assert!(all[3].synthetic);
        assert_eq!((all[3].offset, all[3].size), (10, 2));
        let mut cursor = 0x1000;
        for a in &all {
            assert_eq!(a.vma, cursor);
            cursor = a.end_vma();
        }
        assert_eq!(cursor, 0x1010);
    }

    #[test]
    fn test_address_space_gap_filling() {
        let image = Image::from_bytes(vec![0u8; 16]);
        let addrs = vec![
            Address::new(4, 4, 0).unwrap(),
            Address::new(8, 2, 0).unwrap(),
            Address::new(12, 4, 0).unwrap(),
        ];

        let space = address_space(&addrs, &image, 0, None);
        assert_eq!(space.len(), 5);
        let fillers: Vec<(u64, u64)> = space
            .iter()
            .filter(|a| a.synthetic)
            .map(|a| (a.vma, a.size))
            .collect();
        assert_eq!(fillers, vec![(0, 4), (10, 2)]);

        // Advancing the window start drops the leading filler and any
        // record before it.
        let paged = address_space(&addrs, &image, 0, Some(4));
        assert_eq!(paged.len(), 4);
        assert_eq!(paged[0].vma, 4);
        assert!(!paged[0].synthetic);
    }

    #[test]
    fn test_address_space_clamps_window_start() {
        let image = Image::from_bytes(vec![0u8; 8]);
        let addrs = vec![Address::new(2, 2, 0).unwrap()];
        let below = address_space(&addrs, &image, 0x4000, Some(0x1000));
        assert_eq!(below, address_space(&addrs, &image, 0x4000, None));
        assert_eq!(below[0].vma, 0x4000);
    }

    #[test]
    fn test_address_space_rebases_vmas() {
        let image = Image::from_bytes(vec![0u8; 8]);
        let addrs = vec![Address::new(2, 2, 0xdead).unwrap()];
        let space = address_space(&addrs, &image, 0x4000, None);
        assert_eq!(space.len(), 3);
        assert_eq!(space[1].vma, 0x4002);
        assert_eq!(space[2].vma, 0x4004);
        assert_eq!(space[2].size, 4);
    }

    #[test]
    fn test_patch_and_reconstruct_through_container() {
        let mut ac = container16(0);
        assert!(ac.patch_bytes(0, &[1]).is_err()); // base is immutable
        ac.add_revision();
        ac.patch_bytes(2, &[0xFF, 0xFE]).unwrap();
        let bytes = ac.image().unwrap();
        assert_eq!(&bytes[2..4], &[0xFF, 0xFE]);
        assert_eq!(bytes[0], 0);
        // Revision 0 still reconstructs the pristine base.
        assert_eq!(ac.image_at(0).unwrap(), (0u8..16).collect::<Vec<u8>>());
    }
}
