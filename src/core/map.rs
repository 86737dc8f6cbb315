//! Memory maps: the top-level composition of the model.
//!
//! A `Map` binds an image window to a virtual address with permission flags
//! and an architecture descriptor, owns the address container that tracks
//! its annotations and edit history, and optionally roots a block
//! decomposition tree over its range. Byte access and revisioning delegate
//! to the owned container; validation errors propagate unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::core::address::Address;
use crate::core::address_container::AddressContainer;
use crate::core::arch::ArchInfo;
use crate::core::block::BlockTree;
use crate::core::changeset::{Changeset, Revision};
use crate::core::container::ByteContainer;
use crate::core::image::Image;
use crate::core::metadata::{assigned_ident, Entity, EntityMeta};
use crate::error::Result;

/// Permission flags for mapped regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapPerms {
    /// Raw permission bits: read=1, write=2, execute=4
    pub bits: u8,
}

impl MapPerms {
    pub fn new(read: bool, write: bool, execute: bool) -> Self {
        let mut bits = 0u8;
        if read {
            bits |= 1;
        }
        if write {
            bits |= 2;
        }
        if execute {
            bits |= 4;
        }
        Self { bits }
    }

    pub fn has_read(&self) -> bool {
        (self.bits & 1) != 0
    }

    pub fn has_write(&self) -> bool {
        (self.bits & 2) != 0
    }

    pub fn has_execute(&self) -> bool {
        (self.bits & 4) != 0
    }

    /// Readable and executable but not writable.
    pub fn is_code(&self) -> bool {
        self.has_read() && self.has_execute() && !self.has_write()
    }

    /// Readable and writable but not executable.
    pub fn is_data(&self) -> bool {
        self.has_read() && self.has_write() && !self.has_execute()
    }
}

impl fmt::Display for MapPerms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut perms = String::new();
        perms.push(if self.has_read() { 'r' } else { '-' });
        perms.push(if self.has_write() { 'w' } else { '-' });
        perms.push(if self.has_execute() { 'x' } else { '-' });
        write!(f, "{}", perms)
    }
}

/// A mapped region of a process or file image.
#[derive(Debug, Clone)]
pub struct Map {
    ident: String,
    perms: MapPerms,
    container: AddressContainer,
    block: Option<BlockTree>,
    pub meta: EntityMeta,
}

impl Map {
    /// Map `[image_offset, image_offset + size)` of `image` at `start_addr`.
    pub fn new(
        image: Arc<Image>,
        image_offset: u64,
        size: u64,
        start_addr: u64,
        perms: MapPerms,
        arch: Option<ArchInfo>,
    ) -> Result<Self> {
        let container = ByteContainer::new(image, image_offset, size, start_addr, arch)?;
        Ok(Self {
            ident: assigned_ident(),
            perms,
            container: AddressContainer::new(container),
            block: None,
            meta: EntityMeta::default(),
        })
    }

    /// Map a whole image at `start_addr`.
    pub fn spanning(
        image: Arc<Image>,
        start_addr: u64,
        perms: MapPerms,
        arch: Option<ArchInfo>,
    ) -> Self {
        let container = ByteContainer::spanning(image, start_addr, arch);
        Self {
            ident: assigned_ident(),
            perms,
            container: AddressContainer::new(container),
            block: None,
            meta: EntityMeta::default(),
        }
    }

    /// Replace the assigned ident with one supplied by the persistence layer.
    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = ident.into();
        self
    }

    pub fn start_addr(&self) -> u64 {
        self.container.container().start_addr()
    }

    pub fn end_addr(&self) -> u64 {
        self.container.container().end_addr()
    }

    pub fn size(&self) -> u64 {
        self.container.container().size()
    }

    pub fn image_offset(&self) -> u64 {
        self.container.container().offset()
    }

    pub fn perms(&self) -> MapPerms {
        self.perms
    }

    pub fn arch(&self) -> Option<&ArchInfo> {
        self.container.container().arch()
    }

    pub fn contains(&self, vma: u64) -> bool {
        self.container.container().contains(vma)
    }

    /// The owned address container.
    pub fn address_container(&self) -> &AddressContainer {
        &self.container
    }

    pub fn address_container_mut(&mut self) -> &mut AddressContainer {
        &mut self.container
    }

    /// The effective byte buffer of the current revision.
    pub fn image(&self) -> Result<Vec<u8>> {
        self.container.image()
    }

    /// The backing image blob.
    pub fn backing_image(&self) -> &Arc<Image> {
        self.container.container().image()
    }

    pub fn add_address(&mut self, offset: u64, size: u64) -> Result<&Address> {
        self.container.add_address(offset, size)
    }

    pub fn add_address_at(
        &mut self,
        offset: u64,
        size: u64,
        revision: Option<Revision>,
    ) -> Result<&Address> {
        self.container.add_address_at(offset, size, revision)
    }

    pub fn add_address_object(&mut self, address: Address) -> Result<&Address> {
        self.container.add_address_object(address)
    }

    pub fn addresses(&self, revision: Option<Revision>, recurse: bool) -> Result<Vec<&Address>> {
        self.container.addresses(revision, recurse)
    }

    pub fn address_range(&self, start_vma: u64, size: u64, strict: bool) -> Result<Vec<&Address>> {
        self.container.address_range(start_vma, size, strict)
    }

    pub fn contiguous_addresses(&self) -> Result<Vec<Address>> {
        self.container.contiguous_addresses()
    }

    pub fn patch_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.container.patch_bytes(offset, bytes)
    }

    pub fn add_revision(&mut self) -> Revision {
        self.container.add_revision()
    }

    pub fn remove_revision(&mut self, revision: Revision) -> Result<()> {
        self.container.remove_revision(revision)
    }

    /// The current (topmost) revision number.
    pub fn revision(&self) -> Revision {
        self.container.revision()
    }

    /// The current revision's changeset; `None` at the base revision.
    pub fn changeset(&self) -> Option<&Changeset> {
        self.container.changeset()
    }

    /// The root decomposition block, if one has been created.
    pub fn root_block(&self) -> Option<&BlockTree> {
        self.block.as_ref()
    }

    /// The root decomposition block, created on first use to span the whole
    /// map under the current revision.
    pub fn root_block_mut(&mut self) -> &mut BlockTree {
        let (start_addr, size, revision) = (self.start_addr(), self.size(), self.revision());
        self.block
            .get_or_insert_with(|| BlockTree::new(start_addr, size, revision))
    }

    pub(crate) fn from_parts(
        ident: String,
        perms: MapPerms,
        container: AddressContainer,
        block: Option<BlockTree>,
        meta: EntityMeta,
    ) -> Self {
        Self {
            ident,
            perms,
            container,
            block,
            meta,
        }
    }
}

impl Entity for Map {
    fn ident(&self) -> String {
        self.ident.clone()
    }

    fn kind(&self) -> &'static str {
        "map"
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Map {:#x}..{:#x} {} ({} bytes)",
            self.start_addr(),
            self.start_addr() + self.size(),
            self.perms,
            self.size()
        )
    }
}
