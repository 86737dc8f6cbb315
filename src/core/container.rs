//! Byte containers: an image window bound to a virtual address origin.
//!
//! `ByteContainer` is the base abstraction reused by every higher-level
//! region type. It binds the sub-range `[offset, offset + size)` of a shared
//! image to a start VMA and an optional architecture descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::core::arch::ArchInfo;
use crate::core::image::Image;
use crate::error::{ModelError, Result};

/// A sub-range of an image mapped at a virtual address.
#[derive(Debug, Clone)]
pub struct ByteContainer {
    image: Arc<Image>,
    /// Byte offset of the window inside the image
    offset: u64,
    /// Window size in bytes
    size: u64,
    /// VMA assigned to the first byte of the window
    start_addr: u64,
    arch: Option<ArchInfo>,
}

impl ByteContainer {
    /// Bind `[offset, offset + size)` of `image` to `start_addr`.
    ///
    /// Fails with `BoundsExceeded` if the window does not fit in the image.
    pub fn new(
        image: Arc<Image>,
        offset: u64,
        size: u64,
        start_addr: u64,
        arch: Option<ArchInfo>,
    ) -> Result<Self> {
        let end = offset.checked_add(size).ok_or(ModelError::BoundsExceeded {
            offset,
            size,
            limit: image.size(),
        })?;
        if end > image.size() {
            return Err(ModelError::BoundsExceeded {
                offset,
                size,
                limit: image.size(),
            });
        }
        Ok(Self {
            image,
            offset,
            size,
            start_addr,
            arch,
        })
    }

    /// Bind a whole image to `start_addr`.
    pub fn spanning(image: Arc<Image>, start_addr: u64, arch: Option<ArchInfo>) -> Self {
        let size = image.size();
        Self {
            image,
            offset: 0,
            size,
            start_addr,
            arch,
        }
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn start_addr(&self) -> u64 {
        self.start_addr
    }

    /// Last valid VMA of the container (inclusive).
    pub fn end_addr(&self) -> u64 {
        self.start_addr + self.size.saturating_sub(1)
    }

    pub fn arch(&self) -> Option<&ArchInfo> {
        self.arch.as_ref()
    }

    pub fn set_arch(&mut self, arch: Option<ArchInfo>) {
        self.arch = arch;
    }

    /// Whether `vma` falls inside `[start_addr, start_addr + size)`.
    pub fn contains(&self, vma: u64) -> bool {
        self.size > 0 && vma >= self.start_addr && vma - self.start_addr < self.size
    }

    /// Translate a VMA into a container-relative offset.
    pub fn vma_to_offset(&self, vma: u64) -> Option<u64> {
        self.contains(vma).then(|| vma - self.start_addr)
    }

    /// Read `length` bytes at container-relative `rel_offset` from the base
    /// image (no changesets applied).
    pub fn read(&self, rel_offset: u64, length: u64) -> Result<Vec<u8>> {
        let end = rel_offset
            .checked_add(length)
            .ok_or(ModelError::BoundsExceeded {
                offset: rel_offset,
                size: length,
                limit: self.size,
            })?;
        if end > self.size {
            return Err(ModelError::BoundsExceeded {
                offset: rel_offset,
                size: length,
                limit: self.size,
            });
        }
        self.image.read(self.offset + rel_offset, length)
    }

    /// The container's full base byte window (no changesets applied).
    pub fn base_bytes(&self) -> Result<Vec<u8>> {
        self.image.read(self.offset, self.size)
    }
}

impl fmt::Display for ByteContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ByteContainer {:#x}..{:#x} ({} bytes of {})",
            self.start_addr,
            self.start_addr + self.size,
            self.size,
            &self.image.ident()[..8.min(self.image.ident().len())]
        )
    }
}

/// Serialized shape of a byte container: the image is referenced by ident
/// and resolved through the structured-form context on the way back in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ByteContainerRecord {
    pub image: String,
    pub offset: u64,
    pub size: u64,
    pub start_addr: u64,
    pub arch: Option<ArchInfo>,
}

impl ByteContainerRecord {
    pub fn of(container: &ByteContainer) -> Self {
        Self {
            image: container.image.ident().to_string(),
            offset: container.offset,
            size: container.size,
            start_addr: container.start_addr,
            arch: container.arch.clone(),
        }
    }

    pub fn bind(self, image: Arc<Image>) -> Result<ByteContainer> {
        ByteContainer::new(image, self.offset, self.size, self.start_addr, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image16() -> Arc<Image> {
        Arc::new(Image::from_bytes((0u8..16).collect::<Vec<u8>>()))
    }

    #[test]
    fn test_window_bounds() {
        let img = image16();
        assert!(ByteContainer::new(img.clone(), 4, 8, 0x1000, None).is_ok());
        assert!(matches!(
            ByteContainer::new(img, 10, 8, 0x1000, None),
            Err(ModelError::BoundsExceeded { .. })
        ));
    }

    #[test]
    fn test_addressing() {
        let c = ByteContainer::new(image16(), 4, 8, 0x1000, None).unwrap();
        assert_eq!(c.start_addr(), 0x1000);
        assert_eq!(c.end_addr(), 0x1007);
        assert!(c.contains(0x1000));
        assert!(c.contains(0x1007));
        assert!(!c.contains(0x1008));
        assert_eq!(c.vma_to_offset(0x1003), Some(3));
        assert_eq!(c.vma_to_offset(0xfff), None);
    }

    #[test]
    fn test_read_is_window_relative() {
        let c = ByteContainer::new(image16(), 4, 8, 0x1000, None).unwrap();
        assert_eq!(c.read(0, 2).unwrap(), vec![4, 5]);
        assert_eq!(c.base_bytes().unwrap(), (4u8..12).collect::<Vec<u8>>());
        assert!(c.read(7, 2).is_err());
    }
}
