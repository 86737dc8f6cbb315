//! Content-addressed byte images.
//!
//! An `Image` is an immutable blob identified by the SHA-256 digest of its
//! contents. Concrete images own an in-memory buffer, virtual images tile an
//! infinite fill pattern out to a fixed size, and remote images are backed by
//! a file on disk whose identity is pinned when the image is created. Edits
//! never touch an image; they live in the owning container's changesets.

use memmap2::Mmap;
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ModelError, Result};

/// Compute the lowercase hex SHA-256 digest of a byte slice.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
enum Backing {
    /// In-memory buffer
    Buffer(Vec<u8>),
    /// Infinite repeating fill pattern, materialized to `size`
    Virtual { pattern: Vec<u8> },
    /// File-backed, read lazily, identity pinned at creation
    Remote { path: PathBuf },
}

/// An immutable, content-addressed byte blob.
#[derive(Debug, Clone)]
pub struct Image {
    backing: Backing,
    size: u64,
    ident: OnceCell<String>,
}

impl Image {
    /// Create a concrete image from an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self {
            backing: Backing::Buffer(bytes),
            size,
            ident: OnceCell::new(),
        }
    }

    /// Create a virtual image by tiling `pattern` out to `size` bytes.
    ///
    /// An empty pattern tiles as zeroes.
    pub fn filled(pattern: impl Into<Vec<u8>>, size: u64) -> Self {
        Self {
            backing: Backing::Virtual {
                pattern: pattern.into(),
            },
            size,
            ident: OnceCell::new(),
        }
    }

    /// Create a remote image backed by `path`.
    ///
    /// The file is read once to record its size and pin its content digest;
    /// later reads that disagree with the pinned digest fail with an
    /// integrity error.
    pub fn remote(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = read_file(&path)?;
        let size = bytes.len() as u64;
        let ident = OnceCell::new();
        let _ = ident.set(content_digest(&bytes));
        debug!(path = %path.display(), size, "pinned remote image");
        Ok(Self {
            backing: Backing::Remote { path },
            size,
            ident,
        })
    }

    /// Rehydrate a remote image from its recorded path, size, and pinned
    /// digest without touching the file. Used when deserializing a model
    /// whose backing files may no longer be present.
    pub fn remote_pinned(path: impl AsRef<Path>, size: u64, ident: impl Into<String>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(ident.into());
        Self {
            backing: Backing::Remote {
                path: path.as_ref().to_path_buf(),
            },
            size,
            ident: cell,
        }
    }

    /// Size of the image in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// True for virtual (fill-pattern) images.
    pub fn is_virtual(&self) -> bool {
        matches!(self.backing, Backing::Virtual { .. })
    }

    /// True for a remote image whose backing file no longer exists.
    pub fn is_absent(&self) -> bool {
        match &self.backing {
            Backing::Remote { path } => !path.exists(),
            _ => false,
        }
    }

    /// Fill pattern of virtual images.
    pub(crate) fn virtual_pattern(&self) -> Option<&[u8]> {
        match &self.backing {
            Backing::Virtual { pattern } => Some(pattern.as_slice()),
            _ => None,
        }
    }

    /// Backing file path for remote images.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Remote { path } => Some(path.as_path()),
            _ => None,
        }
    }

    /// Content digest, hex-encoded. Computed once and cached; remote images
    /// pin it at construction time.
    pub fn ident(&self) -> &str {
        self.ident.get_or_init(|| match &self.backing {
            Backing::Buffer(bytes) => content_digest(bytes),
            Backing::Virtual { pattern } => content_digest(&tile(pattern, self.size)),
            // Remote images set the cell in their constructors.
            Backing::Remote { .. } => unreachable!("remote image ident is pinned at creation"),
        })
    }

    /// The full effective byte buffer of the image.
    ///
    /// Remote images re-read their backing file and verify it against the
    /// pinned digest; an absent file degrades to zeroes of the recorded size
    /// so a model can still be inspected read-only.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        match &self.backing {
            Backing::Buffer(bytes) => Ok(bytes.clone()),
            Backing::Virtual { pattern } => Ok(tile(pattern, self.size)),
            Backing::Remote { path } => {
                if !path.exists() {
                    warn!(path = %path.display(), "remote image absent, synthesizing zeroes");
                    return Ok(vec![0u8; self.size as usize]);
                }
                let bytes = read_file(path)?;
                let found = content_digest(&bytes);
                let expected = self.ident();
                if found != expected {
                    return Err(ModelError::Integrity {
                        path: path.display().to_string(),
                        expected: expected.to_string(),
                        found,
                    });
                }
                Ok(bytes)
            }
        }
    }

    /// Read `length` bytes starting at `offset`.
    pub fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(length)
            .ok_or(ModelError::BoundsExceeded {
                offset,
                size: length,
                limit: self.size,
            })?;
        if end > self.size {
            return Err(ModelError::BoundsExceeded {
                offset,
                size: length,
                limit: self.size,
            });
        }
        match &self.backing {
            Backing::Buffer(bytes) => Ok(bytes[offset as usize..end as usize].to_vec()),
            // Tile the pattern directly over the window instead of
            // materializing the whole image.
            Backing::Virtual { pattern } => {
                if pattern.is_empty() {
                    return Ok(vec![0u8; length as usize]);
                }
                let mut out = Vec::with_capacity(length as usize);
                for i in offset..end {
                    out.push(pattern[(i % pattern.len() as u64) as usize]);
                }
                Ok(out)
            }
            Backing::Remote { .. } => {
                let bytes = self.bytes()?;
                Ok(bytes[offset as usize..end as usize].to_vec())
            }
        }
    }
}

/// Images are equal when their contents are: compare by digest and size.
impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.ident() == other.ident()
    }
}

impl Eq for Image {}

fn tile(pattern: &[u8], size: u64) -> Vec<u8> {
    if pattern.is_empty() {
        return vec![0u8; size as usize];
    }
    pattern
        .iter()
        .cycle()
        .take(size as usize)
        .copied()
        .collect()
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(Vec::new());
    }
    // Safety: read-only map of a regular file.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap.to_vec())
}
