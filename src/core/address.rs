//! Address annotation records.
//!
//! An `Address` annotates the byte range `[vma, vma + size)` of a container
//! with a content classification, an optional decoded payload supplied by an
//! external decoder, and a name. Synthetic (filler) records are generated by
//! the gap-filling sweep to make an address space contiguous.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::core::metadata::{Entity, EntityMeta};
use crate::error::{ModelError, Result};

/// Content classification of an annotated range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Not yet classified
    #[default]
    Unknown,
    /// Decoded machine code
    Code,
    /// Data bytes
    Data,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Unknown => write!(f, "unknown"),
            ContentType::Code => write!(f, "code"),
            ContentType::Data => write!(f, "data"),
        }
    }
}

/// An annotation over `[vma, vma + size)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// Byte offset relative to the owning container
    pub offset: u64,
    /// Annotated length in bytes
    pub size: u64,
    /// Virtual address of the first annotated byte
    pub vma: u64,
    /// Classification of the range
    pub content_type: ContentType,
    /// Opaque decoded payload from an external decoder plugin
    pub contents: Option<serde_json::Value>,
    /// Optional symbol-like name
    pub name: Option<String>,
    /// True for generated gap fillers
    pub synthetic: bool,
    /// Comments, tags, and properties
    #[serde(default, skip_serializing_if = "EntityMeta::is_empty")]
    pub meta: EntityMeta,
}

impl Address {
    /// Create an unclassified record over `[vma, vma + size)`.
    ///
    /// Fails when `size` is zero or the range would overflow.
    pub fn new(offset: u64, size: u64, vma: u64) -> Result<Self> {
        if size == 0 || vma.checked_add(size).is_none() {
            return Err(ModelError::BoundsExceeded {
                offset,
                size,
                limit: 0,
            });
        }
        Ok(Self {
            offset,
            size,
            vma,
            content_type: ContentType::Unknown,
            contents: None,
            name: None,
            synthetic: false,
            meta: EntityMeta::default(),
        })
    }

    /// A synthetic unknown-content filler used by gap reconstruction.
    pub fn filler(offset: u64, size: u64, vma: u64) -> Self {
        Self {
            offset,
            size,
            vma,
            content_type: ContentType::Unknown,
            contents: None,
            name: None,
            synthetic: true,
            meta: EntityMeta::default(),
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_contents(mut self, contents: serde_json::Value) -> Self {
        self.contents = Some(contents);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// First VMA past the annotated range (exclusive).
    pub fn end_vma(&self) -> u64 {
        self.vma + self.size
    }

    /// First container offset past the annotated range (exclusive).
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }

    /// Whether `vma` falls inside the annotated range.
    pub fn range_contains(&self, vma: u64) -> bool {
        vma >= self.vma && vma < self.end_vma()
    }

    /// Whether the two records' vma ranges intersect.
    pub fn overlaps(&self, other: &Address) -> bool {
        self.vma < other.end_vma() && other.vma < self.end_vma()
    }

    /// Duplicate records occupy the same offset.
    pub fn duplicates(&self, other: &Address) -> bool {
        self.offset == other.offset
    }
}

impl Entity for Address {
    fn ident(&self) -> String {
        format!("{:x}", self.vma)
    }

    fn kind(&self) -> &'static str {
        "address"
    }
}

impl Eq for Address {}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.vma
            .cmp(&other.vma)
            .then(self.offset.cmp(&other.offset))
            .then(self.size.cmp(&other.size))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{:#x}..{:#x}]",
            self.content_type,
            self.vma,
            self.end_vma()
        )?;
        if let Some(name) = &self.name {
            write!(f, " '{}'", name)?;
        }
        Ok(())
    }
}
