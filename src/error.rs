//! Error types for the patina versioned byte model.
//!
//! This module provides structured error handling using thiserror; every
//! fallible model operation surfaces one of these variants and leaves the
//! structure unmodified when it fails.

use thiserror::Error;

/// Main error type for model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// An operation's range falls outside its container's valid range.
    #[error("bounds exceeded: [{offset:#x}, {offset:#x}+{size:#x}) outside container of {limit:#x} bytes")]
    BoundsExceeded { offset: u64, size: u64, limit: u64 },

    /// A proposed block child intersects an existing sibling in the same revision.
    #[error("child overlap: [{start:#x}, {start:#x}+{size:#x}) intersects sibling [{other_start:#x}, {other_start:#x}+{other_size:#x})")]
    ChildOverlap {
        start: u64,
        size: u64,
        other_start: u64,
        other_size: u64,
    },

    /// A proposed block child exactly duplicates an existing entry.
    #[error("duplicate child: [{start:#x}, {start:#x}+{size:#x}) already present")]
    Duplicate { start: u64, size: u64 },

    /// An address insertion collides with an existing record at the same offset.
    #[error("address exists at offset {offset:#x} in revision {revision}")]
    AddressExists { offset: u64, revision: usize },

    /// A revision was removed out of order or queried past the chain tip.
    #[error("invalid revision {revision} (current is {current})")]
    InvalidRevision { revision: usize, current: usize },

    /// A remote image's on-disk contents no longer match its pinned digest.
    #[error("integrity failure for {path}: expected digest {expected}, found {found}")]
    Integrity {
        path: String,
        expected: String,
        found: String,
    },

    /// File I/O errors from remote image access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structured-form serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::BoundsExceeded {
            offset: 0x10,
            size: 0x20,
            limit: 0x18,
        };
        assert_eq!(
            err.to_string(),
            "bounds exceeded: [0x10, 0x10+0x20) outside container of 0x18 bytes"
        );

        let err = ModelError::InvalidRevision {
            revision: 2,
            current: 4,
        };
        assert_eq!(err.to_string(), "invalid revision 2 (current is 4)");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ModelError = io.into();
        assert!(matches!(err, ModelError::Io(_)));
    }
}
