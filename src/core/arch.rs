//! Architecture descriptor types.
//!
//! The model stores an opaque architecture descriptor on containers and maps
//! for external decoders to consume; nothing in the core interprets it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The endianness of a mapped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    /// Little-endian byte order
    Little,
    /// Big-endian byte order
    Big,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => write!(f, "little"),
            Endianness::Big => write!(f, "big"),
        }
    }
}

/// Opaque architecture descriptor attached to byte containers and maps.
///
/// The core stores and exposes this value without interpreting it; the
/// `arch`/`machine` strings are whatever the loader that created the mapping
/// reported (e.g. `"x86"`/`"i686"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchInfo {
    /// Architecture family name (e.g. "x86", "arm")
    pub arch: String,
    /// Machine/sub-architecture name (e.g. "x86_64", "armv7")
    pub machine: String,
    /// Byte order of the region
    pub endianness: Endianness,
}

impl ArchInfo {
    /// Create a new architecture descriptor.
    pub fn new(
        arch: impl Into<String>,
        machine: impl Into<String>,
        endianness: Endianness,
    ) -> Self {
        Self {
            arch: arch.into(),
            machine: machine.into(),
            endianness,
        }
    }
}

impl fmt::Display for ArchInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.arch, self.machine, self.endianness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_info_display() {
        let arch = ArchInfo::new("x86", "x86_64", Endianness::Little);
        assert_eq!(format!("{}", arch), "x86/x86_64 (little)");
    }

    #[test]
    fn test_endianness_serde_roundtrip() {
        let json = serde_json::to_string(&Endianness::Big).unwrap();
        let back: Endianness = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Endianness::Big);
    }
}
