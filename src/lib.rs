//! patina: a versioned byte-addressable data model for reverse-engineering
//! tools.
//!
//! The crate models the bytes of a binary target as content-addressed
//! images, layers an edit history of sparse byte changesets over them, and
//! registers semantic annotations (code/data classification, nested block
//! decomposition) over byte ranges. Disassembly, durable storage, and
//! plugin dispatch are external collaborators that consume the model
//! through its byte-read/patch, address-insertion, and structured-form
//! interfaces.

/// Core data types module
pub mod core;
/// Error types
pub mod error;
/// Logging and tracing setup
pub mod logging;

pub use crate::core::address::{Address, ContentType};
pub use crate::core::address_container::{address_space, AddressContainer};
pub use crate::core::arch::{ArchInfo, Endianness};
pub use crate::core::block::{BlockId, BlockTree};
pub use crate::core::changeset::{Changeset, Revision, RevisionChain};
pub use crate::core::container::ByteContainer;
pub use crate::core::image::Image;
pub use crate::core::map::{Map, MapPerms};
pub use crate::core::metadata::{Entity, EntityMeta, ObjectPath};
pub use crate::core::structured::{ImageStore, StructuredContext, StructuredForm};
pub use crate::error::{ModelError, Result};
