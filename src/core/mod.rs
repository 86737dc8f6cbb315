//! Core data types for the versioned byte-addressable model.
//!
//! This module contains the fundamental types used throughout the system:
//! content-addressed images, byte containers, the revision/changeset chain,
//! address annotation registries, block decomposition trees, and the
//! top-level memory map composition.

pub mod address;
pub mod address_container;
pub mod arch;
pub mod block;
pub mod changeset;
pub mod container;
pub mod image;
pub mod map;
pub mod metadata;
pub mod structured;
