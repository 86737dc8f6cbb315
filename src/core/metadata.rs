//! Entity identity and metadata.
//!
//! Every serializable model entity carries a stable string ident consumed by
//! the external persistence layer for path-based addressing, plus free-form
//! comments, tags, and properties. Images derive their ident from content;
//! mutable entities (maps, blocks, containers) get an assigned ident.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Free-form annotations shared by every mutable model entity.
///
/// Backed by explicit fields rather than any dynamic attribute mechanism;
/// the core never interprets these values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Analyst comments, in insertion order
    pub comments: Vec<String>,
    /// Classification tags
    pub tags: Vec<String>,
    /// Arbitrary key/value properties
    pub properties: BTreeMap<String, String>,
}

impl EntityMeta {
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty() && self.tags.is_empty() && self.properties.is_empty()
    }

    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// A stable identifier plus kind, implemented by every addressable entity.
pub trait Entity {
    /// Stable ident string: a content digest for images, an assigned key
    /// otherwise.
    fn ident(&self) -> String;

    /// Entity kind segment used in hierarchical object paths
    /// (e.g. "image", "map", "block", "address").
    fn kind(&self) -> &'static str;

    /// The `/kind/ident` path segment for this entity.
    fn path_segment(&self) -> ObjectPathSegment {
        ObjectPathSegment {
            kind: self.kind().to_string(),
            ident: self.ident(),
        }
    }
}

/// Generate an assigned ident for a mutable entity with no natural key.
pub fn assigned_ident() -> String {
    Uuid::new_v4().simple().to_string()
}

/// One `kind/ident` component of an object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectPathSegment {
    pub kind: String,
    pub ident: String,
}

/// Hierarchical `/kind/ident/kind/ident/...` address of an entity, used by
/// the external store to locate entities inside a serialized model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectPath {
    segments: Vec<ObjectPathSegment>,
}

impl ObjectPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[ObjectPathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a `kind/ident` component, returning the extended path.
    pub fn child(&self, entity: &dyn Entity) -> Self {
        let mut segments = self.segments.clone();
        segments.push(entity.path_segment());
        Self { segments }
    }

    pub fn push(&mut self, kind: impl Into<String>, ident: impl Into<String>) {
        self.segments.push(ObjectPathSegment {
            kind: kind.into(),
            ident: ident.into(),
        });
    }

    /// The trailing component, if any.
    pub fn leaf(&self) -> Option<&ObjectPathSegment> {
        self.segments.last()
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for seg in &self.segments {
            write!(f, "/{}/{}", seg.kind, seg.ident)?;
        }
        Ok(())
    }
}

impl FromStr for ObjectPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let parts: Vec<&str> = trimmed.split('/').collect();
        if parts.len() % 2 != 0 {
            return Err(format!("object path has dangling kind: {}", s));
        }
        let mut path = Self::root();
        for pair in parts.chunks(2) {
            if pair[0].is_empty() || pair[1].is_empty() {
                return Err(format!("object path has empty component: {}", s));
            }
            path.push(pair[0], pair[1]);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_roundtrip() {
        let mut meta = EntityMeta::default();
        assert!(meta.is_empty());
        meta.add_comment("entry point candidate");
        meta.add_tag("code");
        meta.add_tag("code");
        meta.set_property("origin", "loader");
        assert_eq!(meta.comments.len(), 1);
        assert_eq!(meta.tags.len(), 1);
        assert_eq!(meta.property("origin"), Some("loader"));
    }

    #[test]
    fn test_object_path_display_parse() {
        let mut path = ObjectPath::root();
        path.push("map", "m0");
        path.push("block", "b3");
        let rendered = path.to_string();
        assert_eq!(rendered, "/map/m0/block/b3");

        let parsed: ObjectPath = rendered.parse().unwrap();
        assert_eq!(parsed, path);
        assert_eq!(parsed.leaf().unwrap().ident, "b3");
    }

    #[test]
    fn test_object_path_root() {
        let root: ObjectPath = "/".parse().unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");
    }

    #[test]
    fn test_object_path_rejects_dangling_kind() {
        assert!("/map/m0/block".parse::<ObjectPath>().is_err());
    }

    #[test]
    fn test_assigned_idents_unique() {
        assert_ne!(assigned_ident(), assigned_ident());
    }
}
