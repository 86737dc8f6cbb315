//! Generic structured-form serialization hooks.
//!
//! Every serializable entity converts to and from a `serde_json::Value`
//! mapping of plain scalars, sequences, and nested mappings. The external
//! JSON pipeline and the durable store consume these two hooks; the core
//! assumes no encoding beyond them. Deserialization runs against a
//! `StructuredContext` whose image store resolves shared images by content
//! digest.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::core::address::Address;
use crate::core::address_container::AddressContainer;
use crate::core::block::BlockTree;
use crate::core::changeset::RevisionChain;
use crate::core::container::{ByteContainer, ByteContainerRecord};
use crate::core::image::Image;
use crate::core::map::{Map, MapPerms};
use crate::core::metadata::EntityMeta;
use crate::error::{ModelError, Result};

/// Shared images keyed by content digest, used to rebind deserialized
/// containers to their blobs.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: HashMap<String, Arc<Image>>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image under its content digest, returning the digest.
    pub fn insert(&mut self, image: Arc<Image>) -> String {
        let ident = image.ident().to_string();
        self.images.insert(ident.clone(), image);
        ident
    }

    pub fn get(&self, ident: &str) -> Option<Arc<Image>> {
        self.images.get(ident).cloned()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Deserialization context handed to `from_structured_form`.
#[derive(Debug, Clone, Default)]
pub struct StructuredContext {
    pub images: ImageStore,
}

impl StructuredContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn image(&self, ident: &str) -> Result<Arc<Image>> {
        self.images.get(ident).ok_or_else(|| {
            ModelError::Serialization(format!("unknown image ident: {}", ident))
        })
    }
}

/// The serialize/deserialize hook implemented by every persistent entity.
pub trait StructuredForm: Sized {
    /// Render the entity as a mapping of plain scalars/sequences/mappings.
    fn to_structured_form(&self) -> Result<Value>;

    /// Rebuild the entity from `value`, resolving shared references through
    /// `context`.
    fn from_structured_form(value: &Value, context: &StructuredContext) -> Result<Self>;
}

fn to_value<T: Serialize>(entity: &T) -> Result<Value> {
    Ok(serde_json::to_value(entity)?)
}

fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(serde_json::from_value(value.clone())?)
}

fn field<'a>(value: &'a Value, key: &str) -> Result<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| ModelError::Serialization(format!("missing field: {}", key)))
}

fn str_field(value: &Value, key: &str) -> Result<String> {
    Ok(field(value, key)?
        .as_str()
        .ok_or_else(|| ModelError::Serialization(format!("field {} is not a string", key)))?
        .to_string())
}

fn u64_field(value: &Value, key: &str) -> Result<u64> {
    field(value, key)?
        .as_u64()
        .ok_or_else(|| ModelError::Serialization(format!("field {} is not an integer", key)))
}

impl StructuredForm for Image {
    fn to_structured_form(&self) -> Result<Value> {
        let mut form = serde_json::Map::new();
        form.insert("ident".into(), json!(self.ident()));
        form.insert("size".into(), json!(self.size()));
        if let Some(path) = self.path() {
            form.insert("kind".into(), json!("remote"));
            form.insert("path".into(), json!(path.display().to_string()));
        } else if let Some(pattern) = self.virtual_pattern() {
            form.insert("kind".into(), json!("virtual"));
            form.insert("pattern".into(), json!(hex::encode(pattern)));
        } else {
            form.insert("kind".into(), json!("buffer"));
            form.insert("data".into(), json!(hex::encode(self.bytes()?)));
        }
        Ok(Value::Object(form))
    }

    fn from_structured_form(value: &Value, _context: &StructuredContext) -> Result<Self> {
        let kind = str_field(value, "kind")?;
        match kind.as_str() {
            "buffer" => {
                let data = hex::decode(str_field(value, "data")?)
                    .map_err(|e| ModelError::Serialization(e.to_string()))?;
                Ok(Image::from_bytes(data))
            }
            "virtual" => {
                let pattern = hex::decode(str_field(value, "pattern")?)
                    .map_err(|e| ModelError::Serialization(e.to_string()))?;
                Ok(Image::filled(pattern, u64_field(value, "size")?))
            }
            "remote" => Ok(Image::remote_pinned(
                str_field(value, "path")?,
                u64_field(value, "size")?,
                str_field(value, "ident")?,
            )),
            other => Err(ModelError::Serialization(format!(
                "unknown image kind: {}",
                other
            ))),
        }
    }
}

impl StructuredForm for ByteContainer {
    fn to_structured_form(&self) -> Result<Value> {
        to_value(&ByteContainerRecord::of(self))
    }

    fn from_structured_form(value: &Value, context: &StructuredContext) -> Result<Self> {
        let record: ByteContainerRecord = from_value(value)?;
        let image = context.image(&record.image)?;
        record.bind(image)
    }
}

impl StructuredForm for Address {
    fn to_structured_form(&self) -> Result<Value> {
        to_value(self)
    }

    fn from_structured_form(value: &Value, _context: &StructuredContext) -> Result<Self> {
        from_value(value)
    }
}

impl StructuredForm for RevisionChain {
    fn to_structured_form(&self) -> Result<Value> {
        to_value(self)
    }

    fn from_structured_form(value: &Value, _context: &StructuredContext) -> Result<Self> {
        from_value(value)
    }
}

impl StructuredForm for BlockTree {
    fn to_structured_form(&self) -> Result<Value> {
        to_value(self)
    }

    fn from_structured_form(value: &Value, _context: &StructuredContext) -> Result<Self> {
        from_value(value)
    }
}

impl StructuredForm for AddressContainer {
    fn to_structured_form(&self) -> Result<Value> {
        use crate::core::metadata::Entity;
        let registry: Vec<Vec<&Address>> = self
            .registry()
            .iter()
            .map(|slot| slot.values().collect())
            .collect();
        Ok(json!({
            "ident": self.ident(),
            "container": self.container().to_structured_form()?,
            "chain": to_value(self.chain())?,
            "registry": to_value(&registry)?,
            "meta": to_value(&self.meta)?,
        }))
    }

    fn from_structured_form(value: &Value, context: &StructuredContext) -> Result<Self> {
        let container = ByteContainer::from_structured_form(field(value, "container")?, context)?;
        let chain: RevisionChain = from_value(field(value, "chain")?)?;
        let slots: Vec<Vec<Address>> = from_value(field(value, "registry")?)?;
        if slots.len() != chain.current() + 1 {
            return Err(ModelError::Serialization(format!(
                "registry has {} slots for {} revisions",
                slots.len(),
                chain.current() + 1
            )));
        }
        let registry: Vec<BTreeMap<u64, Address>> = slots
            .into_iter()
            .map(|slot| slot.into_iter().map(|a| (a.offset, a)).collect())
            .collect();
        let meta: EntityMeta = from_value(field(value, "meta")?)?;
        Ok(AddressContainer::from_parts(
            container,
            chain,
            registry,
            str_field(value, "ident")?,
            meta,
        ))
    }
}

impl StructuredForm for Map {
    fn to_structured_form(&self) -> Result<Value> {
        use crate::core::metadata::Entity;
        let block = match self.root_block() {
            Some(tree) => tree.to_structured_form()?,
            None => Value::Null,
        };
        Ok(json!({
            "ident": self.ident(),
            "perms": to_value(&self.perms())?,
            "container": self.address_container().to_structured_form()?,
            "block": block,
            "meta": to_value(&self.meta)?,
        }))
    }

    fn from_structured_form(value: &Value, context: &StructuredContext) -> Result<Self> {
        let perms: MapPerms = from_value(field(value, "perms")?)?;
        let container = AddressContainer::from_structured_form(field(value, "container")?, context)?;
        let block = match field(value, "block")? {
            Value::Null => None,
            form => Some(BlockTree::from_structured_form(form, context)?),
        };
        let meta: EntityMeta = from_value(field(value, "meta")?)?;
        Ok(Map::from_parts(
            str_field(value, "ident")?,
            perms,
            container,
            block,
            meta,
        ))
    }
}
