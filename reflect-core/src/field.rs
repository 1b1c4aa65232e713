//! Field descriptors and type-erased field access
//!
//! A record lists its persisted fields by building one `FieldDescriptor` per
//! field. Building a descriptor encodes the field's current value and captures
//! an accessor pair for it; `Config::update` then files the accessor in the
//! owning type's field table so the field can later be read or written by name
//! on any instance of that type.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::kind::{Kind, Reflect};
use crate::registry::{MethodEntry, Registry};
use crate::serializable::Serializable;

/// Placeholder text rendered for method descriptors
pub const METHOD_SENTINEL: &str = "<classmethod>";

/// Read/write access to one field of a record seen as `dyn Any`
pub trait ErasedField: Send + Sync {
    /// Borrow the field, or `None` if `record` is not the owning type
    fn read<'a>(&self, record: &'a dyn Any) -> Option<&'a dyn Any>;

    /// Mutably borrow the field, or `None` if `record` is not the owning type
    fn write<'a>(&self, record: &'a mut dyn Any) -> Option<&'a mut dyn Any>;
}

/// Accessor pair for field `F` of record `R`
pub struct FieldSlot<R, F> {
    get: fn(&R) -> &F,
    set: fn(&mut R) -> &mut F,
}

impl<R: 'static, F: 'static> FieldSlot<R, F> {
    pub fn new(get: fn(&R) -> &F, set: fn(&mut R) -> &mut F) -> Self {
        Self { get, set }
    }
}

impl<R: 'static, F: 'static> ErasedField for FieldSlot<R, F> {
    fn read<'a>(&self, record: &'a dyn Any) -> Option<&'a dyn Any> {
        let record = record.downcast_ref::<R>()?;
        Some((self.get)(record))
    }

    fn write<'a>(&self, record: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        let record = record.downcast_mut::<R>()?;
        Some((self.set)(record))
    }
}

/// Accessor reaching through an embedded value, e.g. a parent record
pub struct NestedSlot {
    outer: Arc<dyn ErasedField>,
    inner: Arc<dyn ErasedField>,
}

impl NestedSlot {
    pub fn new(outer: Arc<dyn ErasedField>, inner: Arc<dyn ErasedField>) -> Self {
        Self { outer, inner }
    }
}

impl ErasedField for NestedSlot {
    fn read<'a>(&self, record: &'a dyn Any) -> Option<&'a dyn Any> {
        self.inner.read(self.outer.read(record)?)
    }

    fn write<'a>(&self, record: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        self.inner.write(self.outer.write(record)?)
    }
}

/// One row of a type's field table
#[derive(Clone)]
pub struct FieldEntry {
    pub type_tag: String,
    pub byte_offset: usize,
    pub slot: Arc<dyn ErasedField>,
}

impl fmt::Debug for FieldEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldEntry")
            .field("type_tag", &self.type_tag)
            .field("byte_offset", &self.byte_offset)
            .finish_non_exhaustive()
    }
}

impl PartialEq for FieldEntry {
    fn eq(&self, other: &Self) -> bool {
        self.type_tag == other.type_tag && self.byte_offset == other.byte_offset
    }
}

/// Per-type field table in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable {
    entries: Vec<(String, FieldEntry)>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite in place; returns `true` if the name was new
    pub fn insert(&mut self, name: &str, entry: FieldEntry) -> bool {
        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => {
                *slot = entry;
                false
            }
            None => {
                self.entries.push((name.to_string(), entry));
                true
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldEntry> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, entry)| entry)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Distance in bytes from `record` to `field`
///
/// Computed from addresses only; nothing is ever dereferenced through it.
pub fn byte_offset_of<R, F>(record: &R, field: &F) -> usize {
    (field as *const F as usize).wrapping_sub(record as *const R as usize)
}

/// Description of one persisted field (or one exposed method) of a record
pub struct FieldDescriptor {
    pub name: String,
    pub type_tag: String,
    pub byte_offset: usize,
    pub encoded: String,
    pub kind: Kind,
    pub is_field: bool,
    slot: Option<Arc<dyn ErasedField>>,
}

impl FieldDescriptor {
    /// Describe a data field of `record`
    ///
    /// Encodes the field's current value (which registers its converter) and
    /// captures the accessor pair. Prefer the `field!` macro, which derives
    /// the name and both accessors from the field path.
    pub fn field<R: 'static, F: Reflect>(
        registry: &Registry,
        record: &R,
        name: &str,
        get: fn(&R) -> &F,
        set: fn(&mut R) -> &mut F,
    ) -> Result<Self> {
        let value = get(record);
        let encoded = value.encode(registry)?;
        Ok(Self {
            name: name.to_string(),
            type_tag: F::type_tag(),
            byte_offset: byte_offset_of(record, value),
            encoded,
            kind: F::KIND,
            is_field: true,
            slot: Some(Arc::new(FieldSlot::new(get, set))),
        })
    }

    /// Describe a method of record type `R` reachable by name
    ///
    /// `method` is a plain function pointer such as
    /// `Board::reveal as fn(&mut Board, usize) -> bool`. It is filed in the
    /// method table right away and never becomes part of a `Config`.
    pub fn method<R: Serializable, M: Copy + Send + Sync + 'static>(
        registry: &Registry,
        name: &str,
        method: M,
    ) -> Result<Self> {
        let type_tag = type_name::<M>().to_string();
        registry.register_method(
            R::CLASS_NAME,
            name,
            MethodEntry::new(type_tag.clone(), Arc::new(method)),
        );
        Ok(Self {
            name: name.to_string(),
            type_tag,
            byte_offset: 0,
            encoded: METHOD_SENTINEL.to_string(),
            kind: Kind::Method,
            is_field: false,
            slot: None,
        })
    }

    /// Field table row for this descriptor, if it describes data
    pub fn entry(&self) -> Option<FieldEntry> {
        let slot = self.slot.clone()?;
        Some(FieldEntry {
            type_tag: self.type_tag.clone(),
            byte_offset: self.byte_offset,
            slot,
        })
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("type_tag", &self.type_tag)
            .field("byte_offset", &self.byte_offset)
            .field("encoded", &self.encoded)
            .field("kind", &self.kind)
            .field("is_field", &self.is_field)
            .finish()
    }
}

/// Build a `FieldDescriptor` for `record.field`
///
/// ```ignore
/// config.update(registry, [
///     field!(registry, self, over),
///     field!(registry, self, mine),
/// ])?;
/// ```
#[macro_export]
macro_rules! field {
    ($registry:expr, $record:expr, $name:ident) => {
        $crate::field::FieldDescriptor::field(
            $registry,
            $record,
            stringify!($name),
            |record| &record.$name,
            |record| &mut record.$name,
        )
    };
}

/// Build a method `FieldDescriptor` for `Type::name` with an explicit signature
///
/// ```ignore
/// method!(registry, Board, reveal: fn(&mut Board, usize) -> Reveal)
/// ```
#[macro_export]
macro_rules! method {
    ($registry:expr, $record:ty, $name:ident : $signature:ty) => {
        $crate::field::FieldDescriptor::method::<$record, $signature>(
            $registry,
            stringify!($name),
            <$record>::$name as $signature,
        )
    };
}
