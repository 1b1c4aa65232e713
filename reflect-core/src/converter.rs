//! Converter registry: type-tag keyed encode/decode capabilities
//!
//! Every data-bearing type gets one converter the first time a value of that
//! type is encoded. A converter is the erased face of a typed `Reflect` impl:
//! it decodes text into a fresh value or into an existing slot, and encodes a
//! value it only sees as `&dyn Any`. Nested converters look each other up by
//! type tag through the owning `Registry`, so arbitrarily deep shapes decode
//! without per-shape code.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{ReflectError, Result};
use crate::kind::{Kind, Reflect};
use crate::registry::Registry;

/// Runtime interface for one concrete type's text conversion
///
/// Implemented for every `Reflect` type by `CodecAdapter`; callers never need
/// to implement it by hand.
pub trait ErasedCodec: Send + Sync {
    /// Tag of the type this converter handles
    fn type_tag(&self) -> String;

    /// Encoding category of the handled type
    fn kind(&self) -> Kind;

    /// `TypeId` of the handled type
    fn value_type_id(&self) -> TypeId;

    /// Decode `text` into a freshly built value
    fn decode(&self, text: &str, registry: &Registry) -> Result<Box<dyn Any>>;

    /// Decode `text` and write the result into `slot`
    ///
    /// # Errors
    ///
    /// Returns `DecodeUnknown` if `slot` does not hold the handled type, or
    /// whatever the typed decoder reports.
    fn decode_into(&self, slot: &mut dyn Any, text: &str, registry: &Registry) -> Result<()>;

    /// Encode a value of the handled type
    fn encode(&self, value: &dyn Any, registry: &Registry) -> Result<String>;

    /// Reset a nullable slot to its null state
    fn null_out(&self, slot: &mut dyn Any) -> Result<()>;
}

/// Adapter exposing a typed `Reflect` impl through `ErasedCodec`
pub struct CodecAdapter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Reflect> CodecAdapter<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    fn slot_of<'a>(&self, slot: &'a mut dyn Any) -> Result<&'a mut T> {
        slot.downcast_mut::<T>().ok_or_else(|| {
            ReflectError::decode_unknown(format!(
                "slot does not hold a value of type <{}>",
                T::type_tag()
            ))
        })
    }
}

impl<T: Reflect> Default for CodecAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reflect> ErasedCodec for CodecAdapter<T> {
    fn type_tag(&self) -> String {
        T::type_tag()
    }

    fn kind(&self) -> Kind {
        T::KIND
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn decode(&self, text: &str, registry: &Registry) -> Result<Box<dyn Any>> {
        let value = T::decode(text, registry)?;
        Ok(Box::new(value))
    }

    fn decode_into(&self, slot: &mut dyn Any, text: &str, registry: &Registry) -> Result<()> {
        let value = T::decode(text, registry)?;
        *self.slot_of(slot)? = value;
        Ok(())
    }

    fn encode(&self, value: &dyn Any, registry: &Registry) -> Result<String> {
        let value = value
            .downcast_ref::<T>()
            .ok_or_else(|| ReflectError::NotSerializable(T::type_tag()))?;
        value.encode(registry)
    }

    fn null_out(&self, slot: &mut dyn Any) -> Result<()> {
        if self.slot_of(slot)?.null_out() {
            Ok(())
        } else {
            Err(ReflectError::decode_unknown(format!(
                "type <{}> has no null state",
                T::type_tag()
            )))
        }
    }
}

#[derive(Default)]
struct ConverterTable {
    by_tag: HashMap<String, Arc<dyn ErasedCodec>>,
    by_type: HashMap<TypeId, String>,
}

/// Type-tag keyed table of converters
///
/// Guarded by a single writer lock. Converters are cloned out of the table
/// before they run, so a converter that recurses into the table never holds
/// the lock.
#[derive(Default)]
pub struct Converters {
    table: RwLock<ConverterTable>,
}

impl Converters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the converter for `T` unless one already exists
    ///
    /// Returns `true` when a new converter was inserted.
    pub fn ensure<T: Reflect>(&self) -> bool {
        let tag = T::type_tag();
        {
            let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
            if table.by_tag.contains_key(&tag) {
                return false;
            }
        }
        self.insert::<T>();
        true
    }

    /// Register (or replace) the converter for `T`
    pub fn insert<T: Reflect>(&self) {
        let tag = T::type_tag();
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if !table.by_tag.contains_key(&tag) {
            debug!(type_tag = %tag, kind = %T::KIND, "registered converter");
        }
        table.by_type.insert(TypeId::of::<T>(), tag.clone());
        table
            .by_tag
            .insert(tag, Arc::new(CodecAdapter::<T>::new()) as Arc<dyn ErasedCodec>);
    }

    /// Look up the converter for a type tag
    pub fn get(&self, type_tag: &str) -> Option<Arc<dyn ErasedCodec>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_tag.get(type_tag).cloned()
    }

    /// Look up the converter for a concrete type
    pub fn get_by_type(&self, type_id: TypeId) -> Option<Arc<dyn ErasedCodec>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_type
            .get(&type_id)
            .and_then(|tag| table.by_tag.get(tag))
            .cloned()
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_tag.contains_key(type_tag)
    }

    /// All registered type tags, sorted
    pub fn tags(&self) -> Vec<String> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut tags: Vec<String> = table.by_tag.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
