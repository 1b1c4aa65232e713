//! Type registry: converters, field tables, method tables and constructors
//!
//! A `Registry` owns every table the reflection engine consults. Tables are
//! filled during start-up registration and as a side effect of encoding, and
//! are only read afterwards. Each table sits behind its own lock; entries are
//! cloned out before use so that nested encoders and decoders can re-enter
//! the registry freely.
//!
//! A process-wide instance is available through [`shared`]; tests and
//! embedders can build private registries with [`Registry::new`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::converter::Converters;
use crate::error::{ReflectError, Result};
use crate::field::{FieldEntry, FieldTable};
use crate::kind::Reflect;
use crate::serializable::Serializable;

/// Factory building a default instance of a registered type
pub type Constructor = fn() -> Box<dyn Any>;

/// Destroyer for an instance built by the matching constructor
///
/// Returns the instance back if it is not of the registered type.
pub type Destructor = fn(Box<dyn Any>) -> std::result::Result<(), Box<dyn Any>>;

/// Constructor/destructor pair for one registered type
#[derive(Debug, Clone, Copy)]
pub struct TypeEntry {
    pub type_id: TypeId,
    pub construct: Constructor,
    pub destroy: Destructor,
}

impl TypeEntry {
    pub fn of<T: Serializable>() -> Self {
        fn construct<T: Serializable>() -> Box<dyn Any> {
            Box::new(T::default())
        }
        fn destroy<T: Serializable>(
            instance: Box<dyn Any>,
        ) -> std::result::Result<(), Box<dyn Any>> {
            instance.downcast::<T>().map(drop)
        }
        Self {
            type_id: TypeId::of::<T>(),
            construct: construct::<T>,
            destroy: destroy::<T>,
        }
    }
}

/// One entry of a type's method table
#[derive(Clone)]
pub struct MethodEntry {
    /// Name of the stored function pointer type
    pub type_tag: String,
    pub callable: Arc<dyn Any + Send + Sync>,
}

impl MethodEntry {
    pub fn new(type_tag: String, callable: Arc<dyn Any + Send + Sync>) -> Self {
        Self { type_tag, callable }
    }
}

impl std::fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodEntry")
            .field("type_tag", &self.type_tag)
            .finish_non_exhaustive()
    }
}

/// Tables backing reflection, encoding and decoding
#[derive(Default)]
pub struct Registry {
    converters: Converters,
    fields: RwLock<HashMap<String, FieldTable>>,
    methods: RwLock<HashMap<String, HashMap<String, MethodEntry>>>,
    types: RwLock<HashMap<String, TypeEntry>>,
}

static SHARED: Lazy<Registry> = Lazy::new(Registry::new);

/// Process-wide registry, created on first use
pub fn shared() -> &'static Registry {
    &SHARED
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn converters(&self) -> &Converters {
        &self.converters
    }

    /// Register the converter for `T` unless one already exists
    pub fn ensure_converter<T: Reflect>(&self) {
        self.converters.ensure::<T>();
    }

    /// Decode `text` as `T` through the converter registered for `T`'s tag
    ///
    /// # Errors
    ///
    /// Returns `DecodeUnknown` if no converter is registered for the tag,
    /// otherwise whatever the converter reports.
    pub fn decode_tagged<T: Reflect>(&self, text: &str) -> Result<T> {
        let tag = T::type_tag();
        let codec = self.converters.get(&tag).ok_or_else(|| {
            ReflectError::decode_unknown(format!("no converter registered for <{}>", tag))
        })?;
        let value = codec.decode(text, self)?;
        value.downcast::<T>().map(|value| *value).map_err(|_| {
            ReflectError::decode_unknown(format!("converter for <{}> built another type", tag))
        })
    }

    /// File one field under `class`, overwriting an entry of the same name
    pub fn register_field(&self, class: &str, name: &str, entry: FieldEntry) {
        let mut fields = self.fields.write().unwrap_or_else(PoisonError::into_inner);
        let table = fields.entry(class.to_string()).or_default();
        if let Some(existing) = table.get(name) {
            if *existing != entry {
                warn!(class, field = name, "field table entry overridden");
            }
        } else {
            debug!(class, field = name, type_tag = %entry.type_tag, "registered field");
        }
        table.insert(name, entry);
    }

    pub fn has_field(&self, class: &str, name: &str) -> bool {
        let fields = self.fields.read().unwrap_or_else(PoisonError::into_inner);
        fields
            .get(class)
            .map(|table| table.contains(name))
            .unwrap_or(false)
    }

    /// Snapshot of the field table of `class`
    pub fn field_table(&self, class: &str) -> Option<FieldTable> {
        let fields = self.fields.read().unwrap_or_else(PoisonError::into_inner);
        fields.get(class).cloned()
    }

    pub(crate) fn field_entry(&self, class: &str, name: &str) -> Result<FieldEntry> {
        let fields = self.fields.read().unwrap_or_else(PoisonError::into_inner);
        fields
            .get(class)
            .and_then(|table| table.get(name))
            .cloned()
            .ok_or_else(|| ReflectError::unknown_field(class, name))
    }

    /// Field names of `R` in declaration order
    pub fn get_field_names<R: Serializable>(&self) -> Vec<String> {
        self.get_field_names_of(R::CLASS_NAME)
    }

    pub fn get_field_names_of(&self, class: &str) -> Vec<String> {
        self.field_table(class)
            .map(|table| table.names())
            .unwrap_or_default()
    }

    /// Type tag of a registered field
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if `class` has no such field.
    pub fn get_field_type(&self, class: &str, name: &str) -> Result<String> {
        self.field_entry(class, name).map(|entry| entry.type_tag)
    }

    /// Byte offset of a registered field within its record
    pub fn get_field_offset(&self, class: &str, name: &str) -> Result<usize> {
        self.field_entry(class, name).map(|entry| entry.byte_offset)
    }

    /// Borrow field `name` of `record` as `F`
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if the field does not exist or is not an `F`.
    pub fn get_field<'a, F: 'static, R: Serializable>(
        &self,
        record: &'a R,
        name: &str,
    ) -> Result<&'a F> {
        self.get_field_dyn(record, R::CLASS_NAME, name)
    }

    pub fn get_field_mut<'a, F: 'static, R: Serializable>(
        &self,
        record: &'a mut R,
        name: &str,
    ) -> Result<&'a mut F> {
        self.get_field_dyn_mut(record, R::CLASS_NAME, name)
    }

    /// Overwrite field `name` of `record`
    pub fn set_field<F: 'static, R: Serializable>(
        &self,
        record: &mut R,
        name: &str,
        value: F,
    ) -> Result<()> {
        self.set_field_dyn(record, R::CLASS_NAME, name, value)
    }

    /// Borrow field `name` of an erased instance of `class`
    pub fn get_field_dyn<'a, F: 'static>(
        &self,
        instance: &'a dyn Any,
        class: &str,
        name: &str,
    ) -> Result<&'a F> {
        let entry = self.field_entry(class, name)?;
        entry
            .slot
            .read(instance)
            .and_then(|field| field.downcast_ref::<F>())
            .ok_or_else(|| ReflectError::unknown_field(class, name))
    }

    pub fn get_field_dyn_mut<'a, F: 'static>(
        &self,
        instance: &'a mut dyn Any,
        class: &str,
        name: &str,
    ) -> Result<&'a mut F> {
        let entry = self.field_entry(class, name)?;
        entry
            .slot
            .write(instance)
            .and_then(|field| field.downcast_mut::<F>())
            .ok_or_else(|| ReflectError::unknown_field(class, name))
    }

    /// Overwrite field `name` of an erased instance of `class`
    pub fn set_field_dyn<F: 'static>(
        &self,
        instance: &mut dyn Any,
        class: &str,
        name: &str,
        value: F,
    ) -> Result<()> {
        *self.get_field_dyn_mut::<F>(instance, class, name)? = value;
        Ok(())
    }

    pub fn register_method(&self, class: &str, name: &str, entry: MethodEntry) {
        let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
        let table = methods.entry(class.to_string()).or_default();
        match table.get(name) {
            Some(existing) if existing.type_tag != entry.type_tag => {
                warn!(class, method = name, "method table entry overridden");
            }
            Some(_) => {}
            None => debug!(class, method = name, "registered method"),
        }
        table.insert(name.to_string(), entry);
    }

    /// Stored function pointer for method `name` of `class`
    ///
    /// `M` must be the exact function pointer type the method was registered
    /// with.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMethod` if the method is missing or `M` does not match.
    pub fn get_method<M: Copy + 'static>(&self, class: &str, name: &str) -> Result<M> {
        let methods = self.methods.read().unwrap_or_else(PoisonError::into_inner);
        methods
            .get(class)
            .and_then(|table| table.get(name))
            .and_then(|entry| entry.callable.downcast_ref::<M>())
            .copied()
            .ok_or_else(|| ReflectError::unknown_method(class, name))
    }

    /// Method names of `class`, sorted
    pub fn get_method_names(&self, class: &str) -> Vec<String> {
        let methods = self.methods.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = methods
            .get(class)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Record constructor and destructor for `T` under `class`
    ///
    /// Returns `true` if the name was not registered before.
    pub fn register_type<T: Serializable>(&self, class: &str) -> bool {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        let entry = TypeEntry::of::<T>();
        let fresh = match types.get(class) {
            Some(existing) if existing.type_id != entry.type_id => {
                warn!(class, "overriding existing type registration");
                false
            }
            Some(_) => false,
            None => {
                debug!(class, "registered type");
                true
            }
        };
        types.insert(class.to_string(), entry);
        fresh
    }

    pub fn is_registered(&self, class: &str) -> bool {
        let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
        types.contains_key(class)
    }

    /// Names of every registered type, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = types.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a default instance of a registered type
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if nothing is registered under `class`.
    pub fn get_instance(&self, class: &str) -> Result<Box<dyn Any>> {
        let construct = {
            let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
            types
                .get(class)
                .map(|entry| entry.construct)
                .ok_or_else(|| ReflectError::UnknownType(class.to_string()))?
        };
        Ok(construct())
    }

    /// Destroy an instance built by `get_instance`
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if `class` is unknown or the instance is of
    /// another type.
    pub fn delete_instance(&self, class: &str, instance: Box<dyn Any>) -> Result<()> {
        let destroy = {
            let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
            types
                .get(class)
                .map(|entry| entry.destroy)
                .ok_or_else(|| ReflectError::UnknownType(class.to_string()))?
        };
        destroy(instance).map_err(|_| ReflectError::UnknownType(class.to_string()))
    }

    /// Tags of every type that currently has a converter, sorted
    pub fn serializable_types(&self) -> Vec<String> {
        self.converters.tags()
    }
}
