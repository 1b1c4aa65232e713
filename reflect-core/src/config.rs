//! Ordered field-name to encoded-text mapping for one record instance

use std::fmt;
use std::sync::Arc;

use crate::codec;
use crate::error::Result;
use crate::field::{
    byte_offset_of, ErasedField, FieldDescriptor, FieldEntry, FieldSlot, NestedSlot,
};
use crate::registry::Registry;
use crate::serializable::Serializable;

/// Reserved key naming the most-derived record type
pub const CLASS_NAME_KEY: &str = "class_name";

/// Encoded fields of one record, in declaration order
///
/// Keys are unique. Setting an existing key overwrites its value in place, so
/// the output order is always the order in which keys were first inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    owner: Option<String>,
    entries: Vec<(String, String)>,
}

impl Config {
    /// Empty config with no owning type
    pub fn new() -> Self {
        Self::default()
    }

    /// Config owned by record type `R`, starting with its `class_name`
    ///
    /// Field descriptors passed to `update` on this config are filed in the
    /// field table of `R`.
    pub fn of<R: Serializable>() -> Self {
        let mut config = Self {
            owner: Some(R::CLASS_NAME.to_string()),
            entries: Vec::new(),
        };
        config.set(CLASS_NAME_KEY, codec::quote(R::CLASS_NAME));
        config
    }

    /// Type whose field table receives this config's descriptors
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Unquoted `class_name` entry, if present
    pub fn class_name(&self) -> Option<&str> {
        self.get(CLASS_NAME_KEY)
            .and_then(|text| codec::unquote(text).ok())
    }

    pub fn set(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let text = text.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, value)) => *value = text,
            None => self.entries.push((name, text)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, text)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Add or overwrite entries from field descriptors
    ///
    /// Data descriptors are also filed in the owner's field table. Method
    /// descriptors are skipped: they were filed in the method table when they
    /// were built and never appear as data.
    ///
    /// # Errors
    ///
    /// Returns the first error produced while building a descriptor.
    pub fn update(
        &mut self,
        registry: &Registry,
        descriptors: impl IntoIterator<Item = Result<FieldDescriptor>>,
    ) -> Result<()> {
        for descriptor in descriptors {
            let descriptor = descriptor?;
            if !descriptor.is_field {
                continue;
            }
            if let (Some(owner), Some(entry)) = (&self.owner, descriptor.entry()) {
                registry.register_field(owner, &descriptor.name, entry);
            }
            self.set(descriptor.name, descriptor.encoded);
        }
        Ok(())
    }

    /// Layer a parent's entries under this config
    ///
    /// Entries already present here win over the parent's, including
    /// `class_name`. The result lists `class_name` first, then the parent's
    /// keys in the parent's order, then the keys only this config has.
    pub fn merge(&mut self, parent: &Config) {
        let mut own = std::mem::take(&mut self.entries);
        let mut merged = Vec::with_capacity(own.len() + parent.len());
        let mut take_own = |name: &str| {
            own.iter()
                .position(|(key, _)| key == name)
                .map(|index| own.remove(index))
        };

        if let Some(entry) = take_own(CLASS_NAME_KEY) {
            merged.push(entry);
        }
        for (name, text) in parent.iter().filter(|(name, _)| *name != CLASS_NAME_KEY) {
            merged.push(take_own(name).unwrap_or_else(|| (name.to_string(), text.to_string())));
        }
        merged.append(&mut own);
        self.entries = merged;
    }

    /// Inherit every field of the parent record `P` embedded in `record`
    ///
    /// The parent's fields are added to this config, and the parent's field
    /// table entries are copied under this config's owner with accessors that
    /// reach through `get`/`set`, unless the owner already has an entry of
    /// the same name. A derived field of the same name shadows the parent's
    /// whether it is added before or after this call.
    ///
    /// # Arguments
    ///
    /// * `record` - The derived record being described
    /// * `get` - Borrows the embedded parent
    /// * `set` - Mutably borrows the embedded parent
    pub fn inherit<P: Serializable, R: 'static>(
        &mut self,
        registry: &Registry,
        record: &R,
        get: fn(&R) -> &P,
        set: fn(&mut R) -> &mut P,
    ) -> Result<()> {
        let parent = get(record);
        let parent_config = parent.get_config(registry)?;

        if let (Some(owner), Some(table)) = (&self.owner, registry.field_table(P::CLASS_NAME)) {
            let base_offset = byte_offset_of(record, parent);
            let outer: Arc<dyn ErasedField> = Arc::new(FieldSlot::new(get, set));
            for (name, entry) in table.iter() {
                if registry.has_field(owner, name) {
                    continue;
                }
                let inherited = FieldEntry {
                    type_tag: entry.type_tag.clone(),
                    byte_offset: base_offset + entry.byte_offset,
                    slot: Arc::new(NestedSlot::new(outer.clone(), entry.slot.clone())),
                };
                registry.register_field(owner, name, inherited);
            }
        }

        self.merge(&parent_config);
        Ok(())
    }

    /// Render as object text
    ///
    /// Top-level output puts every entry on its own line; nested output keeps
    /// the object on one line.
    pub fn to_text(&self, top_level: bool) -> String {
        render(self.iter(), top_level)
    }

    /// Render without `class_name`, for embedding inside another value
    pub fn to_nested_text(&self) -> String {
        render(
            self.iter().filter(|(name, _)| *name != CLASS_NAME_KEY),
            false,
        )
    }
}

fn render<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>, top_level: bool) -> String {
    let separator = if top_level { "\n" } else { " " };
    let body: Vec<String> = entries
        .map(|(name, text)| format!("\"{}\":{}", name, text))
        .collect();
    if body.is_empty() {
        return "{}".to_string();
    }
    format!(
        "{{{sep}{}{sep}}}",
        body.join(&format!(",{}", separator)),
        sep = separator
    )
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(true))
    }
}
