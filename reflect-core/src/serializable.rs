//! Record types and the serialization façade
//!
//! A record is a struct that lists its persisted fields through
//! `Serializable::get_config`. Wiring it up takes three steps:
//!
//! ```rust
//! use reflect_core::{field, reflect_record, Config, Registry, Result, Serializable};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! impl Serializable for Point {
//!     const CLASS_NAME: &'static str = "Point";
//!
//!     fn get_config(&self, registry: &Registry) -> Result<Config> {
//!         let mut config = Config::of::<Self>();
//!         config.update(registry, [field!(registry, self, x), field!(registry, self, y)])?;
//!         Ok(config)
//!     }
//! }
//!
//! reflect_record!(Point);
//!
//! let registry = Registry::new();
//! registry.register::<Point>().unwrap();
//!
//! let text = registry.dump(&Point { x: 1, y: 2 }).unwrap();
//! assert_eq!(registry.load::<Point>(&text).unwrap(), Point { x: 1, y: 2 });
//! ```

use std::any::Any;

use tracing::debug;

use crate::codec::{self, NULL_LITERAL};
use crate::config::{Config, CLASS_NAME_KEY};
use crate::error::{ReflectError, Result};
use crate::kind::{encode_items, Reflect, POINTER_MARKER};
use crate::registry::Registry;

/// A struct whose fields can be dumped to and loaded from text
pub trait Serializable: Reflect + Default {
    /// Name the type is registered and tagged under
    const CLASS_NAME: &'static str;

    /// Describe every persisted field, in a fixed order
    ///
    /// Start from `Config::of::<Self>()`, call `Config::inherit` for an
    /// embedded parent record if there is one, then `Config::update` with one
    /// `field!` per field.
    fn get_config(&self, registry: &Registry) -> Result<Config>;
}

/// Nested encoding of a record: its config on one line, without `class_name`
pub fn encode_record<T: Serializable>(record: &T, registry: &Registry) -> Result<String> {
    registry.ensure_converter::<T>();
    Ok(record.get_config(registry)?.to_nested_text())
}

/// Top-level encoding of a record: one entry per line, `class_name` first
pub fn dump_record<T: Serializable>(record: &T, registry: &Registry) -> Result<String> {
    registry.ensure_converter::<T>();
    Ok(record.get_config(registry)?.to_text(true))
}

/// Build a default record and apply the decoded text onto it
pub fn decode_record<T: Serializable>(text: &str, registry: &Registry) -> Result<T> {
    let config = codec::decode(text)?;
    let mut record = T::default();
    registry.from_config(&mut record, &config)?;
    Ok(record)
}

/// Implement `Reflect` for record types
///
/// The type must already implement `Serializable`.
#[macro_export]
macro_rules! reflect_record {
    ($($record:ty),+ $(,)?) => {
        $(
            impl $crate::kind::Reflect for $record {
                const KIND: $crate::kind::Kind = $crate::kind::Kind::Record;

                fn type_tag() -> ::std::string::String {
                    <$record as $crate::serializable::Serializable>::CLASS_NAME.to_string()
                }

                fn encode(
                    &self,
                    registry: &$crate::registry::Registry,
                ) -> $crate::error::Result<::std::string::String> {
                    $crate::serializable::encode_record(self, registry)
                }

                fn decode(
                    text: &str,
                    registry: &$crate::registry::Registry,
                ) -> $crate::error::Result<Self> {
                    $crate::serializable::decode_record(text, registry)
                }

                fn dump(
                    &self,
                    registry: &$crate::registry::Registry,
                ) -> $crate::error::Result<::std::string::String> {
                    $crate::serializable::dump_record(self, registry)
                }
            }
        )+
    };
}

/// Register several record types, stopping at the first failure
///
/// ```ignore
/// register_types!(registry, Point, Polygon, Layer)?;
/// ```
#[macro_export]
macro_rules! register_types {
    ($registry:expr, $($record:ty),+ $(,)?) => {{
        let registry: &$crate::registry::Registry = $registry;
        ::std::result::Result::Ok::<(), $crate::error::ReflectError>(())
            $(.and_then(|()| registry.register::<$record>()))+
    }};
}

impl Registry {
    /// Register record type `T`
    ///
    /// Builds one default instance's config so the field and method tables
    /// are filled before the first load. Registering twice leaves every table
    /// unchanged.
    pub fn register<T: Serializable>(&self) -> Result<()> {
        if self.register_type::<T>(T::CLASS_NAME) {
            debug!(class = T::CLASS_NAME, "registering serializable type");
        }
        T::default().get_config(self)?;
        self.ensure_converter::<T>();
        Ok(())
    }

    /// Encode a value as top-level text
    pub fn dump<T: Reflect>(&self, value: &T) -> Result<String> {
        value.dump(self)
    }

    /// Encode a homogeneous sequence as a bracketed list
    pub fn dump_list<T: Reflect>(&self, values: &[T]) -> Result<String> {
        self.ensure_converter::<Vec<T>>();
        self.ensure_converter::<T>();
        encode_items(values, self)
    }

    /// Encode an erased value through the converter of its concrete type
    ///
    /// Records come out in their nested form.
    ///
    /// # Errors
    ///
    /// Returns `NotSerializable` if no value of that type was encoded or
    /// registered before. An erased value carries no type name, so the error
    /// names the unregistered `TypeId` instead.
    pub fn dump_any(&self, value: &dyn Any) -> Result<String> {
        let type_id = value.type_id();
        let codec = self
            .converters()
            .get_by_type(type_id)
            .ok_or_else(|| ReflectError::NotSerializable(format!("unregistered {:?}", type_id)))?;
        codec.encode(value, self)
    }

    /// Decode a value of type `T`
    ///
    /// # Errors
    ///
    /// Delimiter errors pass through unchanged; every other failure is
    /// reported as `DecodeUnknown`.
    pub fn load<T: Reflect>(&self, text: &str) -> Result<T> {
        self.decode_tagged::<T>(text)
            .map_err(|err| err.into_decode_error())
    }

    /// Decode a value of the type registered under `class`
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if `class` was never registered; decode failures
    /// are reported as in `load`.
    pub fn load_by_name(&self, text: &str, class: &str) -> Result<Box<dyn Any>> {
        let mut instance = self.get_instance(class)?;
        let codec = self.converters().get(class).ok_or_else(|| {
            ReflectError::decode_unknown(format!("no converter registered for <{}>", class))
        })?;
        codec
            .decode_into(instance.as_mut(), text, self)
            .map_err(|err| err.into_decode_error())?;
        Ok(instance)
    }

    /// Apply a decoded config onto `record`
    pub fn from_config<R: Serializable>(&self, record: &mut R, config: &Config) -> Result<()> {
        self.from_config_dyn(record, R::CLASS_NAME, config)
    }

    /// Apply a decoded config onto an erased instance of `class`
    ///
    /// Every key except `class_name` must name a field in the type's field
    /// table. Fields may be left partially written if a later field fails.
    ///
    /// # Errors
    ///
    /// * `UnknownField` for a key with no field table entry
    /// * `DecodeUnknown` if the field's type has no converter
    /// * whatever the field's converter reports
    pub fn from_config_dyn(&self, instance: &mut dyn Any, class: &str, config: &Config) -> Result<()> {
        for (name, text) in config.iter() {
            if name == CLASS_NAME_KEY {
                continue;
            }
            let entry = self.field_entry(class, name)?;
            let codec = self.converters().get(&entry.type_tag).ok_or_else(|| {
                ReflectError::decode_unknown(format!(
                    "no converter registered for <{}>",
                    entry.type_tag
                ))
            })?;
            let slot = entry
                .slot
                .write(instance)
                .ok_or_else(|| ReflectError::unknown_field(class, name))?;

            if entry.type_tag.ends_with(POINTER_MARKER) && text.trim() == NULL_LITERAL {
                codec.null_out(slot)?;
            } else {
                codec.decode_into(slot, text, self)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl Serializable for Point {
        const CLASS_NAME: &'static str = "Point";

        fn get_config(&self, registry: &Registry) -> Result<Config> {
            let mut config = Config::of::<Self>();
            config.update(registry, [field!(registry, self, x), field!(registry, self, y)])?;
            Ok(config)
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Polygon {
        label: String,
        vertices: Vec<Point>,
    }

    impl Serializable for Polygon {
        const CLASS_NAME: &'static str = "Polygon";

        fn get_config(&self, registry: &Registry) -> Result<Config> {
            let mut config = Config::of::<Self>();
            config.update(
                registry,
                [field!(registry, self, label), field!(registry, self, vertices)],
            )?;
            Ok(config)
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Layer {
        visible: bool,
        polygons: Vec<Polygon>,
        anchor: Option<Point>,
    }

    impl Serializable for Layer {
        const CLASS_NAME: &'static str = "Layer";

        fn get_config(&self, registry: &Registry) -> Result<Config> {
            let mut config = Config::of::<Self>();
            config.update(
                registry,
                [
                    field!(registry, self, visible),
                    field!(registry, self, polygons),
                    field!(registry, self, anchor),
                ],
            )?;
            Ok(config)
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Base {
        a: i32,
        b: String,
    }

    impl Serializable for Base {
        const CLASS_NAME: &'static str = "Base";

        fn get_config(&self, registry: &Registry) -> Result<Config> {
            let mut config = Config::of::<Self>();
            config.update(registry, [field!(registry, self, a), field!(registry, self, b)])?;
            Ok(config)
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Derived {
        base: Base,
        c: bool,
    }

    impl Serializable for Derived {
        const CLASS_NAME: &'static str = "Derived";

        fn get_config(&self, registry: &Registry) -> Result<Config> {
            let mut config = Config::of::<Self>();
            config.inherit(registry, self, |d| &d.base, |d| &mut d.base)?;
            config.update(registry, [field!(registry, self, c)])?;
            Ok(config)
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Grand {
        derived: Derived,
        d: u8,
    }

    impl Serializable for Grand {
        const CLASS_NAME: &'static str = "Grand";

        fn get_config(&self, registry: &Registry) -> Result<Config> {
            let mut config = Config::of::<Self>();
            config.inherit(registry, self, |g| &g.derived, |g| &mut g.derived)?;
            config.update(registry, [field!(registry, self, d)])?;
            Ok(config)
        }
    }

    /// Own `a` added before the parent is inherited
    #[derive(Debug, Default, Clone, PartialEq)]
    struct ShadowLate {
        base: Base,
        a: i32,
    }

    impl Serializable for ShadowLate {
        const CLASS_NAME: &'static str = "ShadowLate";

        fn get_config(&self, registry: &Registry) -> Result<Config> {
            let mut config = Config::of::<Self>();
            config.update(registry, [field!(registry, self, a)])?;
            config.inherit(registry, self, |s| &s.base, |s| &mut s.base)?;
            Ok(config)
        }
    }

    /// Own `a` added after the parent is inherited
    #[derive(Debug, Default, Clone, PartialEq)]
    struct ShadowEarly {
        base: Base,
        a: i32,
    }

    impl Serializable for ShadowEarly {
        const CLASS_NAME: &'static str = "ShadowEarly";

        fn get_config(&self, registry: &Registry) -> Result<Config> {
            let mut config = Config::of::<Self>();
            config.inherit(registry, self, |s| &s.base, |s| &mut s.base)?;
            config.update(registry, [field!(registry, self, a)])?;
            Ok(config)
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Node {
        value: i32,
        next: Option<Box<Node>>,
    }

    impl Serializable for Node {
        const CLASS_NAME: &'static str = "Node";

        fn get_config(&self, registry: &Registry) -> Result<Config> {
            let mut config = Config::of::<Self>();
            config.update(
                registry,
                [field!(registry, self, value), field!(registry, self, next)],
            )?;
            Ok(config)
        }
    }

    reflect_record!(Point, Polygon, Layer, Base, Derived, Grand, ShadowLate, ShadowEarly, Node);

    fn registry() -> Registry {
        let registry = Registry::new();
        register_types!(
            &registry,
            Point,
            Polygon,
            Layer,
            Base,
            Derived,
            Grand,
            ShadowLate,
            ShadowEarly,
            Node
        )
        .unwrap();
        registry
    }

    fn sample_layer() -> Layer {
        Layer {
            visible: true,
            polygons: vec![
                Polygon {
                    label: "tri,{a}[b]".to_string(),
                    vertices: vec![Point { x: 0, y: 0 }, Point { x: 4, y: 0 }, Point { x: 0, y: 3 }],
                },
                Polygon {
                    label: String::new(),
                    vertices: Vec::new(),
                },
            ],
            anchor: None,
        }
    }

    #[test]
    fn test_dump_record_layout() {
        let registry = registry();
        let text = registry.dump(&Point { x: 1, y: -2 }).unwrap();
        assert_eq!(text, "{\n\"class_name\":\"Point\",\n\"x\":1,\n\"y\":-2\n}");
    }

    #[test]
    fn test_nested_records_omit_class_name() {
        let registry = registry();
        let polygon = Polygon {
            label: "p".to_string(),
            vertices: vec![Point { x: 1, y: 2 }],
        };
        let text = registry.dump(&polygon).unwrap();
        assert_eq!(
            text,
            "{\n\"class_name\":\"Polygon\",\n\"label\":\"p\",\n\"vertices\":[{ \"x\":1, \"y\":2 }]\n}"
        );
    }

    #[test]
    fn test_three_level_round_trip() {
        let registry = registry();
        let layer = sample_layer();

        let text = registry.dump(&layer).unwrap();
        assert_eq!(registry.load::<Layer>(&text).unwrap(), layer);
    }

    #[test]
    fn test_delimiters_in_strings_do_not_leak() {
        let registry = registry();
        let layer = sample_layer();

        let loaded = registry.load::<Layer>(&registry.dump(&layer).unwrap()).unwrap();
        assert_eq!(loaded.polygons[0].label, "tri,{a}[b]");
        assert_eq!(loaded.polygons[0].vertices.len(), 3);
        assert!(loaded.visible);
    }

    #[test]
    fn test_strings_keep_newlines_and_non_ascii() {
        let registry = registry();
        let polygon = Polygon {
            label: "two\nlines, caf\u{e9}".to_string(),
            vertices: vec![Point { x: 1, y: 1 }],
        };

        let text = registry.dump(&polygon).unwrap();
        assert!(text.contains("\"label\":\"two\nlines, caf\u{e9}\""));
        assert_eq!(registry.load::<Polygon>(&text).unwrap(), polygon);
    }

    #[test]
    fn test_optional_record() {
        let registry = registry();
        let mut layer = sample_layer();
        layer.anchor = Some(Point { x: 7, y: 8 });

        let text = registry.dump(&layer).unwrap();
        assert!(text.contains("\"anchor\":{ \"x\":7, \"y\":8 }"));
        assert_eq!(registry.load::<Layer>(&text).unwrap(), layer);
    }

    #[test]
    fn test_null_pointer_resets_field() {
        let registry = registry();
        let mut node = Node {
            value: 1,
            next: Some(Box::new(Node::default())),
        };

        let mut config = Config::new();
        config.set("next", "null");
        registry.from_config(&mut node, &config).unwrap();

        assert_eq!(node.next, None);
        assert_eq!(node.value, 1);
    }

    #[test]
    fn test_linked_nodes_round_trip() {
        let registry = registry();
        let list = Node {
            value: 1,
            next: Some(Box::new(Node {
                value: 2,
                next: Some(Box::new(Node { value: 3, next: None })),
            })),
        };

        let text = registry.dump(&list).unwrap();
        assert_eq!(registry.load::<Node>(&text).unwrap(), list);
    }

    #[test]
    fn test_inheritance_merges_parent_fields() {
        let registry = registry();
        let derived = Derived {
            base: Base {
                a: 5,
                b: "five".to_string(),
            },
            c: true,
        };

        let config = derived.get_config(&registry).unwrap();
        let keys: Vec<&str> = config.keys().collect();
        assert_eq!(keys, vec![CLASS_NAME_KEY, "a", "b", "c"]);
        assert_eq!(config.class_name(), Some("Derived"));

        assert_eq!(registry.get_field_names::<Derived>(), vec!["a", "b", "c"]);
        assert_eq!(registry.get_field_type("Derived", "b").unwrap(), "String");

        let text = registry.dump(&derived).unwrap();
        assert_eq!(registry.load::<Derived>(&text).unwrap(), derived);
    }

    #[test]
    fn test_inherited_field_access() {
        let registry = registry();
        let mut derived = Derived::default();

        registry.set_field(&mut derived, "a", 11i32).unwrap();
        assert_eq!(derived.base.a, 11);
        assert_eq!(*registry.get_field::<i32, _>(&derived, "a").unwrap(), 11);

        let parent_offset = field::byte_offset_of(&derived, &derived.base);
        let a_offset = field::byte_offset_of(&derived.base, &derived.base.a);
        assert_eq!(
            registry.get_field_offset("Derived", "a").unwrap(),
            parent_offset + a_offset
        );
    }

    #[test]
    fn test_derived_field_shadows_parent_field() {
        let registry = registry();
        let base = Base {
            a: 1,
            b: "one".to_string(),
        };

        let late = ShadowLate { base: base.clone(), a: 2 };
        let text = registry.dump(&late).unwrap();
        assert_eq!(
            text,
            "{\n\"class_name\":\"ShadowLate\",\n\"a\":2,\n\"b\":\"one\"\n}"
        );
        let loaded = registry.load::<ShadowLate>(&text).unwrap();
        assert_eq!(loaded.a, 2);
        assert_eq!(loaded.base.a, 0);
        assert_eq!(loaded.base.b, "one");

        let early = ShadowEarly { base, a: 2 };
        let text = registry.dump(&early).unwrap();
        assert_eq!(
            text,
            "{\n\"class_name\":\"ShadowEarly\",\n\"a\":2,\n\"b\":\"one\"\n}"
        );
        let loaded = registry.load::<ShadowEarly>(&text).unwrap();
        assert_eq!(loaded.a, 2);
        assert_eq!(loaded.base.a, 0);

        let mut target = ShadowEarly::default();
        registry.set_field(&mut target, "a", 7i32).unwrap();
        assert_eq!((target.a, target.base.a), (7, 0));
        assert_eq!(
            registry.get_field_offset("ShadowEarly", "a").unwrap(),
            field::byte_offset_of(&target, &target.a)
        );
    }

    #[test]
    fn test_two_level_inheritance() {
        let registry = registry();
        let grand = Grand {
            derived: Derived {
                base: Base {
                    a: 3,
                    b: "three".to_string(),
                },
                c: true,
            },
            d: 9,
        };

        assert_eq!(registry.get_field_names::<Grand>(), vec!["a", "b", "c", "d"]);
        let text = registry.dump(&grand).unwrap();
        assert!(text.starts_with("{\n\"class_name\":\"Grand\",\n\"a\":3,"));
        assert_eq!(registry.load::<Grand>(&text).unwrap(), grand);

        let mut target = Grand::default();
        registry.set_field(&mut target, "b", "set".to_string()).unwrap();
        assert_eq!(target.derived.base.b, "set");

        let expected = field::byte_offset_of(&target, &target.derived)
            + field::byte_offset_of(&target.derived, &target.derived.base)
            + field::byte_offset_of(&target.derived.base, &target.derived.base.a);
        assert_eq!(registry.get_field_offset("Grand", "a").unwrap(), expected);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = registry();
        let fields = registry.field_table("Layer");
        let converters = registry.serializable_types();
        let types = registry.registered_types();

        register_types!(&registry, Layer, Point).unwrap();

        assert_eq!(registry.field_table("Layer"), fields);
        assert_eq!(registry.serializable_types(), converters);
        assert_eq!(registry.registered_types(), types);
    }

    #[test]
    fn test_registration_prewarms_tables() {
        let registry = registry();
        assert_eq!(
            registry.get_field_names::<Layer>(),
            vec!["visible", "polygons", "anchor"]
        );
        let tags = registry.serializable_types();
        assert!(tags.contains(&"Vec<Polygon>".to_string()));
        assert!(tags.contains(&"Point*".to_string()));
    }

    #[test]
    fn test_load_by_name() {
        let registry = registry();
        let instance = registry
            .load_by_name("{\"class_name\":\"Point\",\"x\":3,\"y\":4}", "Point")
            .unwrap();
        assert_eq!(
            instance.downcast_ref::<Point>(),
            Some(&Point { x: 3, y: 4 })
        );
    }

    #[test]
    fn test_load_by_name_unknown_type() {
        let registry = registry();
        assert_eq!(
            registry.load_by_name("{}", "Ghost").err(),
            Some(ReflectError::UnknownType("Ghost".to_string()))
        );
    }

    #[test]
    fn test_load_missing_closing_brace() {
        let registry = registry();
        assert_eq!(
            registry.load::<Point>("{\"x\":1"),
            Err(ReflectError::DecodeDelimiter('}'))
        );
    }

    #[test]
    fn test_load_not_an_object() {
        let registry = registry();
        assert_eq!(
            registry.load::<Point>("not json"),
            Err(ReflectError::DecodeDelimiter('{'))
        );
    }

    #[test]
    fn test_load_unknown_field_is_wrapped() {
        let registry = registry();
        match registry.load::<Point>("{\"x\":1,\"z\":2}") {
            Err(ReflectError::DecodeUnknown { reason, .. }) => {
                assert!(reason.contains("'z'"));
            }
            other => panic!("Expected DecodeUnknown, got {:?}", other),
        }
    }

    #[test]
    fn test_from_config_unknown_field() {
        let registry = registry();
        let mut point = Point::default();
        let mut config = Config::new();
        config.set("z", "1");

        assert_eq!(
            registry.from_config(&mut point, &config),
            Err(ReflectError::unknown_field("Point", "z"))
        );
    }

    #[test]
    fn test_dump_list() {
        let registry = registry();
        assert_eq!(registry.dump_list(&[1u8, 2, 3]).unwrap(), "[1,2,3]");
        assert_eq!(registry.dump_list::<u8>(&[]).unwrap(), "[]");
        assert_eq!(registry.load::<Vec<u8>>("[4, 5]").unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_dump_any() {
        let registry = registry();
        let point: Box<dyn Any> = Box::new(Point { x: 1, y: 2 });
        assert_eq!(registry.dump_any(point.as_ref()).unwrap(), "{ \"x\":1, \"y\":2 }");

        struct Opaque;
        match registry.dump_any(&Opaque) {
            Err(ReflectError::NotSerializable(name)) => {
                assert!(name.starts_with("unregistered TypeId"));
            }
            other => panic!("Expected NotSerializable, got {:?}", other),
        }
    }

    #[test]
    fn test_mutating_one_field_changes_one_line() {
        let registry = registry();
        let mut point = Point { x: 1, y: 2 };
        let before = registry.dump(&point).unwrap();
        point.y = 9;
        let after = registry.dump(&point).unwrap();

        let changed: Vec<(&str, &str)> = before
            .lines()
            .zip(after.lines())
            .filter(|(old, new)| old != new)
            .collect();
        assert_eq!(changed, vec![("\"y\":2", "\"y\":9")]);
    }
}
