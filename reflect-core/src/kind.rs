//! Type classification and the typed `Reflect` trait
//!
//! Every value that can appear in a serialized record implements `Reflect`.
//! The impl decides the value's `Kind`, its stable type tag, and how it is
//! turned into text and back. Containers never decode their elements
//! directly: they go through the registry's converter table by tag, the same
//! way `load` does, so a type that was never encoded cannot be decoded.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::ffi::CString;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use crate::codec::{self, NULL_LITERAL};
use crate::error::{ReflectError, Result};
use crate::registry::Registry;

/// Marker appended to the tag of nullable pointer types
pub const POINTER_MARKER: char = '*';

/// Encoding category of a type, in classification priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Booleans, integers and floats
    Fundamental,
    /// Owned strings
    Text,
    /// Owned C character buffers
    RawText,
    /// `Option<T>` and `Box<T>`
    Pointer,
    /// Types implementing `Serializable`
    Record,
    Tuple,
    /// Sequences, sets and maps
    Collection,
    /// Fixed-size arrays
    Array,
    /// Method references; never encoded as data
    Method,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Fundamental => "fundamental",
            Kind::Text => "text",
            Kind::RawText => "raw-text",
            Kind::Pointer => "pointer",
            Kind::Record => "record",
            Kind::Tuple => "tuple",
            Kind::Collection => "collection",
            Kind::Array => "array",
            Kind::Method => "method",
        };
        f.write_str(name)
    }
}

/// Typed text conversion for one concrete type
///
/// Implementations must register their own converter (and the converters of
/// any element types they delegate to) from `encode`, so that a value which
/// has been encoded once can later be decoded by tag.
///
/// # Example
///
/// ```rust
/// # use reflect_core::{Reflect, Registry};
/// let registry = Registry::new();
/// let text = vec![1u8, 2, 3].encode(&registry).unwrap();
/// assert_eq!(text, "[1,2,3]");
/// assert_eq!(Vec::<u8>::decode(&text, &registry).unwrap(), vec![1, 2, 3]);
/// ```
pub trait Reflect: Any + Sized {
    /// Encoding category
    const KIND: Kind;

    /// Stable tag identifying this type in every registry table
    fn type_tag() -> String;

    /// Encode as nested text
    ///
    /// # Errors
    ///
    /// Returns `NotSerializable` for values with no text form.
    fn encode(&self, registry: &Registry) -> Result<String>;

    /// Decode a fresh value from text produced by `encode`
    fn decode(text: &str, registry: &Registry) -> Result<Self>;

    /// Encode as top-level text
    ///
    /// Identical to `encode` except for records, which render with their
    /// `class_name` and one entry per line.
    fn dump(&self, registry: &Registry) -> Result<String> {
        self.encode(registry)
    }

    /// Reset to the null state; returns `false` for non-nullable types
    fn null_out(&mut self) -> bool {
        false
    }
}

/// Encode items as a bracketed list
pub fn encode_items<'a, T: Reflect + 'a>(
    items: impl IntoIterator<Item = &'a T>,
    registry: &Registry,
) -> Result<String> {
    let parts = items
        .into_iter()
        .map(|item| item.encode(registry))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("[{}]", parts.join(",")))
}

/// Decode a bracketed list, resolving each element through the converter table
pub fn decode_items<T: Reflect>(text: &str, registry: &Registry) -> Result<Vec<T>> {
    codec::split_list(text)?
        .iter()
        .map(|item| registry.decode_tagged::<T>(item))
        .collect()
}

fn parse_literal<T>(text: &str) -> Result<T>
where
    T: Reflect + FromStr,
    T::Err: fmt::Display,
{
    let literal = text.trim();
    literal.parse::<T>().map_err(|err| {
        ReflectError::decode_unknown(format!(
            "invalid <{}> literal '{}': {}",
            T::type_tag(),
            literal,
            err
        ))
    })
}

macro_rules! reflect_integer {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Reflect for $ty {
                const KIND: Kind = Kind::Fundamental;

                fn type_tag() -> String {
                    stringify!($ty).to_string()
                }

                fn encode(&self, registry: &Registry) -> Result<String> {
                    registry.ensure_converter::<Self>();
                    Ok(self.to_string())
                }

                fn decode(text: &str, _registry: &Registry) -> Result<Self> {
                    parse_literal(text)
                }
            }
        )*
    };
}

reflect_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! reflect_float {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Reflect for $ty {
                const KIND: Kind = Kind::Fundamental;

                fn type_tag() -> String {
                    stringify!($ty).to_string()
                }

                fn encode(&self, registry: &Registry) -> Result<String> {
                    if !self.is_finite() {
                        return Err(ReflectError::NotSerializable(Self::type_tag()));
                    }
                    registry.ensure_converter::<Self>();
                    Ok(self.to_string())
                }

                fn decode(text: &str, _registry: &Registry) -> Result<Self> {
                    parse_literal(text)
                }
            }
        )*
    };
}

reflect_float!(f32, f64);

impl Reflect for bool {
    const KIND: Kind = Kind::Fundamental;

    fn type_tag() -> String {
        "bool".to_string()
    }

    fn encode(&self, registry: &Registry) -> Result<String> {
        registry.ensure_converter::<Self>();
        Ok(self.to_string())
    }

    /// Accepts `true`/`false` and the older `1`/`0` form
    fn decode(text: &str, _registry: &Registry) -> Result<Self> {
        match text.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(ReflectError::decode_unknown(format!(
                "invalid <bool> literal '{}'",
                other
            ))),
        }
    }
}

impl Reflect for String {
    const KIND: Kind = Kind::Text;

    fn type_tag() -> String {
        "String".to_string()
    }

    fn encode(&self, registry: &Registry) -> Result<String> {
        registry.ensure_converter::<Self>();
        Ok(codec::quote(self))
    }

    fn decode(text: &str, _registry: &Registry) -> Result<Self> {
        Ok(codec::unquote(text)?.to_string())
    }
}

impl Reflect for CString {
    const KIND: Kind = Kind::RawText;

    fn type_tag() -> String {
        "CString".to_string()
    }

    fn encode(&self, registry: &Registry) -> Result<String> {
        registry.ensure_converter::<Self>();
        Ok(codec::quote(&self.to_string_lossy()))
    }

    fn decode(text: &str, _registry: &Registry) -> Result<Self> {
        CString::new(codec::unquote(text)?).map_err(|err| {
            ReflectError::decode_unknown(format!("invalid <CString> text: {}", err))
        })
    }
}

impl<T: Reflect> Reflect for Option<T> {
    const KIND: Kind = Kind::Pointer;

    fn type_tag() -> String {
        format!("{}{}", T::type_tag(), POINTER_MARKER)
    }

    fn encode(&self, registry: &Registry) -> Result<String> {
        registry.ensure_converter::<Self>();
        registry.ensure_converter::<T>();
        match self {
            Some(value) => value.encode(registry),
            None => Ok(NULL_LITERAL.to_string()),
        }
    }

    fn decode(text: &str, registry: &Registry) -> Result<Self> {
        if text.trim() == NULL_LITERAL {
            return Ok(None);
        }
        registry.decode_tagged::<T>(text).map(Some)
    }

    fn null_out(&mut self) -> bool {
        *self = None;
        true
    }
}

impl<T: Reflect> Reflect for Box<T> {
    const KIND: Kind = Kind::Pointer;

    fn type_tag() -> String {
        format!("Box<{}>", T::type_tag())
    }

    fn encode(&self, registry: &Registry) -> Result<String> {
        registry.ensure_converter::<Self>();
        registry.ensure_converter::<T>();
        self.as_ref().encode(registry)
    }

    fn decode(text: &str, registry: &Registry) -> Result<Self> {
        registry.decode_tagged::<T>(text).map(Box::new)
    }
}

fn next_item(items: &mut std::vec::IntoIter<String>) -> Result<String> {
    items
        .next()
        .ok_or_else(|| ReflectError::decode_unknown("tuple is missing elements"))
}

macro_rules! reflect_tuple {
    ($len:literal => $($name:ident $index:tt),+) => {
        impl<$($name: Reflect),+> Reflect for ($($name,)+) {
            const KIND: Kind = Kind::Tuple;

            fn type_tag() -> String {
                let parts = [$($name::type_tag()),+];
                if $len == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }

            fn encode(&self, registry: &Registry) -> Result<String> {
                registry.ensure_converter::<Self>();
                $(registry.ensure_converter::<$name>();)+
                let parts = [$(self.$index.encode(registry)?),+];
                Ok(format!("[{}]", parts.join(",")))
            }

            fn decode(text: &str, registry: &Registry) -> Result<Self> {
                let items = codec::split_list(text)?;
                if items.len() != $len {
                    return Err(ReflectError::decode_unknown(format!(
                        "expected {} elements for <{}>, got {}",
                        $len,
                        Self::type_tag(),
                        items.len()
                    )));
                }
                let mut items = items.into_iter();
                Ok(($(registry.decode_tagged::<$name>(&next_item(&mut items)?)?,)+))
            }
        }
    };
}

reflect_tuple!(1 => A 0);
reflect_tuple!(2 => A 0, B 1);
reflect_tuple!(3 => A 0, B 1, C 2);
reflect_tuple!(4 => A 0, B 1, C 2, D 3);
reflect_tuple!(5 => A 0, B 1, C 2, D 3, E 4);
reflect_tuple!(6 => A 0, B 1, C 2, D 3, E 4, F 5);

macro_rules! reflect_sequence {
    ($collection:ident $(, $bound:path)*) => {
        impl<T: Reflect $(+ $bound)*> Reflect for $collection<T> {
            const KIND: Kind = Kind::Collection;

            fn type_tag() -> String {
                format!("{}<{}>", stringify!($collection), T::type_tag())
            }

            fn encode(&self, registry: &Registry) -> Result<String> {
                registry.ensure_converter::<Self>();
                registry.ensure_converter::<T>();
                encode_items(self.iter(), registry)
            }

            fn decode(text: &str, registry: &Registry) -> Result<Self> {
                Ok(decode_items::<T>(text, registry)?.into_iter().collect())
            }
        }
    };
}

reflect_sequence!(Vec);
reflect_sequence!(VecDeque);
reflect_sequence!(BTreeSet, Ord);
reflect_sequence!(HashSet, Eq, Hash);

macro_rules! reflect_map {
    ($collection:ident $(, $bound:path)*) => {
        impl<K: Reflect $(+ $bound)*, V: Reflect> Reflect for $collection<K, V> {
            const KIND: Kind = Kind::Collection;

            fn type_tag() -> String {
                format!(
                    "{}<{}, {}>",
                    stringify!($collection),
                    K::type_tag(),
                    V::type_tag()
                )
            }

            /// Entries encode as `[key,value]` pairs
            fn encode(&self, registry: &Registry) -> Result<String> {
                registry.ensure_converter::<Self>();
                registry.ensure_converter::<(K, V)>();
                registry.ensure_converter::<K>();
                registry.ensure_converter::<V>();
                let parts = self
                    .iter()
                    .map(|(key, value)| {
                        Ok(format!("[{},{}]", key.encode(registry)?, value.encode(registry)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("[{}]", parts.join(",")))
            }

            fn decode(text: &str, registry: &Registry) -> Result<Self> {
                Ok(decode_items::<(K, V)>(text, registry)?.into_iter().collect())
            }
        }
    };
}

reflect_map!(BTreeMap, Ord);
reflect_map!(HashMap, Eq, Hash);

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    const KIND: Kind = Kind::Array;

    fn type_tag() -> String {
        format!("[{}; {}]", T::type_tag(), N)
    }

    fn encode(&self, registry: &Registry) -> Result<String> {
        registry.ensure_converter::<Self>();
        registry.ensure_converter::<T>();
        encode_items(self.iter(), registry)
    }

    fn decode(text: &str, registry: &Registry) -> Result<Self> {
        let items = decode_items::<T>(text, registry)?;
        let found = items.len();
        items.try_into().map_err(|_| {
            ReflectError::decode_unknown(format!(
                "expected {} elements for <{}>, got {}",
                N,
                Self::type_tag(),
                found
            ))
        })
    }
}
