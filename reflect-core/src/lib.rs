//! Reflection and text serialization engine
//!
//! This crate lets record types describe their own fields and methods at
//! runtime and round-trips them through a brace/bracket text format:
//! - `Reflect`: Typed encode/decode for every supported value shape
//! - `Serializable`: Records that list their fields through a `Config`
//! - `Registry`: Converter, field, method and constructor tables
//! - `codec`: The state machine decoder behind `load`

pub mod error;
pub mod kind;
pub mod field;
pub mod converter;
pub mod config;
pub mod codec;
pub mod registry;
pub mod serializable;

// Re-export main types for convenience
pub use error::{ReflectError, Result};
pub use kind::{Kind, Reflect};
pub use field::FieldDescriptor;
pub use config::{Config, CLASS_NAME_KEY};
pub use registry::{shared, Registry};
pub use serializable::Serializable;
