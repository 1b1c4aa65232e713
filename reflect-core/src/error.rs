//! Error taxonomy for the reflection engine
//!
//! Every operation in this crate reports failure through `ReflectError`.
//! Decode failures come in two flavours: a missing delimiter, and everything
//! else, which is normalized into `DecodeUnknown` together with the source
//! location that raised it.

use std::panic::Location;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ReflectError>;

/// Errors raised by registration, field/method access, encoding and decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReflectError {
    #[error("Class '{0}' does not exist or is not reflectable")]
    UnknownType(String),
    #[error("Object of type <{type_name}> does not have field named '{field}'")]
    UnknownField { type_name: String, field: String },
    #[error("Object of type <{type_name}> does not have method named '{method}'")]
    UnknownMethod { type_name: String, method: String },
    #[error("Object of type <{0}> is not serializable")]
    NotSerializable(String),
    #[error("Expecting '{0}' delimiter in decoding data")]
    DecodeDelimiter(char),
    #[error("Unknown error in decoding data: {reason} (file: {file}, line: {line})")]
    DecodeUnknown {
        reason: String,
        file: &'static str,
        line: u32,
    },
}

impl ReflectError {
    /// Build a `DecodeUnknown` error stamped with the caller's location
    #[track_caller]
    pub fn decode_unknown(reason: impl Into<String>) -> Self {
        let location = Location::caller();
        ReflectError::DecodeUnknown {
            reason: reason.into(),
            file: location.file(),
            line: location.line(),
        }
    }

    pub fn unknown_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        ReflectError::UnknownField {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    pub fn unknown_method(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        ReflectError::UnknownMethod {
            type_name: type_name.into(),
            method: method.into(),
        }
    }

    /// Whether this error belongs to the decode family
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ReflectError::DecodeDelimiter(_) | ReflectError::DecodeUnknown { .. }
        )
    }

    /// Keep decode errors as they are, re-wrap anything else as `DecodeUnknown`
    ///
    /// This gives `load` callers a uniform error surface no matter how deep in
    /// the nested converters the failure happened.
    #[track_caller]
    pub fn into_decode_error(self) -> Self {
        if self.is_decode_error() {
            self
        } else {
            ReflectError::decode_unknown(self.to_string())
        }
    }
}
