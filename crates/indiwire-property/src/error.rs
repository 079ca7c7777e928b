use indiwire_codec::CodecError;

use crate::model::PropertyKind;

/// Errors raised while building, parsing or mutating properties.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    /// A required attribute or child is missing or unusable.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// No registered property with this device/name pair.
    #[error("property {device}.{name} is not defined")]
    PropertyNotFound { device: String, name: String },

    /// The vector has no element with this name.
    #[error("{element} is not a member of {device}.{name}")]
    ElementNotFound {
        device: String,
        name: String,
        element: String,
    },

    /// A command would violate a range or switch rule; nothing was applied.
    #[error("{device}.{name}: {reason}")]
    ValidationFailed {
        device: String,
        name: String,
        reason: String,
    },

    /// A vector could not be constructed.
    #[error("invalid property {device}.{name}: {reason}")]
    InvalidVector {
        device: String,
        name: String,
        reason: String,
    },

    /// The operation targets a vector of another kind.
    #[error("{device}.{name} is a {found} vector, not {expected}")]
    KindMismatch {
        device: String,
        name: String,
        expected: PropertyKind,
        found: PropertyKind,
    },

    /// Text that is not a number in any accepted notation.
    #[error("bad number format {0:?}")]
    InvalidNumber(String),

    /// An enumerated token (state, permission, rule, switch) not recognized.
    #[error("invalid {what} {token:?}")]
    InvalidToken { what: &'static str, token: String },

    /// BLOB content could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, PropertyError>;
