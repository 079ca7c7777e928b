use std::path::PathBuf;

use indiwire_codec::CodecError;
use indiwire_property::PropertyError;

/// Errors raised while dispatching one inbound element.
///
/// Only [`is_fatal`](DispatchError::is_fatal) errors end a driver's read loop.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A required attribute is missing or the tag does not fit the property.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The command names a property that is not registered.
    #[error("property {device}.{name} is not defined")]
    PropertyNotFound { device: String, name: String },

    /// A client tried to write a read-only property.
    #[error("cannot set read-only property {device}.{name}")]
    PermissionDenied { device: String, name: String },

    /// `getProperties` without a version, or with a newer one than ours.
    #[error("client protocol version {requested} is not supported (this side speaks {supported})")]
    ProtocolVersionIncompatible {
        requested: String,
        supported: &'static str,
    },

    /// Tag the driver does not handle.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Every member of a `new*Vector` failed to decode.
    #[error("{tag} for {device}.{name} has no valid members")]
    NoValidMembers {
        device: String,
        name: String,
        tag: String,
    },

    /// Snoop subscription lock was poisoned by a panicking thread.
    #[error("snoop subscription lock poisoned")]
    SnoopLockPoisoned,

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl DispatchError {
    /// True when the connection cannot continue.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ProtocolVersionIncompatible { .. } | Self::SnoopLockPoisoned => true,
            Self::Codec(err) => matches!(err, CodecError::Io(_) | CodecError::ConnectionClosed),
            _ => false,
        }
    }

    /// Device the error concerns, when one is known.
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::PropertyNotFound { device, .. } | Self::PermissionDenied { device, .. } => Some(device),
            Self::Property(PropertyError::ValidationFailed { device, .. })
            | Self::Property(PropertyError::PropertyNotFound { device, .. })
            | Self::Property(PropertyError::ElementNotFound { device, .. })
            | Self::Property(PropertyError::KindMismatch { device, .. }) => Some(device),
            _ => None,
        }
    }
}

/// Errors from driver config persistence.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Neither an explicit path, `INDICONFIG` nor `HOME` is available.
    #[error("no config path for device {0}: set INDICONFIG or HOME")]
    NoPath(String),

    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The file has no entry for the requested property or element.
    /// `key` is `device.property` or `device.property.element`.
    #[error("no saved value for {key}")]
    NotFound { key: String },
}

pub type Result<T> = std::result::Result<T, DispatchError>;
