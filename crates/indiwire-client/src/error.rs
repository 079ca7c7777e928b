use indiwire_codec::CodecError;
use indiwire_property::PropertyError;

/// Errors raised while mirroring one inbound element or emitting a command.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A required attribute is missing or the element cannot be interpreted.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("device {0} is not known")]
    DeviceNotFound(String),

    /// An update or deletion names a property the mirror never saw defined.
    #[error("property {device}.{name} is not defined")]
    PropertyNotFound { device: String, name: String },

    /// Tag outside the driver-to-client grammar.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ClientError {
    /// True when the connection cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Codec(CodecError::Io(_)) | Self::Codec(CodecError::ConnectionClosed)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
