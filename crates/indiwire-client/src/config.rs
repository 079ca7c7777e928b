use indiwire_codec::CodecConfig;
use indiwire_property::{BlobPolicy, PROTOCOL_VERSION};

/// Client-side behavior knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Version announced in `getProperties`.
    pub protocol_version: String,
    /// BLOB handling assumed for devices without an explicit mode.
    pub default_blob_mode: BlobPolicy,
    pub codec: CodecConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            default_blob_mode: BlobPolicy::Also,
            codec: CodecConfig::default(),
        }
    }
}
