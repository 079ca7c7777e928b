//! INDI instrument-control protocol for Rust.
//!
//! Drivers expose typed, observable properties; clients mirror them and send
//! commands back, all over one stream of XML elements.
//!
//! # Crate Structure
//!
//! - [`codec`]: Element stream reader/writer, XML escaping and BLOB base64 framing
//! - [`property`]: Property model, registry, wire parsing and message emitters
//! - [`driver`]: Driver-side dispatcher, snooping and config persistence (behind `driver` feature)
//! - [`client`]: Client-side mirror and command emitters (behind `client` feature)

/// Re-export codec types.
pub mod codec {
    pub use indiwire_codec::*;
}

/// Re-export property types.
pub mod property {
    pub use indiwire_property::*;
}

/// Re-export driver types (requires `driver` feature).
#[cfg(feature = "driver")]
pub mod driver {
    pub use indiwire_driver::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use indiwire_client::*;
}

pub use indiwire_property::{PROTOCOL_VERSION, PROTOCOL_VERSION_NUMBER};
