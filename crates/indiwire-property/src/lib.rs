//! INDI properties: the typed, observable values devices expose.
//!
//! This crate holds the property model and everything that converts it to and
//! from protocol elements:
//! - [`PropertyVector`] with atomic number/switch command application
//! - [`PropertyRegistry`] keyed by device and property name
//! - Wire parsing of `def*`, `set*` and `new*` vectors
//! - Emitters rendering every outbound message into a `BytesMut`
//!
//! Numbers are parsed and formatted without regard to locale.

pub mod emit;
pub mod error;
pub mod model;
pub mod number;
pub mod parse;
pub mod registry;
pub mod update;

pub use error::{PropertyError, Result};
pub use model::{
    BlobElement, BlobPolicy, Elements, LightElement, NumberElement, Permission, PropertyKind, PropertyState,
    PropertyVector, SwitchElement, SwitchRule, SwitchState, TextElement,
};
pub use number::{format_number, format_wire, parse_number};
pub use parse::{parse_definition, parse_update, MessageTag, ParsedUpdate, SkippedMember};
pub use registry::{PropertyRegistry, Registration, RegistryEntry};
pub use update::{BlobValue, ElementValue, NumberValue, PropertyUpdate};

/// Protocol version spoken and accepted.
pub const PROTOCOL_VERSION: &str = "1.7";

/// [`PROTOCOL_VERSION`] as a number, for `getProperties` version checks.
pub const PROTOCOL_VERSION_NUMBER: f64 = 1.7;
