//! Wire-level building blocks for the INDI protocol.
//!
//! The protocol is a stream of top-level XML elements. This crate provides:
//! - A table-driven base64 codec used to carry BLOB payloads inside XML text
//! - BLOB framing (line wrapping, `enclen` checks, compression markers)
//! - XML attribute/text escaping for the hand-rolled emitters
//! - An element-boundary scanner that turns a byte stream into [`XmlElement`]s
//!
//! No partial elements ever reach the caller.

pub mod base64;
pub mod blob;
pub mod codec;
pub mod element;
pub mod error;
pub mod escape;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use blob::{is_compressed, wrap, BlobFrame, BLOB_LINE_WIDTH};
pub use codec::{decode_element, CodecConfig, ElementDecoder, DEFAULT_MAX_ELEMENT_SIZE};
pub use element::XmlElement;
pub use error::{CodecError, Result};
pub use escape::escape;
pub use reader::ElementReader;
pub use writer::MessageWriter;

#[cfg(feature = "async")]
pub use async_codec::ElementCodec;
