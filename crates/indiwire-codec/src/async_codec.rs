//! `tokio-util` codec over the element scanner.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{CodecConfig, ElementDecoder};
use crate::element::XmlElement;
use crate::error::{CodecError, Result};

/// Decodes [`XmlElement`]s and encodes pre-rendered messages.
#[derive(Debug, Clone, Default)]
pub struct ElementCodec {
    decoder: ElementDecoder,
}

impl ElementCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &CodecConfig) -> Self {
        Self {
            decoder: ElementDecoder::new(config.max_element_size),
        }
    }
}

impl Decoder for ElementCodec {
    type Item = XmlElement;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<XmlElement>> {
        self.decoder.decode(src)
    }
}

impl Encoder<Bytes> for ElementCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
