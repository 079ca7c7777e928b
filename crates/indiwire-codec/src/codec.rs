use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::blob::BLOB_LINE_WIDTH;
use crate::element::XmlElement;
use crate::error::{CodecError, Result};

/// Default maximum size of one buffered element: 64 MiB.
pub const DEFAULT_MAX_ELEMENT_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for the element codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Maximum size of a single top-level element in bytes. Default: 64 MiB.
    pub max_element_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
    /// Column width of emitted BLOB content.
    pub blob_line_width: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_element_size: DEFAULT_MAX_ELEMENT_SIZE,
            read_timeout: None,
            write_timeout: None,
            blob_line_width: BLOB_LINE_WIDTH,
        }
    }
}

/// Decode one top-level element from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete element yet.
/// XML declarations, comments and stray text between elements are consumed
/// and discarded. On success, consumes the element bytes from the buffer.
///
/// This rescans the buffer from the start on every call; stream readers keep
/// an [`ElementDecoder`] instead so large BLOB elements are scanned once. The
/// decoder also remembers an oversized element across calls: after
/// `ElementTooLarge` from this function the buffer should be discarded.
pub fn decode_element(src: &mut BytesMut, max_element_size: usize) -> Result<Option<XmlElement>> {
    ElementDecoder::new(max_element_size).decode(src)
}

/// Incremental element decoder.
///
/// Remembers how far into the buffered element it has scanned, so repeated
/// calls while a large element trickles in only look at the new bytes. The
/// buffer must only be appended to between calls.
#[derive(Debug, Clone)]
pub struct ElementDecoder {
    max_element_size: usize,
    state: ScanState,
    /// Set while the tail of an oversized element is being dropped.
    discarding: bool,
}

#[derive(Debug, Clone, Default)]
struct ScanState {
    /// Offset of the root element's `<`, once found.
    start: Option<usize>,
    /// Offset from which to look for the next `<`.
    cursor: usize,
    depth: usize,
}

enum Scan {
    Incomplete,
    Skip(usize),
    Element { start: usize, end: usize },
}

enum Markup {
    Incomplete,
    /// Declaration, processing instruction, comment, CDATA or doctype.
    Special(usize),
    Open { len: usize, self_closing: bool },
    Close(usize),
}

impl ElementDecoder {
    pub fn new(max_element_size: usize) -> Self {
        Self {
            max_element_size,
            state: ScanState::default(),
            discarding: false,
        }
    }

    pub fn max_element_size(&self) -> usize {
        self.max_element_size
    }

    pub fn set_max_element_size(&mut self, max_element_size: usize) {
        self.max_element_size = max_element_size;
    }

    /// Decode the next complete element, consuming its bytes.
    ///
    /// A malformed element is consumed before its error is returned, so the
    /// caller may keep reading the stream. After `ElementTooLarge` the rest of
    /// the offending element is dropped as it arrives and decoding resumes
    /// with the element that follows.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<XmlElement>> {
        loop {
            match scan(src, &mut self.state) {
                Scan::Incomplete => {
                    if self.discarding {
                        self.drain_scanned(src);
                        return Ok(None);
                    }
                    let pending = src.len() - self.state.start.unwrap_or(0);
                    if pending > self.max_element_size {
                        self.discarding = true;
                        self.drain_scanned(src);
                        return Err(CodecError::ElementTooLarge {
                            size: pending,
                            max: self.max_element_size,
                        });
                    }
                    return Ok(None);
                }
                Scan::Skip(n) => {
                    if src[..n].iter().any(|b| !b.is_ascii_whitespace()) {
                        tracing::trace!(bytes = n, "skipped non-element data");
                    }
                    src.advance(n);
                }
                Scan::Element { start, end } => {
                    let bytes = src.split_to(end);
                    if std::mem::take(&mut self.discarding) {
                        tracing::debug!(bytes = end, "dropped tail of oversized element");
                        continue;
                    }
                    let size = end - start;
                    if size > self.max_element_size {
                        return Err(CodecError::ElementTooLarge {
                            size,
                            max: self.max_element_size,
                        });
                    }
                    tracing::trace!(bytes = size, "scanned element");
                    return XmlElement::parse(&bytes[start..]).map(Some);
                }
            }
        }
    }

    /// Drop the bytes of the current element scanned so far, keeping the
    /// nesting depth so its close tag is still recognized.
    fn drain_scanned(&mut self, src: &mut BytesMut) {
        match self.state.start {
            Some(_) => {
                src.advance(self.state.cursor);
                self.state.start = Some(0);
                self.state.cursor = 0;
            }
            None => {
                // Oversized opening tag: nothing to track, drop it all.
                src.clear();
                self.discarding = false;
            }
        }
    }
}

impl Default for ElementDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ELEMENT_SIZE)
    }
}

fn scan(buf: &[u8], state: &mut ScanState) -> Scan {
    let start = match state.start {
        Some(start) => start,
        None => {
            let Some(first) = buf.iter().position(|b| !b.is_ascii_whitespace()) else {
                return if buf.is_empty() {
                    Scan::Incomplete
                } else {
                    Scan::Skip(buf.len())
                };
            };
            if buf[first] != b'<' {
                let end = find_byte(buf, first, b'<').unwrap_or(buf.len());
                return Scan::Skip(end);
            }
            match markup(&buf[first..]) {
                Markup::Incomplete => return Scan::Incomplete,
                Markup::Special(len) | Markup::Close(len) => return Scan::Skip(first + len),
                Markup::Open { len, self_closing } => {
                    if self_closing {
                        return Scan::Element {
                            start: first,
                            end: first + len,
                        };
                    }
                    *state = ScanState {
                        start: Some(first),
                        cursor: first + len,
                        depth: 1,
                    };
                    first
                }
            }
        }
    };

    loop {
        let Some(lt) = find_byte(buf, state.cursor, b'<') else {
            state.cursor = buf.len();
            return Scan::Incomplete;
        };
        state.cursor = lt;
        match markup(&buf[lt..]) {
            Markup::Incomplete => return Scan::Incomplete,
            Markup::Special(len) => state.cursor = lt + len,
            Markup::Open { len, self_closing } => {
                state.cursor = lt + len;
                if !self_closing {
                    state.depth += 1;
                }
            }
            Markup::Close(len) => {
                state.cursor = lt + len;
                state.depth -= 1;
                if state.depth == 0 {
                    let end = state.cursor;
                    *state = ScanState::default();
                    return Scan::Element { start, end };
                }
            }
        }
    }
}

/// Classify the markup starting at `rest[0] == b'<'`.
fn markup(rest: &[u8]) -> Markup {
    const COMMENT: &[u8] = b"<!--";
    const CDATA: &[u8] = b"<![CDATA[";

    if rest.len() < 2 {
        return Markup::Incomplete;
    }
    match rest[1] {
        b'?' => find_seq(rest, 2, b"?>").map_or(Markup::Incomplete, |p| Markup::Special(p + 2)),
        b'!' => {
            if rest.starts_with(COMMENT) {
                find_seq(rest, COMMENT.len(), b"-->")
                    .map_or(Markup::Incomplete, |p| Markup::Special(p + 3))
            } else if rest.starts_with(CDATA) {
                find_seq(rest, CDATA.len(), b"]]>")
                    .map_or(Markup::Incomplete, |p| Markup::Special(p + 3))
            } else if COMMENT.starts_with(&rest[..rest.len().min(COMMENT.len())])
                || CDATA.starts_with(&rest[..rest.len().min(CDATA.len())])
            {
                Markup::Incomplete
            } else {
                find_byte(rest, 2, b'>').map_or(Markup::Incomplete, |p| Markup::Special(p + 1))
            }
        }
        b'/' => find_byte(rest, 2, b'>').map_or(Markup::Incomplete, |p| Markup::Close(p + 1)),
        _ => match tag_end(rest) {
            Some(p) => Markup::Open {
                len: p + 1,
                self_closing: rest[p - 1] == b'/',
            },
            None => Markup::Incomplete,
        },
    }
}

/// Offset of the `>` closing a start tag, ignoring any inside quoted values.
fn tag_end(rest: &[u8]) -> Option<usize> {
    let mut quote = None;
    for (i, &byte) in rest.iter().enumerate().skip(1) {
        match (quote, byte) {
            (None, b'"' | b'\'') => quote = Some(byte),
            (Some(q), _) if q == byte => quote = None,
            (None, b'>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn find_byte(buf: &[u8], from: usize, needle: u8) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|p| from + p)
}

fn find_seq(buf: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    buf.get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|p| from + p)
}
