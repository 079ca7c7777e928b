//! Table-driven base64 (RFC 4648 standard alphabet, `=` padding).
//!
//! Encoding maps each 12-bit group to two output characters through a
//! 4096-entry table, so a 3-byte input group costs two lookups. Decoding runs
//! four characters at a time through a 256-entry table. Line breaks in the
//! input are skipped, which lets wrapped BLOB text decode without unwrapping.

use crate::error::{CodecError, Result};

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const INVALID: u8 = 0xFF;
const PAD: u8 = 0xFE;

static ENCODE_TABLE: [[u8; 2]; 4096] = build_encode_table();
static DECODE_TABLE: [u8; 256] = build_decode_table();

const fn build_encode_table() -> [[u8; 2]; 4096] {
    let mut table = [[0u8; 2]; 4096];
    let mut i = 0;
    while i < 4096 {
        table[i] = [ALPHABET[i >> 6], ALPHABET[i & 0x3f]];
        i += 1;
    }
    table
}

const fn build_decode_table() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < 64 {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table[b'=' as usize] = PAD;
    table
}

/// Length of the encoding of `n` input bytes: `4 * ceil(n / 3)`.
pub const fn encoded_len(n: usize) -> usize {
    n.div_ceil(3) * 4
}

/// Upper bound on the decoded size of `enclen` encoded characters.
pub const fn decoded_capacity(enclen: usize) -> usize {
    enclen / 4 * 3
}

/// Encode bytes as base64 without line breaks.
pub fn encode(input: impl AsRef<[u8]>) -> String {
    let input = input.as_ref();
    let mut out = Vec::with_capacity(encoded_len(input.len()));

    let mut chunks = input.chunks_exact(3);
    for chunk in &mut chunks {
        let group = (u32::from(chunk[0]) << 16) | (u32::from(chunk[1]) << 8) | u32::from(chunk[2]);
        out.extend_from_slice(&ENCODE_TABLE[(group >> 12) as usize]);
        out.extend_from_slice(&ENCODE_TABLE[(group & 0xfff) as usize]);
    }

    match *chunks.remainder() {
        [a] => {
            let group = u32::from(a) << 16;
            out.extend_from_slice(&ENCODE_TABLE[(group >> 12) as usize]);
            out.extend_from_slice(b"==");
        }
        [a, b] => {
            let group = (u32::from(a) << 16) | (u32::from(b) << 8);
            out.extend_from_slice(&ENCODE_TABLE[(group >> 12) as usize]);
            out.push(ENCODE_TABLE[(group & 0xfff) as usize][0]);
            out.push(b'=');
        }
        _ => {}
    }

    // Every byte pushed above comes from ALPHABET or is '='.
    out.into_iter().map(char::from).collect()
}

/// Decode base64 text, skipping `\n` and `\r` wherever they appear.
pub fn decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    let input = input.as_ref();
    let significant = input.iter().filter(|b| !is_line_break(**b)).count();
    if significant % 4 != 0 {
        return Err(CodecError::InvalidLength { len: significant });
    }

    let mut out = Vec::with_capacity(decoded_capacity(significant));
    let mut quad = [0u8; 4];
    let mut offsets = [0usize; 4];
    let mut filled = 0;
    let mut padded = false;

    for (offset, &byte) in input.iter().enumerate() {
        if is_line_break(byte) {
            continue;
        }
        if padded {
            return Err(CodecError::InvalidCharacter { byte, offset });
        }
        quad[filled] = byte;
        offsets[filled] = offset;
        filled += 1;
        if filled == 4 {
            padded = decode_quad(&quad, &offsets, &mut out)?;
            filled = 0;
        }
    }

    Ok(out)
}

/// Decode one group of four characters. Returns true when the group was padded.
fn decode_quad(quad: &[u8; 4], offsets: &[usize; 4], out: &mut Vec<u8>) -> Result<bool> {
    let mut sextets = [0u32; 4];
    let mut padding = 0;

    for i in 0..4 {
        let invalid = CodecError::InvalidCharacter {
            byte: quad[i],
            offset: offsets[i],
        };
        match DECODE_TABLE[quad[i] as usize] {
            INVALID => return Err(invalid),
            PAD if i < 2 => return Err(invalid),
            PAD => padding += 1,
            _ if padding > 0 => return Err(invalid),
            value => sextets[i] = u32::from(value),
        }
    }

    let group = (sextets[0] << 18) | (sextets[1] << 12) | (sextets[2] << 6) | sextets[3];
    out.push((group >> 16) as u8);
    if padding < 2 {
        out.push((group >> 8) as u8);
    }
    if padding < 1 {
        out.push(group as u8);
    }
    Ok(padding > 0)
}

fn is_line_break(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"f"), "Zg==");
        assert_eq!(encode(b"fo"), "Zm8=");
        assert_eq!(encode(b"foo"), "Zm9v");
        assert_eq!(encode(b"foob"), "Zm9vYg==");
        assert_eq!(encode(b"fooba"), "Zm9vYmE=");
        assert_eq!(encode(b"foobar"), "Zm9vYmFy");
    }

    #[test]
    fn roundtrip_all_small_lengths() {
        for len in 0..=200usize {
            let data: Vec<u8> = (0..len).map(|i| (i * 37 + len) as u8).collect();
            let text = encode(&data);
            assert_eq!(text.len(), encoded_len(len), "length {len}");
            assert_eq!(decode(&text).unwrap(), data, "length {len}");
        }
    }

    #[test]
    fn every_byte_value_survives() {
        let data: Vec<u8> = (0..=255u8).collect();
        assert_eq!(decode(encode(&data)).unwrap(), data);
    }

    #[test]
    fn decode_skips_line_breaks() {
        let data: Vec<u8> = (0..100u8).collect();
        let text = encode(&data);
        let wrapped: String = text
            .as_bytes()
            .chunks(7)
            .map(|line| format!("{}\r\n", std::str::from_utf8(line).unwrap()))
            .collect();
        assert_eq!(decode(&wrapped).unwrap(), data);
    }

    #[test]
    fn decode_rejects_bad_length() {
        let err = decode("Zm9vY").unwrap_err();
        assert!(matches!(err, CodecError::InvalidLength { len: 5 }));
    }

    #[test]
    fn decode_rejects_bad_character() {
        let err = decode("Zm9v\nY*==").unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidCharacter {
                byte: b'*',
                offset: 6
            }
        ));
    }

    #[test]
    fn decode_rejects_misplaced_padding() {
        assert!(matches!(
            decode("Z=9v").unwrap_err(),
            CodecError::InvalidCharacter { byte: b'=', .. }
        ));
        assert!(matches!(
            decode("Zm=v").unwrap_err(),
            CodecError::InvalidCharacter { byte: b'v', .. }
        ));
        assert!(matches!(
            decode("Zg==Zm9v").unwrap_err(),
            CodecError::InvalidCharacter { byte: b'Z', offset: 4 }
        ));
    }

    #[test]
    fn capacity_helpers() {
        assert_eq!(encoded_len(0), 0);
        assert_eq!(encoded_len(1), 4);
        assert_eq!(encoded_len(3), 4);
        assert_eq!(encoded_len(4), 8);
        assert_eq!(decoded_capacity(8), 6);
    }
}
