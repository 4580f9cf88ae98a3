//! Order-preserving tuple encoding.
//!
//! Keys are tuples of UTF-8 strings. Each element is written as a type code
//! (`0x02`), the string bytes with every `0x00` escaped as `0x00 0xFF`, and a
//! `0x00` terminator. Byte-wise comparison of two packed tuples therefore
//! matches element-wise comparison of the unpacked tuples, which is what
//! makes prefix-bounded range scans over the store meaningful.

use crate::error::KvError;

/// Type code for a UTF-8 string element.
pub const STRING_CODE: u8 = 0x02;

/// Element terminator.
const TERMINATOR: u8 = 0x00;

/// Escape byte following an embedded `0x00`.
const ESCAPE: u8 = 0xFF;

/// Append one string element to `out`.
pub fn encode_element(element: &str, out: &mut Vec<u8>) {
    out.push(STRING_CODE);
    append_escaped(element, out);
    out.push(TERMINATOR);
}

/// Append the escaped bytes of `s` without type code or terminator.
///
/// Escaping is byte-local, so `escape(p)` is always a prefix of
/// `escape(p + q)`; range scans over "names starting with `p`" rely on it.
pub fn append_escaped(s: &str, out: &mut Vec<u8>) {
    for byte in s.as_bytes() {
        if *byte == TERMINATOR {
            out.extend_from_slice(&[TERMINATOR, ESCAPE]);
        } else {
            out.push(*byte);
        }
    }
}

/// Pack a tuple of string elements.
///
/// # Examples
///
/// ```
/// use meterstack_kv::tuple::{pack, unpack};
///
/// let key = pack(&["container:", "acct", "photos", "bytes"]);
/// assert_eq!(unpack(&key).unwrap(), vec!["container:", "acct", "photos", "bytes"]);
/// ```
#[must_use]
pub fn pack(elements: &[&str]) -> Vec<u8> {
    let mut out = Vec::with_capacity(elements.iter().map(|e| e.len() + 2).sum());
    for element in elements {
        encode_element(element, &mut out);
    }
    out
}

/// Decode a packed tuple back into its string elements.
///
/// # Errors
///
/// Returns [`KvError::InvalidKey`] when the bytes are not a sequence of
/// well-formed string elements.
pub fn unpack(mut bytes: &[u8]) -> Result<Vec<String>, KvError> {
    let mut elements = Vec::new();
    while !bytes.is_empty() {
        let (element, rest) = decode_element(bytes)?;
        elements.push(element);
        bytes = rest;
    }
    Ok(elements)
}

/// Decode the first element of `bytes`, returning it with the remainder.
fn decode_element(bytes: &[u8]) -> Result<(String, &[u8]), KvError> {
    let Some((&code, body)) = bytes.split_first() else {
        return Err(KvError::InvalidKey("empty tuple element".to_owned()));
    };
    if code != STRING_CODE {
        return Err(KvError::InvalidKey(format!(
            "unsupported tuple type code {code:#04x}"
        )));
    }

    let mut raw = Vec::new();
    let mut i = 0;
    while i < body.len() {
        let byte = body[i];
        if byte == TERMINATOR {
            if body.get(i + 1) == Some(&ESCAPE) {
                raw.push(TERMINATOR);
                i += 2;
                continue;
            }
            let element = String::from_utf8(raw)
                .map_err(|e| KvError::InvalidKey(format!("non UTF-8 tuple element: {e}")))?;
            return Ok((element, &body[i + 1..]));
        }
        raw.push(byte);
        i += 1;
    }

    Err(KvError::InvalidKey("unterminated tuple element".to_owned()))
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte is
/// incremented. Returns `None` when `prefix` is empty or all `0xFF`.
#[must_use]
pub fn strinc(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    while let Some(&last) = next.last() {
        if last == 0xFF {
            next.pop();
        } else {
            let end = next.len() - 1;
            next[end] = last + 1;
            return Some(next);
        }
    }
    None
}
