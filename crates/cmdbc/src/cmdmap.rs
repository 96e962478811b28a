//! The `cmdMap` wire format (§6): a bidirectional encoding between source
//! byte positions and code-word offsets, one entry per compiled command.
//!
//! Four parallel variable-length byte sequences carry code-start deltas,
//! code lengths, source-start deltas, and source lengths. Each value is
//! prefixed: a leading byte `< 0xFF` is the value itself (signed for deltas,
//! unsigned for lengths); a leading `0xFF` means "read a following 4-byte
//! big-endian integer instead". Code deltas are always non-negative
//! (`codeStart` is strictly monotone, §3.3); source deltas may be negative
//! when a nested command's source range precedes its enclosing command's
//! in byte order (expansions).

use serde::{Deserialize, Serialize};

/// One decoded `cmdMap` row: a source command's byte range and the code
/// range it compiled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdMapEntry {
    pub src_start: i64,
    pub src_len: u32,
    pub code_start: u32,
    pub code_len: u32,
}

/// The four encoded byte sequences, stored separately rather than
/// interleaved so each can be decoded independently (§6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdMapWire {
    pub code_deltas: Vec<u8>,
    pub code_lengths: Vec<u8>,
    pub src_deltas: Vec<u8>,
    pub src_lengths: Vec<u8>,
}

const ESCAPE: u8 = 0xFF;

fn put_unsigned(buf: &mut Vec<u8>, v: u32) {
    if v < ESCAPE as u32 {
        buf.push(v as u8);
    } else {
        buf.push(ESCAPE);
        buf.extend_from_slice(&v.to_be_bytes());
    }
}

fn put_signed(buf: &mut Vec<u8>, v: i32) {
    if v != -1 && (i8::MIN as i32..=i8::MAX as i32).contains(&v) {
        buf.push(v as i8 as u8);
    } else {
        buf.push(ESCAPE);
        buf.extend_from_slice(&v.to_be_bytes());
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take_unsigned(&mut self) -> Option<u32> {
        let tag = *self.bytes.get(self.pos)?;
        self.pos += 1;
        if tag == ESCAPE {
            let word: [u8; 4] = self.bytes.get(self.pos..self.pos + 4)?.try_into().ok()?;
            self.pos += 4;
            Some(u32::from_be_bytes(word))
        } else {
            Some(tag as u32)
        }
    }

    fn take_signed(&mut self) -> Option<i32> {
        let tag = *self.bytes.get(self.pos)?;
        self.pos += 1;
        if tag == ESCAPE {
            let word: [u8; 4] = self.bytes.get(self.pos..self.pos + 4)?.try_into().ok()?;
            self.pos += 4;
            Some(i32::from_be_bytes(word))
        } else {
            Some(tag as i8 as i32)
        }
    }
}

/// Encodes a strictly-`codeStart`-monotone sequence of entries (§3.3
/// invariant 4 in §8) into the wire format.
#[must_use]
pub fn encode(entries: &[CmdMapEntry]) -> CmdMapWire {
    let mut wire = CmdMapWire::default();
    let mut prev_code_start: i64 = 0;
    let mut prev_src_start: i64 = 0;
    for e in entries {
        let code_delta = e.code_start as i64 - prev_code_start;
        debug_assert!(code_delta >= 0, "codeStart must be monotone non-decreasing");
        put_unsigned(&mut wire.code_deltas, code_delta as u32);
        put_unsigned(&mut wire.code_lengths, e.code_len);
        put_signed(&mut wire.src_deltas, (e.src_start - prev_src_start) as i32);
        put_unsigned(&mut wire.src_lengths, e.src_len);
        prev_code_start = e.code_start as i64;
        prev_src_start = e.src_start;
    }
    wire
}

/// Decodes a `cmdMap` wire blob back into entries. Returns `None` on a
/// malformed (truncated) sequence.
#[must_use]
pub fn decode(wire: &CmdMapWire) -> Option<Vec<CmdMapEntry>> {
    let mut code_r = Reader::new(&wire.code_deltas);
    let mut clen_r = Reader::new(&wire.code_lengths);
    let mut src_r = Reader::new(&wire.src_deltas);
    let mut slen_r = Reader::new(&wire.src_lengths);

    let mut entries = Vec::new();
    let mut code_start: i64 = 0;
    let mut src_start: i64 = 0;
    loop {
        let Some(code_delta) = code_r.take_unsigned() else { break };
        let code_len = clen_r.take_unsigned()?;
        let src_delta = src_r.take_signed()?;
        let src_len = slen_r.take_unsigned()?;
        code_start += code_delta as i64;
        src_start += src_delta as i64;
        entries.push(CmdMapEntry {
            src_start,
            src_len,
            code_start: code_start as u32,
            code_len,
        });
    }
    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<CmdMapEntry> {
        vec![
            CmdMapEntry { src_start: 0, src_len: 10, code_start: 0, code_len: 3 },
            CmdMapEntry { src_start: 5, src_len: 4, code_start: 3, code_len: 2 },
            CmdMapEntry { src_start: 500, src_len: 300, code_start: 400, code_len: 9 },
        ]
    }

    #[test]
    fn round_trips() {
        let entries = sample();
        let wire = encode(&entries);
        let back = decode(&wire).unwrap();
        assert_eq!(entries, back);
    }

    #[test]
    fn large_values_use_escape_form() {
        let entries = vec![CmdMapEntry { src_start: 0, src_len: 100_000, code_start: 0, code_len: 70_000 }];
        let wire = encode(&entries);
        assert_eq!(wire.code_lengths[0], ESCAPE);
        assert_eq!(decode(&wire).unwrap(), entries);
    }

    #[test]
    fn negative_src_delta_round_trips() {
        let entries = vec![
            CmdMapEntry { src_start: 100, src_len: 5, code_start: 0, code_len: 1 },
            CmdMapEntry { src_start: 20, src_len: 3, code_start: 1, code_len: 1 },
        ];
        let wire = encode(&entries);
        assert_eq!(decode(&wire).unwrap(), entries);
    }
}
