//! Canonical Huffman tables for DEFLATE.
//!
//! A table is a flat lookup indexed by the next `max_len` input bits. DEFLATE
//! packs Huffman codes most-significant-bit first into an LSB-first bit
//! stream, so each code is bit-reversed before it is spread over the table.
//! Every entry stores `(code_length << 16) | symbol`; an entry of zero marks
//! a bit pattern no code maps to.

use crate::error::{Error, Result};
use lazy_static::lazy_static;

/// Longest code length DEFLATE allows.
pub(crate) const MAX_CODE_LENGTH: usize = 15;

/// Lookup table built from per-symbol code lengths.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTable {
    entries: Vec<u32>,
    max_len: u32,
}

lazy_static! {
    /// Fixed literal/length table (BTYPE 1).
    pub(crate) static ref FIXED_LITERALS: HuffmanTable = {
        let mut lengths = [0u8; 288];
        lengths[..144].fill(8);
        lengths[144..256].fill(9);
        lengths[256..280].fill(7);
        lengths[280..].fill(8);
        HuffmanTable::build(&lengths)
    };

    /// Fixed distance table (BTYPE 1).
    pub(crate) static ref FIXED_DISTANCES: HuffmanTable = HuffmanTable::build(&[5u8; 30]);
}

fn reverse_bits(code: u32, len: u32) -> u32 {
    let mut code = code;
    let mut reversed = 0;
    for _ in 0..len {
        reversed = (reversed << 1) | (code & 1);
        code >>= 1;
    }
    reversed
}

impl HuffmanTable {
    /// Build a table from code lengths, rejecting over-subscribed sets.
    ///
    /// Incomplete sets are accepted; DEFLATE uses them for single-code
    /// distance trees.
    pub(crate) fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut counts = [0i32; MAX_CODE_LENGTH + 1];
        for &len in lengths {
            let len = len as usize;
            if len > MAX_CODE_LENGTH {
                return Err(Error::Decode(format!("Huffman code length {} exceeds 15", len)));
            }
            if len > 0 {
                counts[len] += 1;
            }
        }
        let mut left = 1i32;
        for &count in &counts[1..] {
            left = (left << 1) - count;
            if left < 0 {
                return Err(Error::Decode("over-subscribed Huffman code lengths".to_string()));
            }
        }
        Ok(Self::build(lengths))
    }

    /// Build without validation; callers guarantee a prefix-free set.
    fn build(lengths: &[u8]) -> Self {
        let max_len = lengths.iter().copied().max().unwrap_or(0) as u32;
        let size = 1usize << max_len;
        let mut entries = vec![0u32; if max_len == 0 { 0 } else { size }];

        let mut counts = [0u32; MAX_CODE_LENGTH + 1];
        for &len in lengths {
            if len > 0 {
                counts[len as usize] += 1;
            }
        }
        let mut next_code = [0u32; MAX_CODE_LENGTH + 1];
        let mut code = 0u32;
        for bits in 1..=MAX_CODE_LENGTH {
            code = (code + counts[bits - 1]) << 1;
            next_code[bits] = code;
        }

        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let len = len as u32;
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            let entry = (len << 16) | symbol as u32;
            let mut index = reverse_bits(code, len) as usize;
            while index < size {
                entries[index] = entry;
                index += 1 << len;
            }
        }

        Self { entries, max_len }
    }

    /// Number of input bits used to index the table.
    pub(crate) fn max_len(&self) -> u32 {
        self.max_len
    }

    /// Look up `bits` (the next `max_len` input bits, LSB first).
    ///
    /// Returns `(symbol, code_length)`, or `None` when no code matches.
    #[inline]
    pub(crate) fn lookup(&self, bits: u32) -> Option<(u16, u32)> {
        let entry = *self.entries.get(bits as usize)?;
        let len = entry >> 16;
        (len != 0).then_some(((entry & 0xFFFF) as u16, len))
    }
}
