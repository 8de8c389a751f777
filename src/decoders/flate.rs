//! FlateDecode (zlib/deflate) implementation.
//!
//! Decompression is done here rather than through a general-purpose crate so
//! that header validation and output limits follow the PDF reader's rules:
//! a bad zlib header is a hard error, never a silent fallback. The Adler-32
//! trailer is not verified; many producers write it incorrectly.

use super::huffman::{FIXED_DISTANCES, FIXED_LITERALS, HuffmanTable};
use crate::decoders::StreamDecoder;
use crate::decoders::predictor::{DecodeParams, decode_predictor};
use crate::error::{Error, Result};

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
    131, 163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];
/// Order in which code-length code lengths are transmitted.
const CODE_LENGTH_ORDER: [usize; 19] =
    [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

/// LSB-first bit reader over a byte slice.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buffer: u64,
    count: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buffer: 0,
            count: 0,
        }
    }

    #[inline]
    fn refill(&mut self) {
        while self.count <= 56 && self.pos < self.data.len() {
            self.buffer |= (self.data[self.pos] as u64) << self.count;
            self.pos += 1;
            self.count += 8;
        }
    }

    #[inline]
    fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(0);
        }
        self.refill();
        if self.count < n {
            return Err(Error::Decode("deflate stream truncated".to_string()));
        }
        let value = (self.buffer & ((1u64 << n) - 1)) as u32;
        self.buffer >>= n;
        self.count -= n;
        Ok(value)
    }

    fn decode_symbol(&mut self, table: &HuffmanTable) -> Result<u16> {
        self.refill();
        let max_len = table.max_len();
        if max_len == 0 {
            return Err(Error::Decode("empty Huffman table used".to_string()));
        }
        let window = (self.buffer & ((1u64 << max_len) - 1)) as u32;
        let (symbol, len) = table
            .lookup(window)
            .ok_or_else(|| Error::Decode("invalid Huffman code".to_string()))?;
        if len > self.count {
            return Err(Error::Decode("deflate stream truncated".to_string()));
        }
        self.buffer >>= len;
        self.count -= len;
        Ok(symbol)
    }

    /// Drop bits up to the next byte boundary.
    fn align_to_byte(&mut self) {
        let skip = self.count % 8;
        self.buffer >>= skip;
        self.count -= skip;
    }

    /// Copy `n` byte-aligned bytes, draining buffered whole bytes first.
    fn copy_aligned(&mut self, mut n: usize, out: &mut Vec<u8>) -> Result<()> {
        while n > 0 && self.count >= 8 {
            out.push(self.buffer as u8);
            self.buffer >>= 8;
            self.count -= 8;
            n -= 1;
        }
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(Error::Decode("stored block exceeds input".to_string()));
        }
        out.extend_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }
}

fn check_zlib_header(input: &[u8]) -> Result<()> {
    if input.len() < 2 {
        return Err(Error::Decode("zlib header truncated".to_string()));
    }
    let cmf = input[0];
    let flg = input[1];
    if cmf & 0x0F != 8 {
        return Err(Error::Decode(format!("unsupported zlib compression method {}", cmf & 0x0F)));
    }
    if (cmf >> 4) > 7 {
        return Err(Error::Decode(format!("invalid zlib window size {}", cmf >> 4)));
    }
    if ((u16::from(cmf) << 8) | u16::from(flg)) % 31 != 0 {
        return Err(Error::Decode("zlib header checksum mismatch".to_string()));
    }
    if flg & 0x20 != 0 {
        return Err(Error::Decode("zlib preset dictionary not supported".to_string()));
    }
    Ok(())
}

/// Inflate a zlib stream.
pub fn inflate(input: &[u8]) -> Result<Vec<u8>> {
    inflate_with_limit(input, 0)
}

/// Inflate a zlib stream, failing once output exceeds `max_size` (0 = unlimited).
pub fn inflate_with_limit(input: &[u8], max_size: usize) -> Result<Vec<u8>> {
    check_zlib_header(input)?;
    let mut reader = BitReader::new(&input[2..]);
    let mut out = Vec::with_capacity(input.len().saturating_mul(4).min(1 << 20));

    loop {
        let is_final = reader.read_bits(1)? == 1;
        match reader.read_bits(2)? {
            0 => inflate_stored(&mut reader, &mut out)?,
            1 => inflate_block(&mut reader, &mut out, &FIXED_LITERALS, &FIXED_DISTANCES, max_size)?,
            2 => {
                let (literals, distances) = read_dynamic_tables(&mut reader)?;
                inflate_block(&mut reader, &mut out, &literals, &distances, max_size)?
            },
            other => return Err(Error::Decode(format!("invalid deflate block type {}", other))),
        }
        if max_size > 0 && out.len() > max_size {
            return Err(Error::Decode(format!(
                "decompressed size exceeds limit of {} bytes",
                max_size
            )));
        }
        if is_final {
            break;
        }
    }

    Ok(out)
}

fn inflate_stored(reader: &mut BitReader<'_>, out: &mut Vec<u8>) -> Result<()> {
    reader.align_to_byte();
    let len = reader.read_bits(16)?;
    let nlen = reader.read_bits(16)?;
    if len != !nlen & 0xFFFF {
        return Err(Error::Decode("stored block length check failed".to_string()));
    }
    reader.copy_aligned(len as usize, out)
}

fn inflate_block(
    reader: &mut BitReader<'_>,
    out: &mut Vec<u8>,
    literals: &HuffmanTable,
    distances: &HuffmanTable,
    max_size: usize,
) -> Result<()> {
    loop {
        let symbol = reader.decode_symbol(literals)?;
        match symbol {
            0..=255 => out.push(symbol as u8),
            256 => return Ok(()),
            257..=285 => {
                let index = (symbol - 257) as usize;
                let length = LENGTH_BASE[index] as usize
                    + reader.read_bits(u32::from(LENGTH_EXTRA[index]))? as usize;
                let dist_symbol = reader.decode_symbol(distances)? as usize;
                if dist_symbol >= DIST_BASE.len() {
                    return Err(Error::Decode(format!("invalid distance symbol {}", dist_symbol)));
                }
                let distance = DIST_BASE[dist_symbol] as usize
                    + reader.read_bits(u32::from(DIST_EXTRA[dist_symbol]))? as usize;
                if distance > out.len() {
                    return Err(Error::Decode(format!(
                        "distance {} reaches before start of output",
                        distance
                    )));
                }
                let from = out.len() - distance;
                if distance >= length {
                    out.extend_from_within(from..from + length);
                } else {
                    for i in 0..length {
                        let byte = out[from + i];
                        out.push(byte);
                    }
                }
            },
            other => return Err(Error::Decode(format!("invalid literal/length symbol {}", other))),
        }
        if max_size > 0 && out.len() > max_size {
            return Err(Error::Decode(format!(
                "decompressed size exceeds limit of {} bytes",
                max_size
            )));
        }
    }
}

fn read_dynamic_tables(reader: &mut BitReader<'_>) -> Result<(HuffmanTable, HuffmanTable)> {
    let hlit = reader.read_bits(5)? as usize + 257;
    let hdist = reader.read_bits(5)? as usize + 1;
    let hclen = reader.read_bits(4)? as usize + 4;

    let mut code_length_lengths = [0u8; 19];
    for &position in CODE_LENGTH_ORDER.iter().take(hclen) {
        code_length_lengths[position] = reader.read_bits(3)? as u8;
    }
    let code_lengths = HuffmanTable::from_lengths(&code_length_lengths)?;

    let total = hlit + hdist;
    let mut lengths: Vec<u8> = Vec::with_capacity(total);
    while lengths.len() < total {
        let symbol = reader.decode_symbol(&code_lengths)?;
        let (value, repeat) = match symbol {
            0..=15 => (symbol as u8, 1),
            16 => {
                let previous = *lengths
                    .last()
                    .ok_or_else(|| Error::Decode("repeat code with no previous length".to_string()))?;
                (previous, 3 + reader.read_bits(2)? as usize)
            },
            17 => (0, 3 + reader.read_bits(3)? as usize),
            18 => (0, 11 + reader.read_bits(7)? as usize),
            other => return Err(Error::Decode(format!("invalid code length symbol {}", other))),
        };
        if lengths.len() + repeat > total {
            return Err(Error::Decode("code lengths overflow table size".to_string()));
        }
        lengths.extend(std::iter::repeat(value).take(repeat));
    }

    if lengths[256] == 0 {
        return Err(Error::Decode("dynamic block has no end-of-block code".to_string()));
    }
    let literals = HuffmanTable::from_lengths(&lengths[..hlit])?;
    let distances = HuffmanTable::from_lengths(&lengths[hlit..])?;
    Ok((literals, distances))
}

/// FlateDecode filter implementation.
///
/// Inflates the data, then reverses the PNG predictor named in the decode
/// parameters, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlateDecoder {
    /// Output limit in bytes (0 = unlimited)
    pub max_size: usize,
}

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8], params: Option<&DecodeParams>) -> Result<Vec<u8>> {
        let inflated = inflate_with_limit(input, self.max_size)?;
        log::debug!("FlateDecode: {} -> {} bytes", input.len(), inflated.len());
        match params {
            Some(params) => decode_predictor(&inflated, params),
            None => Ok(inflated),
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
