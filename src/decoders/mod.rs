//! Stream decoder implementations for PDF filters.
//!
//! Only FlateDecode is decoded. Every other filter name is reported as
//! [`Error::UnsupportedFilter`]; the stream's dictionary stays usable, only
//! the decode call fails.
//!
//! Decoders can be chained together in a filter pipeline, each stage taking
//! the `/DecodeParms` entry at the same position.

use crate::error::{Error, Result};

mod flate;
mod huffman;
pub mod predictor;

pub use flate::{FlateDecoder, inflate, inflate_with_limit};
pub use predictor::{DecodeParams, PngFilter, decode_predictor, encode_png_rows};

/// PDF stream filter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// FlateDecode (deflate/zlib compression)
    FlateDecode,
}

impl Filter {
    /// Resolve a filter name, with or without the leading slash.
    ///
    /// The inline-image abbreviation `Fl` is accepted too.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim_start_matches('/') {
            "FlateDecode" | "Fl" => Ok(Filter::FlateDecode),
            other => Err(Error::UnsupportedFilter(other.to_string())),
        }
    }

    /// Name as written in a `/Filter` entry.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Filter::FlateDecode => "/FlateDecode",
        }
    }
}

/// Trait for PDF stream decoders.
///
/// Each decoder implements a specific PDF filter algorithm and can decode
/// compressed or encoded stream data.
pub trait StreamDecoder {
    /// Decode the input data, reversing any predictor in `params`.
    fn decode(&self, input: &[u8], params: Option<&DecodeParams>) -> Result<Vec<u8>>;

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Decode stream data using a filter pipeline.
///
/// # Examples
///
/// ```rust
/// use pdf_delta::decoders::{decode_stream, encode_flate};
///
/// let compressed = encode_flate(b"BT /F1 12 Tf ET").unwrap();
/// let filters = vec!["/FlateDecode".to_string()];
/// let decoded = decode_stream(&compressed, &filters).unwrap();
/// assert_eq!(decoded, b"BT /F1 12 Tf ET");
/// ```
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_params(data, filters, &[], 0)
}

/// Decode stream data with per-filter parameters and an output limit.
///
/// `params[i]` belongs to `filters[i]`; missing entries mean no predictor.
/// `max_size` bounds every intermediate result (0 = unlimited).
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: &[Option<DecodeParams>],
    max_size: usize,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for (index, filter_name) in filters.iter().enumerate() {
        let decoder: Box<dyn StreamDecoder> = match Filter::from_name(filter_name)? {
            Filter::FlateDecode => Box::new(FlateDecoder { max_size }),
        };
        let stage_params = params.get(index).and_then(Option::as_ref);
        current = decoder.decode(&current, stage_params)?;
        log::debug!("decoded {} stage {}: {} bytes", decoder.name(), index, current.len());
    }

    Ok(current)
}

/// Compress data for a `/FlateDecode` stream.
pub fn encode_flate(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
