//! PNG predictor implementations for PDF stream decoding.
//!
//! PDF streams can use PNG predictors (algorithms 10-15) to improve compression.
//! Each encoded row starts with its own filter-type byte, whatever value
//! `/Predictor` names, so a single stream may mix filters. The TIFF predictor
//! (2) is rejected outright rather than passed through undecoded.

use crate::error::{Error, Result};
use crate::object::Object;

/// PNG filter types, as stored in the leading byte of each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngFilter {
    /// No prediction
    None = 0,
    /// Difference from the byte `interval` to the left
    Sub = 1,
    /// Difference from the byte above
    Up = 2,
    /// Difference from the floor average of left and above
    Average = 3,
    /// Difference from the Paeth predictor of left, above and upper-left
    Paeth = 4,
}

impl PngFilter {
    /// Filter for a row tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PngFilter::None),
            1 => Some(PngFilter::Sub),
            2 => Some(PngFilter::Up),
            3 => Some(PngFilter::Average),
            4 => Some(PngFilter::Paeth),
            _ => None,
        }
    }

    /// All five filters, in tag order.
    pub const ALL: [PngFilter; 5] = [
        PngFilter::None,
        PngFilter::Sub,
        PngFilter::Up,
        PngFilter::Average,
        PngFilter::Paeth,
    ];
}

/// Decode parameters for stream decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (samples per row)
    pub columns: usize,
    /// Number of color components per sample (default 1)
    pub colors: usize,
    /// Bits per component (default 8)
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1, // No prediction
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read `/Predictor`, `/Columns`, `/Colors` and `/BitsPerComponent`.
    pub fn from_object(obj: &Object) -> Self {
        let mut params = Self::default();
        let Some(dict) = obj.as_dict() else {
            return params;
        };
        let read = |key: &str| dict.get(key).and_then(Object::as_integer);
        if let Some(p) = read("/Predictor") {
            params.predictor = p;
        }
        if let Some(c) = read("/Columns").filter(|&c| c > 0) {
            params.columns = c as usize;
        }
        if let Some(c) = read("/Colors").filter(|&c| c > 0) {
            params.colors = c as usize;
        }
        if let Some(b) = read("/BitsPerComponent").filter(|&b| b > 0) {
            params.bits_per_component = b as usize;
        }
        params
    }

    /// Serialize back into a `/DecodeParms` dictionary.
    pub fn to_object(&self) -> Object {
        let mut dict = crate::object::Dictionary::new();
        dict.insert("/Predictor".to_string(), Object::Integer(self.predictor));
        dict.insert("/Columns".to_string(), Object::Integer(self.columns as i64));
        if self.colors != 1 {
            dict.insert("/Colors".to_string(), Object::Integer(self.colors as i64));
        }
        if self.bits_per_component != 8 {
            dict.insert(
                "/BitsPerComponent".to_string(),
                Object::Integer(self.bits_per_component as i64),
            );
        }
        Object::Dictionary(dict)
    }

    /// Distance in bytes to the corresponding byte of the previous pixel.
    pub fn interval(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }

    /// Calculate the number of bytes of pixel data per row (without predictor tag).
    pub fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }
}

/// Reverse the predictor named by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        10..=15 => decode_png_predictor(data, params),
        other => Err(Error::UnsupportedPredictor(other)),
    }
}

#[inline]
fn paeth(left: u8, above: u8, upper_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(above) - i16::from(upper_left);
    let pa = (p - i16::from(left)).abs();
    let pb = (p - i16::from(above)).abs();
    let pc = (p - i16::from(upper_left)).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

/// Reverse one filtered row in place. `previous` is the decoded row above,
/// all zeros for the first row.
pub fn unfilter_row(filter: PngFilter, row: &mut [u8], previous: &[u8], interval: usize) {
    for x in 0..row.len() {
        let left = if x >= interval { row[x - interval] } else { 0 };
        let above = previous.get(x).copied().unwrap_or(0);
        let upper_left = if x >= interval {
            previous.get(x - interval).copied().unwrap_or(0)
        } else {
            0
        };
        let predicted = match filter {
            PngFilter::None => 0,
            PngFilter::Sub => left,
            PngFilter::Up => above,
            PngFilter::Average => ((u16::from(left) + u16::from(above)) / 2) as u8,
            PngFilter::Paeth => paeth(left, above, upper_left),
        };
        row[x] = row[x].wrapping_add(predicted);
    }
}

/// Apply one filter to a raw row, returning the filtered payload (no tag byte).
pub fn filter_row(filter: PngFilter, row: &[u8], previous: &[u8], interval: usize) -> Vec<u8> {
    row.iter()
        .enumerate()
        .map(|(x, &value)| {
            let left = if x >= interval { row[x - interval] } else { 0 };
            let above = previous.get(x).copied().unwrap_or(0);
            let upper_left = if x >= interval {
                previous.get(x - interval).copied().unwrap_or(0)
            } else {
                0
            };
            let predicted = match filter {
                PngFilter::None => 0,
                PngFilter::Sub => left,
                PngFilter::Up => above,
                PngFilter::Average => ((u16::from(left) + u16::from(above)) / 2) as u8,
                PngFilter::Paeth => paeth(left, above, upper_left),
            };
            value.wrapping_sub(predicted)
        })
        .collect()
}

/// Encode whole rows with one filter, each prefixed by its tag byte.
pub fn encode_png_rows(data: &[u8], params: &DecodeParams, filter: PngFilter) -> Vec<u8> {
    let row_len = params.pixel_bytes_per_row().max(1);
    let interval = params.interval();
    let mut out = Vec::with_capacity(data.len() + data.len() / row_len + 1);
    let mut previous = vec![0u8; row_len];
    for row in data.chunks(row_len) {
        out.push(filter as u8);
        out.extend(filter_row(filter, row, &previous, interval));
        previous[..row.len()].copy_from_slice(row);
    }
    out
}

/// Decode PNG predictors (10-15).
///
/// A trailing partial row is decoded as far as it goes.
fn decode_png_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.pixel_bytes_per_row();
    if row_len == 0 {
        return Err(Error::Decode("PNG predictor with zero-width rows".to_string()));
    }
    let interval = params.interval();
    let mut output = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len];

    for (row_index, encoded) in data.chunks(row_len + 1).enumerate() {
        let tag = encoded[0];
        let filter = PngFilter::from_tag(tag).ok_or_else(|| {
            Error::Decode(format!("Invalid PNG predictor tag {} in row {}", tag, row_index))
        })?;
        let mut row = encoded[1..].to_vec();
        unfilter_row(filter, &mut row, &previous, interval);
        previous[..row.len()].copy_from_slice(&row);
        output.extend_from_slice(&row);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(columns: usize, colors: usize) -> DecodeParams {
        DecodeParams {
            predictor: 15,
            columns,
            colors,
            bits_per_component: 8,
        }
    }

    #[test]
    fn test_no_predictor() {
        let data = b"Hello, World!";
        let result = decode_predictor(data, &DecodeParams::default()).unwrap();
        assert_eq!(result, data);
    }

    #[test]
    fn test_png_up_predictor() {
        let params = DecodeParams {
            predictor: 12,
            columns: 5,
            ..Default::default()
        };
        let encoded = vec![
            2, 10, 20, 30, 40, 50, // Row 0
            2, 5, 5, 5, 5, 5, // Row 1
        ];
        let result = decode_predictor(&encoded, &params).unwrap();
        assert_eq!(result, vec![10, 20, 30, 40, 50, 15, 25, 35, 45, 55]);
    }

    #[test]
    fn test_row_tag_overrides_predictor_value() {
        // /Predictor 12 but the row says Sub.
        let params = DecodeParams {
            predictor: 12,
            columns: 3,
            ..Default::default()
        };
        let result = decode_predictor(&[1, 1, 1, 1], &params).unwrap();
        assert_eq!(result, vec![1, 2, 3]);
    }

    #[test]
    fn test_sub_uses_interval() {
        // Two components per pixel: left is two bytes back.
        let result = decode_predictor(&[1, 1, 2, 1, 2], &png(2, 2)).unwrap();
        assert_eq!(result, vec![1, 2, 2, 4]);
    }

    #[test]
    fn test_paeth_tie_breaks() {
        // All equal: left wins.
        assert_eq!(paeth(5, 5, 5), 5);
        // p = 10 + 20 - 10 = 20: |p - above| = 0 wins.
        assert_eq!(paeth(10, 20, 10), 20);
        // left == above tie with distinct upper-left: left first.
        assert_eq!(paeth(7, 7, 0), 7);
        // p = 0 + 0 - 5 = -5: pa = 5, pb = 5, pc = 10 -> left.
        assert_eq!(paeth(0, 0, 5), 0);
    }

    #[test]
    fn test_each_filter_round_trip() {
        let params = png(4, 3);
        let rows: Vec<u8> = (0..48u32).map(|i| (i * 37 % 251) as u8).collect();
        for filter in PngFilter::ALL {
            let encoded = encode_png_rows(&rows, &params, filter);
            assert_eq!(encoded.len(), rows.len() + 4);
            assert_eq!(decode_predictor(&encoded, &params).unwrap(), rows, "{:?}", filter);
        }
    }

    #[test]
    fn test_tiff_predictor_rejected() {
        let params = DecodeParams {
            predictor: 2,
            ..Default::default()
        };
        assert!(matches!(
            decode_predictor(b"abc", &params),
            Err(Error::UnsupportedPredictor(2))
        ));
    }

    #[test]
    fn test_invalid_row_tag() {
        assert!(decode_predictor(&[9, 0, 0], &png(2, 1)).is_err());
    }

    #[test]
    fn test_decode_params_from_object() {
        let mut dict = crate::object::Dictionary::new();
        dict.insert("/Predictor".into(), Object::Integer(12));
        dict.insert("/Columns".into(), Object::Integer(7));
        let params = DecodeParams::from_object(&Object::Dictionary(dict));
        assert_eq!(params.predictor, 12);
        assert_eq!(params.columns, 7);
        assert_eq!(params.colors, 1);
        assert_eq!(DecodeParams::from_object(&params.to_object()), params);
    }

    #[test]
    fn test_sub_byte_rows() {
        let params = DecodeParams {
            predictor: 10,
            columns: 16,
            colors: 1,
            bits_per_component: 1,
        };
        assert_eq!(params.pixel_bytes_per_row(), 2);
        assert_eq!(params.interval(), 1);
    }
}
