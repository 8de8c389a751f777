//! Stream objects.
//!
//! A [`PdfStream`] keeps the encoded payload exactly as found in the file
//! (after decryption) and decodes it on first request. The decoded bytes are
//! cached; a failed decode is not cached and leaves the dictionary usable.

use super::dict::{read_int, read_names, read_ref, read_object};
use super::{ParseInfo, PdfDict, PdfObject};
use crate::decoders::{self, DecodeParams, Filter};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectId, stream_payload_start, trim_payload_eol};
use crate::scanner::{ByteScanner, SearchOptions, ValueType};
use bytes::Bytes;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy)]
enum LengthValue {
    Direct(usize),
    Indirect(ObjectId),
}

/// Stream dictionary plus payload.
#[derive(Debug, Clone, Default)]
pub struct PdfStream {
    /// Base dictionary
    pub dict: PdfDict,
    /// `/Filter` names in application order, slash included
    pub filters: Vec<String>,
    /// `/DecodeParms`, one slot per filter
    pub decode_parms: Vec<Option<DecodeParams>>,
    raw: Bytes,
    decoded: OnceLock<Bytes>,
    max_decoded_size: usize,
}

impl PdfStream {
    /// Unfiltered stream holding `data`.
    pub fn new(type_name: Option<&str>, data: &[u8]) -> Self {
        Self {
            dict: PdfDict::new(type_name),
            raw: Bytes::copy_from_slice(data),
            ..Default::default()
        }
    }

    /// FlateDecode stream holding `data` compressed.
    pub fn flate(type_name: Option<&str>, data: &[u8]) -> Result<Self> {
        let mut stream = Self::new(type_name, &[]);
        stream.set_stream_data(data)?;
        stream.dict = PdfDict::new(type_name);
        Ok(stream)
    }

    /// Parse a stream whose dictionary starts the value range of `info`.
    ///
    /// `/Length`, `/Filter` and `/DecodeParms` are handled here; other
    /// properties go to `on_prop` as in [`PdfDict::parse_props`]. A
    /// `/Length` that disagrees with the payload is a hard error.
    pub(crate) fn parse_with<F>(info: &ParseInfo, expected_type: Option<&str>, mut on_prop: F) -> Result<Self>
    where
        F: FnMut(&ByteScanner<'_>, &str, usize) -> Result<Option<usize>>,
    {
        let mut dict = PdfDict::default();
        let mut length = None;
        let mut filters = Vec::new();
        let mut parms: Option<Object> = None;

        let dict_bounds = dict.parse_props(info, expected_type, |s, name, i| match name {
            "/Length" => {
                if s.get_value_type_at(i, false) == ValueType::Ref {
                    let r = read_ref(s, i)?;
                    length = Some(LengthValue::Indirect(r.value));
                    Ok(Some(r.end + 1))
                } else {
                    let n = read_int(s, i)?;
                    let n_value = usize::try_from(n.value)
                        .map_err(|_| Error::parse(i, "negative stream /Length"))?;
                    length = Some(LengthValue::Direct(n_value));
                    Ok(Some(n.end + 1))
                }
            },
            "/Filter" => {
                let names = read_names(s, i)?;
                filters = names.value;
                Ok(Some(names.end + 1))
            },
            "/DecodeParms" => {
                let value = read_object(info, s, i)?;
                parms = Some(value.value);
                Ok(Some(value.end + 1))
            },
            _ => on_prop(s, name, i),
        })?;

        let scanner = info.scanner();
        let keyword = scanner
            .skip_empty(dict_bounds.end + 1)
            .ok_or_else(|| Error::parse(dict_bounds.end, "missing stream keyword"))?;
        let payload_start = stream_payload_start(&scanner, keyword)
            .ok_or_else(|| Error::parse(keyword, "expected stream keyword"))?;

        let declared = match length {
            Some(LengthValue::Direct(n)) => Some(n),
            Some(LengthValue::Indirect(r)) => Some(resolve_length(info, r)?),
            None => None,
        };
        let payload_end = match declared {
            Some(n) if ends_before_endstream(&scanner, payload_start + n, false) => payload_start + n,
            Some(n) => {
                let actual = find_payload_end(&scanner, payload_start)? - payload_start;
                let err = Error::LengthMismatch {
                    declared: n,
                    actual,
                };
                // extra white-space between the payload and `endstream`
                if ends_before_endstream(&scanner, payload_start + n, true) && info.options.tolerates(&err) {
                    payload_start + n
                } else {
                    return Err(err);
                }
            },
            None => find_payload_end(&scanner, payload_start)?,
        };

        let encoded = &info.data[payload_start..payload_end];
        let raw = match info.crypt_info {
            Some(_) => Bytes::from(info.decrypt_stream(encoded)?),
            None => info.data.slice(payload_start..payload_end),
        };

        let decode_parms = match parms {
            Some(Object::Array(items)) => items
                .iter()
                .map(|item| item.as_dict().map(|_| DecodeParams::from_object(item)))
                .collect(),
            Some(obj @ Object::Dictionary(_)) => vec![Some(DecodeParams::from_object(&obj))],
            _ => Vec::new(),
        };

        Ok(Self {
            dict,
            filters,
            decode_parms,
            raw,
            decoded: OnceLock::new(),
            max_decoded_size: info.options.max_decompressed_size,
        })
    }

    /// Encoded payload as stored in the file (decrypted).
    pub fn raw_data(&self) -> &Bytes {
        &self.raw
    }

    /// Decoded payload, computed on first call.
    ///
    /// Fails with [`Error::UnsupportedFilter`] for anything but FlateDecode.
    pub fn decoded_data(&self) -> Result<Bytes> {
        if let Some(decoded) = self.decoded.get() {
            return Ok(decoded.clone());
        }
        let decoded = if self.filters.is_empty() {
            self.raw.clone()
        } else {
            Bytes::from(decoders::decode_stream_with_params(
                &self.raw,
                &self.filters,
                &self.decode_parms,
                self.max_decoded_size,
            )?)
        };
        let _ = self.decoded.set(decoded.clone());
        Ok(decoded)
    }

    /// Replace the payload, re-encoding it with FlateDecode.
    pub fn set_stream_data(&mut self, data: &[u8]) -> Result<()> {
        let encoded = decoders::encode_flate(data)?;
        self.raw = Bytes::from(encoded);
        self.filters = vec![Filter::FlateDecode.pdf_name().to_string()];
        self.decode_parms.clear();
        self.decoded = OnceLock::new();
        let _ = self.decoded.set(Bytes::copy_from_slice(data));
        self.dict.mark_edited();
        Ok(())
    }

    /// Replace the payload with already-encoded bytes.
    pub fn set_raw_data(&mut self, raw: Bytes, filters: Vec<String>, decode_parms: Vec<Option<DecodeParams>>) {
        self.raw = raw;
        self.filters = filters;
        self.decode_parms = decode_parms;
        self.decoded = OnceLock::new();
        self.dict.mark_edited();
    }

    /// Write `/Length`, `/Filter` and `/DecodeParms` and wrap with the payload.
    pub(crate) fn finish_object(&self, mut dict: Dictionary) -> Object {
        dict.insert("/Length".into(), Object::Integer(self.raw.len() as i64));
        match self.filters.len() {
            0 => {},
            1 => {
                dict.insert("/Filter".into(), Object::name(&self.filters[0]));
            },
            _ => {
                let names = self.filters.iter().map(|f| Object::name(f)).collect();
                dict.insert("/Filter".into(), Object::Array(names));
            },
        }
        let parms: Vec<Object> = self
            .decode_parms
            .iter()
            .map(|p| p.as_ref().map_or(Object::Null, DecodeParams::to_object))
            .collect();
        if parms.iter().any(|p| *p != Object::Null) {
            let value = if parms.len() == 1 {
                parms.into_iter().next().unwrap_or(Object::Null)
            } else {
                Object::Array(parms)
            };
            dict.insert("/DecodeParms".into(), value);
        }
        self.dict.finish_object(&mut dict);
        Object::Stream {
            dict,
            data: self.raw.clone(),
        }
    }
}

impl PdfObject for PdfStream {
    fn parse(info: &ParseInfo) -> Result<Self> {
        Self::parse_with(info, None, |_, _, _| Ok(None))
    }

    fn dict(&self) -> &PdfDict {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    fn to_object(&self) -> Object {
        self.finish_object(self.dict.begin_object())
    }
}

fn resolve_length(info: &ParseInfo, reference: ObjectId) -> Result<usize> {
    let target = info.resolve(reference.id)?;
    let scanner = target.scanner();
    let (start, _) = target.bounds.content();
    let value = read_int(&scanner, start)?;
    usize::try_from(value.value).map_err(|_| Error::parse(start, "negative stream /Length"))
}

/// Whether `endstream` follows `end` after at most one EOL, or after any
/// white-space when `loose`.
fn ends_before_endstream(scanner: &ByteScanner<'_>, end: usize, loose: bool) -> bool {
    if end > scanner.len() {
        return false;
    }
    let data = scanner.data();
    let keyword = if loose {
        match scanner.skip_empty(end) {
            Some(k) => k,
            None => return false,
        }
    } else if data[end..].starts_with(b"\r\n") {
        end + 2
    } else if matches!(data.get(end), Some(b'\n' | b'\r')) {
        end + 1
    } else {
        end
    };
    data.get(keyword..).is_some_and(|rest| rest.starts_with(b"endstream"))
}

fn find_payload_end(scanner: &ByteScanner<'_>, payload_start: usize) -> Result<usize> {
    let endstream = scanner
        .find_subarray_index(
            b"endstream",
            SearchOptions {
                min_index: payload_start,
                ..Default::default()
            },
        )
        .ok_or_else(|| Error::parse(payload_start, "missing endstream"))?;
    Ok(trim_payload_eol(scanner, payload_start, endstream.start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_config::ParserOptions;
    use crate::scanner::ParserBounds;

    fn info(data: &[u8]) -> ParseInfo {
        ParseInfo::new(
            Bytes::copy_from_slice(data),
            ParserBounds::with_content(0, data.len() - 1, 0, data.len() - 1),
        )
    }

    #[test]
    fn test_parse_plain_stream() {
        let stream = PdfStream::parse(&info(b"<< /Length 5 /Custom 1 >>\r\nstream\r\nhello\r\nendstream")).unwrap();
        assert_eq!(&stream.raw_data()[..], b"hello");
        assert_eq!(&stream.decoded_data().unwrap()[..], b"hello");
        assert_eq!(stream.dict.custom["/Custom"], Object::Integer(1));
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let err = PdfStream::parse(&info(b"<< /Length 3 >>\nstream\nhello\nendstream")).unwrap_err();
        match err {
            Error::LengthMismatch { declared, actual } => {
                assert_eq!(declared, 3);
                assert_eq!(actual, 5);
            },
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_short_length_before_padding_needs_lenient_mode() {
        let data = b"<< /Length 5 >>\nstream\nhello  \r\n\nendstream";
        let mut strict = info(data);
        strict.options = ParserOptions::strict();
        assert!(matches!(
            PdfStream::parse(&strict),
            Err(Error::LengthMismatch { declared: 5, actual: 9 })
        ));

        let lenient = info(data);
        let stream = PdfStream::parse(&lenient).unwrap();
        assert_eq!(&stream.raw_data()[..], b"hello");
    }

    #[test]
    fn test_exact_length_without_eol_is_accepted_in_strict_mode() {
        let mut strict = info(b"<< /Length 3 >>\nstream\nabcendstream");
        strict.options = ParserOptions::strict();
        assert_eq!(&PdfStream::parse(&strict).unwrap().raw_data()[..], b"abc");
    }

    #[test]
    fn test_missing_length_uses_endstream() {
        let stream = PdfStream::parse(&info(b"<<>>\nstream\nabc\nendstream")).unwrap();
        assert_eq!(&stream.raw_data()[..], b"abc");
    }

    #[test]
    fn test_flate_stream_decodes_once() {
        let compressed = decoders::encode_flate(b"q 1 0 0 1 0 0 cm Q").unwrap();
        let mut data = format!("<< /Length {} /Filter /FlateDecode >>\nstream\n", compressed.len()).into_bytes();
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream");
        let stream = PdfStream::parse(&info(&data)).unwrap();
        assert_eq!(stream.filters, vec!["/FlateDecode"]);
        assert_eq!(&stream.decoded_data().unwrap()[..], b"q 1 0 0 1 0 0 cm Q");
        assert!(stream.decoded.get().is_some());
    }

    #[test]
    fn test_unsupported_filter_keeps_dict() {
        let stream = PdfStream::parse(&info(b"<< /Length 2 /Filter /DCTDecode /W 4 >>\nstream\nab\nendstream")).unwrap();
        assert!(matches!(stream.decoded_data(), Err(Error::UnsupportedFilter(_))));
        assert_eq!(stream.dict.custom["/W"], Object::Integer(4));
    }

    #[test]
    fn test_set_stream_data_marks_edited() {
        let mut stream = PdfStream::new(None, b"old");
        stream.set_stream_data(b"new content").unwrap();
        assert!(stream.dict.is_edited());
        assert_eq!(&stream.decoded_data().unwrap()[..], b"new content");
        match stream.to_object() {
            Object::Stream { dict, data } => {
                assert_eq!(dict["/Filter"], Object::Name("/FlateDecode".into()));
                assert_eq!(dict["/Length"], Object::Integer(data.len() as i64));
            },
            other => panic!("expected stream, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_decode_parms_array() {
        let data = b"<< /Length 1 /Filter [/FlateDecode] /DecodeParms [<< /Predictor 12 /Columns 3 >>] >>\nstream\nx\nendstream";
        let stream = PdfStream::parse(&info(data)).unwrap();
        assert_eq!(stream.decode_parms.len(), 1);
        assert_eq!(stream.decode_parms[0].as_ref().map(|p| p.columns), Some(3));
    }
}
