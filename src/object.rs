//! PDF object types.
//!
//! [`ObjectId`] addresses an indirect object. [`Object`] is the generic value
//! used for trailer entries and for dictionary keys the typed model does not
//! recognize, so they survive a parse, edit and serialize cycle unchanged.

use crate::scanner::{ByteScanner, ParseResult, ValueType};
use indexmap::IndexMap;

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    /// Object number
    pub id: u32,
    /// Generation number
    pub generation: u16,
}

impl ObjectId {
    /// Create a new object reference.
    pub fn new(id: u32, generation: u16) -> Self {
        Self { id, generation }
    }

    /// Parse `id gen R` at `start`.
    pub fn parse_ref_at(
        scanner: &ByteScanner<'_>,
        start: usize,
        skip_empty: bool,
    ) -> Option<ParseResult<ObjectId>> {
        let id = scanner.parse_integer_at(start, skip_empty)?;
        let generation = scanner.parse_integer_at(id.end + 1, true)?;
        let r = scanner.skip_empty(generation.end + 1)?;
        if scanner.byte_at(r) != Some(b'R') {
            return None;
        }
        if scanner.byte_at(r + 1).is_some_and(crate::scanner::is_regular_char) {
            return None;
        }
        let value = ObjectId::new(u32::try_from(id.value).ok()?, u16::try_from(generation.value).ok()?);
        Some(ParseResult {
            value,
            start: id.start,
            end: r,
        })
    }

    /// Parse an array made only of references.
    pub fn parse_ref_array_at(
        scanner: &ByteScanner<'_>,
        start: usize,
        skip_empty: bool,
    ) -> Option<ParseResult<Vec<ObjectId>>> {
        let bounds = scanner.get_array_bounds_at(start, skip_empty)?;
        let (cs, ce) = bounds.content();
        let mut refs = Vec::new();
        let mut i = cs;
        while let Some(next) = scanner.skip_empty(i).filter(|&n| n <= ce) {
            let r = ObjectId::parse_ref_at(scanner, next, false)?;
            refs.push(r.value);
            i = r.end + 1;
        }
        Some(ParseResult {
            value: refs,
            start: bounds.start,
            end: bounds.end,
        })
    }

    /// Parse an indirect object header `id gen obj`; `end` is the `j` of `obj`.
    pub fn parse_header_at(
        scanner: &ByteScanner<'_>,
        start: usize,
        skip_empty: bool,
    ) -> Option<ParseResult<ObjectId>> {
        let id = scanner.parse_integer_at(start, skip_empty)?;
        let generation = scanner.parse_integer_at(id.end + 1, true)?;
        let keyword = scanner.parse_string_at(generation.end + 1, true)?;
        if keyword.value != "obj" {
            return None;
        }
        let value = ObjectId::new(u32::try_from(id.value).ok()?, u16::try_from(generation.value).ok()?);
        Some(ParseResult {
            value,
            start: id.start,
            end: keyword.end,
        })
    }

    /// Serialized reference, e.g. `12 0 R`.
    pub fn to_ref_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.generation)
    }
}

impl From<(u32, u16)> for ObjectId {
    fn from((id, generation): (u32, u16)) -> Self {
        Self::new(id, generation)
    }
}

/// Ordered dictionary; keys keep their leading slash.
pub type Dictionary = IndexMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String with escapes resolved (literal) or digits decoded (hex)
    String(Vec<u8>),
    /// Name as written, leading slash included, `#xx` unresolved
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs in source order)
    Dictionary(Dictionary),
    /// Stream (dictionary + encoded data)
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Encoded stream data
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectId),
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Shorthand for a name value.
    pub fn name(name: &str) -> Self {
        if name.starts_with('/') {
            Object::Name(name.to_string())
        } else {
            Object::Name(format!("/{}", name))
        }
    }

    /// Array of numbers, integral values written as integers.
    pub fn numbers(values: &[f64]) -> Self {
        Object::Array(values.iter().map(|&v| Object::from(v)).collect())
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an integer or real.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Collect every reference reachable inside this value.
    pub fn collect_references(&self, out: &mut Vec<ObjectId>) {
        match self {
            Object::Reference(r) => out.push(*r),
            Object::Array(items) => items.iter().for_each(|o| o.collect_references(out)),
            Object::Dictionary(dict) | Object::Stream { dict, .. } => {
                dict.values().for_each(|o| o.collect_references(out))
            },
            _ => {},
        }
    }

    /// Parse any value at `start`.
    ///
    /// Returns `None` for comments, bare keywords and unterminated
    /// structures. A stream is returned with its payload located by
    /// `endstream`; typed streams verify `/Length` on their own.
    pub fn parse_at(
        scanner: &ByteScanner<'_>,
        start: usize,
        skip_empty: bool,
    ) -> Option<ParseResult<Object>> {
        let start = if skip_empty {
            scanner.skip_empty(start)?
        } else {
            start
        };
        match scanner.get_value_type_at(start, false) {
            ValueType::Null => Some(ParseResult {
                value: Object::Null,
                start,
                end: start + 3,
            }),
            ValueType::Boolean => scanner.parse_bool_at(start, false).map(|r| r.map(Object::Boolean)),
            ValueType::Number => Self::parse_number(scanner, start),
            ValueType::Ref => {
                ObjectId::parse_ref_at(scanner, start, false).map(|r| r.map(Object::Reference))
            },
            ValueType::Name => scanner.parse_name_at(start, false).map(|r| r.map(Object::Name)),
            ValueType::StringLiteral => scanner
                .parse_literal_at(start, false)
                .map(|r| r.map(|raw| Object::String(decode_literal_escapes(&raw)))),
            ValueType::StringHex => scanner.parse_hex_at(start, false).map(|r| r.map(Object::String)),
            ValueType::Array => Self::parse_array(scanner, start),
            ValueType::Dictionary => {
                let (dict, bounds) = Self::parse_dict(scanner, start)?;
                Some(ParseResult {
                    value: Object::Dictionary(dict),
                    start,
                    end: bounds,
                })
            },
            ValueType::Stream => Self::parse_stream(scanner, start),
            ValueType::Comment | ValueType::Unknown => None,
        }
    }

    fn parse_number(scanner: &ByteScanner<'_>, start: usize) -> Option<ParseResult<Object>> {
        let number = scanner.parse_number_at(start, true, false)?;
        let is_real = scanner.slice(number.start, number.end).contains(&b'.');
        let value = if is_real {
            Object::Real(number.value)
        } else {
            Object::Integer(number.value as i64)
        };
        Some(ParseResult {
            value,
            start: number.start,
            end: number.end,
        })
    }

    fn parse_array(scanner: &ByteScanner<'_>, start: usize) -> Option<ParseResult<Object>> {
        let bounds = scanner.get_array_bounds_at(start, false)?;
        let (cs, ce) = bounds.content();
        let mut items = Vec::new();
        let mut i = cs;
        while let Some(next) = scanner.skip_empty(i).filter(|&n| n <= ce) {
            let item = Object::parse_at(scanner, next, false)?;
            i = item.end + 1;
            items.push(item.value);
        }
        Some(ParseResult {
            value: Object::Array(items),
            start: bounds.start,
            end: bounds.end,
        })
    }

    /// Parse a dictionary; returns the entries and the index of the closing `>`.
    pub(crate) fn parse_dict(scanner: &ByteScanner<'_>, start: usize) -> Option<(Dictionary, usize)> {
        let bounds = scanner.get_dict_bounds_at(start, false)?;
        let (cs, ce) = bounds.content();
        let mut dict = Dictionary::new();
        let mut cursor = cs;
        while let Some(name_start) = scanner.skip_to_next_name(cursor, ce) {
            let name = scanner.parse_name_at(name_start, false)?;
            cursor = name.end + 1;
            let Some(value_start) = scanner.skip_empty(cursor).filter(|&v| v <= ce) else {
                break;
            };
            match Object::parse_at(scanner, value_start, false) {
                Some(value) => {
                    cursor = value.end + 1;
                    dict.insert(name.value, value.value);
                },
                None => {
                    cursor = scanner.skip_value_at(value_start)?;
                },
            }
        }
        Some((dict, bounds.end))
    }

    fn parse_stream(scanner: &ByteScanner<'_>, start: usize) -> Option<ParseResult<Object>> {
        let (dict, dict_end) = Self::parse_dict(scanner, start)?;
        let keyword = scanner.skip_empty(dict_end + 1)?;
        let payload_start = stream_payload_start(scanner, keyword)?;
        let endstream = scanner.find_subarray_index(
            b"endstream",
            crate::scanner::SearchOptions {
                min_index: payload_start,
                ..Default::default()
            },
        )?;
        let payload_end = trim_payload_eol(scanner, payload_start, endstream.start);
        let data = bytes::Bytes::copy_from_slice(&scanner.data()[payload_start..payload_end]);
        Some(ParseResult {
            value: Object::Stream { dict, data },
            start,
            end: endstream.end,
        })
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Object::Integer(value as i64)
        } else {
            Object::Real(value)
        }
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<ObjectId> for Object {
    fn from(value: ObjectId) -> Self {
        Object::Reference(value)
    }
}

/// Index of the first payload byte after the `stream` keyword at `keyword`.
///
/// The keyword must be followed by CRLF or LF; a lone CR is accepted too.
pub(crate) fn stream_payload_start(scanner: &ByteScanner<'_>, keyword: usize) -> Option<usize> {
    let data = scanner.data();
    if !data.get(keyword..)?.starts_with(b"stream") {
        return None;
    }
    let after = keyword + 6;
    match (data.get(after), data.get(after + 1)) {
        (Some(b'\r'), Some(b'\n')) => Some(after + 2),
        (Some(b'\n'), _) | (Some(b'\r'), _) => Some(after + 1),
        _ => None,
    }
}

/// Exclusive end of a payload followed by `endstream` at `endstream_start`,
/// dropping the EOL marker that precedes the keyword.
pub(crate) fn trim_payload_eol(
    scanner: &ByteScanner<'_>,
    payload_start: usize,
    endstream_start: usize,
) -> usize {
    let data = scanner.data();
    let mut end = endstream_start;
    if end > payload_start && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > payload_start && data[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

/// Resolve backslash escapes in raw literal-string content.
///
/// Handles `\n \r \t \b \f \( \) \\`, one to three octal digits, and a
/// backslash-EOL line continuation. An unknown escape keeps the escaped byte.
pub fn decode_literal_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let byte = raw[i];
        if byte != b'\\' {
            out.push(byte);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&escaped) = raw.get(i) else {
            break;
        };
        match escaped {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                            digits += 1;
                        },
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
                continue;
            },
            b'\r' => {
                if raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'\n' => {},
            other => out.push(other),
        }
        i += 1;
    }
    out
}

/// Resolve `#xx` escapes in a name. Invalid escapes are kept literally.
pub fn decode_name_escapes(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'#' {
            if let Some(hex) = name.get(i + 1..i + 3) {
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    match String::from_utf8(out) {
        Ok(text) => text,
        Err(err) => crate::scanner::latin1_to_string(err.as_bytes()),
    }
}

/// Decode a PDF text string: UTF-16BE when it carries the FE FF byte order
/// mark, PDFDocEncoding (read as Latin-1) otherwise.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if bytes.len() >= 3 && bytes[..3] == [0xEF, 0xBB, 0xBF] {
        return String::from_utf8_lossy(&bytes[3..]).into_owned();
    }
    crate::scanner::latin1_to_string(bytes)
}

/// Encode a text string: plain bytes for ASCII, UTF-16BE with BOM otherwise.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_display() {
        assert_eq!(ObjectId::new(10, 0).to_string(), "10 0 R");
        assert_eq!(ObjectId::new(3, 2).to_ref_bytes(), b"3 2 R");
    }

    #[test]
    fn test_parse_ref_and_header() {
        let s = ByteScanner::new(b"12 0 obj 3 1 R 4 0 Rx");
        let header = ObjectId::parse_header_at(&s, 0, false).unwrap();
        assert_eq!(header.value, ObjectId::new(12, 0));
        assert_eq!(header.end, 7);
        let r = ObjectId::parse_ref_at(&s, 8, true).unwrap();
        assert_eq!(r.value, ObjectId::new(3, 1));
        assert_eq!(r.end, 13);
        assert!(ObjectId::parse_ref_at(&s, 15, false).is_none());
    }

    #[test]
    fn test_parse_ref_array() {
        let s = ByteScanner::new(b"[1 0 R 2 0 R\n5 3 R]");
        let refs = ObjectId::parse_ref_array_at(&s, 0, false).unwrap().value;
        assert_eq!(refs, vec![ObjectId::new(1, 0), ObjectId::new(2, 0), ObjectId::new(5, 3)]);
    }

    #[test]
    fn test_parse_generic_dictionary_keeps_order() {
        let data = b"<< /Zed 1 /Alpha [1 2.5 /N (s)] /Ref 4 0 R /Sub << /K true >> /Nul null >>";
        let parsed = Object::parse_at(&ByteScanner::new(data), 0, false).unwrap();
        let dict = parsed.value.as_dict().unwrap().clone();
        let keys: Vec<_> = dict.keys().cloned().collect();
        assert_eq!(keys, vec!["/Zed", "/Alpha", "/Ref", "/Sub", "/Nul"]);
        assert_eq!(dict["/Zed"], Object::Integer(1));
        assert_eq!(
            dict["/Alpha"],
            Object::Array(vec![
                Object::Integer(1),
                Object::Real(2.5),
                Object::Name("/N".into()),
                Object::String(b"s".to_vec()),
            ])
        );
        assert_eq!(dict["/Ref"], Object::Reference(ObjectId::new(4, 0)));
        assert_eq!(dict["/Nul"], Object::Null);
        assert_eq!(parsed.end, data.len() - 1);
    }

    #[test]
    fn test_parse_generic_stream() {
        let data = b"<< /Length 5 >>\r\nstream\r\nhello\r\nendstream";
        let parsed = Object::parse_at(&ByteScanner::new(data), 0, false).unwrap();
        match parsed.value {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"hello"),
            other => panic!("expected stream, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_collect_references() {
        let obj = Object::Array(vec![
            Object::Reference(ObjectId::new(1, 0)),
            Object::Dictionary(Dictionary::from([(
                "/P".to_string(),
                Object::Reference(ObjectId::new(2, 0)),
            )])),
        ]);
        let mut refs = Vec::new();
        obj.collect_references(&mut refs);
        assert_eq!(refs, vec![ObjectId::new(1, 0), ObjectId::new(2, 0)]);
    }

    #[test]
    fn test_literal_escapes() {
        assert_eq!(decode_literal_escapes(b"a\\(b\\)\\\\"), b"a(b)\\");
        assert_eq!(decode_literal_escapes(b"\\101\\7x"), b"A\x07x");
        assert_eq!(decode_literal_escapes(b"line\\\r\nnext"), b"linenext");
        assert_eq!(decode_literal_escapes(b"\\n\\t\\q"), b"\n\tq");
    }

    #[test]
    fn test_name_escapes() {
        assert_eq!(decode_name_escapes("/A#20B"), "/A B");
        assert_eq!(decode_name_escapes("/Bad#zz"), "/Bad#zz");
        assert_eq!(decode_name_escapes("/Tail#4"), "/Tail#4");
    }

    #[test]
    fn test_text_string_round_trip() {
        assert_eq!(decode_text_string(b"plain"), "plain");
        let encoded = encode_text_string("Grüße");
        assert_eq!(&encoded[..2], &[0xFE, 0xFF]);
        assert_eq!(decode_text_string(&encoded), "Grüße");
        assert_eq!(decode_text_string(&[0xE9]), "é");
    }

    #[test]
    fn test_number_conversion() {
        assert_eq!(Object::from(3.0), Object::Integer(3));
        assert_eq!(Object::from(0.25), Object::Real(0.25));
        assert_eq!(Object::name("Annot"), Object::Name("/Annot".into()));
    }
}
