//! Base dictionary record and property readers.

use super::ParseInfo;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectId, decode_literal_escapes, decode_text_string};
use crate::scanner::{ByteScanner, ParseResult, ParserBounds, ValueType};

/// State shared by every typed dictionary.
///
/// Mutations go through setters on the concrete types, which call
/// [`PdfDict::mark_edited`]; the writer re-emits only edited, added or
/// deleted objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfDict {
    /// `/Type` value, slash included
    pub type_name: Option<String>,
    /// Reference, once the object was read from or written to a file
    pub reference: Option<ObjectId>,
    /// Location in the source buffer
    pub bounds: Option<ParserBounds>,
    /// Object stream holding the source object
    pub stream_id: Option<u32>,
    /// Keys the typed parser does not recognize, in source order
    pub custom: Dictionary,
    edited: bool,
    added: bool,
    deleted: bool,
}

impl PdfDict {
    /// Fresh dictionary with an optional `/Type`.
    pub fn new(type_name: Option<&str>) -> Self {
        Self {
            type_name: type_name.map(str::to_string),
            ..Default::default()
        }
    }

    /// Whether a setter changed this object since it was parsed.
    pub fn is_edited(&self) -> bool {
        self.edited
    }

    /// Raise the dirty flag.
    pub fn mark_edited(&mut self) {
        self.edited = true;
    }

    /// Whether the object is new in this edit session.
    pub fn is_added(&self) -> bool {
        self.added
    }

    /// Flag the object as new.
    pub fn mark_added(&mut self) {
        self.added = true;
    }

    /// Whether the object is scheduled for removal.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Schedule the object for removal at the next write.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Clear all flags after a successful write.
    pub fn clear_flags(&mut self) {
        self.edited = false;
        self.added = false;
        self.deleted = false;
    }

    /// Walk the dictionary at the start of `info`'s value range.
    ///
    /// `/Type` is handled here and must equal `expected_type` when one is
    /// given. Every other property goes to `on_prop(scanner, name, value_start)`,
    /// which returns the index after the value when it recognized the name.
    /// Unrecognized values are kept in [`PdfDict::custom`]. Returns the
    /// dictionary bounds.
    pub(crate) fn parse_props<F>(
        &mut self,
        info: &ParseInfo,
        expected_type: Option<&str>,
        mut on_prop: F,
    ) -> Result<ParserBounds>
    where
        F: FnMut(&ByteScanner<'_>, &str, usize) -> Result<Option<usize>>,
    {
        let scanner = info.scanner();
        let (value_start, _) = info.bounds.content();
        let bounds = scanner
            .get_dict_bounds_at(value_start, true)
            .ok_or_else(|| Error::parse(value_start, "expected dictionary"))?;
        self.reference = info.id;
        self.stream_id = info.stream_id;
        self.bounds = Some(info.bounds);

        let (start, end) = bounds.content();
        let mut cursor = start;
        while let Some(name_start) = scanner.skip_to_next_name(cursor, end) {
            let name = scanner
                .parse_name_at(name_start, false)
                .ok_or_else(|| Error::parse(name_start, "invalid property name"))?;
            let Some(value_start) = scanner.skip_empty(name.end + 1).filter(|&v| v <= end) else {
                break;
            };

            if name.value == "/Type" {
                let type_name = read_name(&scanner, value_start)?;
                if let Some(expected) = expected_type {
                    if type_name.value != expected {
                        return Err(Error::InvalidObjectType {
                            expected: expected.to_string(),
                            found: type_name.value,
                        });
                    }
                }
                self.type_name = Some(type_name.value);
                cursor = type_name.end + 1;
                continue;
            }

            cursor = match on_prop(&scanner, &name.value, value_start)? {
                Some(next) => next,
                None => match Object::parse_at(&scanner, value_start, false) {
                    Some(value) => {
                        let mut value_obj = value.value;
                        info.decrypt_object(&mut value_obj)?;
                        self.custom.insert(name.value, value_obj);
                        value.end + 1
                    },
                    None => scanner.skip_value_at(value_start).unwrap_or(end + 1),
                },
            };
        }
        Ok(bounds)
    }

    /// Start a generic dictionary for serialization (`/Type` first).
    pub(crate) fn begin_object(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        if let Some(type_name) = &self.type_name {
            dict.insert("/Type".to_string(), Object::name(type_name));
        }
        dict
    }

    /// Append custom properties not already written by the typed fields.
    pub(crate) fn finish_object(&self, dict: &mut Dictionary) {
        for (key, value) in &self.custom {
            if !dict.contains_key(key) {
                dict.insert(key.clone(), value.clone());
            }
        }
    }
}

// ============================================================================
// Property readers: map scanner absence to a parse error at the value index
// ============================================================================

/// Read a name value.
pub(crate) fn read_name(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<String>> {
    s.parse_name_at(i, false).ok_or_else(|| Error::parse(i, "expected name"))
}

/// Read an integer value.
pub(crate) fn read_int(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<i64>> {
    s.parse_integer_at(i, false).ok_or_else(|| Error::parse(i, "expected integer"))
}

/// Read a non-negative integer value.
pub(crate) fn read_usize(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<usize>> {
    let value = read_int(s, i)?;
    let converted =
        usize::try_from(value.value).map_err(|_| Error::parse(i, "expected non-negative integer"))?;
    Ok(value.map(|_| converted))
}

/// Read a number value.
pub(crate) fn read_number(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<f64>> {
    s.parse_number_at(i, true, false).ok_or_else(|| Error::parse(i, "expected number"))
}

/// Read a boolean value.
pub(crate) fn read_bool(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<bool>> {
    s.parse_bool_at(i, false).ok_or_else(|| Error::parse(i, "expected boolean"))
}

/// Read an indirect reference.
pub(crate) fn read_ref(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<ObjectId>> {
    ObjectId::parse_ref_at(s, i, false).ok_or_else(|| Error::parse(i, "expected reference"))
}

/// Read an array of references.
pub(crate) fn read_refs(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<Vec<ObjectId>>> {
    ObjectId::parse_ref_array_at(s, i, false)
        .ok_or_else(|| Error::parse(i, "expected array of references"))
}

/// Read a reference or an array of references.
pub(crate) fn read_ref_or_refs(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<Vec<ObjectId>>> {
    match s.get_value_type_at(i, false) {
        ValueType::Ref => read_ref(s, i).map(|r| r.map(|id| vec![id])),
        _ => read_refs(s, i),
    }
}

/// Read an array of numbers.
pub(crate) fn read_numbers(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<Vec<f64>>> {
    s.parse_number_array_at(i, true, false)
        .ok_or_else(|| Error::parse(i, "expected array of numbers"))
}

/// Read a rectangle `[llx lly urx ury]`, normalized so `ll <= ur`.
pub(crate) fn read_rect(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<[f64; 4]>> {
    let numbers = read_numbers(s, i)?;
    if numbers.value.len() != 4 {
        return Err(Error::parse(i, "rectangle needs four numbers"));
    }
    let v = &numbers.value;
    let rect = [v[0].min(v[2]), v[1].min(v[3]), v[0].max(v[2]), v[1].max(v[3])];
    Ok(ParseResult {
        value: rect,
        start: numbers.start,
        end: numbers.end,
    })
}

/// Read a transformation matrix `[a b c d e f]`.
pub(crate) fn read_matrix(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<[f64; 6]>> {
    let numbers = read_numbers(s, i)?;
    let matrix: [f64; 6] = numbers
        .value
        .as_slice()
        .try_into()
        .map_err(|_| Error::parse(i, "matrix needs six numbers"))?;
    Ok(ParseResult {
        value: matrix,
        start: numbers.start,
        end: numbers.end,
    })
}

/// Read a name or an array of names.
pub(crate) fn read_names(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<Vec<String>>> {
    match s.get_value_type_at(i, false) {
        ValueType::Name => read_name(s, i).map(|r| r.map(|n| vec![n])),
        ValueType::Array => s
            .parse_name_array_at(i, false)
            .ok_or_else(|| Error::parse(i, "expected array of names")),
        _ => Err(Error::parse(i, "expected name or array of names")),
    }
}

/// Read a literal or hex string without decryption.
pub(crate) fn read_raw_bytes(s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<Vec<u8>>> {
    match s.get_value_type_at(i, false) {
        ValueType::StringLiteral => s
            .parse_literal_at(i, false)
            .map(|r| r.map(|raw| decode_literal_escapes(&raw)))
            .ok_or_else(|| Error::parse(i, "unterminated literal string")),
        ValueType::StringHex => {
            s.parse_hex_at(i, false).ok_or_else(|| Error::parse(i, "invalid hex string"))
        },
        _ => Err(Error::parse(i, "expected string")),
    }
}

/// Read a string and decrypt it for the owning object.
pub(crate) fn read_bytes(
    info: &ParseInfo,
    s: &ByteScanner<'_>,
    i: usize,
) -> Result<ParseResult<Vec<u8>>> {
    let raw = read_raw_bytes(s, i)?;
    let decrypted = info.decrypt_string(raw.value)?;
    Ok(ParseResult {
        value: decrypted,
        start: raw.start,
        end: raw.end,
    })
}

/// Read a text string (decrypted, then decoded to Unicode).
pub(crate) fn read_text(info: &ParseInfo, s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<String>> {
    read_bytes(info, s, i).map(|r| r.map(|bytes| decode_text_string(&bytes)))
}

/// Read any value as a generic object, strings decrypted.
pub(crate) fn read_object(info: &ParseInfo, s: &ByteScanner<'_>, i: usize) -> Result<ParseResult<Object>> {
    let mut value = Object::parse_at(s, i, false).ok_or_else(|| Error::parse(i, "invalid value"))?;
    info.decrypt_object(&mut value.value)?;
    Ok(value)
}

/// Bounds of an inline dictionary at `i`, as a value range.
pub(crate) fn inline_dict_bounds(s: &ByteScanner<'_>, i: usize) -> Result<ParserBounds> {
    let bounds = s
        .get_dict_bounds_at(i, false)
        .ok_or_else(|| Error::parse(i, "expected dictionary"))?;
    Ok(ParserBounds::with_content(bounds.start, bounds.end, bounds.start, bounds.end))
}

/// Name value of `key` in the dictionary at the start of `info`'s value range.
///
/// Used to pick a variant before the typed parse runs.
pub(crate) fn peek_name(info: &ParseInfo, key: &str) -> Result<Option<String>> {
    let scanner = info.scanner();
    let (start, _) = info.bounds.content();
    let start = scanner
        .skip_empty(start)
        .ok_or_else(|| Error::parse(start, "expected dictionary"))?;
    let (dict, _) =
        Object::parse_dict(&scanner, start).ok_or_else(|| Error::parse(start, "expected dictionary"))?;
    Ok(dict.get(key).and_then(Object::as_name).map(str::to_string))
}

/// Insert an optional value.
pub(crate) fn put_opt<T: Into<Object>>(dict: &mut Dictionary, key: &str, value: Option<T>) {
    if let Some(value) = value {
        dict.insert(key.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn info(data: &'static [u8]) -> ParseInfo {
        ParseInfo::new(
            Bytes::from_static(data),
            ParserBounds::with_content(0, data.len() - 1, 0, data.len() - 1),
        )
    }

    #[test]
    fn test_parse_props_dispatch_and_custom() {
        let info = info(b"<< /Type /Thing /Known 5 /Extra [1 2] /Other (x) >>");
        let mut dict = PdfDict::default();
        let mut known = None;
        dict.parse_props(&info, Some("/Thing"), |s, name, i| match name {
            "/Known" => {
                let v = read_int(s, i)?;
                known = Some(v.value);
                Ok(Some(v.end + 1))
            },
            _ => Ok(None),
        })
        .unwrap();
        assert_eq!(known, Some(5));
        assert_eq!(dict.type_name.as_deref(), Some("/Thing"));
        let keys: Vec<_> = dict.custom.keys().cloned().collect();
        assert_eq!(keys, vec!["/Extra", "/Other"]);
    }

    #[test]
    fn test_parse_props_type_mismatch() {
        let info = info(b"<< /Type /Page >>");
        let mut dict = PdfDict::default();
        let err = dict.parse_props(&info, Some("/Catalog"), |_, _, _| Ok(None)).unwrap_err();
        assert!(matches!(err, Error::InvalidObjectType { .. }));
    }

    #[test]
    fn test_parse_props_name_values_are_not_keys() {
        let info = info(b"<< /A /B /C 1 >>");
        let mut dict = PdfDict::default();
        let mut seen = Vec::new();
        dict.parse_props(&info, None, |_, name, _| {
            seen.push(name.to_string());
            Ok(None)
        })
        .unwrap();
        assert_eq!(seen, vec!["/A", "/C"]);
        assert_eq!(dict.custom["/A"], Object::Name("/B".into()));
    }

    #[test]
    fn test_flags() {
        let mut dict = PdfDict::new(Some("/Annot"));
        assert!(!dict.is_edited());
        dict.mark_edited();
        dict.mark_deleted();
        assert!(dict.is_edited() && dict.is_deleted());
        dict.clear_flags();
        assert!(!dict.is_edited() && !dict.is_deleted() && !dict.is_added());
    }

    #[test]
    fn test_read_rect_normalizes() {
        let s = ByteScanner::new(b"[100 200 10 20]");
        assert_eq!(read_rect(&s, 0).unwrap().value, [10.0, 20.0, 100.0, 200.0]);
        assert!(read_rect(&ByteScanner::new(b"[1 2 3]"), 0).is_err());
    }

    #[test]
    fn test_read_names_and_refs() {
        let s = ByteScanner::new(b"/Fl [/A /B] 4 0 R [1 0 R]");
        assert_eq!(read_names(&s, 0).unwrap().value, vec!["/Fl"]);
        assert_eq!(read_names(&s, 4).unwrap().value, vec!["/A", "/B"]);
        assert_eq!(read_ref_or_refs(&s, 12).unwrap().value, vec![ObjectId::new(4, 0)]);
        assert_eq!(read_ref_or_refs(&s, 18).unwrap().value, vec![ObjectId::new(1, 0)]);
    }

    #[test]
    fn test_read_text_hex_utf16() {
        let s = ByteScanner::new(b"<FEFF00480069>");
        let info = info(b"<< >>");
        assert_eq!(read_text(&info, &s, 0).unwrap().value, "Hi");
    }
}
