//! Cross-reference streams (`/Type /XRef`).
//!
//! The decoded payload is a sequence of fixed-width rows. `/W [w0 w1 w2]`
//! gives the byte width of each big-endian field, `/Index [first count ...]`
//! the id runs the rows belong to (default `[0 Size]`).
//!
//! | type | field 2           | field 3          |
//! |------|-------------------|------------------|
//! | 0    | next free id      | generation       |
//! | 1    | byte offset       | generation       |
//! | 2    | object stream id  | index in stream  |
//!
//! A zero `w0` means every row is type 1. Unknown types are skipped.

use super::{subsections, TrailerDict, XRefEntry, XRefEntryKind, XRefKind, XRefSection};
use crate::decoders::{self, DecodeParams, Filter, PngFilter};
use crate::error::{Error, Result};
use crate::model::{ParseInfo, PdfObject, PdfStream};
use crate::object::{Dictionary, Object, ObjectId};
use crate::parser_config::ParserOptions;
use crate::writer::ObjectSerializer;
use bytes::Bytes;

const MAX_FIELD_WIDTH: usize = 8;

fn invalid(offset: usize, reason: impl Into<String>) -> Error {
    Error::InvalidXref {
        offset,
        reason: reason.into(),
    }
}

fn read_field(row: &[u8]) -> u64 {
    row.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn widths(dict: &Dictionary, offset: usize) -> Result<[usize; 3]> {
    let items = dict
        .get("/W")
        .and_then(Object::as_array)
        .ok_or_else(|| invalid(offset, "xref stream without /W"))?;
    let values: Vec<usize> = items
        .iter()
        .map(|item| {
            item.as_integer()
                .and_then(|w| usize::try_from(w).ok())
                .filter(|&w| w <= MAX_FIELD_WIDTH)
        })
        .collect::<Option<_>>()
        .ok_or_else(|| invalid(offset, "invalid /W entry"))?;
    match values.as_slice() {
        &[a, b, c] if a + b + c > 0 => Ok([a, b, c]),
        _ => Err(invalid(offset, format!("/W must hold three widths, found {:?}", values))),
    }
}

fn index_runs(dict: &Dictionary, size: u32, offset: usize) -> Result<Vec<(u32, u32)>> {
    let Some(items) = dict.get("/Index").and_then(Object::as_array) else {
        return Ok(vec![(0, size)]);
    };
    if items.len() % 2 != 0 {
        return Err(invalid(offset, "/Index with an odd number of values"));
    }
    items
        .chunks(2)
        .map(|pair| {
            let first = pair[0].as_integer().and_then(|v| u32::try_from(v).ok());
            let count = pair[1].as_integer().and_then(|v| u32::try_from(v).ok());
            first.zip(count).ok_or_else(|| invalid(offset, "invalid /Index entry"))
        })
        .collect()
}

/// Parse the cross-reference stream object whose header is at `offset`.
pub(crate) fn parse_stream_section(data: &Bytes, offset: usize, options: &ParserOptions) -> Result<XRefSection> {
    let mut info = ParseInfo::from_indirect_at(data.clone(), offset)?;
    info.options = *options;
    let stream_id = info.id.map(|id| id.id);
    let stream = PdfStream::parse_with(&info, Some("/XRef"), |_, _, _| Ok(None))?;
    let dict = &stream.dict.custom;

    let trailer = TrailerDict::from_dictionary(dict, offset)?;
    let w = widths(dict, offset)?;
    let runs = index_runs(dict, trailer.size, offset)?;
    let rows = stream.decoded_data()?;
    let row_len = w[0] + w[1] + w[2];

    let mut entries = Vec::new();
    let mut cursor = 0usize;
    for (first, count) in runs {
        if count > options.max_xref_entries {
            return Err(invalid(
                offset,
                format!("subsection of {} entries exceeds the limit of {}", count, options.max_xref_entries),
            ));
        }
        for n in 0..count {
            let Some(row) = rows.get(cursor..cursor + row_len) else {
                return Err(invalid(
                    offset,
                    format!("stream data ends inside subsection {} (row {} of {})", first, n, count),
                ));
            };
            cursor += row_len;
            let id = first.saturating_add(n);
            let entry_type = if w[0] == 0 { 1 } else { read_field(&row[..w[0]]) };
            let field2 = read_field(&row[w[0]..w[0] + w[1]]);
            let field3 = read_field(&row[w[0] + w[1]..]);
            let entry = match entry_type {
                0 => XRefEntry::free(id, field3 as u16, field2 as u32),
                1 => XRefEntry::normal(id, field3 as u16, field2 as usize),
                2 => XRefEntry::compressed(id, field2 as u32, field3 as usize),
                other => {
                    log::debug!("xref stream at {}: skipping object {} with entry type {}", offset, id, other);
                    continue;
                },
            };
            entries.push(entry);
        }
    }

    Ok(XRefSection {
        kind: XRefKind::Stream,
        offset,
        trailer,
        entries,
        stream_id,
    })
}

fn byte_width(max: u64) -> usize {
    let mut width = 1;
    while width < MAX_FIELD_WIDTH && max >> (8 * width) != 0 {
        width += 1;
    }
    width
}

fn row_fields(entry: &XRefEntry) -> (u64, u64, u64) {
    match entry.kind {
        XRefEntryKind::Free { next_free_id } => (0, u64::from(next_free_id), u64::from(entry.generation)),
        XRefEntryKind::Normal { byte_offset } => (1, byte_offset as u64, u64::from(entry.generation)),
        XRefEntryKind::Compressed {
            stream_id,
            index_in_stream,
        } => (2, u64::from(stream_id), index_in_stream as u64),
    }
}

fn push_field(out: &mut Vec<u8>, value: u64, width: usize) {
    out.extend_from_slice(&value.to_be_bytes()[MAX_FIELD_WIDTH - width..]);
}

/// Serialize a cross-reference stream object `id` listing `entries`.
///
/// `entries` must be sorted by id and include the stream's own entry. The
/// trailer keys are stored in the stream dictionary. Rows are PNG Up
/// filtered and flate compressed.
pub(crate) fn write_stream_section(id: ObjectId, entries: &[XRefEntry], trailer: &Dictionary) -> Result<Vec<u8>> {
    let fields: Vec<(u64, u64, u64)> = entries.iter().map(row_fields).collect();
    let w = [
        1,
        byte_width(fields.iter().map(|f| f.1).max().unwrap_or(0)),
        byte_width(fields.iter().map(|f| f.2).max().unwrap_or(0)),
    ];

    let mut rows = Vec::with_capacity(entries.len() * (w[0] + w[1] + w[2]));
    for (entry_type, field2, field3) in &fields {
        push_field(&mut rows, *entry_type, w[0]);
        push_field(&mut rows, *field2, w[1]);
        push_field(&mut rows, *field3, w[2]);
    }

    let params = DecodeParams {
        predictor: 12,
        columns: w[0] + w[1] + w[2],
        ..Default::default()
    };
    let filtered = decoders::encode_png_rows(&rows, &params, PngFilter::Up);
    let mut stream = PdfStream::new(Some("/XRef"), &[]);
    stream.set_raw_data(
        Bytes::from(decoders::encode_flate(&filtered)?),
        vec![Filter::FlateDecode.pdf_name().to_string()],
        vec![Some(params)],
    );

    let index: Vec<f64> = subsections(entries)
        .iter()
        .flat_map(|(first, run)| [f64::from(*first), run.len() as f64])
        .collect();
    let custom = &mut stream.dict.custom;
    for (key, value) in trailer {
        custom.insert(key.clone(), value.clone());
    }
    custom.insert("/W".into(), Object::numbers(&w.map(|v| v as f64)));
    custom.insert("/Index".into(), Object::numbers(&index));

    ObjectSerializer::new().serialize_indirect(id, &stream.to_object(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_stream(rows: &[u8], extra: &str) -> Vec<u8> {
        let mut data = format!("7 0 obj\n<< /Type /XRef /Size 6 /W [1 2 1] {} /Length {} >>\nstream\n", extra, rows.len())
            .into_bytes();
        data.extend_from_slice(rows);
        data.extend_from_slice(b"\nendstream\nendobj\n");
        data
    }

    #[test]
    fn test_parse_uncompressed_rows() {
        let rows = [
            0, 0, 0, 255, // 0: free, gen 255
            1, 0, 15, 0, // 1: offset 15
            2, 0, 7, 3, // 2: in stream 7 at index 3
            9, 0, 0, 0, // 3: unknown type, skipped
        ];
        let data = Bytes::from(build_stream(&rows, "/Index [0 4] /Root 1 0 R"));
        let section = parse_stream_section(&data, 0, &ParserOptions::strict()).unwrap();
        assert_eq!(section.kind, XRefKind::Stream);
        assert_eq!(section.stream_id, Some(7));
        assert_eq!(section.trailer.root, Some(ObjectId::new(1, 0)));
        assert_eq!(section.entries, vec![
            XRefEntry::free(0, 255, 0),
            XRefEntry::normal(1, 0, 15),
            XRefEntry::compressed(2, 7, 3),
        ]);
    }

    #[test]
    fn test_zero_type_width_defaults_to_normal() {
        let mut data = b"3 0 obj\n<< /Type /XRef /Size 2 /W [0 2 0] /Length 4 >>\nstream\n".to_vec();
        data.extend_from_slice(&[0, 10, 1, 0]);
        data.extend_from_slice(b"\nendstream\nendobj\n");
        let section = parse_stream_section(&Bytes::from(data), 0, &ParserOptions::strict()).unwrap();
        assert_eq!(section.entries, vec![XRefEntry::normal(0, 0, 10), XRefEntry::normal(1, 0, 256)]);
    }

    #[test]
    fn test_truncated_rows() {
        let data = Bytes::from(build_stream(&[1, 0, 15, 0, 1, 0], "/Index [0 2]"));
        let err = parse_stream_section(&data, 0, &ParserOptions::lenient()).unwrap_err();
        assert!(matches!(err, Error::InvalidXref { .. }));
    }

    #[test]
    fn test_missing_widths() {
        let data = Bytes::from_static(b"1 0 obj\n<< /Type /XRef /Size 1 /Length 0 >>\nstream\n\nendstream\nendobj\n");
        assert!(parse_stream_section(&data, 0, &ParserOptions::lenient()).is_err());
    }

    #[test]
    fn test_write_then_parse() {
        let entries = [
            XRefEntry::free(0, 65535, 0),
            XRefEntry::normal(3, 1, 70_000),
            XRefEntry::compressed(4, 9, 2),
            XRefEntry::normal(10, 0, 123),
        ];
        let mut trailer = Dictionary::new();
        trailer.insert("/Size".into(), Object::Integer(11));
        trailer.insert("/Prev".into(), Object::Integer(500));
        let bytes = write_stream_section(ObjectId::new(10, 0), &entries, &trailer).unwrap();
        assert!(bytes.starts_with(b"10 0 obj\r\n<< /Type /XRef"));

        let section = parse_stream_section(&Bytes::from(bytes), 0, &ParserOptions::strict()).unwrap();
        assert_eq!(section.entries, entries);
        assert_eq!(section.trailer.size, 11);
        assert_eq!(section.trailer.prev, Some(500));

        let info = ParseInfo::from_indirect_at(
            Bytes::from(write_stream_section(ObjectId::new(10, 0), &entries, &trailer).unwrap()),
            0,
        )
        .unwrap();
        let stream = PdfStream::parse(&info).unwrap();
        assert_eq!(stream.dict.custom.get("/W"), Some(&Object::numbers(&[1.0, 3.0, 2.0])));
        assert_eq!(stream.dict.custom.get("/Index"), Some(&Object::numbers(&[0.0, 1.0, 3.0, 2.0, 10.0, 1.0])));
    }

    #[test]
    fn test_byte_width() {
        assert_eq!(byte_width(0), 1);
        assert_eq!(byte_width(255), 1);
        assert_eq!(byte_width(256), 2);
        assert_eq!(byte_width(70_000), 3);
    }
}
