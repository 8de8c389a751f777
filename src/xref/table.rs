//! Classic cross-reference tables.
//!
//! ```text
//! xref
//! 0 3
//! 0000000000 65535 f\r\n
//! 0000000015 00000 n\r\n
//! 0000000079 00000 n\r\n
//! trailer
//! << /Size 3 /Root 1 0 R >>
//! ```
//!
//! Rows are written as exactly 20 bytes. On input the row tokens are read
//! whatever whitespace separates them.

use super::{subsections, TrailerDict, XRefEntry, XRefEntryKind, XRefKind, XRefSection};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser_config::ParserOptions;
use crate::scanner::{ByteScanner, SearchDirection, SearchOptions};
use crate::writer::ObjectSerializer;

struct Row {
    field: usize,
    generation: u16,
    in_use: bool,
    end: usize,
}

fn parse_row(s: &ByteScanner<'_>, start: usize) -> Option<Row> {
    let field = s.parse_integer_at(start, false)?;
    let generation = s.parse_integer_at(field.end + 1, true)?;
    let marker_at = s.skip_empty(generation.end + 1)?;
    let in_use = match s.byte_at(marker_at)? {
        b'n' => true,
        b'f' => false,
        _ => return None,
    };
    Some(Row {
        field: usize::try_from(field.value).ok()?,
        generation: u16::try_from(generation.value).ok()?,
        in_use,
        end: marker_at,
    })
}

fn invalid(offset: usize, reason: impl Into<String>) -> Error {
    Error::InvalidXref {
        offset,
        reason: reason.into(),
    }
}

/// Parse the table starting with the `xref` keyword at `offset`, and its trailer.
pub(crate) fn parse_table_section(data: &[u8], offset: usize, options: &ParserOptions) -> Result<XRefSection> {
    let s = ByteScanner::new(data);
    let bounds = s
        .get_xref_table_bounds_at(offset, false)
        .ok_or_else(|| invalid(offset, "xref table without trailer"))?;
    let (_, content_end) = bounds.content();
    let mut entries = Vec::new();
    let mut cursor = offset + 4;

    while let Some(header_at) = s.skip_empty(cursor).filter(|&i| i <= content_end) {
        let first = s
            .parse_integer_at(header_at, false)
            .ok_or_else(|| invalid(header_at, "expected subsection header"))?;
        let count = s
            .parse_integer_at(first.end + 1, true)
            .ok_or_else(|| invalid(header_at, "subsection header without count"))?;
        let first_id = u32::try_from(first.value).map_err(|_| invalid(header_at, "negative first object number"))?;
        let count_value = u32::try_from(count.value).map_err(|_| invalid(header_at, "negative entry count"))?;
        if count_value > options.max_xref_entries {
            return Err(invalid(
                header_at,
                format!("subsection of {} entries exceeds the limit of {}", count_value, options.max_xref_entries),
            ));
        }

        cursor = count.end + 1;
        for n in 0..count_value {
            let Some(row_at) = s.skip_empty(cursor).filter(|&i| i <= content_end) else {
                let err = invalid(cursor, format!("subsection {} ends after {} of {} rows", first_id, n, count_value));
                if options.tolerates(&err) {
                    break;
                }
                return Err(err);
            };
            let id = first_id.saturating_add(n);
            match parse_row(&s, row_at) {
                Some(row) => {
                    cursor = row.end + 1;
                    entries.push(if row.in_use {
                        XRefEntry::normal(id, row.generation, row.field)
                    } else {
                        XRefEntry::free(id, row.generation, u32::try_from(row.field).unwrap_or(0))
                    });
                },
                None => {
                    let err = invalid(row_at, format!("malformed row for object {}", id));
                    if !options.tolerates(&err) {
                        return Err(err);
                    }
                    cursor = s
                        .find_new_line_index(SearchDirection::Forward, row_at)
                        .unwrap_or(content_end + 1);
                },
            }
        }
    }

    let trailer_keyword = s
        .find_subarray_index(b"trailer", SearchOptions::keyword_from(bounds.end + 1))
        .ok_or_else(|| invalid(offset, "missing trailer keyword"))?;
    let dict_at = s
        .skip_empty(trailer_keyword.end + 1)
        .ok_or_else(|| invalid(trailer_keyword.start, "missing trailer dictionary"))?;
    let (trailer, _) =
        Object::parse_dict(&s, dict_at).ok_or_else(|| invalid(dict_at, "unreadable trailer dictionary"))?;

    Ok(XRefSection {
        kind: XRefKind::Table,
        offset,
        trailer: TrailerDict::from_dictionary(&trailer, offset)?,
        entries,
        stream_id: None,
    })
}

/// Serialize a table section and its trailer; `entries` must be sorted by id.
///
/// Compressed entries cannot be expressed in a table and are rejected.
pub(crate) fn write_table_section(entries: &[XRefEntry], trailer: &Dictionary) -> Result<Vec<u8>> {
    let mut out = b"xref\r\n".to_vec();
    for (first, run) in subsections(entries) {
        out.extend_from_slice(format!("{} {}\r\n", first, run.len()).as_bytes());
        for entry in run {
            let (field, marker) = match entry.kind {
                XRefEntryKind::Free { next_free_id } => (next_free_id as usize, 'f'),
                XRefEntryKind::Normal { byte_offset } => (byte_offset, 'n'),
                XRefEntryKind::Compressed { .. } => {
                    return Err(Error::ReferenceIntegrity(format!(
                        "object {} is compressed and cannot be listed in an xref table",
                        entry.id
                    )));
                },
            };
            out.extend_from_slice(format!("{:010} {:05} {}\r\n", field, entry.generation, marker).as_bytes());
        }
    }
    out.extend_from_slice(b"trailer\r\n");
    out.extend_from_slice(&ObjectSerializer::new().serialize(&Object::Dictionary(trailer.clone()), None, None)?);
    out.extend_from_slice(b"\r\n");
    Ok(out)
}
