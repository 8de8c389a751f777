//! Cross-reference sections and the `/Prev` chain.
//!
//! Sections are read newest first, starting at the offset named by the last
//! `startxref` in the file. Each one is either a classic table (`xref`
//! keyword) or a cross-reference stream (an indirect object with `/W`). A
//! table whose trailer carries `/XRefStm` is a hybrid section: the stream's
//! entries come first and win over the table's for the same id.
//!
//! Folding the chain into one id -> location map is done by
//! [`ReferenceData`]: the first entry seen for an id is authoritative.

pub mod reference_data;
pub mod stream;
pub mod table;

pub use reference_data::{FreeReference, ReferenceData, ReferenceDataChange, UsedLocation, UsedReference};

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectId};
use crate::parser_config::ParserOptions;
use crate::scanner::{ByteScanner, SearchDirection, SearchOptions};
use std::collections::HashSet;

/// Generation of object 0 and of entries that can never be reused.
pub const MAX_GENERATION: u16 = 65535;

/// Where an entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryKind {
    /// Free slot, linked to the next free id (0 ends the chain)
    Free {
        /// Next free object number
        next_free_id: u32,
    },
    /// Object stored uncompressed at a byte offset
    Normal {
        /// Offset of the `id gen obj` header
        byte_offset: usize,
    },
    /// Object stored inside an object stream
    Compressed {
        /// Object number of the object stream
        stream_id: u32,
        /// Slot inside the object stream
        index_in_stream: usize,
    },
}

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Object number
    pub id: u32,
    /// Generation (always 0 for compressed entries)
    pub generation: u16,
    /// Location
    pub kind: XRefEntryKind,
}

impl XRefEntry {
    /// Free entry.
    pub fn free(id: u32, generation: u16, next_free_id: u32) -> Self {
        Self {
            id,
            generation,
            kind: XRefEntryKind::Free { next_free_id },
        }
    }

    /// Uncompressed object at `byte_offset`.
    pub fn normal(id: u32, generation: u16, byte_offset: usize) -> Self {
        Self {
            id,
            generation,
            kind: XRefEntryKind::Normal { byte_offset },
        }
    }

    /// Object inside object stream `stream_id`.
    pub fn compressed(id: u32, stream_id: u32, index_in_stream: usize) -> Self {
        Self {
            id,
            generation: 0,
            kind: XRefEntryKind::Compressed {
                stream_id,
                index_in_stream,
            },
        }
    }

    /// Whether the entry marks a free slot.
    pub fn is_free(&self) -> bool {
        matches!(self.kind, XRefEntryKind::Free { .. })
    }
}

/// Physical form of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum XRefKind {
    /// `xref` table followed by `trailer`
    Table,
    /// Cross-reference stream object
    Stream,
}

/// Trailer entries the engine uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrailerDict {
    /// `/Size`: one more than the highest object number
    pub size: u32,
    /// `/Root`: document catalog
    pub root: Option<ObjectId>,
    /// `/Prev`: offset of the previous section
    pub prev: Option<usize>,
    /// `/Info`
    pub info: Option<ObjectId>,
    /// `/Encrypt`
    pub encrypt: Option<ObjectId>,
    /// `/ID`: two byte strings
    pub id: Option<[Vec<u8>; 2]>,
    /// `/XRefStm`: stream half of a hybrid section
    pub xref_stm: Option<usize>,
}

impl TrailerDict {
    /// Read from a trailer or cross-reference stream dictionary.
    pub fn from_dictionary(dict: &Dictionary, offset: usize) -> Result<Self> {
        let size = dict
            .get("/Size")
            .and_then(Object::as_integer)
            .and_then(|s| u32::try_from(s).ok())
            .ok_or_else(|| Error::InvalidXref {
                offset,
                reason: "trailer without a valid /Size".to_string(),
            })?;
        let offset_of = |key: &str| {
            dict.get(key)
                .and_then(Object::as_integer)
                .and_then(|v| usize::try_from(v).ok())
                .filter(|&v| v > 0)
        };
        let id = dict.get("/ID").and_then(Object::as_array).and_then(|items| match items.as_slice() {
            [a, b] => Some([a.as_string()?.to_vec(), b.as_string()?.to_vec()]),
            _ => None,
        });
        Ok(Self {
            size,
            root: dict.get("/Root").and_then(Object::as_reference),
            prev: offset_of("/Prev"),
            info: dict.get("/Info").and_then(Object::as_reference),
            encrypt: dict.get("/Encrypt").and_then(Object::as_reference),
            id,
            xref_stm: offset_of("/XRefStm"),
        })
    }

    /// Entries for a new trailer: `/Size`, `/Root`, `/Prev`, and the
    /// carried-over `/Info`, `/Encrypt` and `/ID`.
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("/Size".to_string(), Object::Integer(i64::from(self.size)));
        if let Some(root) = self.root {
            dict.insert("/Root".to_string(), Object::Reference(root));
        }
        if let Some(prev) = self.prev {
            dict.insert("/Prev".to_string(), Object::Integer(prev as i64));
        }
        if let Some(info) = self.info {
            dict.insert("/Info".to_string(), Object::Reference(info));
        }
        if let Some(encrypt) = self.encrypt {
            dict.insert("/Encrypt".to_string(), Object::Reference(encrypt));
        }
        if let Some([first, second]) = &self.id {
            dict.insert(
                "/ID".to_string(),
                Object::Array(vec![Object::String(first.clone()), Object::String(second.clone())]),
            );
        }
        dict
    }
}

/// One section of the chain.
#[derive(Debug, Clone)]
pub struct XRefSection {
    /// Table or stream
    pub kind: XRefKind,
    /// Offset the section was found at
    pub offset: usize,
    /// Trailer (the stream dictionary for stream sections)
    pub trailer: TrailerDict,
    /// Entries in precedence order
    pub entries: Vec<XRefEntry>,
    /// Object number of the stream, for stream sections
    pub stream_id: Option<u32>,
}

/// Offset named by the last `startxref` in the buffer.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let scanner = ByteScanner::new(data);
    let keyword = scanner
        .find_subarray_index(
            b"startxref",
            SearchOptions {
                direction: SearchDirection::Backward,
                closed_only: true,
                ..Default::default()
            },
        )
        .ok_or_else(|| Error::InvalidXref {
            offset: data.len(),
            reason: "startxref not found".to_string(),
        })?;
    let offset = scanner
        .parse_integer_at(keyword.end + 1, true)
        .and_then(|r| usize::try_from(r.value).ok())
        .ok_or_else(|| Error::InvalidXref {
            offset: keyword.start,
            reason: "startxref without an offset".to_string(),
        })?;
    if offset >= data.len() {
        return Err(Error::InvalidXref {
            offset: keyword.start,
            reason: format!("startxref {} points past the end of the file", offset),
        });
    }
    Ok(offset)
}

/// Parse the section at `offset`, table or stream.
pub fn parse_section(data: &bytes::Bytes, offset: usize, options: &ParserOptions) -> Result<XRefSection> {
    let scanner = ByteScanner::new(data);
    let start = scanner.skip_empty(offset).ok_or_else(|| Error::InvalidXref {
        offset,
        reason: "offset past the end of the file".to_string(),
    })?;
    if data[start..].starts_with(b"xref") {
        let mut section = table::parse_table_section(data, start, options)?;
        if let Some(stm_offset) = section.trailer.xref_stm {
            log::debug!("hybrid section at {}: /XRefStm {}", start, stm_offset);
            match stream::parse_stream_section(data, stm_offset, options) {
                Ok(hidden) => {
                    let mut entries = hidden.entries;
                    entries.append(&mut section.entries);
                    section.entries = entries;
                },
                Err(e) if options.tolerates(&e) => {},
                Err(e) => return Err(e),
            }
        }
        Ok(section)
    } else if ObjectId::parse_header_at(&scanner, start, false).is_some() {
        stream::parse_stream_section(data, start, options)
    } else {
        Err(Error::InvalidXref {
            offset,
            reason: "neither an xref table nor an xref stream".to_string(),
        })
    }
}

/// Every section reachable through `/Prev`, newest first.
#[derive(Debug, Clone, Default)]
pub struct XRefChain {
    /// Sections, newest first
    pub sections: Vec<XRefSection>,
}

impl XRefChain {
    /// Locate `startxref` and walk the chain.
    pub fn parse(data: &bytes::Bytes, options: &ParserOptions) -> Result<Self> {
        let start = find_startxref(data)?;
        Self::parse_from(data, start, options)
    }

    /// Walk the chain from the section at `start`.
    ///
    /// The first section is mandatory. An older section that cannot be read
    /// ends the walk when the options are lenient.
    pub fn parse_from(data: &bytes::Bytes, start: usize, options: &ParserOptions) -> Result<Self> {
        let mut sections: Vec<XRefSection> = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(start);

        while let Some(offset) = next {
            if !seen.insert(offset) {
                log::warn!("xref /Prev loop back to offset {}, stopping", offset);
                break;
            }
            if sections.len() >= options.max_prev_chain_depth as usize {
                let err = Error::InvalidXref {
                    offset,
                    reason: format!("/Prev chain longer than {}", options.max_prev_chain_depth),
                };
                if options.tolerates(&err) {
                    break;
                }
                return Err(err);
            }
            match parse_section(data, offset, options) {
                Ok(section) => {
                    log::debug!(
                        "xref section at {}: {:?}, {} entries",
                        offset,
                        section.kind,
                        section.entries.len()
                    );
                    next = section.trailer.prev;
                    sections.push(section);
                },
                Err(e) if sections.is_empty() => return Err(e),
                Err(e) if options.tolerates(&e) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(Self { sections })
    }

    /// Newest section.
    pub fn newest(&self) -> Option<&XRefSection> {
        self.sections.first()
    }

    /// Trailer of the newest section.
    pub fn trailer(&self) -> Option<&TrailerDict> {
        self.newest().map(|s| &s.trailer)
    }

    /// Form of the newest section; an update mirrors it.
    pub fn kind(&self) -> XRefKind {
        self.newest().map_or(XRefKind::Table, |s| s.kind)
    }

    /// All entries in precedence order.
    pub fn entries(&self) -> impl Iterator<Item = &XRefEntry> {
        self.sections.iter().flat_map(|s| s.entries.iter())
    }

    /// `/Root`, taken from the newest trailer that has one.
    pub fn root(&self) -> Option<ObjectId> {
        self.sections.iter().find_map(|s| s.trailer.root)
    }

    /// Largest `/Size` across the chain.
    pub fn size(&self) -> u32 {
        self.sections.iter().map(|s| s.trailer.size).max().unwrap_or(0)
    }
}

/// Split entries sorted by id into runs of consecutive ids.
pub(crate) fn subsections(entries: &[XRefEntry]) -> Vec<(u32, &[XRefEntry])> {
    let mut runs = Vec::new();
    let mut run_start = 0;
    for i in 1..=entries.len() {
        let breaks = i == entries.len() || entries[i].id != entries[i - 1].id + 1;
        if breaks {
            runs.push((entries[run_start].id, &entries[run_start..i]));
            run_start = i;
        }
    }
    runs
}
