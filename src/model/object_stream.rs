//! Object streams (`/Type /ObjStm`).
//!
//! The decoded payload starts with `N` pairs `objNum offset`; offsets are
//! relative to `/First`. Objects stored here are never encrypted on their
//! own and always have generation 0.

use super::dict::{read_ref, read_usize};
use super::stream::PdfStream;
use super::{ParseInfo, PdfDict, PdfObject};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectId};
use crate::scanner::{ByteScanner, ParserBounds, SearchDirection};

/// Compressed object container.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// Stream dictionary and payload
    pub stream: PdfStream,
    /// `/N`: number of objects
    pub count: usize,
    /// `/First`: offset of the first object in the decoded data
    pub first: usize,
    /// `/Extends`: another object stream this one extends
    pub extends: Option<ObjectId>,
}

impl ObjectStream {
    /// `(object number, absolute offset)` for every stored object, in order.
    pub fn object_offsets(&self) -> Result<Vec<(u32, usize)>> {
        let data = self.stream.decoded_data()?;
        let scanner = ByteScanner::new(&data);
        let mut offsets = Vec::with_capacity(self.count);
        let mut cursor = 0;
        for _ in 0..self.count {
            let id = scanner
                .parse_integer_at(cursor, true)
                .ok_or_else(|| Error::parse(cursor, "object stream header: expected object number"))?;
            let offset = scanner
                .parse_integer_at(id.end + 1, true)
                .ok_or_else(|| Error::parse(id.end + 1, "object stream header: expected offset"))?;
            let id_value =
                u32::try_from(id.value).map_err(|_| Error::parse(id.start, "negative object number"))?;
            let offset_value =
                usize::try_from(offset.value).map_err(|_| Error::parse(offset.start, "negative offset"))?;
            offsets.push((id_value, self.first + offset_value));
            cursor = offset.end + 1;
        }
        Ok(offsets)
    }

    /// Parse info for the object at `index` inside this stream.
    ///
    /// The returned info owns the decoded buffer; the caller attaches a
    /// resolver. `expected_id` guards against an index that points at the
    /// wrong object.
    pub fn parse_info_for(&self, index: usize, expected_id: u32) -> Result<ParseInfo> {
        let offsets = self.object_offsets()?;
        let &(id, start) = offsets
            .get(index)
            .ok_or_else(|| Error::ObjectNotFound(expected_id, 0))?;
        if id != expected_id {
            return Err(Error::InvalidXref {
                offset: index,
                reason: format!("object stream slot {} holds object {}, not {}", index, id, expected_id),
            });
        }
        let data = self.stream.decoded_data()?;
        let scanner = ByteScanner::new(&data);
        let end = offsets
            .get(index + 1)
            .map(|&(_, next)| next.saturating_sub(1))
            .unwrap_or(data.len().saturating_sub(1));
        let value_start = scanner
            .skip_empty(start)
            .filter(|&v| v <= end)
            .ok_or_else(|| Error::parse(start, "empty object stream slot"))?;
        let value_end = scanner
            .find_non_space_index(SearchDirection::Backward, end)
            .unwrap_or(end);

        let mut info = ParseInfo::new(data.clone(), ParserBounds::with_content(start, end, value_start, value_end));
        info.id = Some(ObjectId::new(id, 0));
        info.stream_id = self.stream.dict.reference.map(|r| r.id);
        Ok(info)
    }
}

impl PdfObject for ObjectStream {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let (mut count, mut first, mut extends) = (None, None, None);
        let stream = PdfStream::parse_with(info, Some("/ObjStm"), |s, name, i| match name {
            "/N" => {
                let r = read_usize(s, i)?;
                count = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/First" => {
                let r = read_usize(s, i)?;
                first = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/Extends" => {
                let r = read_ref(s, i)?;
                extends = Some(r.value);
                Ok(Some(r.end + 1))
            },
            _ => Ok(None),
        })?;
        if stream.dict.type_name.as_deref() != Some("/ObjStm") {
            return Err(Error::missing_key("/Type", "ObjStm"));
        }
        Ok(Self {
            stream,
            count: count.ok_or_else(|| Error::missing_key("/N", "ObjStm"))?,
            first: first.ok_or_else(|| Error::missing_key("/First", "ObjStm"))?,
            extends,
        })
    }

    fn dict(&self) -> &PdfDict {
        &self.stream.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.stream.dict
    }

    fn to_object(&self) -> Object {
        let mut dict = self.stream.dict.begin_object();
        dict.insert("/N".to_string(), Object::Integer(self.count as i64));
        dict.insert("/First".to_string(), Object::Integer(self.first as i64));
        if let Some(extends) = self.extends {
            dict.insert("/Extends".to_string(), Object::Reference(extends));
        }
        self.stream.finish_object(dict)
    }
}
