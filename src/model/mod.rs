//! Typed PDF object model.
//!
//! Every concrete dictionary or stream type implements [`PdfObject`]:
//! `parse` walks the dictionary body with the byte scanner, dispatching on
//! property names, and `to_object` rebuilds the generic [`Object`] that the
//! serializer writes. Unknown keys are kept in [`PdfDict::custom`].
//!
//! References are stored as plain [`ObjectId`]s. When a type needs the
//! referenced object it asks the [`ObjectResolver`] carried by its
//! [`ParseInfo`], which keeps this module independent of the xref engine.

pub mod annotations;
pub mod appearance;
pub mod catalog;
pub mod date;
pub mod dict;
pub mod object_stream;
pub mod page;
pub mod resources;
pub mod stream;

pub use annotations::{AnnotationDict, AnnotationDto, AnnotationKind, MarkupFields};
pub use appearance::{AppearanceDict, AppearanceEntry, StreamSlot};
pub use catalog::{CatalogDict, PageTreeDict, PageTreeNode};
pub use date::PdfDate;
pub use dict::PdfDict;
pub use object_stream::ObjectStream;
pub use page::{AnnotsRef, PageDict};
pub use resources::{FontDict, ImageStream, RefMap, ResourceDict, ResourcesRef, XFormStream, IDENTITY_MATRIX};
pub use stream::PdfStream;

use crate::crypt::CryptInfo;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectId};
use crate::parser_config::ParserOptions;
use crate::scanner::{ByteScanner, ParserBounds};
use crate::writer::ObjectSerializer;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Looks up where an indirect object lives.
///
/// Implemented by the document; the model only sees this callback.
pub trait ObjectResolver: Send + Sync {
    /// Parse info for object `id`, at its newest generation.
    fn parse_info(&self, id: u32) -> Result<ParseInfo>;
}

/// Everything a parser needs to read one object.
#[derive(Clone)]
pub struct ParseInfo {
    /// Buffer holding the object: the whole file, or a decoded object stream
    pub data: Bytes,
    /// Object location; the content range is the value to parse
    pub bounds: ParserBounds,
    /// Reference of the owning indirect object
    pub id: Option<ObjectId>,
    /// Object stream holding the object, if compressed
    pub stream_id: Option<u32>,
    /// Cryptors for strings and streams
    pub crypt_info: Option<CryptInfo>,
    /// Callback resolving other objects
    pub resolver: Option<Arc<dyn ObjectResolver>>,
    /// Limits and strictness
    pub options: ParserOptions,
}

impl fmt::Debug for ParseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseInfo")
            .field("len", &self.data.len())
            .field("bounds", &self.bounds)
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("crypt_info", &self.crypt_info)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl ParseInfo {
    /// Parse info for a value at `bounds`, with no resolver or cryptors.
    pub fn new(data: Bytes, bounds: ParserBounds) -> Self {
        Self {
            data,
            bounds,
            id: None,
            stream_id: None,
            crypt_info: None,
            resolver: None,
            options: ParserOptions::default(),
        }
    }

    /// Locate the indirect object whose header starts at `offset`.
    pub fn from_indirect_at(data: Bytes, offset: usize) -> Result<Self> {
        let scanner = ByteScanner::new(&data);
        let header = ObjectId::parse_header_at(&scanner, offset, true)
            .ok_or_else(|| Error::parse(offset, "expected indirect object header"))?;
        let bounds = scanner
            .get_indirect_object_bounds_at(header.start, false)
            .ok_or_else(|| Error::parse(offset, "unterminated indirect object"))?;
        let mut info = Self::new(data, bounds);
        info.id = Some(header.value);
        Ok(info)
    }

    /// Scanner over the buffer.
    pub fn scanner(&self) -> ByteScanner<'_> {
        ByteScanner::new(&self.data)
    }

    /// Same owner and capabilities, different location (inline values).
    pub fn with_bounds(&self, bounds: ParserBounds) -> Self {
        Self {
            bounds,
            ..self.clone()
        }
    }

    /// Raw bytes of the value range.
    pub fn content_bytes(&self) -> &[u8] {
        let (start, end) = self.bounds.content();
        ByteScanner::new(&self.data).slice(start, end)
    }

    /// Resolve another object through the injected callback.
    pub fn resolve(&self, id: u32) -> Result<ParseInfo> {
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| Error::InvalidPdf(format!("no resolver to look up object {}", id)))?;
        resolver.parse_info(id)
    }

    fn string_owner(&self) -> Option<(&CryptInfo, ObjectId)> {
        if self.stream_id.is_some() {
            return None;
        }
        Some((self.crypt_info.as_ref()?, self.id?))
    }

    /// Decrypt a string value read from this object.
    pub fn decrypt_string(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        match self.string_owner() {
            Some((crypt, owner)) => crypt.decrypt_string(&data, owner),
            None => Ok(data),
        }
    }

    /// Decrypt this object's stream payload.
    pub fn decrypt_stream(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.string_owner() {
            Some((crypt, owner)) => crypt.decrypt_stream(data, owner),
            None => Ok(data.to_vec()),
        }
    }

    /// Decrypt every string nested inside a generic value.
    pub fn decrypt_object(&self, obj: &mut Object) -> Result<()> {
        if self.string_owner().is_none() {
            return Ok(());
        }
        match obj {
            Object::String(bytes) => {
                *bytes = self.decrypt_string(std::mem::take(bytes))?;
            },
            Object::Array(items) => {
                for item in items {
                    self.decrypt_object(item)?;
                }
            },
            Object::Dictionary(dict) => {
                for value in dict.values_mut() {
                    self.decrypt_object(value)?;
                }
            },
            _ => {},
        }
        Ok(())
    }
}

/// Parse/serialize contract shared by every typed dictionary and stream.
pub trait PdfObject: Sized {
    /// Parse from the value range of `info`.
    fn parse(info: &ParseInfo) -> Result<Self>;

    /// Base dictionary state.
    fn dict(&self) -> &PdfDict;

    /// Mutable base dictionary state.
    fn dict_mut(&mut self) -> &mut PdfDict;

    /// Generic value written by the serializer.
    fn to_object(&self) -> Object;

    /// Serialized value (no indirect-object wrapper).
    fn to_bytes(&self, crypt: Option<&CryptInfo>) -> Result<Vec<u8>> {
        ObjectSerializer::new().serialize(&self.to_object(), self.dict().reference, crypt)
    }
}
