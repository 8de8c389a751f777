//! Resource dictionaries and the XObjects and fonts they name.

use super::dict::{inline_dict_bounds, put_opt, read_int, read_matrix, read_name, read_rect, read_ref, read_usize};
use super::stream::PdfStream;
use super::{ParseInfo, PdfDict, PdfObject};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectId};
use crate::scanner::{ByteScanner, ValueType};
use indexmap::IndexMap;

/// Resource name (slash included) to object reference.
pub type RefMap = IndexMap<String, ObjectId>;

/// Identity transformation matrix.
pub const IDENTITY_MATRIX: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `/Resources` value: shared object or inline dictionary.
#[derive(Debug, Clone)]
pub enum ResourcesRef {
    /// Reference to a resource dictionary
    Indirect(ObjectId),
    /// Dictionary written inline
    Inline(Box<ResourceDict>),
}

impl ResourcesRef {
    /// Read the value at `i`; `None` when it is neither a reference nor a dictionary.
    pub(crate) fn parse_at(info: &ParseInfo, s: &ByteScanner<'_>, i: usize) -> Result<Option<(Self, usize)>> {
        match s.get_value_type_at(i, false) {
            ValueType::Ref => {
                let r = read_ref(s, i)?;
                Ok(Some((ResourcesRef::Indirect(r.value), r.end)))
            },
            ValueType::Dictionary => {
                let bounds = inline_dict_bounds(s, i)?;
                let inline = ResourceDict::parse(&info.with_bounds(bounds))?;
                Ok(Some((ResourcesRef::Inline(Box::new(inline)), bounds.end)))
            },
            _ => Ok(None),
        }
    }

    /// Generic value for serialization.
    pub fn to_object(&self) -> Object {
        match self {
            ResourcesRef::Indirect(r) => Object::Reference(*r),
            ResourcesRef::Inline(res) => res.to_object(),
        }
    }

    /// Every reference this value leads to without resolving anything.
    pub fn references(&self) -> Vec<ObjectId> {
        match self {
            ResourcesRef::Indirect(r) => vec![*r],
            ResourcesRef::Inline(res) => res.references(),
        }
    }
}

/// Resource dictionary.
///
/// Only the categories an annotation appearance needs are typed; the rest
/// (`/ColorSpace`, `/Pattern`, `/Shading`, `/ProcSet`...) stay custom.
/// Category dictionaries stored as separate objects are resolved and
/// written back inline.
#[derive(Debug, Clone, Default)]
pub struct ResourceDict {
    /// Base dictionary
    pub dict: PdfDict,
    /// `/Font`
    pub fonts: RefMap,
    /// `/XObject`
    pub xobjects: RefMap,
    /// `/ExtGState`
    pub ext_gstates: RefMap,
}

impl ResourceDict {
    /// Every object referenced by the typed categories.
    pub fn references(&self) -> Vec<ObjectId> {
        self.fonts
            .values()
            .chain(self.xobjects.values())
            .chain(self.ext_gstates.values())
            .copied()
            .collect()
    }

    /// Register an XObject under `name` and mark the dictionary edited.
    pub fn insert_xobject(&mut self, name: &str, reference: ObjectId) {
        let key = if name.starts_with('/') { name.to_string() } else { format!("/{}", name) };
        self.xobjects.insert(key, reference);
        self.dict.mark_edited();
    }
}

fn ref_map_object(map: &RefMap) -> Object {
    let dict: Dictionary = map
        .iter()
        .map(|(k, &v)| (k.clone(), Object::Reference(v)))
        .collect();
    Object::Dictionary(dict)
}

/// Parse a name-to-reference dictionary; non-reference values are skipped.
fn parse_ref_map(s: &ByteScanner<'_>, start: usize) -> Result<(RefMap, usize)> {
    let bounds = s
        .get_dict_bounds_at(start, true)
        .ok_or_else(|| Error::parse(start, "expected dictionary"))?;
    let (cs, ce) = bounds.content();
    let mut map = RefMap::new();
    let mut cursor = cs;
    while let Some(name_start) = s.skip_to_next_name(cursor, ce) {
        let name = read_name(s, name_start)?;
        let Some(value_start) = s.skip_empty(name.end + 1).filter(|&v| v <= ce) else {
            break;
        };
        match ObjectId::parse_ref_at(s, value_start, false) {
            Some(r) => {
                map.insert(name.value, r.value);
                cursor = r.end + 1;
            },
            None => {
                log::debug!("resource {} is not a reference, skipped", name.value);
                cursor = s.skip_value_at(value_start).unwrap_or(ce + 1);
            },
        }
    }
    Ok((map, bounds.end))
}

/// Read a category value: inline dictionary or reference to one.
fn read_ref_map(info: &ParseInfo, s: &ByteScanner<'_>, i: usize) -> Result<(RefMap, usize)> {
    if s.get_value_type_at(i, false) == ValueType::Ref {
        let r = read_ref(s, i)?;
        let target = info.resolve(r.value.id)?;
        let (start, _) = target.bounds.content();
        let (map, _) = parse_ref_map(&target.scanner(), start)?;
        return Ok((map, r.end));
    }
    parse_ref_map(s, i)
}

impl PdfObject for ResourceDict {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let mut res = Self::default();
        let mut fonts = RefMap::new();
        let mut xobjects = RefMap::new();
        let mut ext_gstates = RefMap::new();
        res.dict.parse_props(info, None, |s, name, i| {
            let target = match name {
                "/Font" => &mut fonts,
                "/XObject" => &mut xobjects,
                "/ExtGState" => &mut ext_gstates,
                _ => return Ok(None),
            };
            let (map, end) = read_ref_map(info, s, i)?;
            *target = map;
            Ok(Some(end + 1))
        })?;
        res.fonts = fonts;
        res.xobjects = xobjects;
        res.ext_gstates = ext_gstates;
        Ok(res)
    }

    fn dict(&self) -> &PdfDict {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    fn to_object(&self) -> Object {
        let mut dict = self.dict.begin_object();
        for (key, map) in [("/Font", &self.fonts), ("/XObject", &self.xobjects), ("/ExtGState", &self.ext_gstates)] {
            if !map.is_empty() {
                dict.insert(key.to_string(), ref_map_object(map));
            }
        }
        self.dict.finish_object(&mut dict);
        Object::Dictionary(dict)
    }
}

/// Font dictionary (`/Type /Font`). Glyph data is never interpreted.
#[derive(Debug, Clone, Default)]
pub struct FontDict {
    /// Base dictionary
    pub dict: PdfDict,
    /// `/Subtype` (`/Type1`, `/TrueType`, ...)
    pub subtype: Option<String>,
    /// `/BaseFont`
    pub base_font: Option<String>,
    /// `/Encoding` when given as a name
    pub encoding: Option<String>,
}

impl FontDict {
    /// Standard 14 font with WinAnsiEncoding.
    pub fn standard(base_font: &str) -> Self {
        Self {
            dict: PdfDict::new(Some("/Font")),
            subtype: Some("/Type1".to_string()),
            base_font: Some(format!("/{}", base_font.trim_start_matches('/'))),
            encoding: Some("/WinAnsiEncoding".to_string()),
        }
    }
}

impl PdfObject for FontDict {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let mut font = Self::default();
        let (mut subtype, mut base_font, mut encoding) = (None, None, None);
        font.dict.parse_props(info, Some("/Font"), |s, name, i| {
            let slot = match name {
                "/Subtype" => &mut subtype,
                "/BaseFont" => &mut base_font,
                "/Encoding" if s.get_value_type_at(i, false) == ValueType::Name => &mut encoding,
                _ => return Ok(None),
            };
            let value = read_name(s, i)?;
            *slot = Some(value.value);
            Ok(Some(value.end + 1))
        })?;
        font.subtype = subtype;
        font.base_font = base_font;
        font.encoding = encoding;
        Ok(font)
    }

    fn dict(&self) -> &PdfDict {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    fn to_object(&self) -> Object {
        let mut dict = self.dict.begin_object();
        put_opt(&mut dict, "/Subtype", self.subtype.as_deref().map(Object::name));
        put_opt(&mut dict, "/BaseFont", self.base_font.as_deref().map(Object::name));
        put_opt(&mut dict, "/Encoding", self.encoding.as_deref().map(Object::name));
        self.dict.finish_object(&mut dict);
        Object::Dictionary(dict)
    }
}

/// Form XObject (`/Subtype /Form`), used for appearance streams.
#[derive(Debug, Clone)]
pub struct XFormStream {
    /// Stream dictionary and payload
    pub stream: PdfStream,
    /// `/BBox` in form space
    pub bbox: [f64; 4],
    /// `/Matrix` from form space to user space
    pub matrix: [f64; 6],
    /// `/Resources`
    pub resources: Option<ResourcesRef>,
}

impl XFormStream {
    /// New form with FlateDecode content, identity matrix and no resources.
    pub fn new(bbox: [f64; 4], content: &[u8]) -> Result<Self> {
        let mut stream = PdfStream::flate(Some("/XObject"), content)?;
        stream.dict.mark_added();
        Ok(Self {
            stream,
            bbox,
            matrix: IDENTITY_MATRIX,
            resources: None,
        })
    }

    /// Decoded content stream.
    pub fn content(&self) -> Result<bytes::Bytes> {
        self.stream.decoded_data()
    }

    /// Replace the content stream.
    pub fn set_content(&mut self, content: &[u8]) -> Result<()> {
        self.stream.set_stream_data(content)
    }

    /// Set the bounding box and raise the dirty flag.
    pub fn set_bbox(&mut self, bbox: [f64; 4]) {
        self.bbox = bbox;
        self.stream.dict.mark_edited();
    }
}

impl PdfObject for XFormStream {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let mut subtype = None;
        let mut bbox = None;
        let mut matrix = IDENTITY_MATRIX;
        let mut resources = None;
        let stream = PdfStream::parse_with(info, Some("/XObject"), |s, name, i| match name {
            "/Subtype" => {
                let r = read_name(s, i)?;
                subtype = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/BBox" => {
                let r = read_rect(s, i)?;
                bbox = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/Matrix" => {
                let r = read_matrix(s, i)?;
                matrix = r.value;
                Ok(Some(r.end + 1))
            },
            "/Resources" => match ResourcesRef::parse_at(info, s, i)? {
                Some((value, end)) => {
                    resources = Some(value);
                    Ok(Some(end + 1))
                },
                None => Ok(None),
            },
            "/FormType" => Ok(Some(read_int(s, i)?.end + 1)),
            _ => Ok(None),
        })?;
        if let Some(found) = subtype.filter(|s| s != "/Form") {
            return Err(Error::InvalidObjectType {
                expected: "/Form".to_string(),
                found,
            });
        }
        let bbox = bbox.ok_or_else(|| Error::missing_key("/BBox", "Form XObject"))?;
        Ok(Self {
            stream,
            bbox,
            matrix,
            resources,
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
        dict.insert("/Subtype".to_string(), Object::name("Form"));
        dict.insert("/FormType".to_string(), Object::Integer(1));
        dict.insert("/BBox".to_string(), Object::numbers(&self.bbox));
        dict.insert("/Matrix".to_string(), Object::numbers(&self.matrix));
        put_opt(&mut dict, "/Resources", self.resources.as_ref().map(ResourcesRef::to_object));
        self.stream.finish_object(dict)
    }
}

/// Image XObject (`/Subtype /Image`). Samples are never decoded here.
#[derive(Debug, Clone)]
pub struct ImageStream {
    /// Stream dictionary and payload
    pub stream: PdfStream,
    /// `/Width` in samples
    pub width: usize,
    /// `/Height` in samples
    pub height: usize,
    /// `/BitsPerComponent`, absent for masks and JPX
    pub bits_per_component: Option<usize>,
    /// `/SMask` soft mask image
    pub smask: Option<ObjectId>,
}

impl PdfObject for ImageStream {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let (mut width, mut height, mut bits, mut smask) = (None, None, None, None);
        let stream = PdfStream::parse_with(info, Some("/XObject"), |s, name, i| match name {
            "/Subtype" => {
                let r = read_name(s, i)?;
                if r.value != "/Image" {
                    return Err(Error::InvalidObjectType {
                        expected: "/Image".to_string(),
                        found: r.value,
                    });
                }
                Ok(Some(r.end + 1))
            },
            "/Width" | "/Height" | "/BitsPerComponent" => {
                let r = read_usize(s, i)?;
                match name {
                    "/Width" => width = Some(r.value),
                    "/Height" => height = Some(r.value),
                    _ => bits = Some(r.value),
                }
                Ok(Some(r.end + 1))
            },
            "/SMask" => {
                let r = read_ref(s, i)?;
                smask = Some(r.value);
                Ok(Some(r.end + 1))
            },
            _ => Ok(None),
        })?;
        Ok(Self {
            stream,
            width: width.ok_or_else(|| Error::missing_key("/Width", "Image XObject"))?,
            height: height.ok_or_else(|| Error::missing_key("/Height", "Image XObject"))?,
            bits_per_component: bits,
            smask,
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
        dict.insert("/Subtype".to_string(), Object::name("Image"));
        dict.insert("/Width".to_string(), Object::Integer(self.width as i64));
        dict.insert("/Height".to_string(), Object::Integer(self.height as i64));
        put_opt(&mut dict, "/BitsPerComponent", self.bits_per_component.map(|b| b as i64));
        put_opt(&mut dict, "/SMask", self.smask);
        self.stream.finish_object(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectResolver;
    use bytes::Bytes;
    use std::sync::Arc;

    struct OneObject(Bytes);

    impl ObjectResolver for OneObject {
        fn parse_info(&self, _id: u32) -> Result<ParseInfo> {
            ParseInfo::from_indirect_at(self.0.clone(), 0)
        }
    }

    fn indirect(data: &'static [u8]) -> ParseInfo {
        ParseInfo::from_indirect_at(Bytes::from_static(data), 0).unwrap()
    }

    #[test]
    fn test_resource_dict_inline_maps() {
        let info = indirect(b"3 0 obj << /Font << /F1 4 0 R /F2 << /Type /Font >> >> /ProcSet [/PDF] >> endobj");
        let res = ResourceDict::parse(&info).unwrap();
        assert_eq!(res.fonts.len(), 1);
        assert_eq!(res.fonts["/F1"], ObjectId::new(4, 0));
        assert!(res.dict.custom.contains_key("/ProcSet"));
    }

    #[test]
    fn test_resource_dict_resolves_indirect_category() {
        let mut info = indirect(b"3 0 obj << /XObject 9 0 R >> endobj");
        info.resolver = Some(Arc::new(OneObject(Bytes::from_static(b"9 0 obj << /Im1 10 0 R >> endobj"))));
        let res = ResourceDict::parse(&info).unwrap();
        assert_eq!(res.xobjects["/Im1"], ObjectId::new(10, 0));
        assert_eq!(res.references(), vec![ObjectId::new(10, 0)]);
    }

    #[test]
    fn test_font_dict() {
        let info = indirect(b"4 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj");
        let font = FontDict::parse(&info).unwrap();
        assert_eq!(font.base_font.as_deref(), Some("/Helvetica"));
        assert_eq!(font.encoding, None);
        let standard = FontDict::standard("Helvetica");
        assert_eq!(standard.base_font, font.base_font);
    }

    #[test]
    fn test_xform_defaults_and_round_trip() {
        let form = XFormStream::new([0.0, 0.0, 20.0, 10.0], b"0 0 20 10 re S").unwrap();
        let obj = form.to_object();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict["/Subtype"], Object::Name("/Form".into()));
        assert_eq!(dict["/Matrix"], Object::numbers(&IDENTITY_MATRIX));

        let mut bytes = b"12 0 obj\r\n".to_vec();
        bytes.extend(crate::writer::ObjectSerializer::new().serialize(&obj, None, None).unwrap());
        bytes.extend_from_slice(b"\r\nendobj\r\n");
        let info = ParseInfo::from_indirect_at(Bytes::from(bytes), 0).unwrap();
        let parsed = XFormStream::parse(&info).unwrap();
        assert_eq!(parsed.bbox, [0.0, 0.0, 20.0, 10.0]);
        assert_eq!(&parsed.content().unwrap()[..], b"0 0 20 10 re S");
    }

    #[test]
    fn test_xform_requires_bbox() {
        let info = indirect(b"5 0 obj << /Subtype /Form /Length 0 >>\nstream\n\nendstream endobj");
        assert!(matches!(XFormStream::parse(&info), Err(Error::MissingKey { .. })));
    }

    #[test]
    fn test_image_stream() {
        let info = indirect(
            b"6 0 obj << /Type /XObject /Subtype /Image /Width 2 /Height 1 /BitsPerComponent 8 /SMask 7 0 R /Length 6 >>\nstream\nabcdef\nendstream endobj",
        );
        let image = ImageStream::parse(&info).unwrap();
        assert_eq!((image.width, image.height), (2, 1));
        assert_eq!(image.smask, Some(ObjectId::new(7, 0)));
    }
}
