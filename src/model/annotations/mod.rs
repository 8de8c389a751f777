//! Annotation dictionaries (`/Type /Annot`).
//!
//! [`AnnotationDict`] carries the entries every annotation shares plus a
//! closed [`AnnotationKind`] holding the per-subtype fields. Subtypes without
//! a dedicated variant parse as [`AnnotationKind::Unknown`] and keep their
//! raw bytes, so nothing is dropped on a round trip.
//!
//! Mutators raise the dirty flag and refresh `/M`; the incremental writer
//! only re-emits annotations that are edited, added or deleted.

pub mod appearance_builder;
pub mod dto;
pub mod types;

pub use appearance_builder::AppearanceBuilder;
pub use dto::AnnotationDto;
pub use types::{
    AnnotationBorderStyle, AnnotationColor, AnnotationFlags, AnnotationSubtype, BorderStyleType,
    LineEndingStyle, TextAnnotationIcon, TextMarkupKind,
};

use super::appearance::AppearanceDict;
use super::date::PdfDate;
use super::dict::{
    inline_dict_bounds, peek_name, put_opt, read_bool, read_int, read_name, read_names, read_number,
    read_numbers, read_object, read_rect, read_ref, read_text,
};
use super::{ParseInfo, PdfDict, PdfObject};
use crate::error::{Error, Result};
use crate::object::{encode_text_string, Dictionary, Object, ObjectId};
use crate::scanner::{ByteScanner, ValueType};
use bytes::Bytes;

fn text_object(value: &str) -> Object {
    Object::String(encode_text_string(value))
}

fn date_object(value: &PdfDate) -> Object {
    Object::String(value.to_pdf_string().into_bytes())
}

fn numbers_of(value: &Object) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Object::as_number).collect()
}

/// Entries shared by markup annotations (ISO 32000-1, table 170).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkupFields {
    /// `/T`: author
    pub author: Option<String>,
    /// `/CreationDate`
    pub creation_date: Option<PdfDate>,
    /// `/Subj`
    pub subject: Option<String>,
    /// `/CA`: constant opacity
    pub opacity: Option<f64>,
    /// `/Popup`
    pub popup: Option<ObjectId>,
    /// `/IRT`: annotation this one replies to
    pub in_reply_to: Option<ObjectId>,
}

impl MarkupFields {
    fn parse_prop(
        &mut self,
        info: &ParseInfo,
        s: &ByteScanner<'_>,
        name: &str,
        i: usize,
    ) -> Result<Option<usize>> {
        match name {
            "/T" => {
                let r = read_text(info, s, i)?;
                self.author = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/Subj" => {
                let r = read_text(info, s, i)?;
                self.subject = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/CreationDate" => {
                let r = read_text(info, s, i)?;
                match PdfDate::parse(&r.value) {
                    Ok(date) => {
                        self.creation_date = Some(date);
                        Ok(Some(r.end + 1))
                    },
                    Err(_) => Ok(None),
                }
            },
            "/CA" => {
                let r = read_number(s, i)?;
                self.opacity = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/Popup" => {
                let r = read_ref(s, i)?;
                self.popup = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/IRT" => {
                let r = read_ref(s, i)?;
                self.in_reply_to = Some(r.value);
                Ok(Some(r.end + 1))
            },
            _ => Ok(None),
        }
    }

    fn write(&self, dict: &mut Dictionary) {
        put_opt(dict, "/T", self.author.as_deref().map(text_object));
        put_opt(dict, "/CreationDate", self.creation_date.as_ref().map(date_object));
        put_opt(dict, "/Subj", self.subject.as_deref().map(text_object));
        put_opt(dict, "/CA", self.opacity);
        put_opt(dict, "/Popup", self.popup);
        put_opt(dict, "/IRT", self.in_reply_to);
    }
}

/// Per-subtype fields.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    /// Sticky note
    Text {
        /// `/Name`
        icon: TextAnnotationIcon,
        /// `/Open`
        open: bool,
    },
    /// Text drawn on the page
    FreeText {
        /// `/DA`: default appearance string
        default_appearance: Option<String>,
        /// `/Q`: 0 left, 1 centered, 2 right
        justification: i64,
    },
    /// Straight line
    Line {
        /// `/L`: `x1 y1 x2 y2`
        line: [f64; 4],
        /// `/LE`
        endings: [LineEndingStyle; 2],
        /// `/IC`: fill for closed line endings
        interior: AnnotationColor,
    },
    /// Rectangle
    Square {
        /// `/IC`
        interior: AnnotationColor,
    },
    /// Ellipse
    Circle {
        /// `/IC`
        interior: AnnotationColor,
    },
    /// Closed polygon
    Polygon {
        /// `/Vertices`: `x0 y0 x1 y1 ...`
        vertices: Vec<f64>,
        /// `/IC`
        interior: AnnotationColor,
    },
    /// Open polyline
    PolyLine {
        /// `/Vertices`
        vertices: Vec<f64>,
        /// `/LE`
        endings: [LineEndingStyle; 2],
    },
    /// Freehand strokes
    Ink {
        /// `/InkList`: one point list per stroke
        ink_list: Vec<Vec<f64>>,
    },
    /// Highlight, underline, squiggly or strikeout
    TextMarkup {
        /// Which of the four
        kind: TextMarkupKind,
        /// `/QuadPoints`: eight numbers per quadrilateral
        quad_points: Vec<f64>,
    },
    /// Rubber stamp
    Stamp {
        /// `/Name`: stamp icon, slash included
        name: Option<String>,
    },
    /// Popup window of a markup annotation
    Popup {
        /// `/Parent`
        parent: Option<ObjectId>,
        /// `/Open`
        open: bool,
    },
    /// Form field widget; all field entries stay in the custom map
    Widget,
    /// Any other subtype
    Unknown {
        /// `/Subtype` value, slash included
        subtype: String,
        /// Source bytes of the dictionary
        raw: Bytes,
    },
}

impl AnnotationKind {
    fn empty(subtype: AnnotationSubtype, subtype_name: &str, raw: Bytes) -> Self {
        match subtype {
            AnnotationSubtype::Text => Self::Text {
                icon: TextAnnotationIcon::default(),
                open: false,
            },
            AnnotationSubtype::FreeText => Self::FreeText {
                default_appearance: None,
                justification: 0,
            },
            AnnotationSubtype::Line => Self::Line {
                line: [0.0; 4],
                endings: [LineEndingStyle::None; 2],
                interior: AnnotationColor::None,
            },
            AnnotationSubtype::Square => Self::Square {
                interior: AnnotationColor::None,
            },
            AnnotationSubtype::Circle => Self::Circle {
                interior: AnnotationColor::None,
            },
            AnnotationSubtype::Polygon => Self::Polygon {
                vertices: Vec::new(),
                interior: AnnotationColor::None,
            },
            AnnotationSubtype::PolyLine => Self::PolyLine {
                vertices: Vec::new(),
                endings: [LineEndingStyle::None; 2],
            },
            AnnotationSubtype::Ink => Self::Ink { ink_list: Vec::new() },
            AnnotationSubtype::Highlight
            | AnnotationSubtype::Underline
            | AnnotationSubtype::Squiggly
            | AnnotationSubtype::StrikeOut => Self::TextMarkup {
                kind: TextMarkupKind::from_subtype(subtype).unwrap_or(TextMarkupKind::Highlight),
                quad_points: Vec::new(),
            },
            AnnotationSubtype::Stamp => Self::Stamp { name: None },
            AnnotationSubtype::Popup => Self::Popup {
                parent: None,
                open: false,
            },
            AnnotationSubtype::Widget => Self::Widget,
            AnnotationSubtype::Unknown => Self::Unknown {
                subtype: subtype_name.to_string(),
                raw,
            },
        }
    }

    /// Subtype of this kind.
    pub fn subtype(&self) -> AnnotationSubtype {
        match self {
            Self::Text { .. } => AnnotationSubtype::Text,
            Self::FreeText { .. } => AnnotationSubtype::FreeText,
            Self::Line { .. } => AnnotationSubtype::Line,
            Self::Square { .. } => AnnotationSubtype::Square,
            Self::Circle { .. } => AnnotationSubtype::Circle,
            Self::Polygon { .. } => AnnotationSubtype::Polygon,
            Self::PolyLine { .. } => AnnotationSubtype::PolyLine,
            Self::Ink { .. } => AnnotationSubtype::Ink,
            Self::TextMarkup { kind, .. } => kind.subtype(),
            Self::Stamp { .. } => AnnotationSubtype::Stamp,
            Self::Popup { .. } => AnnotationSubtype::Popup,
            Self::Widget => AnnotationSubtype::Widget,
            Self::Unknown { .. } => AnnotationSubtype::Unknown,
        }
    }

    /// Key without which the subtype cannot be parsed.
    fn required_key(&self) -> Option<&'static str> {
        match self {
            Self::Line { .. } => Some("/L"),
            Self::Polygon { .. } | Self::PolyLine { .. } => Some("/Vertices"),
            Self::Ink { .. } => Some("/InkList"),
            Self::TextMarkup { .. } => Some("/QuadPoints"),
            _ => None,
        }
    }

    fn parse_prop(
        &mut self,
        info: &ParseInfo,
        s: &ByteScanner<'_>,
        name: &str,
        i: usize,
    ) -> Result<Option<usize>> {
        match (self, name) {
            (Self::Text { icon, .. }, "/Name") => {
                let r = read_name(s, i)?;
                *icon = TextAnnotationIcon::from_pdf_name(&r.value);
                Ok(Some(r.end + 1))
            },
            (Self::Text { open, .. } | Self::Popup { open, .. }, "/Open") => {
                let r = read_bool(s, i)?;
                *open = r.value;
                Ok(Some(r.end + 1))
            },
            (Self::FreeText { default_appearance, .. }, "/DA") => {
                let r = read_text(info, s, i)?;
                *default_appearance = Some(r.value);
                Ok(Some(r.end + 1))
            },
            (Self::FreeText { justification, .. }, "/Q") => {
                let r = read_int(s, i)?;
                *justification = r.value;
                Ok(Some(r.end + 1))
            },
            (Self::Line { line, .. }, "/L") => {
                let r = read_numbers(s, i)?;
                *line = r
                    .value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::parse(i, "/L needs four numbers"))?;
                Ok(Some(r.end + 1))
            },
            (Self::Line { endings, .. } | Self::PolyLine { endings, .. }, "/LE") => {
                let r = read_names(s, i)?;
                for (slot, name) in endings.iter_mut().zip(&r.value) {
                    *slot = LineEndingStyle::from_pdf_name(name);
                }
                Ok(Some(r.end + 1))
            },
            (
                Self::Line { interior, .. }
                | Self::Square { interior }
                | Self::Circle { interior }
                | Self::Polygon { interior, .. },
                "/IC",
            ) => {
                let r = read_numbers(s, i)?;
                *interior = AnnotationColor::from_array(&r.value);
                Ok(Some(r.end + 1))
            },
            (Self::Polygon { vertices, .. } | Self::PolyLine { vertices, .. }, "/Vertices") => {
                let r = read_numbers(s, i)?;
                *vertices = r.value;
                Ok(Some(r.end + 1))
            },
            (Self::Ink { ink_list }, "/InkList") => {
                let r = read_object(info, s, i)?;
                let strokes = r
                    .value
                    .as_array()
                    .and_then(|paths| paths.iter().map(numbers_of).collect::<Option<Vec<_>>>())
                    .ok_or_else(|| Error::parse(i, "/InkList must be an array of number arrays"))?;
                *ink_list = strokes;
                Ok(Some(r.end + 1))
            },
            (Self::TextMarkup { quad_points, .. }, "/QuadPoints") => {
                let r = read_numbers(s, i)?;
                if r.value.len() % 8 != 0 {
                    return Err(Error::parse(i, "/QuadPoints length must be a multiple of 8"));
                }
                *quad_points = r.value;
                Ok(Some(r.end + 1))
            },
            (Self::Stamp { name }, "/Name") => {
                let r = read_name(s, i)?;
                *name = Some(r.value);
                Ok(Some(r.end + 1))
            },
            (Self::Popup { parent, .. }, "/Parent") => {
                let r = read_ref(s, i)?;
                *parent = Some(r.value);
                Ok(Some(r.end + 1))
            },
            _ => Ok(None),
        }
    }

    fn write(&self, dict: &mut Dictionary) {
        let endings_object = |endings: &[LineEndingStyle; 2]| {
            Object::Array(endings.iter().map(|e| Object::name(e.pdf_name())).collect())
        };
        let color_object = |color: &AnnotationColor| color.to_array().map(|c| Object::numbers(&c));
        match self {
            Self::Text { icon, open } => {
                dict.insert("/Name".to_string(), Object::name(icon.pdf_name()));
                dict.insert("/Open".to_string(), Object::Boolean(*open));
            },
            Self::FreeText {
                default_appearance,
                justification,
            } => {
                put_opt(dict, "/DA", default_appearance.as_deref().map(text_object));
                dict.insert("/Q".to_string(), Object::Integer(*justification));
            },
            Self::Line {
                line,
                endings,
                interior,
            } => {
                dict.insert("/L".to_string(), Object::numbers(line));
                if endings.iter().any(|e| *e != LineEndingStyle::None) {
                    dict.insert("/LE".to_string(), endings_object(endings));
                }
                put_opt(dict, "/IC", color_object(interior));
            },
            Self::Square { interior } | Self::Circle { interior } => {
                put_opt(dict, "/IC", color_object(interior));
            },
            Self::Polygon { vertices, interior } => {
                dict.insert("/Vertices".to_string(), Object::numbers(vertices));
                put_opt(dict, "/IC", color_object(interior));
            },
            Self::PolyLine { vertices, endings } => {
                dict.insert("/Vertices".to_string(), Object::numbers(vertices));
                if endings.iter().any(|e| *e != LineEndingStyle::None) {
                    dict.insert("/LE".to_string(), endings_object(endings));
                }
            },
            Self::Ink { ink_list } => {
                let strokes = ink_list.iter().map(|stroke| Object::numbers(stroke)).collect();
                dict.insert("/InkList".to_string(), Object::Array(strokes));
            },
            Self::TextMarkup { quad_points, .. } => {
                dict.insert("/QuadPoints".to_string(), Object::numbers(quad_points));
            },
            Self::Stamp { name } => {
                put_opt(dict, "/Name", name.as_deref().map(Object::name));
            },
            Self::Popup { parent, open } => {
                put_opt(dict, "/Parent", *parent);
                dict.insert("/Open".to_string(), Object::Boolean(*open));
            },
            Self::Widget | Self::Unknown { .. } => {},
        }
    }
}

/// Annotation dictionary.
#[derive(Debug, Clone)]
pub struct AnnotationDict {
    /// Base dictionary
    pub dict: PdfDict,
    rect: [f64; 4],
    contents: Option<String>,
    uuid: String,
    modified: Option<PdfDate>,
    flags: AnnotationFlags,
    page: Option<ObjectId>,
    border: Option<AnnotationBorderStyle>,
    color: AnnotationColor,
    appearance: Option<AppearanceDict>,
    appearance_ref: Option<ObjectId>,
    appearance_state: Option<String>,
    markup: Option<MarkupFields>,
    kind: AnnotationKind,
}

impl AnnotationDict {
    /// New annotation with a fresh `/NM`, printable, dated now.
    pub fn new(kind: AnnotationKind, rect: [f64; 4]) -> Self {
        let now = PdfDate::now();
        let markup = kind.subtype().is_markup().then(|| MarkupFields {
            creation_date: Some(now),
            ..Default::default()
        });
        let mut dict = PdfDict::new(Some("/Annot"));
        dict.mark_added();
        Self {
            dict,
            rect,
            contents: None,
            uuid: uuid::Uuid::new_v4().to_string(),
            modified: Some(now),
            flags: AnnotationFlags::printable(),
            page: None,
            border: None,
            color: AnnotationColor::None,
            appearance: None,
            appearance_ref: None,
            appearance_state: None,
            markup,
            kind,
        }
    }

    /// Subtype.
    pub fn subtype(&self) -> AnnotationSubtype {
        self.kind.subtype()
    }

    /// `/Subtype` value as written, slash included.
    pub fn subtype_name(&self) -> String {
        match &self.kind {
            AnnotationKind::Unknown { subtype, .. } => subtype.clone(),
            other => format!("/{}", other.subtype().pdf_name()),
        }
    }

    /// `/NM`, generated when the source had none.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// `/Rect`, normalized.
    pub fn rect(&self) -> [f64; 4] {
        self.rect
    }

    /// `/Contents`
    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }

    /// `/M`
    pub fn modified(&self) -> Option<PdfDate> {
        self.modified
    }

    /// `/F`
    pub fn flags(&self) -> AnnotationFlags {
        self.flags
    }

    /// `/P`: page holding the annotation
    pub fn page(&self) -> Option<ObjectId> {
        self.page
    }

    /// `/BS`
    pub fn border(&self) -> Option<&AnnotationBorderStyle> {
        self.border.as_ref()
    }

    /// `/C`
    pub fn color(&self) -> &AnnotationColor {
        &self.color
    }

    /// Inline `/AP` dictionary.
    pub fn appearance(&self) -> Option<&AppearanceDict> {
        self.appearance.as_ref()
    }

    /// `/AP` given as a reference to a separate dictionary.
    pub fn appearance_ref(&self) -> Option<ObjectId> {
        self.appearance_ref
    }

    /// Inline `/AP` for the writer to assign references to new streams.
    pub(crate) fn appearance_mut(&mut self) -> Option<&mut AppearanceDict> {
        self.appearance.as_mut()
    }

    /// Markup entries; `None` for popups, widgets and unknown subtypes.
    pub fn markup(&self) -> Option<&MarkupFields> {
        self.markup.as_ref()
    }

    /// Per-subtype fields.
    pub fn kind(&self) -> &AnnotationKind {
        &self.kind
    }

    fn touch(&mut self) {
        self.modified = Some(PdfDate::now());
        self.dict.mark_edited();
    }

    /// Mutable per-subtype fields; raises the dirty flag.
    pub fn kind_mut(&mut self) -> &mut AnnotationKind {
        self.touch();
        &mut self.kind
    }

    /// Set `/Rect`.
    pub fn set_rect(&mut self, rect: [f64; 4]) {
        self.rect = [rect[0].min(rect[2]), rect[1].min(rect[3]), rect[0].max(rect[2]), rect[1].max(rect[3])];
        self.touch();
    }

    /// Set or clear `/Contents`.
    pub fn set_contents(&mut self, contents: Option<String>) {
        self.contents = contents;
        self.touch();
    }

    /// Set `/C`.
    pub fn set_color(&mut self, color: AnnotationColor) {
        self.color = color;
        self.touch();
    }

    /// Set `/F`.
    pub fn set_flags(&mut self, flags: AnnotationFlags) {
        self.flags = flags;
        self.touch();
    }

    /// Set or clear `/BS`.
    pub fn set_border(&mut self, border: Option<AnnotationBorderStyle>) {
        self.border = border;
        self.touch();
    }

    /// Set `/P`.
    pub fn set_page(&mut self, page: ObjectId) {
        self.page = Some(page);
        self.touch();
    }

    /// Set `/T` (markup annotations only).
    pub fn set_author(&mut self, author: Option<String>) {
        if let Some(markup) = self.markup.as_mut() {
            markup.author = author;
            self.touch();
        }
    }

    /// Set `/Subj` (markup annotations only).
    pub fn set_subject(&mut self, subject: Option<String>) {
        if let Some(markup) = self.markup.as_mut() {
            markup.subject = subject;
            self.touch();
        }
    }

    /// Replace the appearance dictionary.
    pub fn set_appearance(&mut self, appearance: AppearanceDict) {
        self.appearance = Some(appearance);
        self.appearance_ref = None;
        self.touch();
    }

    /// Stroke width used for generated appearances.
    pub fn stroke_width(&self) -> f64 {
        self.border.as_ref().map_or(1.0, |b| b.width)
    }

    /// Build a normal appearance from the annotation geometry.
    ///
    /// Popups, widgets and unknown subtypes are left untouched.
    pub fn generate_appearance(&mut self) -> Result<()> {
        let width = self.stroke_width();
        let stroke = match &self.color {
            AnnotationColor::None => AnnotationColor::black(),
            color => color.clone(),
        };
        let builder = AppearanceBuilder::new(self.rect);
        let builder = match &self.kind {
            AnnotationKind::Text { .. } => builder.note_icon(&self.color),
            AnnotationKind::FreeText { .. } | AnnotationKind::Stamp { .. } => {
                builder.rectangle(&stroke, &AnnotationColor::None, width)
            },
            AnnotationKind::Square { interior } => builder.rectangle(&stroke, interior, width),
            AnnotationKind::Circle { interior } => builder.ellipse(&stroke, interior, width),
            AnnotationKind::Line { line, .. } => builder.path(line, false, &stroke, width),
            AnnotationKind::Polygon { vertices, .. } => builder.path(vertices, true, &stroke, width),
            AnnotationKind::PolyLine { vertices, .. } => builder.path(vertices, false, &stroke, width),
            AnnotationKind::Ink { ink_list } => builder.ink(ink_list, &stroke, width),
            AnnotationKind::TextMarkup { kind, quad_points } => {
                let color = match (&self.color, kind) {
                    (AnnotationColor::None, TextMarkupKind::Highlight) => AnnotationColor::yellow(),
                    (AnnotationColor::None, _) => AnnotationColor::black(),
                    (color, _) => color.clone(),
                };
                builder.text_markup(*kind, quad_points, &color)
            },
            AnnotationKind::Popup { .. } | AnnotationKind::Widget | AnnotationKind::Unknown { .. } => {
                return Ok(());
            },
        };
        let form = builder.build()?;
        self.set_appearance(AppearanceDict::with_normal(form));
        Ok(())
    }

    /// Every object this annotation points at.
    pub fn references(&self) -> Vec<ObjectId> {
        let mut refs: Vec<ObjectId> = self.page.into_iter().chain(self.appearance_ref).collect();
        if let Some(ap) = &self.appearance {
            refs.extend(ap.references());
        }
        if let Some(markup) = &self.markup {
            refs.extend(markup.popup);
            refs.extend(markup.in_reply_to);
        }
        if let AnnotationKind::Popup { parent: Some(parent), .. } = &self.kind {
            refs.push(*parent);
        }
        for value in self.dict.custom.values() {
            value.collect_references(&mut refs);
        }
        refs
    }
}

impl PdfObject for AnnotationDict {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let subtype_name =
            peek_name(info, "/Subtype")?.ok_or_else(|| Error::missing_key("/Subtype", "Annot"))?;
        let subtype = AnnotationSubtype::from_pdf_name(&subtype_name);
        let mut kind = AnnotationKind::empty(subtype, &subtype_name, Bytes::copy_from_slice(info.content_bytes()));
        let required = kind.required_key();
        let mut required_seen = required.is_none();
        let mut markup = subtype.is_markup().then(MarkupFields::default);

        let mut dict = PdfDict::default();
        let mut rect = None;
        let mut contents = None;
        let mut uuid = None;
        let mut modified = None;
        let mut flags = AnnotationFlags::default();
        let mut page = None;
        let mut border = None;
        let mut color = AnnotationColor::None;
        let mut appearance = None;
        let mut appearance_ref = None;
        let mut appearance_state = None;

        dict.parse_props(info, Some("/Annot"), |s, name, i| match name {
            "/Subtype" => Ok(Some(read_name(s, i)?.end + 1)),
            "/Rect" => {
                let r = read_rect(s, i)?;
                rect = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/Contents" => {
                let r = read_text(info, s, i)?;
                contents = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/NM" => {
                let r = read_text(info, s, i)?;
                uuid = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/M" => {
                let r = read_text(info, s, i)?;
                match PdfDate::parse(&r.value) {
                    Ok(date) => {
                        modified = Some(date);
                        Ok(Some(r.end + 1))
                    },
                    Err(_) => Ok(None),
                }
            },
            "/F" => {
                let r = read_int(s, i)?;
                flags = AnnotationFlags::new(u32::try_from(r.value).unwrap_or(0));
                Ok(Some(r.end + 1))
            },
            "/P" => {
                let r = read_ref(s, i)?;
                page = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/BS" if s.get_value_type_at(i, false) == ValueType::Dictionary => {
                let r = read_object(info, s, i)?;
                border = Some(AnnotationBorderStyle::from_object(&r.value));
                Ok(Some(r.end + 1))
            },
            "/C" => {
                let r = read_numbers(s, i)?;
                color = AnnotationColor::from_array(&r.value);
                Ok(Some(r.end + 1))
            },
            "/AP" => match s.get_value_type_at(i, false) {
                ValueType::Ref => {
                    let r = read_ref(s, i)?;
                    appearance_ref = Some(r.value);
                    Ok(Some(r.end + 1))
                },
                ValueType::Dictionary => {
                    let bounds = inline_dict_bounds(s, i)?;
                    appearance = Some(AppearanceDict::parse(&info.with_bounds(bounds))?);
                    Ok(Some(bounds.end + 1))
                },
                _ => Ok(None),
            },
            "/AS" => {
                let r = read_name(s, i)?;
                appearance_state = Some(r.value);
                Ok(Some(r.end + 1))
            },
            _ => {
                if let Some(markup) = markup.as_mut() {
                    if let Some(next) = markup.parse_prop(info, s, name, i)? {
                        return Ok(Some(next));
                    }
                }
                let next = kind.parse_prop(info, s, name, i)?;
                if next.is_some() && required == Some(name) {
                    required_seen = true;
                }
                Ok(next)
            },
        })?;

        if let Some(key) = required.filter(|_| !required_seen) {
            return Err(Error::missing_key(key, subtype.pdf_name()));
        }
        let rect = rect.ok_or_else(|| Error::missing_key("/Rect", "Annot"))?;
        let uuid = uuid.unwrap_or_else(|| {
            let generated = uuid::Uuid::new_v4().to_string();
            log::debug!("annotation {:?} has no /NM, assigned {}", dict.reference, generated);
            generated
        });

        Ok(Self {
            dict,
            rect,
            contents,
            uuid,
            modified,
            flags,
            page,
            border,
            color,
            appearance,
            appearance_ref,
            appearance_state,
            markup,
            kind,
        })
    }

    fn dict(&self) -> &PdfDict {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    fn to_object(&self) -> Object {
        let mut dict = self.dict.begin_object();
        dict.insert("/Subtype".to_string(), Object::name(&self.subtype_name()));
        dict.insert("/Rect".to_string(), Object::numbers(&self.rect));
        put_opt(&mut dict, "/Contents", self.contents.as_deref().map(text_object));
        dict.insert("/NM".to_string(), text_object(&self.uuid));
        put_opt(&mut dict, "/M", self.modified.as_ref().map(date_object));
        if self.flags.bits() != 0 {
            dict.insert("/F".to_string(), Object::Integer(i64::from(self.flags.bits())));
        }
        put_opt(&mut dict, "/P", self.page);
        put_opt(&mut dict, "/BS", self.border.as_ref().map(AnnotationBorderStyle::to_object));
        put_opt(&mut dict, "/C", self.color.to_array().map(|c| Object::numbers(&c)));
        match &self.appearance {
            Some(ap) => {
                dict.insert("/AP".to_string(), ap.to_object());
            },
            None => put_opt(&mut dict, "/AP", self.appearance_ref),
        }
        put_opt(&mut dict, "/AS", self.appearance_state.as_deref().map(Object::name));
        if let Some(markup) = &self.markup {
            markup.write(&mut dict);
        }
        self.kind.write(&mut dict);
        self.dict.finish_object(&mut dict);
        Object::Dictionary(dict)
    }
}
