//! Annotation enums and small value types (ISO 32000-1, section 12.5).

use crate::object::Object;

/// Annotation subtype (`/Subtype`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationSubtype {
    /// Sticky note
    Text,
    /// Text drawn directly on the page
    FreeText,
    /// Straight line
    Line,
    /// Rectangle
    Square,
    /// Ellipse
    Circle,
    /// Closed polygon
    Polygon,
    /// Open polyline
    PolyLine,
    /// Highlight markup
    Highlight,
    /// Underline markup
    Underline,
    /// Squiggly underline markup
    Squiggly,
    /// Strikeout markup
    StrikeOut,
    /// Rubber stamp
    Stamp,
    /// Freehand ink
    Ink,
    /// Popup window for another annotation
    Popup,
    /// Form field widget
    Widget,
    /// Anything else; kept as raw bytes
    Unknown,
}

impl AnnotationSubtype {
    /// Name without the leading slash.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::FreeText => "FreeText",
            Self::Line => "Line",
            Self::Square => "Square",
            Self::Circle => "Circle",
            Self::Polygon => "Polygon",
            Self::PolyLine => "PolyLine",
            Self::Highlight => "Highlight",
            Self::Underline => "Underline",
            Self::Squiggly => "Squiggly",
            Self::StrikeOut => "StrikeOut",
            Self::Stamp => "Stamp",
            Self::Ink => "Ink",
            Self::Popup => "Popup",
            Self::Widget => "Widget",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse a subtype name, with or without the leading slash.
    pub fn from_pdf_name(name: &str) -> Self {
        match name.trim_start_matches('/') {
            "Text" => Self::Text,
            "FreeText" => Self::FreeText,
            "Line" => Self::Line,
            "Square" => Self::Square,
            "Circle" => Self::Circle,
            "Polygon" => Self::Polygon,
            "PolyLine" | "Polyline" => Self::PolyLine,
            "Highlight" => Self::Highlight,
            "Underline" => Self::Underline,
            "Squiggly" => Self::Squiggly,
            "StrikeOut" => Self::StrikeOut,
            "Stamp" => Self::Stamp,
            "Ink" => Self::Ink,
            "Popup" => Self::Popup,
            "Widget" => Self::Widget,
            _ => Self::Unknown,
        }
    }

    /// Whether the subtype carries markup fields (`/T`, `/CreationDate`, `/Popup`...).
    pub fn is_markup(&self) -> bool {
        !matches!(self, Self::Popup | Self::Widget | Self::Unknown)
    }

    /// Check if this is a text markup annotation.
    pub fn is_text_markup(&self) -> bool {
        matches!(self, Self::Highlight | Self::Underline | Self::Squiggly | Self::StrikeOut)
    }
}

/// The four text markup subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextMarkupKind {
    /// Highlight
    Highlight,
    /// Underline
    Underline,
    /// Squiggly underline
    Squiggly,
    /// Strikeout
    StrikeOut,
}

impl TextMarkupKind {
    /// Matching subtype.
    pub fn subtype(&self) -> AnnotationSubtype {
        match self {
            Self::Highlight => AnnotationSubtype::Highlight,
            Self::Underline => AnnotationSubtype::Underline,
            Self::Squiggly => AnnotationSubtype::Squiggly,
            Self::StrikeOut => AnnotationSubtype::StrikeOut,
        }
    }

    /// Kind for a text markup subtype.
    pub fn from_subtype(subtype: AnnotationSubtype) -> Option<Self> {
        match subtype {
            AnnotationSubtype::Highlight => Some(Self::Highlight),
            AnnotationSubtype::Underline => Some(Self::Underline),
            AnnotationSubtype::Squiggly => Some(Self::Squiggly),
            AnnotationSubtype::StrikeOut => Some(Self::StrikeOut),
            _ => None,
        }
    }
}

/// Annotation flags (`/F`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnotationFlags(u32);

impl AnnotationFlags {
    /// Do not display an unknown subtype without appearance
    pub const INVISIBLE: u32 = 1 << 0;
    /// Do not display or print
    pub const HIDDEN: u32 = 1 << 1;
    /// Print with the page
    pub const PRINT: u32 = 1 << 2;
    /// Do not scale with page zoom
    pub const NO_ZOOM: u32 = 1 << 3;
    /// Do not rotate with the page
    pub const NO_ROTATE: u32 = 1 << 4;
    /// Do not display on screen
    pub const NO_VIEW: u32 = 1 << 5;
    /// No interaction
    pub const READ_ONLY: u32 = 1 << 6;
    /// No deletion or property changes
    pub const LOCKED: u32 = 1 << 7;
    /// Invert NoView on hover or selection
    pub const TOGGLE_NO_VIEW: u32 = 1 << 8;
    /// Contents may not change
    pub const LOCKED_CONTENTS: u32 = 1 << 9;

    /// Create new flags from raw value.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Default for new annotations (PRINT set).
    pub fn printable() -> Self {
        Self(Self::PRINT)
    }

    /// Get raw value.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Check if a flag is set.
    pub fn contains(&self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    /// Set a flag.
    pub fn set(&mut self, flag: u32) {
        self.0 |= flag;
    }

    /// Clear a flag.
    pub fn clear(&mut self, flag: u32) {
        self.0 &= !flag;
    }

    /// Hidden or not viewable.
    pub fn is_hidden(&self) -> bool {
        self.contains(Self::HIDDEN) || self.contains(Self::NO_VIEW)
    }

    /// Check if locked.
    pub fn is_locked(&self) -> bool {
        self.contains(Self::LOCKED)
    }
}

/// Border style (`/BS /S`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderStyleType {
    /// Solid border (S)
    #[default]
    Solid,
    /// Dashed border (D)
    Dashed,
    /// Beveled border (B)
    Beveled,
    /// Inset border (I)
    Inset,
    /// Underline border (U)
    Underline,
}

impl BorderStyleType {
    /// Name without the leading slash.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::Solid => "S",
            Self::Dashed => "D",
            Self::Beveled => "B",
            Self::Inset => "I",
            Self::Underline => "U",
        }
    }

    /// Parse from PDF name; unknown styles fall back to solid.
    pub fn from_pdf_name(name: &str) -> Self {
        match name.trim_start_matches('/') {
            "D" => Self::Dashed,
            "B" => Self::Beveled,
            "I" => Self::Inset,
            "U" => Self::Underline,
            _ => Self::Solid,
        }
    }
}

/// Border style dictionary (`/BS`).
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationBorderStyle {
    /// Border width in points.
    pub width: f64,
    /// Border style type.
    pub style: BorderStyleType,
    /// Dash pattern for dashed borders.
    pub dash_pattern: Option<Vec<f64>>,
}

impl Default for AnnotationBorderStyle {
    fn default() -> Self {
        Self::solid(1.0)
    }
}

impl AnnotationBorderStyle {
    /// Create a solid border with given width.
    pub fn solid(width: f64) -> Self {
        Self {
            width,
            style: BorderStyleType::Solid,
            dash_pattern: None,
        }
    }

    /// Read `/W`, `/S` and `/D` from a generic dictionary value.
    pub fn from_object(obj: &Object) -> Self {
        let mut border = Self::default();
        let Some(dict) = obj.as_dict() else {
            return border;
        };
        if let Some(width) = dict.get("/W").and_then(Object::as_number) {
            border.width = width;
        }
        if let Some(style) = dict.get("/S").and_then(Object::as_name) {
            border.style = BorderStyleType::from_pdf_name(style);
        }
        if let Some(dash) = dict.get("/D").and_then(Object::as_array) {
            border.dash_pattern = Some(dash.iter().filter_map(Object::as_number).collect());
        }
        border
    }

    /// Generic dictionary value.
    pub fn to_object(&self) -> Object {
        let mut dict = crate::object::Dictionary::new();
        dict.insert("/W".to_string(), Object::from(self.width));
        dict.insert("/S".to_string(), Object::name(self.style.pdf_name()));
        if let Some(dash) = &self.dash_pattern {
            dict.insert("/D".to_string(), Object::numbers(dash));
        }
        Object::Dictionary(dict)
    }
}

/// Annotation color (`/C`, `/IC`); components in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AnnotationColor {
    /// No color (transparent)
    #[default]
    None,
    /// Grayscale (1 component)
    Gray(f64),
    /// RGB color (3 components)
    Rgb(f64, f64, f64),
    /// CMYK color (4 components)
    Cmyk(f64, f64, f64, f64),
}

impl AnnotationColor {
    /// Create yellow color (common for highlights).
    pub fn yellow() -> Self {
        Self::Rgb(1.0, 1.0, 0.0)
    }

    /// Create black color.
    pub fn black() -> Self {
        Self::Gray(0.0)
    }

    /// Components as written in the array.
    pub fn to_array(&self) -> Option<Vec<f64>> {
        match self {
            Self::None => None,
            Self::Gray(g) => Some(vec![*g]),
            Self::Rgb(r, g, b) => Some(vec![*r, *g, *b]),
            Self::Cmyk(c, m, y, k) => Some(vec![*c, *m, *y, *k]),
        }
    }

    /// Parse from PDF array; other lengths mean no color.
    pub fn from_array(arr: &[f64]) -> Self {
        match arr.len() {
            1 => Self::Gray(arr[0]),
            3 => Self::Rgb(arr[0], arr[1], arr[2]),
            4 => Self::Cmyk(arr[0], arr[1], arr[2], arr[3]),
            _ => Self::None,
        }
    }

    /// Content stream operator setting this as the stroke color.
    pub fn stroke_ops(&self) -> Option<String> {
        self.ops(["G", "RG", "K"])
    }

    /// Content stream operator setting this as the fill color.
    pub fn fill_ops(&self) -> Option<String> {
        self.ops(["g", "rg", "k"])
    }

    fn ops(&self, operators: [&str; 3]) -> Option<String> {
        let components = self.to_array()?;
        let operator = match components.len() {
            1 => operators[0],
            3 => operators[1],
            _ => operators[2],
        };
        let values: Vec<String> = components.iter().map(|&c| format_number(c)).collect();
        Some(format!("{} {}\n", values.join(" "), operator))
    }
}

/// Text annotation icon (`/Name`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAnnotationIcon {
    /// Comment icon
    Comment,
    /// Key icon
    Key,
    /// Note icon (default)
    #[default]
    Note,
    /// Help icon
    Help,
    /// New paragraph icon
    NewParagraph,
    /// Paragraph icon
    Paragraph,
    /// Insert icon
    Insert,
}

impl TextAnnotationIcon {
    /// Name without the leading slash.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::Comment => "Comment",
            Self::Key => "Key",
            Self::Note => "Note",
            Self::Help => "Help",
            Self::NewParagraph => "NewParagraph",
            Self::Paragraph => "Paragraph",
            Self::Insert => "Insert",
        }
    }

    /// Parse from PDF name; unknown icons fall back to Note.
    pub fn from_pdf_name(name: &str) -> Self {
        match name.trim_start_matches('/') {
            "Comment" => Self::Comment,
            "Key" => Self::Key,
            "Help" => Self::Help,
            "NewParagraph" => Self::NewParagraph,
            "Paragraph" => Self::Paragraph,
            "Insert" => Self::Insert,
            _ => Self::Note,
        }
    }
}

/// Line ending style (`/LE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEndingStyle {
    /// No line ending
    #[default]
    None,
    /// Square filled with interior color
    Square,
    /// Circle filled with interior color
    Circle,
    /// Diamond filled with interior color
    Diamond,
    /// Open arrow
    OpenArrow,
    /// Closed arrow
    ClosedArrow,
    /// Perpendicular line at endpoint
    Butt,
    /// Reverse open arrow
    ROpenArrow,
    /// Reverse closed arrow
    RClosedArrow,
    /// Slash
    Slash,
}

impl LineEndingStyle {
    /// Name without the leading slash.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Square => "Square",
            Self::Circle => "Circle",
            Self::Diamond => "Diamond",
            Self::OpenArrow => "OpenArrow",
            Self::ClosedArrow => "ClosedArrow",
            Self::Butt => "Butt",
            Self::ROpenArrow => "ROpenArrow",
            Self::RClosedArrow => "RClosedArrow",
            Self::Slash => "Slash",
        }
    }

    /// Parse from PDF name.
    pub fn from_pdf_name(name: &str) -> Self {
        match name.trim_start_matches('/') {
            "Square" => Self::Square,
            "Circle" => Self::Circle,
            "Diamond" => Self::Diamond,
            "OpenArrow" => Self::OpenArrow,
            "ClosedArrow" => Self::ClosedArrow,
            "Butt" => Self::Butt,
            "ROpenArrow" => Self::ROpenArrow,
            "RClosedArrow" => Self::RClosedArrow,
            "Slash" => Self::Slash,
            _ => Self::None,
        }
    }
}

/// Number as written in content streams: integral values without a fraction,
/// others with at most five decimals.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        return format!("{}", value as i64);
    }
    let formatted = format!("{:.5}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
