//! Plain annotation records exchanged with the rendering layer.
//!
//! Dates are RFC 3339 strings here and PDF date strings in the file.

use super::{
    AnnotationBorderStyle, AnnotationColor, AnnotationDict, AnnotationKind, AnnotationSubtype, LineEndingStyle,
    TextAnnotationIcon, TextMarkupKind,
};
use crate::error::{Error, Result};
use crate::model::date::PdfDate;
use crate::object::ObjectId;
use serde::{Deserialize, Serialize};

/// Annotation as seen by the viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotationDto {
    /// Subtype name without the slash (`"Square"`, `"Ink"`...)
    pub annotation_type: String,
    /// `/NM`; empty means "generate one"
    pub uuid: String,
    /// Object number of the page holding the annotation
    pub page_id: u32,
    /// `/CreationDate`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
    /// `/M`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<String>,
    /// `/T`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// `/Contents`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    /// `/Rect`
    pub rect: [f64; 4],
    /// `/BBox` of the normal appearance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    /// `/Matrix` of the normal appearance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix: Option<[f64; 6]>,
    /// `/C` components
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Vec<f64>>,
    /// `/BS /W`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    /// `/InkList`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ink_list: Option<Vec<Vec<f64>>>,
    /// `/QuadPoints`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quad_points: Option<Vec<f64>>,
    /// `/Vertices`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertices: Option<Vec<f64>>,
    /// `/L`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<[f64; 4]>,
    /// Text icon or stamp name, without the slash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// `/Subj`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

fn required<T: Clone>(value: &Option<T>, field: &str) -> Result<T> {
    value.clone().ok_or_else(|| Error::missing_key(field, "AnnotationDto"))
}

impl AnnotationDict {
    /// Viewer record for this annotation on page `page_id`.
    pub fn to_dto(&self, page_id: u32) -> AnnotationDto {
        let markup = self.markup();
        let form = self.appearance().and_then(|ap| ap.new_normal_form());
        let mut dto = AnnotationDto {
            annotation_type: self.subtype_name().trim_start_matches('/').to_string(),
            uuid: self.uuid().to_string(),
            page_id,
            date_created: markup.and_then(|m| m.creation_date).map(|d| d.to_rfc3339()),
            date_modified: self.modified().map(|d| d.to_rfc3339()),
            author: markup.and_then(|m| m.author.clone()),
            text_content: self.contents().map(str::to_string),
            rect: self.rect(),
            bbox: form.map(|f| f.bbox),
            matrix: form.map(|f| f.matrix),
            color: self.color().to_array(),
            stroke_width: self.border().map(|b| b.width),
            subject: markup.and_then(|m| m.subject.clone()),
            ..Default::default()
        };
        match self.kind() {
            AnnotationKind::Text { icon, .. } => dto.icon = Some(icon.pdf_name().to_string()),
            AnnotationKind::Stamp { name } => {
                dto.icon = name.as_deref().map(|n| n.trim_start_matches('/').to_string())
            },
            AnnotationKind::Line { line, .. } => dto.line = Some(*line),
            AnnotationKind::Polygon { vertices, .. } | AnnotationKind::PolyLine { vertices, .. } => {
                dto.vertices = Some(vertices.clone())
            },
            AnnotationKind::Ink { ink_list } => dto.ink_list = Some(ink_list.clone()),
            AnnotationKind::TextMarkup { quad_points, .. } => dto.quad_points = Some(quad_points.clone()),
            _ => {},
        }
        dto
    }

    /// New annotation on `page` from a viewer record, with a generated
    /// normal appearance.
    ///
    /// Popups, widgets and unknown subtypes cannot be created this way.
    pub fn from_dto(dto: &AnnotationDto, page: ObjectId) -> Result<Self> {
        let subtype = AnnotationSubtype::from_pdf_name(&dto.annotation_type);
        let kind = match subtype {
            AnnotationSubtype::Text => AnnotationKind::Text {
                icon: dto.icon.as_deref().map(TextAnnotationIcon::from_pdf_name).unwrap_or_default(),
                open: false,
            },
            AnnotationSubtype::FreeText => AnnotationKind::FreeText {
                default_appearance: Some("/Helv 12 Tf 0 g".to_string()),
                justification: 0,
            },
            AnnotationSubtype::Line => AnnotationKind::Line {
                line: required(&dto.line, "line")?,
                endings: [LineEndingStyle::None; 2],
                interior: AnnotationColor::None,
            },
            AnnotationSubtype::Square => AnnotationKind::Square {
                interior: AnnotationColor::None,
            },
            AnnotationSubtype::Circle => AnnotationKind::Circle {
                interior: AnnotationColor::None,
            },
            AnnotationSubtype::Polygon => AnnotationKind::Polygon {
                vertices: required(&dto.vertices, "vertices")?,
                interior: AnnotationColor::None,
            },
            AnnotationSubtype::PolyLine => AnnotationKind::PolyLine {
                vertices: required(&dto.vertices, "vertices")?,
                endings: [LineEndingStyle::None; 2],
            },
            AnnotationSubtype::Ink => AnnotationKind::Ink {
                ink_list: required(&dto.ink_list, "inkList")?,
            },
            AnnotationSubtype::Highlight
            | AnnotationSubtype::Underline
            | AnnotationSubtype::Squiggly
            | AnnotationSubtype::StrikeOut => {
                let quad_points = required(&dto.quad_points, "quadPoints")?;
                if quad_points.is_empty() || quad_points.len() % 8 != 0 {
                    return Err(Error::InvalidPdf(format!(
                        "quadPoints needs a multiple of 8 numbers, got {}",
                        quad_points.len()
                    )));
                }
                AnnotationKind::TextMarkup {
                    kind: TextMarkupKind::from_subtype(subtype).unwrap_or(TextMarkupKind::Highlight),
                    quad_points,
                }
            },
            AnnotationSubtype::Stamp => AnnotationKind::Stamp {
                name: dto.icon.as_deref().map(|n| format!("/{}", n.trim_start_matches('/'))),
            },
            AnnotationSubtype::Popup | AnnotationSubtype::Widget | AnnotationSubtype::Unknown => {
                return Err(Error::Unsupported(format!(
                    "cannot create {:?} annotations from a DTO",
                    dto.annotation_type
                )));
            },
        };

        let r = dto.rect;
        let mut annot = AnnotationDict::new(kind, [r[0].min(r[2]), r[1].min(r[3]), r[0].max(r[2]), r[1].max(r[3])]);
        if !dto.uuid.is_empty() {
            annot.uuid = dto.uuid.clone();
        }
        annot.page = Some(page);
        annot.contents = dto.text_content.clone();
        if let Some(color) = &dto.color {
            annot.color = AnnotationColor::from_array(color);
        }
        annot.border = dto.stroke_width.map(AnnotationBorderStyle::solid);
        if let Some(markup) = annot.markup.as_mut() {
            markup.author = dto.author.clone();
            markup.subject = dto.subject.clone();
            if let Some(created) = &dto.date_created {
                markup.creation_date = Some(PdfDate::from_rfc3339(created)?);
            }
        }

        annot.generate_appearance()?;
        if let Some(modified) = &dto.date_modified {
            annot.modified = Some(PdfDate::from_rfc3339(modified)?);
        }
        Ok(annot)
    }
}
