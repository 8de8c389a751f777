//! Page dictionaries.

use super::dict::{put_opt, read_int, read_rect, read_ref, read_ref_or_refs, read_refs};
use super::resources::ResourcesRef;
use super::{ParseInfo, PdfDict, PdfObject};
use crate::error::Result;
use crate::object::{Object, ObjectId};
use crate::scanner::ValueType;

/// How a page lists its annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AnnotsRef {
    /// No `/Annots` entry
    #[default]
    None,
    /// Array written inside the page dictionary
    Direct(Vec<ObjectId>),
    /// Reference to a separate array object
    Indirect(ObjectId),
}

/// Leaf page (`/Type /Page`).
#[derive(Debug, Clone, Default)]
pub struct PageDict {
    /// Base dictionary
    pub dict: PdfDict,
    /// Parent page tree node
    pub parent: Option<ObjectId>,
    /// `/MediaBox`, normalized
    pub media_box: Option<[f64; 4]>,
    /// `/CropBox`, normalized
    pub crop_box: Option<[f64; 4]>,
    /// `/Rotate` in degrees
    pub rotate: Option<i64>,
    /// `/Resources`
    pub resources: Option<ResourcesRef>,
    /// Content streams in drawing order
    pub contents: Vec<ObjectId>,
    annots: AnnotsRef,
}

impl PageDict {
    /// New page under `parent` with the given media box.
    pub fn new(parent: ObjectId, media_box: [f64; 4]) -> Self {
        let mut page = Self {
            dict: PdfDict::new(Some("/Page")),
            parent: Some(parent),
            media_box: Some(media_box),
            ..Default::default()
        };
        page.dict.mark_added();
        page
    }

    /// How the annotations are listed.
    pub fn annots(&self) -> &AnnotsRef {
        &self.annots
    }

    /// Replace the annotation list with a direct array.
    pub fn set_annots(&mut self, refs: Vec<ObjectId>) {
        self.annots = AnnotsRef::Direct(refs);
        self.dict.mark_edited();
    }

    /// Effective visible area: crop box, else media box.
    pub fn visible_box(&self) -> Option<[f64; 4]> {
        self.crop_box.or(self.media_box)
    }
}

impl PdfObject for PageDict {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let mut page = Self::default();
        let mut parent = None;
        let mut media_box = None;
        let mut crop_box = None;
        let mut rotate = None;
        let mut resources = None;
        let mut contents = Vec::new();
        let mut annots = AnnotsRef::None;

        page.dict.parse_props(info, Some("/Page"), |s, name, i| match name {
            "/Parent" => {
                let r = read_ref(s, i)?;
                parent = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/MediaBox" => {
                let r = read_rect(s, i)?;
                media_box = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/CropBox" => {
                let r = read_rect(s, i)?;
                crop_box = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/Rotate" => {
                let r = read_int(s, i)?;
                rotate = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/Resources" => match ResourcesRef::parse_at(info, s, i)? {
                Some((value, end)) => {
                    resources = Some(value);
                    Ok(Some(end + 1))
                },
                None => Ok(None),
            },
            "/Contents" => {
                let r = read_ref_or_refs(s, i)?;
                contents = r.value;
                Ok(Some(r.end + 1))
            },
            "/Annots" => match s.get_value_type_at(i, false) {
                ValueType::Ref => {
                    let r = read_ref(s, i)?;
                    annots = AnnotsRef::Indirect(r.value);
                    Ok(Some(r.end + 1))
                },
                // Arrays holding inline annotation dictionaries stay custom.
                _ => match read_refs(s, i) {
                    Ok(r) => {
                        annots = AnnotsRef::Direct(r.value);
                        Ok(Some(r.end + 1))
                    },
                    Err(_) => Ok(None),
                },
            },
            _ => Ok(None),
        })?;

        page.parent = parent;
        page.media_box = media_box;
        page.crop_box = crop_box;
        page.rotate = rotate;
        page.resources = resources;
        page.contents = contents;
        page.annots = annots;
        Ok(page)
    }

    fn dict(&self) -> &PdfDict {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    fn to_object(&self) -> Object {
        let mut dict = self.dict.begin_object();
        put_opt(&mut dict, "/Parent", self.parent);
        put_opt(&mut dict, "/MediaBox", self.media_box.map(|r| Object::numbers(&r)));
        put_opt(&mut dict, "/CropBox", self.crop_box.map(|r| Object::numbers(&r)));
        put_opt(&mut dict, "/Rotate", self.rotate);
        put_opt(&mut dict, "/Resources", self.resources.as_ref().map(ResourcesRef::to_object));
        match self.contents.as_slice() {
            [] => {},
            [single] => {
                dict.insert("/Contents".to_string(), Object::Reference(*single));
            },
            many => {
                let refs = many.iter().map(|&r| Object::Reference(r)).collect();
                dict.insert("/Contents".to_string(), Object::Array(refs));
            },
        }
        match &self.annots {
            AnnotsRef::None => {},
            AnnotsRef::Direct(refs) => {
                let refs = refs.iter().map(|&r| Object::Reference(r)).collect();
                dict.insert("/Annots".to_string(), Object::Array(refs));
            },
            AnnotsRef::Indirect(r) => {
                dict.insert("/Annots".to_string(), Object::Reference(*r));
            },
        }
        self.dict.finish_object(&mut dict);
        Object::Dictionary(dict)
    }
}
