//! Appearance dictionaries (`/AP`).

use super::resources::XFormStream;
use super::{ParseInfo, PdfDict, PdfObject};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectId};
use crate::scanner::{ByteScanner, ValueType};
use indexmap::IndexMap;

/// One appearance stream: already in the file, or waiting to be written.
#[derive(Debug, Clone)]
pub enum StreamSlot {
    /// Existing stream object
    Ref(ObjectId),
    /// Stream created in this session; replaced by `Ref` once written
    New(Box<XFormStream>),
}

impl StreamSlot {
    /// Reference, once the stream has one.
    pub fn reference(&self) -> Option<ObjectId> {
        match self {
            StreamSlot::Ref(r) => Some(*r),
            StreamSlot::New(form) => form.stream.dict.reference,
        }
    }

    fn to_object(&self) -> Object {
        self.reference().map_or(Object::Null, Object::Reference)
    }
}

/// Value of `/N`, `/R` or `/D`.
#[derive(Debug, Clone)]
pub enum AppearanceEntry {
    /// Single stream
    Stream(StreamSlot),
    /// Streams keyed by appearance state (`/On`, `/Off`, ...)
    States(IndexMap<String, StreamSlot>),
}

impl AppearanceEntry {
    fn parse_at(s: &ByteScanner<'_>, i: usize) -> Result<Option<(Self, usize)>> {
        match s.get_value_type_at(i, false) {
            ValueType::Ref => {
                let r = ObjectId::parse_ref_at(s, i, false)
                    .ok_or_else(|| Error::parse(i, "expected appearance stream reference"))?;
                Ok(Some((AppearanceEntry::Stream(StreamSlot::Ref(r.value)), r.end)))
            },
            ValueType::Dictionary => {
                let (dict, end) =
                    Object::parse_dict(s, i).ok_or_else(|| Error::parse(i, "invalid appearance states"))?;
                let states = dict
                    .into_iter()
                    .filter_map(|(state, value)| value.as_reference().map(|r| (state, StreamSlot::Ref(r))))
                    .collect();
                Ok(Some((AppearanceEntry::States(states), end)))
            },
            _ => Ok(None),
        }
    }

    fn to_object(&self) -> Object {
        match self {
            AppearanceEntry::Stream(slot) => slot.to_object(),
            AppearanceEntry::States(states) => {
                let dict: Dictionary = states.iter().map(|(k, v)| (k.clone(), v.to_object())).collect();
                Object::Dictionary(dict)
            },
        }
    }

    fn slots_mut(&mut self) -> Vec<&mut StreamSlot> {
        match self {
            AppearanceEntry::Stream(slot) => vec![slot],
            AppearanceEntry::States(states) => states.values_mut().collect(),
        }
    }

    fn slots(&self) -> Vec<&StreamSlot> {
        match self {
            AppearanceEntry::Stream(slot) => vec![slot],
            AppearanceEntry::States(states) => states.values().collect(),
        }
    }
}

/// Appearance dictionary: normal, rollover and down appearances.
#[derive(Debug, Clone, Default)]
pub struct AppearanceDict {
    /// Base dictionary
    pub dict: PdfDict,
    /// `/N`
    pub normal: Option<AppearanceEntry>,
    /// `/R`
    pub rollover: Option<AppearanceEntry>,
    /// `/D`
    pub down: Option<AppearanceEntry>,
}

impl AppearanceDict {
    /// Dictionary whose normal appearance is a new form.
    pub fn with_normal(form: XFormStream) -> Self {
        Self {
            normal: Some(AppearanceEntry::Stream(StreamSlot::New(Box::new(form)))),
            ..Default::default()
        }
    }

    /// The normal appearance form when it was created in this session.
    pub fn new_normal_form(&self) -> Option<&XFormStream> {
        match &self.normal {
            Some(AppearanceEntry::Stream(StreamSlot::New(form))) => Some(form),
            _ => None,
        }
    }

    /// Every slot, for the writer to assign references to new streams.
    pub fn slots_mut(&mut self) -> Vec<&mut StreamSlot> {
        [&mut self.normal, &mut self.rollover, &mut self.down]
            .into_iter()
            .flatten()
            .flat_map(AppearanceEntry::slots_mut)
            .collect()
    }

    /// References of every existing appearance stream.
    pub fn references(&self) -> Vec<ObjectId> {
        [&self.normal, &self.rollover, &self.down]
            .into_iter()
            .flatten()
            .flat_map(AppearanceEntry::slots)
            .filter_map(StreamSlot::reference)
            .collect()
    }
}

impl PdfObject for AppearanceDict {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let mut ap = Self::default();
        let (mut normal, mut rollover, mut down) = (None, None, None);
        ap.dict.parse_props(info, None, |s, name, i| {
            let slot = match name {
                "/N" => &mut normal,
                "/R" => &mut rollover,
                "/D" => &mut down,
                _ => return Ok(None),
            };
            match AppearanceEntry::parse_at(s, i)? {
                Some((entry, end)) => {
                    *slot = Some(entry);
                    Ok(Some(end + 1))
                },
                None => Ok(None),
            }
        })?;
        ap.normal = normal;
        ap.rollover = rollover;
        ap.down = down;
        Ok(ap)
    }

    fn dict(&self) -> &PdfDict {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    fn to_object(&self) -> Object {
        let mut dict = self.dict.begin_object();
        for (key, entry) in [("/N", &self.normal), ("/R", &self.rollover), ("/D", &self.down)] {
            if let Some(entry) = entry {
                dict.insert(key.to_string(), entry.to_object());
            }
        }
        self.dict.finish_object(&mut dict);
        Object::Dictionary(dict)
    }
}
