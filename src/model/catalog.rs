//! Document catalog and page tree nodes.

use super::dict::{peek_name, put_opt, read_ref, read_refs, read_usize};
use super::page::PageDict;
use super::{ParseInfo, PdfDict, PdfObject};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectId};

/// Document catalog (`/Type /Catalog`).
#[derive(Debug, Clone, Default)]
pub struct CatalogDict {
    /// Base dictionary
    pub dict: PdfDict,
    /// Root of the page tree
    pub pages: Option<ObjectId>,
}

impl PdfObject for CatalogDict {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let mut catalog = Self::default();
        let mut pages = None;
        catalog.dict.parse_props(info, Some("/Catalog"), |s, name, i| match name {
            "/Pages" => {
                let r = read_ref(s, i)?;
                pages = Some(r.value);
                Ok(Some(r.end + 1))
            },
            _ => Ok(None),
        })?;
        if pages.is_none() {
            return Err(Error::missing_key("/Pages", "Catalog"));
        }
        catalog.pages = pages;
        Ok(catalog)
    }

    fn dict(&self) -> &PdfDict {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    fn to_object(&self) -> Object {
        let mut dict = self.dict.begin_object();
        put_opt(&mut dict, "/Pages", self.pages);
        self.dict.finish_object(&mut dict);
        Object::Dictionary(dict)
    }
}

/// Intermediate page tree node (`/Type /Pages`).
#[derive(Debug, Clone, Default)]
pub struct PageTreeDict {
    /// Base dictionary
    pub dict: PdfDict,
    /// Child nodes, pages or page tree nodes
    pub kids: Vec<ObjectId>,
    /// Number of leaf pages below this node
    pub count: usize,
    /// Parent node, absent on the root
    pub parent: Option<ObjectId>,
}

impl PdfObject for PageTreeDict {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let mut node = Self::default();
        let mut kids = None;
        let mut count = 0;
        let mut parent = None;
        node.dict.parse_props(info, Some("/Pages"), |s, name, i| match name {
            "/Kids" => {
                let r = read_refs(s, i)?;
                kids = Some(r.value);
                Ok(Some(r.end + 1))
            },
            "/Count" => {
                let r = read_usize(s, i)?;
                count = r.value;
                Ok(Some(r.end + 1))
            },
            "/Parent" => {
                let r = read_ref(s, i)?;
                parent = Some(r.value);
                Ok(Some(r.end + 1))
            },
            _ => Ok(None),
        })?;
        node.kids = kids.ok_or_else(|| Error::missing_key("/Kids", "Pages"))?;
        node.count = count;
        node.parent = parent;
        Ok(node)
    }

    fn dict(&self) -> &PdfDict {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    fn to_object(&self) -> Object {
        let mut dict = self.dict.begin_object();
        dict.insert(
            "/Kids".to_string(),
            Object::Array(self.kids.iter().map(|&k| Object::Reference(k)).collect()),
        );
        dict.insert("/Count".to_string(), Object::Integer(self.count as i64));
        put_opt(&mut dict, "/Parent", self.parent);
        self.dict.finish_object(&mut dict);
        Object::Dictionary(dict)
    }
}

/// Page tree entry: inner node or leaf page.
#[derive(Debug, Clone)]
pub enum PageTreeNode {
    /// `/Type /Pages`
    Pages(PageTreeDict),
    /// `/Type /Page`
    Page(Box<PageDict>),
}

impl PageTreeNode {
    /// Parse a node, choosing the variant from `/Type`.
    pub fn parse(info: &ParseInfo) -> Result<Self> {
        match peek_name(info, "/Type")?.as_deref() {
            Some("/Pages") => PageTreeDict::parse(info).map(PageTreeNode::Pages),
            Some("/Page") => PageDict::parse(info).map(|p| PageTreeNode::Page(Box::new(p))),
            other => Err(Error::InvalidObjectType {
                expected: "/Pages or /Page".to_string(),
                found: other.unwrap_or("none").to_string(),
            }),
        }
    }
}
