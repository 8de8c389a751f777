//! Opened PDF document: object resolution, pages, annotation edits, save.
//!
//! ```text
//! bytes ─▶ header ─▶ XRefChain (optionally on a ScanPool) ─▶ ReferenceData
//!                                                              │
//!             /Encrypt ─▶ CryptorProvider ─▶ CryptInfo ◀───────┤
//!                                                              ▼
//!                     DocumentSource (ObjectResolver) ─▶ catalog ─▶ pages
//!                                                              │
//!             annotation edits ─▶ DocumentEvent listeners      ▼
//!                                          save() ─▶ IncrementalWriter
//! ```
//!
//! Pages are identified by their object number. Annotations are loaded per
//! page on first use and identified by their `/NM` value.

use crate::crypt::{CryptInfo, CryptorProvider, EncryptionDict};
use crate::error::{Error, Result};
use crate::model::dict::read_refs;
use crate::model::{
    AnnotationDict, AnnotationDto, AnnotsRef, AppearanceDict, CatalogDict, ObjectResolver, ObjectStream, PageDict,
    PageTreeNode, ParseInfo, PdfObject,
};
use crate::object::{Object, ObjectId};
use crate::parser_config::ParserOptions;
use crate::pool::{PooledScanner, ScanPool};
use crate::writer::IncrementalWriter;
use crate::xref::{ReferenceData, TrailerDict, UsedLocation, XRefChain};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, Weak};

/// How far into the file the `%PDF-` marker may appear.
const HEADER_SEARCH_LIMIT: usize = 1024;

/// Read the `%PDF-M.m` header and return the version string.
///
/// Leading junk before the marker is accepted within the first kilobyte.
pub fn parse_header(data: &[u8]) -> Result<String> {
    let window = &data[..data.len().min(HEADER_SEARCH_LIMIT)];
    let start = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            Error::InvalidHeader(String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned())
        })?;
    let version = &data[start + 5..data.len().min(start + 8)];
    match version {
        [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok(format!("{}.{}", *major as char, *minor as char))
        },
        _ => Err(Error::InvalidHeader(format!(
            "%PDF-{}",
            String::from_utf8_lossy(version)
        ))),
    }
}

/// Options used while opening a document.
#[derive(Clone, Default)]
pub struct DocumentOptions {
    /// Strictness and limits
    pub parser: ParserOptions,
    /// Pool used to walk the cross-reference chain off-thread
    pub pool: Option<ScanPool>,
    /// Builds cryptors for encrypted documents
    pub cryptor_provider: Option<Arc<dyn CryptorProvider>>,
}

impl fmt::Debug for DocumentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentOptions")
            .field("parser", &self.parser)
            .field("pool", &self.pool)
            .field("cryptor_provider", &self.cryptor_provider.is_some())
            .finish()
    }
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum DocumentEvent {
    /// An annotation was added
    Add(AnnotationDto),
    /// An annotation was modified
    Edit(AnnotationDto),
    /// An annotation was removed
    Delete(AnnotationDto),
    /// Selection changed; `None` clears it
    Select(Option<AnnotationDto>),
    /// Focus changed; `None` clears it
    Focus(Option<AnnotationDto>),
    /// A page (or every page) should be redrawn
    Render(Option<u32>),
}

type Listener = Box<dyn FnMut(&DocumentEvent) + Send>;

fn emit(listeners: &mut [Listener], event: &DocumentEvent) {
    log::debug!("document event {:?}", event);
    for listener in listeners.iter_mut() {
        listener(event);
    }
}

/// Resolves object numbers against the file buffer.
struct DocumentSource {
    data: Bytes,
    reference_data: Arc<ReferenceData>,
    options: ParserOptions,
    crypt: OnceLock<CryptInfo>,
    object_streams: Mutex<HashMap<u32, Arc<ObjectStream>>>,
    this: Weak<DocumentSource>,
}

impl DocumentSource {
    fn new(data: Bytes, reference_data: Arc<ReferenceData>, options: ParserOptions) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            data,
            reference_data,
            options,
            crypt: OnceLock::new(),
            object_streams: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    fn attach(&self, mut info: ParseInfo) -> ParseInfo {
        info.crypt_info = self.crypt.get().cloned();
        info.resolver = self.this.upgrade().map(|s| s as Arc<dyn ObjectResolver>);
        info.options = self.options;
        info
    }

    fn object_stream(&self, stream_id: u32) -> Result<Arc<ObjectStream>> {
        if let Some(stream) = self
            .object_streams
            .lock()
            .map_err(|_| Error::InvalidPdf("object stream cache poisoned".to_string()))?
            .get(&stream_id)
        {
            return Ok(Arc::clone(stream));
        }
        let used = self
            .reference_data
            .get_used(stream_id)
            .ok_or(Error::ObjectNotFound(stream_id, 0))?;
        let UsedLocation::Offset(offset) = used.location else {
            return Err(Error::InvalidPdf(format!(
                "object stream {} is itself compressed",
                stream_id
            )));
        };
        let info = self.attach(ParseInfo::from_indirect_at(self.data.clone(), offset)?);
        let stream = Arc::new(ObjectStream::parse(&info)?);
        log::debug!("loaded object stream {} ({} objects)", stream_id, stream.count);
        if let Ok(mut cache) = self.object_streams.lock() {
            cache.insert(stream_id, Arc::clone(&stream));
        }
        Ok(stream)
    }

    fn info_for(&self, id: u32) -> Result<ParseInfo> {
        let used = self.reference_data.get_used(id).ok_or(Error::ObjectNotFound(id, 0))?;
        let info = match used.location {
            UsedLocation::Offset(offset) => {
                let info = ParseInfo::from_indirect_at(self.data.clone(), offset)?;
                if info.id != Some(used.object_id()) {
                    return Err(Error::InvalidXref {
                        offset,
                        reason: format!(
                            "expected object {}, found {:?}",
                            used.object_id(),
                            info.id.map(|i| i.to_string())
                        ),
                    });
                }
                info
            },
            UsedLocation::Compressed { stream_id, index } => {
                self.object_stream(stream_id)?.parse_info_for(index, id)?
            },
        };
        log::debug!("resolved object {} at {:?}", id, used.location);
        Ok(self.attach(info))
    }
}

impl ObjectResolver for DocumentSource {
    fn parse_info(&self, id: u32) -> Result<ParseInfo> {
        self.info_for(id)
    }
}

/// Annotation list entry of a loaded page.
#[derive(Debug, Clone)]
enum AnnotSlot {
    Loaded(Box<AnnotationDict>),
    /// Listed by the page but unreadable; kept so a rewrite does not drop it
    Unreadable(ObjectId),
}

#[derive(Debug, Clone)]
struct PageEntry {
    page: PageDict,
    annotations: Option<Vec<AnnotSlot>>,
    list_changed: bool,
}

impl PageEntry {
    fn id(&self) -> u32 {
        self.page.dict.reference.map_or(0, |r| r.id)
    }

    fn loaded(&self) -> impl Iterator<Item = &AnnotationDict> {
        self.annotations
            .iter()
            .flatten()
            .filter_map(|slot| match slot {
                AnnotSlot::Loaded(annot) if !annot.dict.is_deleted() => Some(annot.as_ref()),
                _ => None,
            })
    }
}

/// Mutable access to one annotation.
///
/// Dropping the guard after a mutation notifies subscribers with an edit
/// event.
pub struct AnnotationMut<'a> {
    annotation: &'a mut AnnotationDict,
    listeners: &'a mut Vec<Listener>,
    page_id: u32,
    touched: bool,
}

impl Deref for AnnotationMut<'_> {
    type Target = AnnotationDict;

    fn deref(&self) -> &AnnotationDict {
        self.annotation
    }
}

impl DerefMut for AnnotationMut<'_> {
    fn deref_mut(&mut self) -> &mut AnnotationDict {
        self.touched = true;
        self.annotation
    }
}

impl Drop for AnnotationMut<'_> {
    fn drop(&mut self) {
        if self.touched && self.annotation.dict.is_edited() {
            let event = DocumentEvent::Edit(self.annotation.to_dto(self.page_id));
            emit(&mut *self.listeners, &event);
        }
    }
}

/// An opened PDF document.
pub struct PdfDocument {
    version: String,
    chain: XRefChain,
    source: Arc<DocumentSource>,
    catalog: CatalogDict,
    pages: Vec<PageEntry>,
    listeners: Vec<Listener>,
    selected: Option<String>,
    focused: Option<String>,
}

impl fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("len", &self.source.data.len())
            .field("sections", &self.chain.sections.len())
            .field("root", &self.chain.root())
            .field("encrypted", &self.is_encrypted())
            .field("pages", &self.pages.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Open a document held in memory with default options.
    pub fn open(data: impl Into<Bytes>) -> Result<Self> {
        Self::open_with_options(data, DocumentOptions::default())
    }

    /// Read and open the file at `path`.
    pub fn open_file(path: impl AsRef<Path>, options: DocumentOptions) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::open_with_options(data, options)
    }

    /// Open a document held in memory.
    ///
    /// A missing or unreadable catalog is fatal. Unreadable page tree
    /// nodes are skipped when the parser options are lenient.
    pub fn open_with_options(data: impl Into<Bytes>, options: DocumentOptions) -> Result<Self> {
        let data: Bytes = data.into();
        let version = parse_header(&data)?;
        let parser = options.parser;

        let chain = match &options.pool {
            Some(pool) => PooledScanner::new(pool.clone(), data.clone()).parse_xref_chain(&parser)?,
            None => XRefChain::parse(&data, &parser)?,
        };
        let reference_data = Arc::new(ReferenceData::from_chain(&chain));
        log::debug!(
            "opened PDF {}: {} xref sections, {} objects in use",
            version,
            chain.sections.len(),
            reference_data.used().count()
        );

        let source = DocumentSource::new(data, reference_data, parser);
        let trailer = chain.trailer().cloned().unwrap_or_default();
        if let Some(encrypt) = trailer.encrypt {
            let crypt = Self::load_crypt(&source, &trailer, encrypt, options.cryptor_provider.as_deref())?;
            // set once, before any other object is parsed
            let _ = source.crypt.set(crypt);
        }

        let root = chain
            .root()
            .ok_or_else(|| Error::InvalidPdf("no /Root in the trailer chain".to_string()))?;
        let catalog = CatalogDict::parse(&source.info_for(root.id)?)?;

        let mut document = Self {
            version,
            chain,
            source,
            catalog,
            pages: Vec::new(),
            listeners: Vec::new(),
            selected: None,
            focused: None,
        };
        document.pages = document
            .flatten_page_tree()?
            .into_iter()
            .map(|page| PageEntry {
                page,
                annotations: None,
                list_changed: false,
            })
            .collect();
        Ok(document)
    }

    fn load_crypt(
        source: &DocumentSource,
        trailer: &TrailerDict,
        encrypt: ObjectId,
        provider: Option<&dyn CryptorProvider>,
    ) -> Result<CryptInfo> {
        let encryption = EncryptionDict::parse(&source.info_for(encrypt.id)?)?;
        encryption.check_version()?;
        let provider = provider.ok_or_else(|| {
            Error::Unsupported("encrypted document opened without a cryptor provider".to_string())
        })?;
        let file_id = trailer.id.as_ref().map(|[first, _]| first.as_slice());
        provider.create(&encryption, Some(encrypt), file_id).map_err(|e| {
            log::error!("cannot set up decryption: {}", e);
            e
        })
    }

    /// Leaf pages in document order, cycle-safe and depth limited.
    fn flatten_page_tree(&self) -> Result<Vec<PageDict>> {
        let options = self.source.options;
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let Some(root) = self.catalog.pages else {
            return Ok(pages);
        };
        let mut stack = vec![(root, 0u32)];

        while let Some((id, depth)) = stack.pop() {
            if !visited.insert(id.id) {
                let err = Error::CircularReference(id);
                if options.tolerates(&err) {
                    continue;
                }
                return Err(err);
            }
            if depth > options.max_recursion_depth {
                let err = Error::RecursionLimitExceeded(options.max_recursion_depth);
                if options.tolerates(&err) {
                    continue;
                }
                return Err(err);
            }
            let node = self.source.info_for(id.id).and_then(|info| PageTreeNode::parse(&info));
            match node {
                Ok(PageTreeNode::Pages(tree)) => {
                    stack.extend(tree.kids.iter().rev().map(|&kid| (kid, depth + 1)));
                },
                Ok(PageTreeNode::Page(page)) => pages.push(*page),
                Err(e) if id == root => return Err(e),
                Err(e) if options.tolerates(&e) => {},
                Err(e) => return Err(e),
            }
        }
        Ok(pages)
    }

    /// `M.m` from the header.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Original file bytes.
    pub fn data(&self) -> &Bytes {
        &self.source.data
    }

    /// Cross-reference sections, newest first.
    pub fn xref_chain(&self) -> &XRefChain {
        &self.chain
    }

    /// Folded id -> location map.
    pub fn reference_data(&self) -> &Arc<ReferenceData> {
        &self.source.reference_data
    }

    /// Newest trailer.
    pub fn trailer(&self) -> Option<&TrailerDict> {
        self.chain.trailer()
    }

    /// Document catalog.
    pub fn catalog(&self) -> &CatalogDict {
        &self.catalog
    }

    /// Whether strings and streams go through injected cryptors.
    pub fn is_encrypted(&self) -> bool {
        self.source.crypt.get().is_some()
    }

    /// Parse info for object `id`, ready for a typed parser.
    pub fn resolve(&self, id: u32) -> Result<ParseInfo> {
        self.source.info_for(id)
    }

    /// Object `id` as a generic value, strings decrypted.
    pub fn object(&self, id: u32) -> Result<Object> {
        let info = self.resolve(id)?;
        let (start, _) = info.bounds.content();
        let mut object = Object::parse_at(&info.scanner(), start, true)
            .ok_or_else(|| Error::parse(start, format!("unreadable value in object {}", id)))?
            .value;
        info.decrypt_object(&mut object)?;
        Ok(object)
    }

    /// Number of leaf pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Object numbers of the pages, in document order.
    pub fn page_ids(&self) -> Vec<u32> {
        self.pages.iter().map(PageEntry::id).collect()
    }

    /// Page with object number `page_id`.
    pub fn page(&self, page_id: u32) -> Option<&PageDict> {
        self.pages.iter().find(|p| p.id() == page_id).map(|p| &p.page)
    }

    fn page_index(&self, page_id: u32) -> Result<usize> {
        self.pages
            .iter()
            .position(|p| p.id() == page_id)
            .ok_or(Error::ObjectNotFound(page_id, 0))
    }

    fn annotation_refs(&self, page: &PageDict) -> Result<Vec<ObjectId>> {
        match page.annots() {
            AnnotsRef::None => Ok(Vec::new()),
            AnnotsRef::Direct(refs) => Ok(refs.clone()),
            AnnotsRef::Indirect(array) => {
                let info = self.source.info_for(array.id)?;
                let (start, _) = info.bounds.content();
                Ok(read_refs(&info.scanner(), start)?.value)
            },
        }
    }

    /// Parse the annotations of page `index` unless already loaded.
    fn load_annotations(&mut self, index: usize) -> Result<()> {
        if self.pages[index].annotations.is_some() {
            return Ok(());
        }
        let options = self.source.options;
        let refs = match self.annotation_refs(&self.pages[index].page) {
            Ok(refs) => refs,
            Err(e) if options.tolerates(&e) => Vec::new(),
            Err(e) => return Err(e),
        };
        let mut slots = Vec::with_capacity(refs.len());
        for reference in refs {
            let parsed = self
                .source
                .info_for(reference.id)
                .and_then(|info| AnnotationDict::parse(&info));
            match parsed {
                Ok(annot) => slots.push(AnnotSlot::Loaded(Box::new(annot))),
                Err(e) if options.tolerates(&e) => {
                    log::warn!("skipping unreadable annotation {}: {}", reference, e);
                    slots.push(AnnotSlot::Unreadable(reference));
                },
                Err(e) => return Err(e),
            }
        }
        log::debug!("page {}: {} annotations", self.pages[index].id(), slots.len());
        self.pages[index].annotations = Some(slots);
        Ok(())
    }

    /// Annotations of page `page_id`, loading them on first use.
    pub fn annotations(&mut self, page_id: u32) -> Result<Vec<&AnnotationDict>> {
        let index = self.page_index(page_id)?;
        self.load_annotations(index)?;
        Ok(self.pages[index].loaded().collect())
    }

    /// Viewer records for the annotations of page `page_id`.
    pub fn annotation_dtos(&mut self, page_id: u32) -> Result<Vec<AnnotationDto>> {
        Ok(self
            .annotations(page_id)?
            .into_iter()
            .map(|a| a.to_dto(page_id))
            .collect())
    }

    /// `(page index, slot index)` of the live annotation named `uuid`.
    fn locate(&mut self, uuid: &str) -> Result<Option<(usize, usize)>> {
        for index in 0..self.pages.len() {
            self.load_annotations(index)?;
            let found = self.pages[index].annotations.iter().flatten().position(|slot| {
                matches!(slot, AnnotSlot::Loaded(a) if !a.dict.is_deleted() && a.uuid() == uuid)
            });
            if let Some(slot) = found {
                return Ok(Some((index, slot)));
            }
        }
        Ok(None)
    }

    fn dto_of(&mut self, uuid: &str) -> Result<Option<AnnotationDto>> {
        Ok(self.locate(uuid)?.and_then(|(page, slot)| {
            let entry = &self.pages[page];
            match entry.annotations.as_ref()?.get(slot)? {
                AnnotSlot::Loaded(annot) => Some(annot.to_dto(entry.id())),
                AnnotSlot::Unreadable(_) => None,
            }
        }))
    }

    /// Register a change listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&DocumentEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Add `annotation` to page `page_id`; returns its `/NM`.
    pub fn add_annotation(&mut self, page_id: u32, mut annotation: AnnotationDict) -> Result<String> {
        let index = self.page_index(page_id)?;
        let uuid = annotation.uuid().to_string();
        if self.locate(&uuid)?.is_some() {
            return Err(Error::ReferenceIntegrity(format!("annotation {} already exists", uuid)));
        }
        if let Some(page_ref) = self.pages[index].page.dict.reference {
            if annotation.page() != Some(page_ref) {
                annotation.set_page(page_ref);
            }
        }
        annotation.dict.mark_added();
        let event = DocumentEvent::Add(annotation.to_dto(page_id));

        let entry = &mut self.pages[index];
        entry.annotations.get_or_insert_with(Vec::new).push(AnnotSlot::Loaded(Box::new(annotation)));
        entry.list_changed = true;
        emit(&mut self.listeners, &event);
        Ok(uuid)
    }

    /// Add an annotation described by a viewer record.
    ///
    /// An empty `uuid` gets a generated one.
    pub fn add_annotation_from_dto(&mut self, dto: &AnnotationDto) -> Result<String> {
        let index = self.page_index(dto.page_id)?;
        let page_ref = self.pages[index]
            .page
            .dict
            .reference
            .ok_or(Error::ObjectNotFound(dto.page_id, 0))?;
        let annotation = AnnotationDict::from_dto(dto, page_ref)?;
        self.add_annotation(dto.page_id, annotation)
    }

    /// Mutable access to the annotation named `uuid`.
    pub fn annotation_mut(&mut self, uuid: &str) -> Result<Option<AnnotationMut<'_>>> {
        let Some((page, slot)) = self.locate(uuid)? else {
            return Ok(None);
        };
        let entry = &mut self.pages[page];
        let page_id = entry.id();
        match entry.annotations.as_mut().and_then(|slots| slots.get_mut(slot)) {
            Some(AnnotSlot::Loaded(annotation)) => Ok(Some(AnnotationMut {
                annotation: annotation.as_mut(),
                listeners: &mut self.listeners,
                page_id,
                touched: false,
            })),
            _ => Ok(None),
        }
    }

    /// Remove the annotation named `uuid`; `false` when there is none.
    pub fn remove_annotation(&mut self, uuid: &str) -> Result<bool> {
        let Some((page, slot)) = self.locate(uuid)? else {
            return Ok(false);
        };
        let entry = &mut self.pages[page];
        let page_id = entry.id();
        let Some(slots) = entry.annotations.as_mut() else {
            return Ok(false);
        };
        let event = match slots.get_mut(slot) {
            Some(AnnotSlot::Loaded(annotation)) => {
                let event = DocumentEvent::Delete(annotation.to_dto(page_id));
                if annotation.dict.reference.is_some() {
                    annotation.dict.mark_deleted();
                } else {
                    slots.remove(slot);
                }
                event
            },
            _ => return Ok(false),
        };
        entry.list_changed = true;
        if self.selected.as_deref() == Some(uuid) {
            self.selected = None;
        }
        if self.focused.as_deref() == Some(uuid) {
            self.focused = None;
        }
        emit(&mut self.listeners, &event);
        Ok(true)
    }

    /// Select the annotation named `uuid`, or clear the selection.
    pub fn select_annotation(&mut self, uuid: Option<&str>) -> Result<()> {
        let dto = match uuid {
            Some(uuid) => Some(
                self.dto_of(uuid)?
                    .ok_or_else(|| Error::InvalidPdf(format!("no annotation named {}", uuid)))?,
            ),
            None => None,
        };
        self.selected = dto.as_ref().map(|d| d.uuid.clone());
        emit(&mut self.listeners, &DocumentEvent::Select(dto));
        Ok(())
    }

    /// Focus the annotation named `uuid`, or clear the focus.
    pub fn focus_annotation(&mut self, uuid: Option<&str>) -> Result<()> {
        let dto = match uuid {
            Some(uuid) => Some(
                self.dto_of(uuid)?
                    .ok_or_else(|| Error::InvalidPdf(format!("no annotation named {}", uuid)))?,
            ),
            None => None,
        };
        self.focused = dto.as_ref().map(|d| d.uuid.clone());
        emit(&mut self.listeners, &DocumentEvent::Focus(dto));
        Ok(())
    }

    /// Currently selected annotation.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Currently focused annotation.
    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Ask subscribers to redraw page `page_id`, or all pages.
    pub fn request_render(&mut self, page_id: Option<u32>) {
        emit(&mut self.listeners, &DocumentEvent::Render(page_id));
    }

    /// Whether any annotation or annotation list changed since opening.
    pub fn is_dirty(&self) -> bool {
        self.pages.iter().any(|entry| {
            entry.list_changed
                || entry.annotations.iter().flatten().any(|slot| {
                    matches!(slot, AnnotSlot::Loaded(a)
                        if a.dict.is_added() || a.dict.is_edited() || a.dict.is_deleted())
                })
        })
    }

    /// Appearance streams and popups of removed annotations that no
    /// remaining loaded annotation points at, in id order.
    fn orphaned_by_removal(&self) -> Vec<ObjectId> {
        let mut owned: HashMap<u32, ObjectId> = HashMap::new();
        let mut kept = HashSet::new();
        for slot in self.pages.iter().filter_map(|entry| entry.annotations.as_ref()).flatten() {
            match slot {
                AnnotSlot::Loaded(annot) if annot.dict.is_deleted() => {
                    let appearance = annot.appearance().map(AppearanceDict::references).unwrap_or_default();
                    let popup = annot.markup().and_then(|m| m.popup);
                    for reference in appearance.into_iter().chain(annot.appearance_ref()).chain(popup) {
                        owned.insert(reference.id, reference);
                    }
                },
                AnnotSlot::Loaded(annot) => kept.extend(annot.references().into_iter().map(|r| r.id)),
                AnnotSlot::Unreadable(reference) => {
                    kept.insert(reference.id);
                },
            }
        }
        let mut orphaned: Vec<ObjectId> = owned.into_values().filter(|r| !kept.contains(&r.id)).collect();
        orphaned.sort_by_key(|r| r.id);
        orphaned
    }

    /// Original bytes followed by one incremental update holding every
    /// change. The document itself is left untouched.
    ///
    /// Removing an annotation also frees the appearance streams and popup
    /// only it owned; a popup listed by the page is dropped from the list.
    pub fn save(&self) -> Result<Vec<u8>> {
        let resolver: Arc<dyn ObjectResolver> = Arc::clone(&self.source) as Arc<dyn ObjectResolver>;
        let mut writer = IncrementalWriter::new(&self.source.data, &self.chain, Arc::clone(&self.source.reference_data))?
            .with_crypt(self.source.crypt.get().cloned())
            .with_resolver(Some(resolver))
            .with_options(self.source.options);
        let orphaned = self.orphaned_by_removal();
        let orphaned_ids: HashSet<u32> = orphaned.iter().map(|r| r.id).collect();

        for entry in &self.pages {
            let Some(slots) = &entry.annotations else {
                continue;
            };
            let mut page = entry.page.clone();
            let mut list_changed = entry.list_changed;
            let mut refs = Vec::with_capacity(slots.len());
            for slot in slots {
                match slot {
                    AnnotSlot::Unreadable(reference) => refs.push(*reference),
                    AnnotSlot::Loaded(annotation) if annotation.dict.is_deleted() => {
                        if let Some(reference) = annotation.dict.reference {
                            writer.delete(reference)?;
                        }
                        list_changed = true;
                    },
                    AnnotSlot::Loaded(annotation)
                        if annotation.dict.reference.is_some_and(|r| orphaned_ids.contains(&r.id)) =>
                    {
                        list_changed = true;
                    },
                    AnnotSlot::Loaded(annotation) => {
                        let dirty = annotation.dict.is_added() || annotation.dict.is_edited();
                        match annotation.dict.reference {
                            Some(reference) if !dirty => refs.push(reference),
                            _ => {
                                list_changed |= annotation.dict.reference.is_none();
                                let mut annotation = annotation.as_ref().clone();
                                refs.push(writer.write_annotation(&mut annotation)?);
                            },
                        }
                    },
                }
            }
            if list_changed {
                page.set_annots(refs);
                writer.write_page(&mut page)?;
            } else if let Some(page_ref) = page.dict.reference {
                writer.record_page_annots(page_ref, refs);
            }
        }

        for reference in orphaned {
            if writer.delete(reference)? {
                log::debug!("freed {} owned by a removed annotation", reference);
            }
        }

        let updated = writer.finish()?;
        log::debug!("saved {} bytes ({} appended)", updated.len(), updated.len() - self.source.data.len());
        Ok(updated)
    }

    /// [`save`](Self::save) and write the result to `path`.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let updated = self.save()?;
        std::fs::write(path.as_ref(), updated)?;
        Ok(())
    }
}
