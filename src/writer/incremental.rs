//! Incremental update writer.
//!
//! The original bytes are copied once and never touched again; new and
//! changed objects are appended after them, followed by one cross-reference
//! section of the same kind as the newest section in the file, a trailer
//! whose `/Prev` points at the previous section, and `startxref`/`%%EOF`.
//!
//! ```text
//! <original bytes>
//! 12 0 obj ... endobj        <- new or updated objects
//! xref ... trailer << /Prev N >>   (or an /XRef stream object)
//! startxref
//! <offset>
//! %%EOF
//! ```
//!
//! Before a parent container (annotation, appearance form, page) is
//! written, the resources it reaches are walked: resource dictionaries lead
//! to fonts, form XObjects (recursively, through their own resources) and
//! images with their soft masks. Every reference the walk reaches must be
//! in use at its current generation, both when it is reached and when the
//! update is finished. Objects already written in this update are not
//! revisited and never written twice.

use super::ObjectSerializer;
use crate::crypt::CryptInfo;
use crate::error::{Error, Result};
use crate::model::dict::peek_name;
use crate::model::{
    AnnotationDict, AnnotsRef, FontDict, ImageStream, ObjectResolver, PageDict, ParseInfo, PdfObject, ResourceDict,
    ResourcesRef, StreamSlot, XFormStream,
};
use crate::object::{Object, ObjectId};
use crate::parser_config::ParserOptions;
use crate::xref::{stream, table, ReferenceData, ReferenceDataChange, TrailerDict, XRefChain, XRefKind};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;

/// Appends one incremental update to a document.
///
/// A writer owns its [`ReferenceDataChange`] for the whole session; it is
/// consumed by [`IncrementalWriter::finish`].
pub struct IncrementalWriter {
    output: Vec<u8>,
    update_start: usize,
    change: ReferenceDataChange,
    written: HashSet<u32>,
    reached: HashSet<ObjectId>,
    resolver: Option<Arc<dyn ObjectResolver>>,
    options: ParserOptions,
    page_annots: HashMap<ObjectId, Vec<ObjectId>>,
    trailer: TrailerDict,
    prev: usize,
    kind: XRefKind,
    crypt: Option<CryptInfo>,
    serializer: ObjectSerializer,
}

impl std::fmt::Debug for IncrementalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalWriter")
            .field("update_start", &self.update_start)
            .field("appended", &(self.output.len() - self.update_start))
            .field("written", &self.written.len())
            .field("reached", &self.reached.len())
            .field("kind", &self.kind)
            .finish()
    }
}

impl IncrementalWriter {
    /// Start an update of `source`, whose xref chain and folded references
    /// were read beforehand.
    pub fn new(source: &[u8], chain: &XRefChain, reference_data: Arc<ReferenceData>) -> Result<Self> {
        let newest = chain
            .newest()
            .ok_or_else(|| Error::InvalidPdf("document has no cross-reference section".to_string()))?;
        let mut output = Vec::with_capacity(source.len() + 4096);
        output.extend_from_slice(source);
        if !matches!(source.last(), Some(b'\n' | b'\r')) {
            output.extend_from_slice(b"\r\n");
        }
        let mut trailer = newest.trailer.clone();
        trailer.root = chain.root();
        Ok(Self {
            update_start: output.len(),
            output,
            change: ReferenceDataChange::new(reference_data),
            written: HashSet::new(),
            reached: HashSet::new(),
            resolver: None,
            options: ParserOptions::default(),
            page_annots: HashMap::new(),
            trailer,
            prev: newest.offset,
            kind: newest.kind,
            crypt: None,
            serializer: ObjectSerializer::new(),
        })
    }

    /// Encrypt strings and streams of written objects with `crypt`.
    pub fn with_crypt(mut self, crypt: Option<CryptInfo>) -> Self {
        self.crypt = crypt;
        self
    }

    /// Look up existing objects through `resolver` so the resource walk can
    /// descend into them. Without one only the references themselves are
    /// checked.
    pub fn with_resolver(mut self, resolver: Option<Arc<dyn ObjectResolver>>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Strictness for existing objects the resource walk fails to read.
    /// Integrity errors are never tolerated.
    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    /// Offset the appended section starts at.
    pub fn update_start(&self) -> usize {
        self.update_start
    }

    /// Whether `id` was already written in this update.
    pub fn is_written(&self, id: u32) -> bool {
        self.written.contains(&id)
    }

    /// Whether the resource walk reached `reference`.
    pub fn is_reached(&self, reference: ObjectId) -> bool {
        self.reached.contains(&reference)
    }

    /// Allocation ledger of this update.
    pub fn change(&self) -> &ReferenceDataChange {
        &self.change
    }

    fn append(&mut self, reference: ObjectId, obj: &Object) -> Result<()> {
        let bytes = self.serializer.serialize_indirect(reference, obj, self.crypt.as_ref())?;
        self.output.extend_from_slice(&bytes);
        self.written.insert(reference.id);
        log::debug!("wrote {} ({} bytes)", reference, bytes.len());
        Ok(())
    }

    /// Write a new object under a freshly allocated reference.
    ///
    /// A free id is reused unless `force_new` is set.
    pub fn write_new_object(&mut self, obj: &Object, force_new: bool) -> Result<ObjectId> {
        let reference = self.change.take_free_ref(self.output.len(), force_new);
        self.append(reference, obj)?;
        Ok(reference)
    }

    /// Rewrite the existing object `reference` with a new value.
    ///
    /// The generation is kept; a stale generation is an integrity error. An
    /// id already written in this update is left as written and `obj` is
    /// dropped.
    pub fn write_updated_object(&mut self, reference: ObjectId, obj: &Object) -> Result<()> {
        if self.written.contains(&reference.id) {
            log::debug!("{} already written in this update, skipped", reference);
            return Ok(());
        }
        self.change.update_used_ref(reference, self.output.len())?;
        self.append(reference, obj)
    }

    /// Write a typed object that has no reference yet.
    pub fn write_new<T: PdfObject>(&mut self, obj: &mut T, force_new: bool) -> Result<ObjectId> {
        if let Some(existing) = obj.dict().reference {
            return Err(Error::ReferenceIntegrity(format!("object already has reference {}", existing)));
        }
        let offset = self.output.len();
        let reference = self.change.take_free_ref(offset, force_new);
        obj.dict_mut().reference = Some(reference);
        self.append(reference, &obj.to_object())?;
        obj.dict_mut().clear_flags();
        Ok(reference)
    }

    /// Rewrite a typed object in place of its current revision.
    pub fn write_updated<T: PdfObject>(&mut self, obj: &mut T) -> Result<ObjectId> {
        let reference = obj
            .dict()
            .reference
            .ok_or_else(|| Error::ReferenceIntegrity("updated object has no reference".to_string()))?;
        self.write_updated_object(reference, &obj.to_object())?;
        obj.dict_mut().clear_flags();
        Ok(reference)
    }

    /// Write a page and remember its `/Annots` for the integrity check.
    pub fn write_page(&mut self, page: &mut PageDict) -> Result<ObjectId> {
        if let Some(resources) = &page.resources {
            self.write_resources(resources)?;
        }
        let annots = match page.annots() {
            AnnotsRef::Direct(refs) => refs.clone(),
            _ => Vec::new(),
        };
        let reference = if page.dict.reference.is_none() {
            self.write_new(page, false)?
        } else {
            self.write_updated(page)?
        };
        self.page_annots.insert(reference, annots);
        Ok(reference)
    }

    /// Remember the entries of a separately stored `/Annots` array of `page`.
    pub fn record_page_annots(&mut self, page: ObjectId, annots: Vec<ObjectId>) {
        self.page_annots.insert(page, annots);
    }

    /// Write an annotation, preceded by any appearance stream created in
    /// this session so the annotation can point at it.
    ///
    /// Existing appearance streams and the resources of new ones are walked
    /// first.
    pub fn write_annotation(&mut self, annot: &mut AnnotationDict) -> Result<ObjectId> {
        if let Some(appearance) = annot.appearance_ref() {
            self.visit(appearance)?;
        }
        if let Some(appearance) = annot.appearance_mut() {
            for slot in appearance.slots_mut() {
                match slot {
                    StreamSlot::New(form) => {
                        if let Some(resources) = &form.resources {
                            self.write_resources(resources)?;
                        }
                        let reference = self.write_new(form.as_mut(), false)?;
                        *slot = StreamSlot::Ref(reference);
                    },
                    StreamSlot::Ref(reference) => self.walk_reference(*reference)?,
                }
            }
        }
        if annot.dict.reference.is_none() {
            self.write_new(annot, false)
        } else {
            self.write_updated(annot)
        }
    }

    /// Free `reference`; returns whether the ledger changed.
    pub fn delete(&mut self, reference: ObjectId) -> Result<bool> {
        if self.written.contains(&reference.id) {
            return Err(Error::ReferenceIntegrity(format!("{} was written in this update", reference)));
        }
        match self.change.generation_of(reference.id) {
            Some(generation) if generation != reference.generation && self.change.is_used(reference.id) => {
                Err(Error::ReferenceIntegrity(format!(
                    "stale reference {}: current generation is {}",
                    reference, generation
                )))
            },
            _ => self.change.set_ref_free(reference.id),
        }
    }

    /// Walk every object `resources` leads to.
    pub fn write_resources(&mut self, resources: &ResourcesRef) -> Result<()> {
        match resources {
            ResourcesRef::Inline(dict) => self.walk_resource_dict(dict),
            ResourcesRef::Indirect(reference) => {
                let Some(info) = self.visit(*reference)? else {
                    return Ok(());
                };
                match ResourceDict::parse(&info) {
                    Ok(dict) => self.walk_resource_dict(&dict),
                    Err(e) if self.options.tolerates(&e) => Ok(()),
                    Err(e) => Err(e),
                }
            },
        }
    }

    fn walk_resource_dict(&mut self, dict: &ResourceDict) -> Result<()> {
        for reference in dict.references() {
            self.walk_reference(reference)?;
        }
        Ok(())
    }

    fn walk_reference(&mut self, reference: ObjectId) -> Result<()> {
        let Some(info) = self.visit(reference)? else {
            return Ok(());
        };
        match self.walk_object(&info) {
            Err(e) if !matches!(e, Error::ReferenceIntegrity(_)) && self.options.tolerates(&e) => Ok(()),
            other => other,
        }
    }

    fn walk_object(&mut self, info: &ParseInfo) -> Result<()> {
        match peek_name(info, "/Subtype")?.as_deref() {
            Some("/Form") => {
                let form = XFormStream::parse(info)?;
                if let Some(resources) = &form.resources {
                    self.write_resources(resources)?;
                }
            },
            Some("/Image") => {
                let image = ImageStream::parse(info)?;
                if let Some(smask) = image.smask {
                    self.walk_reference(smask)?;
                }
            },
            _ if peek_name(info, "/Type")?.as_deref() == Some("/Font") => {
                let font = FontDict::parse(info)?;
                log::debug!("reached font {:?} ({:?})", font.base_font, font.subtype);
            },
            _ => {},
        }
        Ok(())
    }

    /// Record and check `reference`; parse info when it should be descended
    /// into.
    fn visit(&mut self, reference: ObjectId) -> Result<Option<ParseInfo>> {
        if !self.reached.insert(reference) {
            return Ok(None);
        }
        self.check_reached(reference)?;
        if self.written.contains(&reference.id) {
            return Ok(None);
        }
        let Some(resolver) = &self.resolver else {
            return Ok(None);
        };
        match resolver.parse_info(reference.id) {
            Ok(info) => Ok(Some(info)),
            Err(e) if self.options.tolerates(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn check_reached(&self, reference: ObjectId) -> Result<()> {
        if !self.change.is_used(reference.id) {
            return Err(Error::ReferenceIntegrity(format!("{} points at a free object", reference)));
        }
        match self.change.generation_of(reference.id) {
            Some(generation) if generation != reference.generation => Err(Error::ReferenceIntegrity(format!(
                "stale reference {}: current generation is {}",
                reference, generation
            ))),
            _ => Ok(()),
        }
    }

    fn check_integrity(&self) -> Result<()> {
        for reference in &self.reached {
            self.check_reached(*reference)?;
        }
        for (page, annots) in &self.page_annots {
            if let Some(dangling) = annots.iter().find(|a| !self.change.is_used(a.id)) {
                return Err(Error::ReferenceIntegrity(format!(
                    "page {} still lists freed annotation {}",
                    page, dangling
                )));
            }
        }
        Ok(())
    }

    /// Append the cross-reference section, trailer and `%%EOF`.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.check_integrity()?;
        let xref_offset = self.output.len();

        let section = match self.kind {
            XRefKind::Table => {
                let entries = self.change.xref_entries();
                let trailer = self.next_trailer().to_dictionary();
                table::write_table_section(&entries, &trailer)?
            },
            XRefKind::Stream => {
                let own = self.change.take_free_ref(xref_offset, true);
                let entries = self.change.xref_entries();
                let trailer = self.next_trailer().to_dictionary();
                stream::write_stream_section(own, &entries, &trailer)?
            },
        };
        self.output.extend_from_slice(&section);
        write!(self.output, "startxref\r\n{}\r\n%%EOF\r\n", xref_offset)?;
        log::debug!(
            "incremental update: {} objects, {} bytes appended, xref at {}",
            self.written.len(),
            self.output.len() - self.update_start,
            xref_offset
        );
        Ok(self.output)
    }

    fn next_trailer(&self) -> TrailerDict {
        TrailerDict {
            size: self.change.size(),
            prev: Some(self.prev),
            xref_stm: None,
            ..self.trailer.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::annotations::AnnotationColor;
    use crate::model::{AnnotationKind, ParseInfo};
    use crate::parser_config::ParserOptions;
    use crate::xref::{UsedLocation, XRefEntry};
    use bytes::Bytes;

    fn build(objects: &[&str]) -> (Vec<u8>, Vec<usize>) {
        let mut out = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        (out, offsets)
    }

    fn table_pdf() -> Vec<u8> {
        let (mut out, offsets) = build(&[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Annots [4 0 R] >>",
            "<< /Type /Annot /Subtype /Square /Rect [10 10 50 50] /NM (sq-1) >>",
        ]);
        let xref = out.len();
        out.extend_from_slice(b"xref\n0 5\n0000000000 65535 f\r\n");
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n\r\n", offset).as_bytes());
        }
        out.extend_from_slice(format!("trailer\n<< /Size 5 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n", xref).as_bytes());
        out
    }

    fn open(data: &[u8]) -> (XRefChain, Arc<ReferenceData>) {
        let chain = XRefChain::parse(&Bytes::copy_from_slice(data), &ParserOptions::strict()).unwrap();
        let refs = Arc::new(ReferenceData::from_chain(&chain));
        (chain, refs)
    }

    fn object_at<T: PdfObject>(data: &[u8], refs: &ReferenceData, id: u32) -> T {
        let Some(UsedLocation::Offset(offset)) = refs.get_used(id).map(|u| u.location) else {
            panic!("object {} is not stored at an offset", id);
        };
        T::parse(&ParseInfo::from_indirect_at(Bytes::copy_from_slice(data), offset).unwrap()).unwrap()
    }

    #[test]
    fn test_zero_edits_appends_empty_section() {
        let source = table_pdf();
        let (chain, refs) = open(&source);
        let prev = chain.newest().unwrap().offset;
        let output = IncrementalWriter::new(&source, &chain, refs).unwrap().finish().unwrap();

        assert!(output.starts_with(&source));
        let tail = String::from_utf8(output[source.len()..].to_vec()).unwrap();
        assert_eq!(
            tail,
            format!(
                "xref\r\ntrailer\r\n<< /Size 5 /Root 1 0 R /Prev {} >>\r\nstartxref\r\n{}\r\n%%EOF\r\n",
                prev,
                source.len()
            )
        );

        let (chain, _) = open(&output);
        assert_eq!(chain.sections.len(), 2);
    }

    #[test]
    fn test_new_annotation_with_appearance() {
        let source = table_pdf();
        let (chain, refs) = open(&source);
        let mut page: PageDict = object_at(&source, &refs, 3);
        let mut writer = IncrementalWriter::new(&source, &chain, refs).unwrap();

        let mut annot = AnnotationDict::new(
            AnnotationKind::Square {
                interior: AnnotationColor::None,
            },
            [20.0, 20.0, 80.0, 60.0],
        );
        annot.set_page(ObjectId::new(3, 0));
        annot.generate_appearance().unwrap();
        let annot_ref = writer.write_annotation(&mut annot).unwrap();
        assert_eq!(annot_ref, ObjectId::new(6, 0));
        assert!(writer.is_written(5));

        page.set_annots(vec![ObjectId::new(4, 0), annot_ref]);
        writer.write_page(&mut page).unwrap();
        let output = writer.finish().unwrap();
        assert!(output.starts_with(&source));

        let (chain, refs) = open(&output);
        assert_eq!(chain.kind(), XRefKind::Table);
        assert_eq!(refs.size(), 7);
        let reread: AnnotationDict = object_at(&output, &refs, 6);
        assert_eq!(reread.uuid(), annot.uuid());
        assert_eq!(reread.appearance().map(|ap| ap.references()), Some(vec![ObjectId::new(5, 0)]));
        let page: PageDict = object_at(&output, &refs, 3);
        assert_eq!(page.annots(), &AnnotsRef::Direct(vec![ObjectId::new(4, 0), ObjectId::new(6, 0)]));
    }

    #[test]
    fn test_second_write_of_same_id_is_skipped() {
        let source = table_pdf();
        let (chain, refs) = open(&source);
        let mut page: PageDict = object_at(&source, &refs, 3);
        let mut writer = IncrementalWriter::new(&source, &chain, refs).unwrap();
        writer.write_page(&mut page).unwrap();
        writer.write_updated_object(ObjectId::new(3, 0), &Object::Null).unwrap();
        assert!(writer.delete(ObjectId::new(3, 0)).is_err());
        let output = writer.finish().unwrap();

        let appended = &output[source.len()..];
        assert_eq!(appended.windows(7).filter(|w| w == b"3 0 obj").count(), 1);
        let (_, refs) = open(&output);
        let page: PageDict = object_at(&output, &refs, 3);
        assert_eq!(page.annots(), &AnnotsRef::Direct(vec![ObjectId::new(4, 0)]));
    }

    /// Reads objects of an unmodified file through its folded references.
    struct FileResolver {
        data: Bytes,
        refs: Arc<ReferenceData>,
    }

    impl ObjectResolver for FileResolver {
        fn parse_info(&self, id: u32) -> Result<ParseInfo> {
            match self.refs.get_used(id).map(|u| u.location) {
                Some(UsedLocation::Offset(offset)) => ParseInfo::from_indirect_at(self.data.clone(), offset),
                _ => Err(Error::ObjectNotFound(id, 0)),
            }
        }
    }

    /// Square annotation 4 whose appearance form 5 uses font 6 and image 7,
    /// the image having soft mask 8.
    fn appearance_pdf() -> Vec<u8> {
        let (mut out, offsets) = build(&[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Annots [4 0 R] >>",
            "<< /Type /Annot /Subtype /Square /Rect [10 10 50 50] /NM (sq-1) /AP << /N 5 0 R >> >>",
            "<< /Type /XObject /Subtype /Form /BBox [0 0 40 40] \
             /Resources << /Font << /F1 6 0 R >> /XObject << /Im1 7 0 R >> >> /Length 7 >>\n\
             stream\n/Im1 Do\nendstream",
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>",
            "<< /Type /XObject /Subtype /Image /Width 1 /Height 1 /BitsPerComponent 8 /SMask 8 0 R /Length 1 >>\n\
             stream\nA\nendstream",
            "<< /Type /XObject /Subtype /Image /Width 1 /Height 1 /BitsPerComponent 8 /Length 1 >>\n\
             stream\nB\nendstream",
        ]);
        let xref = out.len();
        out.extend_from_slice(b"xref\n0 9\n0000000000 65535 f\r\n");
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n\r\n", offset).as_bytes());
        }
        out.extend_from_slice(format!("trailer\n<< /Size 9 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n", xref).as_bytes());
        out
    }

    fn resolving_writer(source: &[u8]) -> (IncrementalWriter, Arc<ReferenceData>) {
        let (chain, refs) = open(source);
        let resolver = FileResolver {
            data: Bytes::copy_from_slice(source),
            refs: Arc::clone(&refs),
        };
        let writer = IncrementalWriter::new(source, &chain, Arc::clone(&refs))
            .unwrap()
            .with_resolver(Some(Arc::new(resolver)));
        (writer, refs)
    }

    #[test]
    fn test_walk_reaches_nested_resources() {
        let source = appearance_pdf();
        let (mut writer, refs) = resolving_writer(&source);
        let mut annot: AnnotationDict = object_at(&source, &refs, 4);
        annot.set_contents(Some("moved".to_string()));
        writer.write_annotation(&mut annot).unwrap();

        for id in 5..=8 {
            assert!(writer.is_reached(ObjectId::new(id, 0)), "object {} not reached", id);
            assert!(!writer.is_written(id));
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_freed_soft_mask_is_rejected() {
        let source = appearance_pdf();
        let (mut writer, refs) = resolving_writer(&source);
        let mut annot: AnnotationDict = object_at(&source, &refs, 4);
        assert!(writer.delete(ObjectId::new(8, 0)).unwrap());
        let err = writer.write_annotation(&mut annot).unwrap_err();
        assert!(matches!(err, Error::ReferenceIntegrity(ref m) if m.contains("8 0 R")), "{}", err);
    }

    #[test]
    fn test_font_freed_after_walk_fails_finish() {
        let source = appearance_pdf();
        let (mut writer, refs) = resolving_writer(&source);
        let mut annot: AnnotationDict = object_at(&source, &refs, 4);
        writer.write_annotation(&mut annot).unwrap();
        assert!(writer.delete(ObjectId::new(6, 0)).unwrap());
        assert!(matches!(writer.finish(), Err(Error::ReferenceIntegrity(_))));
    }

    #[test]
    fn test_without_resolver_only_direct_references_are_checked() {
        let source = appearance_pdf();
        let (chain, refs) = open(&source);
        let mut annot: AnnotationDict = object_at(&source, &refs, 4);
        let mut writer = IncrementalWriter::new(&source, &chain, refs).unwrap();
        writer.write_annotation(&mut annot).unwrap();
        assert!(writer.is_reached(ObjectId::new(5, 0)));
        assert!(!writer.is_reached(ObjectId::new(6, 0)));
    }

    #[test]
    fn test_freed_annotation_still_listed() {
        let source = table_pdf();
        let (chain, refs) = open(&source);
        let mut page: PageDict = object_at(&source, &refs, 3);
        let mut writer = IncrementalWriter::new(&source, &chain, refs).unwrap();
        writer.write_page(&mut page).unwrap();
        assert!(writer.delete(ObjectId::new(4, 0)).unwrap());
        assert!(matches!(writer.finish(), Err(Error::ReferenceIntegrity(_))));
    }

    #[test]
    fn test_delete_annotation() {
        let source = table_pdf();
        let (chain, refs) = open(&source);
        let mut page: PageDict = object_at(&source, &refs, 3);
        let mut writer = IncrementalWriter::new(&source, &chain, refs).unwrap();
        page.set_annots(Vec::new());
        writer.write_page(&mut page).unwrap();
        assert!(writer.delete(ObjectId::new(4, 0)).unwrap());
        assert!(!writer.delete(ObjectId::new(4, 0)).unwrap());
        let output = writer.finish().unwrap();

        let (chain, refs) = open(&output);
        assert_eq!(chain.newest().unwrap().entries.len(), 3);
        assert_eq!(refs.free_chain(), vec![0, 4, 0]);
        assert_eq!(refs.get_free(4).map(|f| f.generation), Some(1));
        assert!(refs.get_used(4).is_none());
    }

    #[test]
    fn test_stale_generation_rejected() {
        let source = table_pdf();
        let (chain, refs) = open(&source);
        let mut writer = IncrementalWriter::new(&source, &chain, refs).unwrap();
        assert!(writer.write_updated_object(ObjectId::new(2, 3), &Object::Null).is_err());
        assert!(writer.delete(ObjectId::new(4, 2)).is_err());
    }

    #[test]
    fn test_stream_section_is_mirrored() {
        let (mut source, offsets) = build(&[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [] /Count 0 >>",
        ]);
        let xref_offset = source.len();
        let entries = [
            XRefEntry::free(0, 65535, 0),
            XRefEntry::normal(1, 0, offsets[0]),
            XRefEntry::normal(2, 0, offsets[1]),
            XRefEntry::normal(3, 0, xref_offset),
        ];
        let mut trailer = crate::object::Dictionary::new();
        trailer.insert("/Size".into(), Object::Integer(4));
        trailer.insert("/Root".into(), Object::Reference(ObjectId::new(1, 0)));
        source.extend(stream::write_stream_section(ObjectId::new(3, 0), &entries, &trailer).unwrap());
        source.extend_from_slice(format!("startxref\r\n{}\r\n%%EOF\r\n", xref_offset).as_bytes());

        let (chain, refs) = open(&source);
        let mut writer = IncrementalWriter::new(&source, &chain, refs).unwrap();
        let info = writer.write_new_object(&Object::Dictionary(Default::default()), false).unwrap();
        assert_eq!(info, ObjectId::new(4, 0));
        let output = writer.finish().unwrap();

        let (chain, refs) = open(&output);
        assert_eq!(chain.sections.len(), 2);
        assert_eq!(chain.kind(), XRefKind::Stream);
        assert_eq!(chain.newest().unwrap().stream_id, Some(5));
        assert_eq!(chain.newest().unwrap().trailer.prev, Some(xref_offset));
        assert_eq!(refs.size(), 6);
        assert_eq!(chain.root(), Some(ObjectId::new(1, 0)));
    }
}
