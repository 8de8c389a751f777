//! Integration tests for appending incremental updates, including several
//! updates stacked on one file.

mod common;

use bytes::Bytes;
use common::{annotated_document, PdfBuilder};
use pdf_delta::model::annotations::AnnotationColor;
use pdf_delta::error::Error;
use pdf_delta::model::{
    AnnotationDict, AnnotationKind, AnnotsRef, AppearanceDict, FontDict, PageDict, ParseInfo, PdfObject, ResourceDict,
    ResourcesRef, XFormStream,
};
use pdf_delta::object::{Object, ObjectId};
use pdf_delta::parser_config::ParserOptions;
use pdf_delta::writer::IncrementalWriter;
use pdf_delta::xref::{ReferenceData, UsedLocation, XRefChain, XRefKind};
use std::sync::Arc;

struct Opened {
    data: Vec<u8>,
    chain: XRefChain,
    refs: Arc<ReferenceData>,
}

fn open(data: Vec<u8>) -> Opened {
    let chain = XRefChain::parse(&Bytes::from(data.clone()), &ParserOptions::strict()).unwrap();
    let refs = Arc::new(ReferenceData::from_chain(&chain));
    Opened { data, chain, refs }
}

impl Opened {
    fn writer(&self) -> IncrementalWriter {
        IncrementalWriter::new(&self.data, &self.chain, Arc::clone(&self.refs)).unwrap()
    }

    fn parse<T: PdfObject>(&self, id: u32) -> T {
        let Some(UsedLocation::Offset(offset)) = self.refs.get_used(id).map(|u| u.location) else {
            panic!("object {} is not stored at an offset", id);
        };
        T::parse(&ParseInfo::from_indirect_at(Bytes::from(self.data.clone()), offset).unwrap()).unwrap()
    }
}

#[test]
fn test_original_bytes_are_preserved() {
    let source = open(annotated_document());
    let mut writer = source.writer();
    let mut annot: AnnotationDict = source.parse(5);
    annot.set_contents(Some("Edited".to_string()));
    writer.write_annotation(&mut annot).unwrap();
    let output = writer.finish().unwrap();

    assert_eq!(&output[..source.data.len()], &source.data[..]);
    let updated = open(output);
    assert_eq!(updated.chain.sections.len(), 2);
    assert_eq!(updated.chain.trailer().and_then(|t| t.prev), Some(source.chain.sections[0].offset));
    let reread: AnnotationDict = updated.parse(5);
    assert_eq!(reread.contents(), Some("Edited"));
    assert_eq!(reread.uuid(), "note-1");
    assert!(reread.markup().is_some_and(|m| m.author.as_deref() == Some("Reviewer")));
}

#[test]
fn test_three_revisions_reuse_freed_id() {
    // revision 2: drop the square annotation
    let first = open(annotated_document());
    let mut writer = first.writer();
    let mut page: PageDict = first.parse(3);
    page.set_annots(vec![ObjectId::new(5, 0)]);
    writer.write_page(&mut page).unwrap();
    assert!(writer.delete(ObjectId::new(4, 0)).unwrap());
    let second = open(writer.finish().unwrap());
    assert_eq!(second.refs.free_chain(), vec![0, 4, 0]);

    // revision 3: a new annotation takes object 4 at generation 1
    let mut writer = second.writer();
    let mut page: PageDict = second.parse(3);
    let mut circle = AnnotationDict::new(
        AnnotationKind::Circle {
            interior: AnnotationColor::None,
        },
        [50.0, 50.0, 80.0, 80.0],
    );
    circle.set_page(ObjectId::new(3, 0));
    let reference = writer.write_annotation(&mut circle).unwrap();
    assert_eq!(reference, ObjectId::new(4, 1));
    page.set_annots(vec![ObjectId::new(5, 0), reference]);
    writer.write_page(&mut page).unwrap();
    let third = open(writer.finish().unwrap());

    assert_eq!(third.chain.sections.len(), 3);
    assert_eq!(third.refs.get_used(4).map(|u| u.generation), Some(1));
    assert_eq!(third.refs.free_chain(), vec![0, 0]);
    assert_eq!(third.refs.size(), 7);
    let reread: AnnotationDict = third.parse(4);
    assert_eq!(reread.uuid(), circle.uuid());
    let page: PageDict = third.parse(3);
    assert_eq!(page.annots(), &AnnotsRef::Direct(vec![ObjectId::new(5, 0), ObjectId::new(4, 1)]));
}

#[test]
fn test_force_new_skips_free_ids() {
    let first = open(annotated_document());
    let mut writer = first.writer();
    let mut page: PageDict = first.parse(3);
    page.set_annots(vec![ObjectId::new(5, 0)]);
    writer.write_page(&mut page).unwrap();
    writer.delete(ObjectId::new(4, 0)).unwrap();
    let second = open(writer.finish().unwrap());

    let mut writer = second.writer();
    let forced = writer.write_new_object(&Object::Integer(1), true).unwrap();
    assert_eq!(forced, ObjectId::new(7, 0));
    let reused = writer.write_new_object(&Object::Integer(2), false).unwrap();
    assert_eq!(reused, ObjectId::new(4, 1));
}

#[test]
fn test_update_mirrors_stream_section() {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object_stream(5, &[(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 300 300] >>")]);
    let source = open(b.finish_xref_stream(6, "/Root 1 0 R"));
    assert_eq!(source.chain.kind(), XRefKind::Stream);

    let mut writer = source.writer();
    let mut annot = AnnotationDict::new(
        AnnotationKind::Square {
            interior: AnnotationColor::None,
        },
        [10.0, 10.0, 40.0, 40.0],
    );
    let annot_ref = writer.write_annotation(&mut annot).unwrap();
    // rewriting a compressed page moves it out of its object stream
    writer.write_updated_object(ObjectId::new(3, 0), &Object::Null).unwrap();
    let updated = open(writer.finish().unwrap());

    assert_eq!(updated.chain.kind(), XRefKind::Stream);
    assert_eq!(updated.chain.sections.len(), 2);
    assert!(matches!(updated.refs.get_used(3).map(|u| u.location), Some(UsedLocation::Offset(_))));
    assert!(updated.refs.get_used(annot_ref.id).is_some());
    let own = updated.chain.newest().and_then(|s| s.stream_id).unwrap();
    assert!(own > annot_ref.id);
    assert_eq!(updated.refs.size(), own + 1);
}

#[test]
fn test_written_annotation_keeps_unknown_keys() {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] /Annots [4 0 R] >>")
        .object(
            4,
            "<< /Type /Annot /Subtype /Square /Rect [1 1 9 9] /NM (sq) /Vendor:Tag (keep me) /StructParent 3 >>",
        );
    let source = open(b.finish_table("/Root 1 0 R"));

    let mut writer = source.writer();
    let mut annot: AnnotationDict = source.parse(4);
    annot.set_rect([2.0, 2.0, 8.0, 8.0]);
    writer.write_annotation(&mut annot).unwrap();
    let updated = open(writer.finish().unwrap());

    let object = updated.parse::<AnnotationDict>(4).to_object();
    let dict = object.as_dict().unwrap();
    assert_eq!(dict.get("/Vendor:Tag").and_then(Object::as_string), Some(&b"keep me"[..]));
    assert_eq!(dict.get("/StructParent").and_then(Object::as_integer), Some(3));
    assert_eq!(dict.get("/Rect"), Some(&Object::numbers(&[2.0, 2.0, 8.0, 8.0])));
}

/// One page, no annotations, a Helvetica font as object 4.
fn font_document() -> Vec<u8> {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 300 300] >>")
        .object(4, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
    b.finish_table("/Root 1 0 R")
}

/// Square whose new appearance form draws text with `font`.
fn square_using_font(rect: [f64; 4], font: ObjectId) -> AnnotationDict {
    let mut annot = AnnotationDict::new(
        AnnotationKind::Square {
            interior: AnnotationColor::None,
        },
        rect,
    );
    annot.set_page(ObjectId::new(3, 0));
    let mut form = XFormStream::new([0.0, 0.0, 40.0, 20.0], b"BT /F1 9 Tf 2 6 Td (label) Tj ET").unwrap();
    let mut resources = ResourceDict::default();
    resources.fonts.insert("/F1".to_string(), font);
    form.resources = Some(ResourcesRef::Inline(Box::new(resources)));
    annot.set_appearance(AppearanceDict::with_normal(form));
    annot
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

#[test]
fn test_shared_font_is_written_once() {
    let source = open(font_document());
    let font = ObjectId::new(4, 0);
    let mut writer = source.writer();
    writer
        .write_updated_object(font, &FontDict::standard("Courier").to_object())
        .unwrap();

    let mut first = square_using_font([10.0, 10.0, 50.0, 30.0], font);
    let mut second = square_using_font([60.0, 10.0, 100.0, 30.0], font);
    let first_ref = writer.write_annotation(&mut first).unwrap();
    let second_ref = writer.write_annotation(&mut second).unwrap();
    assert!(writer.is_reached(font));
    // a later rewrite of the same font is dropped
    writer
        .write_updated_object(font, &FontDict::standard("Times-Roman").to_object())
        .unwrap();

    let mut page: PageDict = source.parse(3);
    page.set_annots(vec![first_ref, second_ref]);
    writer.write_page(&mut page).unwrap();
    let output = writer.finish().unwrap();

    let appended = &output[source.data.len()..];
    assert_eq!(count(appended, b"4 0 obj"), 1);
    assert_eq!(count(appended, b"/Courier"), 1);
    assert_eq!(count(appended, b"/Times-Roman"), 0);
    let updated = open(output);
    let reread: FontDict = updated.parse(4);
    assert_eq!(reread.base_font.as_deref(), Some("/Courier"));
}

#[test]
fn test_freed_font_in_new_appearance_is_rejected() {
    let source = open(font_document());
    let font = ObjectId::new(4, 0);
    let mut writer = source.writer();
    assert!(writer.delete(font).unwrap());

    let mut annot = square_using_font([10.0, 10.0, 50.0, 30.0], font);
    match writer.write_annotation(&mut annot) {
        Err(Error::ReferenceIntegrity(message)) => assert!(message.contains("4 0 R"), "{}", message),
        other => panic!("expected an integrity error, got {:?}", other),
    }
}

#[test]
fn test_font_freed_after_its_form_was_written() {
    let source = open(font_document());
    let font = ObjectId::new(4, 0);
    let mut writer = source.writer();
    let mut annot = square_using_font([10.0, 10.0, 50.0, 30.0], font);
    let annot_ref = writer.write_annotation(&mut annot).unwrap();
    let mut page: PageDict = source.parse(3);
    page.set_annots(vec![annot_ref]);
    writer.write_page(&mut page).unwrap();

    assert!(writer.delete(font).unwrap());
    assert!(matches!(writer.finish(), Err(Error::ReferenceIntegrity(_))));
}

#[test]
fn test_stale_font_generation_is_rejected() {
    let source = open(font_document());
    let mut writer = source.writer();
    let mut annot = square_using_font([10.0, 10.0, 50.0, 30.0], ObjectId::new(4, 2));
    assert!(matches!(writer.write_annotation(&mut annot), Err(Error::ReferenceIntegrity(_))));
}
